//! Administrative helpers
//!
//! Plain CRUD for the records the engine only reads: responsibilities, staff,
//! workstation seating and escalation setup.

use tracing::info;

use super::SqliteQueueStore;
use crate::error::{QueueEngineError, Result};
use crate::escalation::{EscalationTier, TierId};
use crate::ticket::{EmployeeId, WorkstationId};

impl SqliteQueueStore {
    /// Define a service type with its priority weight
    pub async fn add_responsibility(&self, name: &str, priority: i64) -> Result<i64> {
        let result = sqlx::query("INSERT INTO responsibilities (name, priority) VALUES (?, ?)")
            .bind(name)
            .bind(priority)
            .execute(&self.pool)
            .await?;

        info!("📋 Added responsibility '{}' (priority {})", name, priority);
        Ok(result.last_insert_rowid())
    }

    /// Change a service's weight. Tickets already issued keep their stored
    /// priority.
    pub async fn set_responsibility_priority(&self, name: &str, priority: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE responsibilities SET priority = ? WHERE name = ?")
            .bind(priority)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn add_employee(&self, first_name: &str, second_name: &str) -> Result<EmployeeId> {
        let result = sqlx::query("INSERT INTO employees (first_name, second_name) VALUES (?, ?)")
            .bind(first_name)
            .bind(second_name)
            .execute(&self.pool)
            .await?;

        info!("👤 Added employee {} {}", first_name, second_name);
        Ok(result.last_insert_rowid())
    }

    /// Add a workstation, optionally with an employee seated at it
    pub async fn add_workstation(&self, name: &str, employee_id: Option<EmployeeId>) -> Result<WorkstationId> {
        let result = sqlx::query("INSERT INTO workstations (name, employee_id) VALUES (?, ?)")
            .bind(name)
            .bind(employee_id)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Seat an employee at a workstation, or empty it with `None`
    pub async fn seat_employee(&self, workstation_id: WorkstationId, employee_id: Option<EmployeeId>) -> Result<bool> {
        let result = sqlx::query("UPDATE workstations SET employee_id = ? WHERE id = ?")
            .bind(employee_id)
            .bind(workstation_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Authorize an employee for a service
    pub async fn grant_employee(&self, employee_id: EmployeeId, service_type: &str) -> Result<()> {
        let responsibility_id = self.responsibility_id(service_type).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO employee_responsibilities (employee_id, responsibility_id) VALUES (?, ?)",
        )
        .bind(employee_id)
        .bind(responsibility_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Authorize a workstation for a service
    pub async fn grant_workstation(&self, workstation_id: WorkstationId, service_type: &str) -> Result<()> {
        let responsibility_id = self.responsibility_id(service_type).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO workstation_responsibilities (workstation_id, responsibility_id) VALUES (?, ?)",
        )
        .bind(workstation_id)
        .bind(responsibility_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn responsibility_id(&self, service_type: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT id FROM responsibilities WHERE name = ?")
            .bind(service_type)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| QueueEngineError::UnknownService(service_type.to_string()))
    }

    pub async fn add_tier(&self, threshold_secs: i64, name: &str, active: bool) -> Result<EscalationTier> {
        if threshold_secs < 0 {
            return Err(QueueEngineError::invalid_input("threshold must not be negative"));
        }

        let result = sqlx::query("INSERT INTO escalation_tiers (threshold_secs, name, active) VALUES (?, ?, ?)")
            .bind(threshold_secs)
            .bind(name)
            .bind(active)
            .execute(&self.pool)
            .await?;

        info!("⏰ Added escalation tier '{}' at {}s", name, threshold_secs);
        Ok(EscalationTier {
            id: result.last_insert_rowid(),
            threshold_secs,
            name: name.to_string(),
            active,
        })
    }

    pub async fn update_tier(&self, tier: &EscalationTier) -> Result<bool> {
        if tier.threshold_secs < 0 {
            return Err(QueueEngineError::invalid_input("threshold must not be negative"));
        }

        let result = sqlx::query("UPDATE escalation_tiers SET threshold_secs = ?, name = ?, active = ? WHERE id = ?")
            .bind(tier.threshold_secs)
            .bind(&tier.name)
            .bind(tier.active)
            .bind(tier.id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a tier together with its recipients
    pub async fn remove_tier(&self, id: TierId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM escalation_recipients WHERE tier_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM escalation_tiers WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    /// Flip a tier's active flag, returning the new value
    pub async fn toggle_tier(&self, id: TierId) -> Result<Option<bool>> {
        let active = sqlx::query_scalar(
            "UPDATE escalation_tiers SET active = NOT active WHERE id = ? RETURNING active",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(active)
    }

    /// Bind an email address to a tier
    pub async fn add_recipient(&self, email: &str, tier_id: TierId) -> Result<i64> {
        if !email.contains('@') {
            return Err(QueueEngineError::invalid_input(format!("'{}' is not an email address", email)));
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM escalation_tiers WHERE id = ?")
            .bind(tier_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(QueueEngineError::not_found(format!("escalation tier {}", tier_id)));
        }

        let result = sqlx::query("INSERT INTO escalation_recipients (email, tier_id) VALUES (?, ?)")
            .bind(email)
            .bind(tier_id)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn remove_recipient(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM escalation_recipients WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::EntityRef;
    use crate::database::QueueStore;

    #[tokio::test]
    async fn test_grant_unknown_service() {
        let store = SqliteQueueStore::new_in_memory().await.unwrap();
        let employee = store.add_employee("Grace", "Hopper").await.unwrap();

        let err = store.grant_employee(employee, "Nonexistent").await.unwrap_err();
        assert!(matches!(err, QueueEngineError::UnknownService(_)));
    }

    #[tokio::test]
    async fn test_grants_show_up_as_capabilities() {
        let store = SqliteQueueStore::new_in_memory().await.unwrap();
        store.add_responsibility("Passport", 5).await.unwrap();
        store.add_responsibility("Visa", 3).await.unwrap();
        let ws = store.add_workstation("Window 1", None).await.unwrap();

        store.grant_workstation(ws, "Visa").await.unwrap();
        store.grant_workstation(ws, "Visa").await.unwrap();

        let caps = store.capabilities_of(EntityRef::Workstation(ws)).await.unwrap();
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].service_type, "Visa");
        assert_eq!(caps[0].priority, 3);
    }

    #[tokio::test]
    async fn test_tier_lifecycle() {
        let store = SqliteQueueStore::new_in_memory().await.unwrap();
        let late = store.add_tier(600, "Late", true).await.unwrap();
        let early = store.add_tier(60, "Early", true).await.unwrap();

        let names: Vec<_> = store.list_tiers().await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Early", "Late"]);

        assert_eq!(store.toggle_tier(early.id).await.unwrap(), Some(false));
        assert_eq!(store.toggle_tier(early.id).await.unwrap(), Some(true));
        assert_eq!(store.toggle_tier(9_999).await.unwrap(), None);

        store.add_recipient("boss@example.com", late.id).await.unwrap();
        assert!(store.add_recipient("boss@example.com", 9_999).await.is_err());
        assert!(store.add_recipient("not-an-address", late.id).await.is_err());

        assert!(store.remove_tier(late.id).await.unwrap());
        assert!(store.list_recipients().await.unwrap().is_empty());
    }
}
