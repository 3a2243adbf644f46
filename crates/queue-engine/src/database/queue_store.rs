//! `QueueStore` implementation for SQLite

use async_trait::async_trait;
use tracing::debug;

use super::{QueueStore, SqliteQueueStore};
use crate::capability::{Capability, EntityRef};
use crate::error::{QueueEngineError, Result};
use crate::escalation::{EscalationRecipient, EscalationTier};
use crate::ticket::{
    ArchivedTicket, EmployeeId, EmployeeStatus, EmployeeStatusEntry, Ticket, TicketId,
    TicketStatus, WorkstationId,
};

const TICKET_COLUMNS: &str =
    "id, priority, service_type, workstation_id, status, created_at, call_time, confirm_time, quality";

const ARCHIVE_COLUMNS: &str = "id, ticket_id, priority, service_type, workstation_id, status, created_at, \
     call_time, confirm_time, end_time, quality, employee_id, employee_first_name, \
     employee_second_name, workstation_name";

#[derive(sqlx::FromRow, Debug)]
struct TicketRow {
    id: i64,
    priority: i64,
    service_type: String,
    workstation_id: Option<i64>,
    status: i64,
    created_at: i64,
    call_time: Option<i64>,
    confirm_time: Option<i64>,
    quality: Option<i64>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = QueueEngineError;

    fn try_from(row: TicketRow) -> Result<Self> {
        Ok(Ticket {
            id: row.id,
            priority: row.priority,
            service_type: row.service_type,
            workstation_id: row.workstation_id,
            status: ticket_status(row.status)?,
            created_at: row.created_at,
            call_time: row.call_time,
            confirm_time: row.confirm_time,
            quality: row.quality,
        })
    }
}

#[derive(sqlx::FromRow, Debug)]
struct ArchiveRow {
    id: i64,
    ticket_id: i64,
    priority: i64,
    service_type: String,
    workstation_id: Option<i64>,
    status: i64,
    created_at: i64,
    call_time: Option<i64>,
    confirm_time: Option<i64>,
    end_time: i64,
    quality: Option<i64>,
    employee_id: Option<i64>,
    employee_first_name: Option<String>,
    employee_second_name: Option<String>,
    workstation_name: Option<String>,
}

impl TryFrom<ArchiveRow> for ArchivedTicket {
    type Error = QueueEngineError;

    fn try_from(row: ArchiveRow) -> Result<Self> {
        Ok(ArchivedTicket {
            id: row.id,
            ticket_id: row.ticket_id,
            priority: row.priority,
            service_type: row.service_type,
            workstation_id: row.workstation_id,
            status: ticket_status(row.status)?,
            created_at: row.created_at,
            call_time: row.call_time,
            confirm_time: row.confirm_time,
            end_time: row.end_time,
            quality: row.quality,
            employee_id: row.employee_id,
            employee_first_name: row.employee_first_name,
            employee_second_name: row.employee_second_name,
            workstation_name: row.workstation_name,
        })
    }
}

#[derive(sqlx::FromRow, Debug)]
struct EmployeeStatusRow {
    employee_id: i64,
    first_name: String,
    second_name: String,
    status: i64,
    workstation_id: Option<i64>,
}

impl TryFrom<EmployeeStatusRow> for EmployeeStatusEntry {
    type Error = QueueEngineError;

    fn try_from(row: EmployeeStatusRow) -> Result<Self> {
        Ok(EmployeeStatusEntry {
            employee_id: row.employee_id,
            first_name: row.first_name,
            second_name: row.second_name,
            status: employee_status(row.status)?,
            workstation_id: row.workstation_id,
        })
    }
}

#[derive(sqlx::FromRow, Debug)]
struct TierRow {
    id: i64,
    threshold_secs: i64,
    name: String,
    active: bool,
}

#[derive(sqlx::FromRow, Debug)]
struct RecipientRow {
    id: i64,
    email: String,
    tier_id: i64,
}

fn ticket_status(code: i64) -> Result<TicketStatus> {
    TicketStatus::from_code(code)
        .ok_or_else(|| QueueEngineError::internal(format!("unknown ticket status code {}", code)))
}

fn employee_status(code: i64) -> Result<EmployeeStatus> {
    EmployeeStatus::from_code(code)
        .ok_or_else(|| QueueEngineError::internal(format!("unknown employee status code {}", code)))
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = QueueEngineError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn insert_ticket(&self, service_type: &str, priority: i64, created_at: i64) -> Result<TicketId> {
        let result = sqlx::query(
            "INSERT INTO queue (priority, service_type, status, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(priority)
        .bind(service_type)
        .bind(TicketStatus::Waiting.code())
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        let sql = format!("SELECT {} FROM queue WHERE id = ?", TICKET_COLUMNS);
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Ticket::try_from).transpose()
    }

    async fn scan_tickets(&self) -> Result<Vec<Ticket>> {
        let sql = format!("SELECT {} FROM queue ORDER BY id", TICKET_COLUMNS);
        let rows = sqlx::query_as::<_, TicketRow>(&sql).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn scan_waiting(&self) -> Result<Vec<Ticket>> {
        let sql = format!("SELECT {} FROM queue WHERE status = ? ORDER BY id", TICKET_COLUMNS);
        let rows = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(TicketStatus::Waiting.code())
            .fetch_all(&self.pool)
            .await?;

        debug!("Found {} waiting tickets", rows.len());
        collect(rows)
    }

    async fn ticket_for_workstation(&self, workstation_id: WorkstationId) -> Result<Option<Ticket>> {
        let sql = format!(
            "SELECT {} FROM queue WHERE workstation_id = ? AND status IN (?, ?) ORDER BY id LIMIT 1",
            TICKET_COLUMNS
        );
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(workstation_id)
            .bind(TicketStatus::Called.code())
            .bind(TicketStatus::Confirmed.code())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Ticket::try_from).transpose()
    }

    async fn claim_ticket(&self, id: TicketId, workstation_id: WorkstationId, call_time: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE queue
             SET status = ?, workstation_id = ?, call_time = ?
             WHERE id = ? AND status = ?
               AND NOT EXISTS (
                   SELECT 1 FROM queue WHERE workstation_id = ? AND status IN (?, ?)
               )",
        )
        .bind(TicketStatus::Called.code())
        .bind(workstation_id)
        .bind(call_time)
        .bind(id)
        .bind(TicketStatus::Waiting.code())
        .bind(workstation_id)
        .bind(TicketStatus::Called.code())
        .bind(TicketStatus::Confirmed.code())
        .execute(&mut *tx)
        .await?;

        let success = result.rows_affected() > 0;

        if success {
            tx.commit().await?;
            debug!("Ticket {} claimed by workstation {}", id, workstation_id);
        } else {
            tx.rollback().await?;
        }

        Ok(success)
    }

    async fn advance_ticket(
        &self,
        id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
        confirm_time: Option<i64>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue SET status = ?, confirm_time = COALESCE(?, confirm_time)
             WHERE id = ? AND status = ?",
        )
        .bind(to.code())
        .bind(confirm_time)
        .bind(id)
        .bind(from.code())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_ticket(&self, id: TicketId, allowed: &[TicketStatus]) -> Result<bool> {
        if allowed.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; allowed.len()].join(", ");
        let sql = format!("DELETE FROM queue WHERE id = ? AND status IN ({})", placeholders);
        let mut query = sqlx::query(&sql).bind(id);
        for status in allowed {
            query = query.bind(status.code());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn archive_and_delete(
        &self,
        id: TicketId,
        end_time: i64,
        serving_employee: Option<EmployeeId>,
    ) -> Result<Option<ArchivedTicket>> {
        let mut tx = self.pool.begin().await?;

        // Must open with a write: the lock is then taken through the busy
        // handler, while a read-then-write upgrade gets SQLITE_BUSY at once.
        let sql = format!(
            "DELETE FROM queue WHERE id = ? AND status = ? RETURNING {}",
            TICKET_COLUMNS
        );
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(id)
            .bind(TicketStatus::Confirmed.code())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let ticket = Ticket::try_from(row)?;

        let station: Option<(String, Option<i64>)> = match ticket.workstation_id {
            Some(ws) => {
                sqlx::query_as("SELECT name, employee_id FROM workstations WHERE id = ?")
                    .bind(ws)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            None => None,
        };
        let workstation_name = station.as_ref().map(|(name, _)| name.clone());
        let employee_id = station.and_then(|(_, seated)| seated).or(serving_employee);

        let employee: Option<(String, String)> = match employee_id {
            Some(employee_id) => {
                sqlx::query_as("SELECT first_name, second_name FROM employees WHERE id = ?")
                    .bind(employee_id)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            None => None,
        };
        let (employee_first_name, employee_second_name) = match employee {
            Some((first, second)) => (Some(first), Some(second)),
            None => (None, None),
        };

        let end_time = ticket.confirm_time.map_or(end_time, |confirmed| end_time.max(confirmed));

        let inserted = sqlx::query(
            "INSERT INTO clients_log (
                ticket_id, priority, service_type, workstation_id, status, created_at,
                call_time, confirm_time, end_time, quality, employee_id,
                employee_first_name, employee_second_name, workstation_name
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ticket.id)
        .bind(ticket.priority)
        .bind(&ticket.service_type)
        .bind(ticket.workstation_id)
        .bind(ticket.status.code())
        .bind(ticket.created_at)
        .bind(ticket.call_time)
        .bind(ticket.confirm_time)
        .bind(end_time)
        .bind(ticket.quality)
        .bind(employee_id)
        .bind(&employee_first_name)
        .bind(&employee_second_name)
        .bind(&workstation_name)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Ticket {} archived as log entry {}", ticket.id, inserted.last_insert_rowid());

        Ok(Some(ArchivedTicket {
            id: inserted.last_insert_rowid(),
            ticket_id: ticket.id,
            priority: ticket.priority,
            service_type: ticket.service_type,
            workstation_id: ticket.workstation_id,
            status: ticket.status,
            created_at: ticket.created_at,
            call_time: ticket.call_time,
            confirm_time: ticket.confirm_time,
            end_time,
            quality: ticket.quality,
            employee_id,
            employee_first_name,
            employee_second_name,
            workstation_name,
        }))
    }

    async fn set_quality(&self, id: TicketId, quality: i64) -> Result<bool> {
        let live = sqlx::query("UPDATE queue SET quality = ? WHERE id = ?")
            .bind(quality)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if live.rows_affected() > 0 {
            return Ok(true);
        }

        let archived = sqlx::query(
            "UPDATE clients_log SET quality = ?
             WHERE id = (SELECT MAX(id) FROM clients_log WHERE ticket_id = ?)",
        )
        .bind(quality)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(archived.rows_affected() > 0)
    }

    async fn update_employee_status(&self, id: EmployeeId, status: EmployeeStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE employees SET status = ? WHERE id = ?")
            .bind(status.code())
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!("Employee {} status updated to {}", id, status);
        Ok(result.rows_affected() > 0)
    }

    async fn employee_status(&self, id: EmployeeId) -> Result<Option<EmployeeStatus>> {
        let code: Option<i64> = sqlx::query_scalar("SELECT status FROM employees WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        code.map(employee_status).transpose()
    }

    async fn list_employee_statuses(&self) -> Result<Vec<EmployeeStatusEntry>> {
        let rows = sqlx::query_as::<_, EmployeeStatusRow>(
            "SELECT e.id AS employee_id, e.first_name, e.second_name, e.status,
                    (SELECT MIN(w.id) FROM workstations w WHERE w.employee_id = e.id) AS workstation_id
             FROM employees e
             ORDER BY e.id",
        )
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn employee_status_for_workstation(
        &self,
        workstation_id: WorkstationId,
    ) -> Result<Option<EmployeeStatusEntry>> {
        let row = sqlx::query_as::<_, EmployeeStatusRow>(
            "SELECT e.id AS employee_id, e.first_name, e.second_name, e.status,
                    w.id AS workstation_id
             FROM workstations w
             JOIN employees e ON e.id = w.employee_id
             WHERE w.id = ?",
        )
        .bind(workstation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EmployeeStatusEntry::try_from).transpose()
    }

    async fn capabilities_of(&self, entity: EntityRef) -> Result<Vec<Capability>> {
        let (sql, id) = match entity {
            EntityRef::Employee(id) => (
                "SELECT r.name, r.priority
                 FROM employee_responsibilities er
                 JOIN responsibilities r ON r.id = er.responsibility_id
                 WHERE er.employee_id = ?
                 ORDER BY r.id",
                id,
            ),
            EntityRef::Workstation(id) => (
                "SELECT r.name, r.priority
                 FROM workstation_responsibilities wr
                 JOIN responsibilities r ON r.id = wr.responsibility_id
                 WHERE wr.workstation_id = ?
                 ORDER BY r.id",
                id,
            ),
        };

        let rows: Vec<(String, i64)> = sqlx::query_as(sql).bind(id).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(name, priority)| Capability::new(name, priority))
            .collect())
    }

    async fn service_priority(&self, service_type: &str) -> Result<Option<i64>> {
        let priority = sqlx::query_scalar("SELECT priority FROM responsibilities WHERE name = ?")
            .bind(service_type)
            .fetch_optional(&self.pool)
            .await?;

        Ok(priority)
    }

    async fn list_tiers(&self) -> Result<Vec<EscalationTier>> {
        let rows = sqlx::query_as::<_, TierRow>(
            "SELECT id, threshold_secs, name, active FROM escalation_tiers ORDER BY threshold_secs, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| EscalationTier {
                id: row.id,
                threshold_secs: row.threshold_secs,
                name: row.name,
                active: row.active,
            })
            .collect())
    }

    async fn list_recipients(&self) -> Result<Vec<EscalationRecipient>> {
        let rows = sqlx::query_as::<_, RecipientRow>(
            "SELECT id, email, tier_id FROM escalation_recipients ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| EscalationRecipient {
                id: row.id,
                email: row.email,
                tier_id: row.tier_id,
            })
            .collect())
    }

    async fn list_archive(&self) -> Result<Vec<ArchivedTicket>> {
        let sql = format!("SELECT {} FROM clients_log ORDER BY id", ARCHIVE_COLUMNS);
        let rows = sqlx::query_as::<_, ArchiveRow>(&sql).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn clear_queue(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM queue").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn clear_archive(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM clients_log").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn restart_numbering(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM queue").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'queue'")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
