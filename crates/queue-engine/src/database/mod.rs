//! # Queue storage
//!
//! The engine only talks to storage through [`QueueStore`]. Everything it
//! needs is a targeted read, a scan, or a single conditional write, so claims
//! and transitions are guarded in SQL on the ticket's current status and a
//! losing writer simply sees `false`.
//!
//! [`SqliteQueueStore`] is the bundled implementation on a `sqlx` SQLite pool.
//! It creates its schema on start-up and carries the administrative helpers
//! (responsibilities, staff, escalation setup) that sit outside the engine.

pub mod schema;
pub mod queue_store;
pub mod admin;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::capability::{Capability, EntityRef};
use crate::error::Result;
use crate::escalation::{EscalationRecipient, EscalationTier};
use crate::ticket::{
    ArchivedTicket, EmployeeId, EmployeeStatus, EmployeeStatusEntry, Ticket, TicketId,
    TicketStatus, WorkstationId,
};

/// How long a writer waits for another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Storage collaborator consumed by the engine
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a Waiting ticket and return its new id
    async fn insert_ticket(&self, service_type: &str, priority: i64, created_at: i64) -> Result<TicketId>;

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>>;

    /// All live tickets in id order
    async fn scan_tickets(&self) -> Result<Vec<Ticket>>;

    /// Waiting tickets in id order
    async fn scan_waiting(&self) -> Result<Vec<Ticket>>;

    /// Called or confirmed ticket currently owned by a workstation
    async fn ticket_for_workstation(&self, workstation_id: WorkstationId) -> Result<Option<Ticket>>;

    /// Mark a ticket Called for `workstation_id`. Succeeds only while the
    /// ticket is still Waiting and the workstation owns no other live ticket.
    async fn claim_ticket(&self, id: TicketId, workstation_id: WorkstationId, call_time: i64) -> Result<bool>;

    /// Move a ticket from `from` to `to`, optionally stamping the confirm time.
    /// Succeeds only while the ticket is in `from`.
    async fn advance_ticket(
        &self,
        id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
        confirm_time: Option<i64>,
    ) -> Result<bool>;

    /// Delete a live ticket whose status is one of `allowed`
    async fn delete_ticket(&self, id: TicketId, allowed: &[TicketStatus]) -> Result<bool>;

    /// Move a Confirmed ticket into the completed log in one transaction.
    /// Returns `None` when the ticket is missing or not Confirmed.
    async fn archive_and_delete(
        &self,
        id: TicketId,
        end_time: i64,
        serving_employee: Option<EmployeeId>,
    ) -> Result<Option<ArchivedTicket>>;

    /// Set the quality rating on the live ticket, or else on its most recent
    /// archive record
    async fn set_quality(&self, id: TicketId, quality: i64) -> Result<bool>;

    async fn update_employee_status(&self, id: EmployeeId, status: EmployeeStatus) -> Result<bool>;

    async fn employee_status(&self, id: EmployeeId) -> Result<Option<EmployeeStatus>>;

    async fn list_employee_statuses(&self) -> Result<Vec<EmployeeStatusEntry>>;

    /// Status of the employee seated at a workstation
    async fn employee_status_for_workstation(
        &self,
        workstation_id: WorkstationId,
    ) -> Result<Option<EmployeeStatusEntry>>;

    async fn capabilities_of(&self, entity: EntityRef) -> Result<Vec<Capability>>;

    /// Weight of a service type, `None` when it is not defined
    async fn service_priority(&self, service_type: &str) -> Result<Option<i64>>;

    async fn list_tiers(&self) -> Result<Vec<EscalationTier>>;

    async fn list_recipients(&self) -> Result<Vec<EscalationRecipient>>;

    async fn list_archive(&self) -> Result<Vec<ArchivedTicket>>;

    /// Drop all live tickets, returning how many were removed
    async fn clear_queue(&self) -> Result<u64>;

    async fn clear_archive(&self) -> Result<u64>;

    /// Drop all live tickets and restart ticket numbering from 1
    async fn restart_numbering(&self) -> Result<()>;
}

/// SQLite-backed [`QueueStore`]
#[derive(Clone)]
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    /// Open (creating if missing) the database at `database_url`
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        if database_url.contains(":memory:") {
            return Self::new_in_memory().await;
        }

        info!("🗄️ Opening queue database at: {}", database_url);
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Create an in-memory database. The pool keeps exactly one connection
    /// alive since every connection would otherwise see its own empty database.
    pub async fn new_in_memory() -> Result<Self> {
        info!("🗄️ Creating in-memory queue database");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        schema::initialize(&pool).await?;
        info!("✅ Queue database initialized");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute a health check query
    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                error!("❌ Database health check failed: {}", e);
                false
            }
        }
    }
}
