//! # Queue Engine
//!
//! [`QueueEngine`] carries out every operation that changes the queue:
//! issuing tickets, calling the next client for an employee/workstation pair,
//! and moving a ticket through confirm, not-come and complete.
//!
//! ## Claiming
//!
//! Select-and-claim runs inside one critical section per engine, and the claim
//! itself is a conditional update that only succeeds while the ticket is still
//! Waiting and the workstation owns nothing else. Two calls racing for the
//! same client therefore end with one assignment and one `NoMatch`, even
//! when another engine instance shares the database.
//!
//! ## Transitions
//!
//! Every transition is checked against the lifecycle table first and then
//! written with a status guard, so a ticket that moved in between is reported
//! as `InvalidTransition` instead of being overwritten.
//!
//! Storage failures are returned to the caller as they occur. Side effects
//! already applied before the failure are not undone.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::assignment::{select_candidate, Assignment, CallOutcome};
use crate::capability::CapabilityResolver;
use crate::config::{QueueConfig, QueueEngineConfig};
use crate::database::QueueStore;
use crate::error::{QueueEngineError, Result};
use crate::signal::ChangeSignal;
use crate::ticket::{
    transition, ArchivedTicket, EmployeeId, EmployeeStatus, EmployeeStatusEntry, Ticket,
    TicketEvent, TicketId, TicketStatus, WorkstationId,
};

/// Scans made for one call before giving up on a contended queue
const MAX_CLAIM_ATTEMPTS: usize = 3;

/// Core queue operations
pub struct QueueEngine {
    store: Arc<dyn QueueStore>,
    resolver: CapabilityResolver,
    signal: ChangeSignal,
    rules: QueueConfig,
    claim_lock: Mutex<()>,
}

impl QueueEngine {
    /// Create a new QueueEngine
    pub fn new(store: Arc<dyn QueueStore>, signal: ChangeSignal, config: &QueueEngineConfig) -> Self {
        Self {
            resolver: CapabilityResolver::new(store.clone()),
            store,
            signal,
            rules: config.queue.clone(),
            claim_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn signal(&self) -> &ChangeSignal {
        &self.signal
    }

    pub fn resolver(&self) -> &CapabilityResolver {
        &self.resolver
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    /// Issue a ticket for `service_type`
    pub async fn create_ticket(&self, service_type: &str) -> Result<Ticket> {
        let service_type = service_type.trim();
        if service_type.is_empty() {
            return Err(QueueEngineError::invalid_input("service type cannot be empty"));
        }

        let priority = self
            .store
            .service_priority(service_type)
            .await?
            .ok_or_else(|| QueueEngineError::UnknownService(service_type.to_string()))?;

        let created_at = Self::now();
        let id = self.store.insert_ticket(service_type, priority, created_at).await?;
        self.signal.bump();

        info!("🎫 Issued ticket {} for '{}' (priority {})", id, service_type, priority);
        Ok(Ticket {
            id,
            priority,
            service_type: service_type.to_string(),
            workstation_id: None,
            status: TicketStatus::Waiting,
            created_at,
            call_time: None,
            confirm_time: None,
            quality: None,
        })
    }

    /// Call the next client the employee and the workstation can both serve.
    ///
    /// `NoMatch` means nobody eligible is waiting, or the workstation is
    /// still busy with a ticket of its own.
    pub async fn call_next(&self, employee_id: EmployeeId, workstation_id: WorkstationId) -> Result<CallOutcome> {
        let shared = self
            .resolver
            .shared_capabilities(employee_id, workstation_id)
            .await?;

        if shared.is_empty() {
            debug!(
                "Employee {} and workstation {} share no responsibilities",
                employee_id, workstation_id
            );
            return Ok(CallOutcome::NoMatch);
        }

        let _guard = self.claim_lock.lock().await;

        if let Some(owned) = self.store.ticket_for_workstation(workstation_id).await? {
            warn!(
                "Workstation {} still owns ticket {} ({}), not calling another",
                workstation_id, owned.id, owned.status
            );
            return Ok(CallOutcome::NoMatch);
        }

        for attempt in 1..=MAX_CLAIM_ATTEMPTS {
            let queue = self.store.scan_tickets().await?;
            let Some(candidate) = select_candidate(&queue, &shared) else {
                debug!("No eligible ticket for workstation {}", workstation_id);
                return Ok(CallOutcome::NoMatch);
            };

            let call_time = Self::now();
            let ticket_id = candidate.ticket.id;
            if !self.store.claim_ticket(ticket_id, workstation_id, call_time).await? {
                debug!("Ticket {} was claimed elsewhere (attempt {})", ticket_id, attempt);
                continue;
            }

            self.set_owner_status(employee_id, TicketEvent::Call).await?;
            self.signal.bump();

            info!(
                "📢 Ticket {} ('{}') called to workstation {} by employee {}",
                ticket_id, candidate.ticket.service_type, workstation_id, employee_id
            );
            return Ok(CallOutcome::Assigned(Assignment {
                ticket_id,
                service_type: candidate.ticket.service_type.clone(),
                position: candidate.position,
                employee_id,
                workstation_id,
                call_time,
            }));
        }

        warn!(
            "Gave up calling for workstation {} after {} contended attempts",
            workstation_id, MAX_CLAIM_ATTEMPTS
        );
        Ok(CallOutcome::NoMatch)
    }

    /// The called client showed up
    pub async fn confirm(&self, ticket_id: TicketId, employee_id: EmployeeId) -> Result<Ticket> {
        let mut ticket = self.live_ticket(ticket_id).await?;
        transition(ticket_id, ticket.status, TicketEvent::Confirm)?;

        let confirm_time = Self::now();
        let advanced = self
            .store
            .advance_ticket(ticket_id, TicketStatus::Called, TicketStatus::Confirmed, Some(confirm_time))
            .await?;
        if !advanced {
            return Err(self.rejected(ticket_id, TicketEvent::Confirm).await);
        }

        self.set_owner_status(employee_id, TicketEvent::Confirm).await?;
        self.signal.bump();

        ticket.status = TicketStatus::Confirmed;
        ticket.confirm_time = Some(confirm_time);
        info!("✅ Ticket {} confirmed by employee {}", ticket_id, employee_id);
        Ok(ticket)
    }

    /// The client never came. The ticket is dropped without an archive record.
    pub async fn not_come(&self, ticket_id: TicketId, employee_id: EmployeeId) -> Result<()> {
        let ticket = self.live_ticket(ticket_id).await?;
        transition(ticket_id, ticket.status, TicketEvent::NotCome)?;

        if !self.store.delete_ticket(ticket_id, TicketEvent::NotCome.sources()).await? {
            return Err(self.rejected(ticket_id, TicketEvent::NotCome).await);
        }

        self.set_owner_status(employee_id, TicketEvent::NotCome).await?;
        self.signal.bump();

        info!("🚫 Ticket {} dropped as not-come by employee {}", ticket_id, employee_id);
        Ok(())
    }

    /// Service finished: archive the ticket and free the employee
    pub async fn complete(&self, ticket_id: TicketId, employee_id: EmployeeId) -> Result<ArchivedTicket> {
        let ticket = self.live_ticket(ticket_id).await?;
        transition(ticket_id, ticket.status, TicketEvent::Complete)?;

        let archived = match self
            .store
            .archive_and_delete(ticket_id, Self::now(), Some(employee_id))
            .await?
        {
            Some(archived) => archived,
            None => return Err(self.rejected(ticket_id, TicketEvent::Complete).await),
        };

        self.set_owner_status(employee_id, TicketEvent::Complete).await?;
        self.signal.bump();

        info!(
            "🏁 Ticket {} completed at workstation {:?}, archived as {}",
            ticket_id, archived.workstation_id, archived.id
        );
        Ok(archived)
    }

    /// Record the client's rating for a live or archived ticket
    pub async fn rate_quality(&self, ticket_id: TicketId, quality: i64) -> Result<()> {
        if quality < self.rules.min_quality || quality > self.rules.max_quality {
            return Err(QueueEngineError::invalid_input(format!(
                "quality must be between {} and {}, got {}",
                self.rules.min_quality, self.rules.max_quality, quality
            )));
        }

        if !self.store.set_quality(ticket_id, quality).await? {
            return Err(QueueEngineError::not_found(format!("ticket {}", ticket_id)));
        }

        debug!("Ticket {} rated {}", ticket_id, quality);
        Ok(())
    }

    /// Tickets shown on the lobby display: everything not yet confirmed
    pub async fn public_queue(&self) -> Result<Vec<Ticket>> {
        let tickets = self.store.scan_tickets().await?;
        Ok(tickets
            .into_iter()
            .filter(|t| t.status != TicketStatus::Confirmed)
            .collect())
    }

    /// All live tickets
    pub async fn admin_queue(&self) -> Result<Vec<Ticket>> {
        self.store.scan_tickets().await
    }

    pub async fn ticket_for_workstation(&self, workstation_id: WorkstationId) -> Result<Option<Ticket>> {
        self.store.ticket_for_workstation(workstation_id).await
    }

    /// Manual status override
    pub async fn set_employee_status(&self, employee_id: EmployeeId, status: EmployeeStatus) -> Result<()> {
        if !self.store.update_employee_status(employee_id, status).await? {
            return Err(QueueEngineError::not_found(format!("employee {}", employee_id)));
        }
        self.signal.bump();

        info!("👤 Employee {} set to {}", employee_id, status);
        Ok(())
    }

    pub async fn employee_statuses(&self) -> Result<Vec<EmployeeStatusEntry>> {
        self.store.list_employee_statuses().await
    }

    pub async fn employee_status_for_workstation(
        &self,
        workstation_id: WorkstationId,
    ) -> Result<Option<EmployeeStatusEntry>> {
        self.store.employee_status_for_workstation(workstation_id).await
    }

    pub async fn completed_log(&self) -> Result<Vec<ArchivedTicket>> {
        self.store.list_archive().await
    }

    pub async fn clear_log(&self) -> Result<u64> {
        let removed = self.store.clear_archive().await?;
        info!("🧹 Cleared {} completed tickets from the log", removed);
        Ok(removed)
    }

    /// Drop every live ticket
    pub async fn clear_queue(&self) -> Result<u64> {
        let removed = self.store.clear_queue().await?;
        self.signal.bump();

        info!("🧹 Cleared {} tickets from the queue", removed);
        Ok(removed)
    }

    /// Drop every live ticket and start numbering from 1 again
    pub async fn restart_numbering(&self) -> Result<()> {
        self.store.restart_numbering().await?;
        self.signal.bump();

        info!("🔄 Queue cleared and ticket numbering restarted");
        Ok(())
    }

    async fn live_ticket(&self, ticket_id: TicketId) -> Result<Ticket> {
        self.store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| QueueEngineError::not_found(format!("ticket {}", ticket_id)))
    }

    /// Error for a guarded write that matched no row
    async fn rejected(&self, ticket_id: TicketId, event: TicketEvent) -> QueueEngineError {
        match self.store.get_ticket(ticket_id).await {
            Ok(Some(ticket)) => QueueEngineError::InvalidTransition {
                ticket_id,
                status: ticket.status,
                event,
            },
            Ok(None) => QueueEngineError::not_found(format!("ticket {}", ticket_id)),
            Err(e) => e,
        }
    }

    async fn set_owner_status(&self, employee_id: EmployeeId, event: TicketEvent) -> Result<()> {
        let status = event.employee_status();
        if !self.store.update_employee_status(employee_id, status).await? {
            warn!("Employee {} not found while setting status {}", employee_id, status);
        }
        Ok(())
    }
}
