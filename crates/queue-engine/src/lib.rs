//! # DigiQueue Engine
//!
//! Ticket queue assignment engine for service halls: clients draw a ticket for
//! a service, staffed workstations call the highest-priority waiting ticket
//! they are able to serve, and the queue escalates long waits by email and
//! pushes live change notifications to observers.
//!
//! ## Features
//!
//! - **Capability matching**: employees and workstations are each authorized
//!   for a set of weighted services; a ticket is only called where both are
//! - **Priority with FIFO ties**: the heaviest matching service wins, oldest
//!   ticket first among equals
//! - **Checked lifecycle**: `Waiting → Called → Confirmed → archived`, or
//!   dropped as not-come; anything else is an `InvalidTransition`
//! - **Race-free claiming**: at most one workstation ever claims a ticket
//! - **Long-wait escalation**: periodic sweep over threshold tiers
//! - **Push**: a change counter polled once a second, streamed as SSE
//!
//! ## Architecture
//!
//! - [`ticket`]: data types and the lifecycle state machine
//! - [`capability`]: capability sets and their resolution
//! - [`assignment`]: candidate selection
//! - [`engine`]: the queue operations
//! - [`escalation`]: tier bucketing and the sweep
//! - [`signal`]: change signal, push channel and poller
//! - [`notifier`]: email transport seam
//! - [`database`]: storage trait and the SQLite implementation
//! - [`api`]: HTTP surface
//! - [`server`]: lifecycle of a running queue
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use digiqueue_engine::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let store = Arc::new(SqliteQueueStore::new_in_memory().await?);
//!     store.add_responsibility("Passport", 5).await?;
//!     let employee = store.add_employee("Ada", "Lovelace").await?;
//!     let window = store.add_workstation("Window 1", Some(employee)).await?;
//!     store.grant_employee(employee, "Passport").await?;
//!     store.grant_workstation(window, "Passport").await?;
//!
//!     let engine = QueueEngine::new(store, ChangeSignal::new(), &QueueEngineConfig::default());
//!     let ticket = engine.create_ticket("Passport").await?;
//!
//!     if let CallOutcome::Assigned(assignment) = engine.call_next(employee, window).await? {
//!         assert_eq!(assignment.ticket_id, ticket.id);
//!         engine.confirm(ticket.id, employee).await?;
//!         engine.complete(ticket.id, employee).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod config;

pub mod ticket;
pub mod capability;
pub mod assignment;
pub mod escalation;
pub mod signal;
pub mod notifier;

pub mod database;
pub mod engine;
pub mod api;
pub mod server;

pub use error::{QueueEngineError, Result};
pub use config::QueueEngineConfig;
pub use engine::QueueEngine;
pub use server::QueueServer;

/// Commonly used types
pub mod prelude {
    pub use crate::{QueueEngine, QueueEngineConfig, QueueEngineError, QueueServer, Result};

    pub use crate::config::{
        DatabaseConfig, EscalationConfig, GeneralConfig, LoggingConfig, NotificationConfig,
        PushConfig, QueueConfig,
    };

    pub use crate::ticket::{
        ArchivedTicket, EmployeeId, EmployeeStatus, EmployeeStatusEntry, Ticket, TicketEvent,
        TicketId, TicketStatus, Transition, WorkstationId,
    };

    pub use crate::capability::{Capability, CapabilityResolver, CapabilitySet, EntityRef};
    pub use crate::assignment::{select_candidate, Assignment, CallOutcome};
    pub use crate::escalation::{
        bucket_for, EscalationRecipient, EscalationSweep, EscalationTier, SweepReport,
    };
    pub use crate::signal::{ChangePoller, ChangeSignal, PushChannel, PushEvent};
    pub use crate::notifier::{LogNotifier, MemoryNotifier, Notifier, SentMessage};
    pub use crate::database::{QueueStore, SqliteQueueStore};
    pub use crate::api::{create_router, ApiState};
}
