//! Ticket management module
//!
//! This module provides the ticket, employee and workstation types used across
//! the engine, and the lifecycle state machine that decides which events a
//! ticket accepts.

pub mod types;
pub mod state;

pub use types::{
    ArchivedTicket, EmployeeId, EmployeeStatus, EmployeeStatusEntry, Ticket, TicketId,
    TicketStatus, WorkstationId,
};
pub use state::{transition, TicketEvent, Transition};
