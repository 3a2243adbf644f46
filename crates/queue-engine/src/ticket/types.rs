//! Core types for the ticket queue

use serde::{Deserialize, Serialize};

/// Store-assigned ticket number, monotonic and unique.
pub type TicketId = i64;

/// Employee identifier
pub type EmployeeId = i64;

/// Workstation identifier
pub type WorkstationId = i64;

/// Where a live ticket is in its lifecycle.
///
/// The numeric codes are the ones persisted in the `queue` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Waiting,
    Called,
    Confirmed,
}

impl TicketStatus {
    pub fn code(self) -> i64 {
        match self {
            TicketStatus::Waiting => 1,
            TicketStatus::Called => 2,
            TicketStatus::Confirmed => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(TicketStatus::Waiting),
            2 => Some(TicketStatus::Called),
            3 => Some(TicketStatus::Confirmed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Waiting => write!(f, "waiting"),
            TicketStatus::Called => write!(f, "called"),
            TicketStatus::Confirmed => write!(f, "confirmed"),
        }
    }
}

/// Employee availability, mirroring the progress of the ticket they own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    Available,
    Calling,
    Serving,
}

impl EmployeeStatus {
    pub fn code(self) -> i64 {
        match self {
            EmployeeStatus::Available => 1,
            EmployeeStatus::Calling => 2,
            EmployeeStatus::Serving => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(EmployeeStatus::Available),
            2 => Some(EmployeeStatus::Calling),
            3 => Some(EmployeeStatus::Serving),
            _ => None,
        }
    }
}

impl std::fmt::Display for EmployeeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmployeeStatus::Available => write!(f, "available"),
            EmployeeStatus::Calling => write!(f, "calling"),
            EmployeeStatus::Serving => write!(f, "serving"),
        }
    }
}

/// A client's place in the queue.
///
/// Times are unix seconds. `workstation_id` and `call_time` stay `None` while
/// the ticket is waiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    /// Weight of the requested service at creation time
    pub priority: i64,
    pub service_type: String,
    pub workstation_id: Option<WorkstationId>,
    pub status: TicketStatus,
    pub created_at: i64,
    pub call_time: Option<i64>,
    pub confirm_time: Option<i64>,
    pub quality: Option<i64>,
}

impl Ticket {
    /// Seconds the client has been in the queue at `now`.
    pub fn wait_seconds(&self, now: i64) -> i64 {
        now - self.created_at
    }
}

/// A completed ticket as recorded in the completed-tickets log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedTicket {
    pub id: i64,
    pub ticket_id: TicketId,
    pub priority: i64,
    pub service_type: String,
    pub workstation_id: Option<WorkstationId>,
    pub status: TicketStatus,
    pub created_at: i64,
    pub call_time: Option<i64>,
    pub confirm_time: Option<i64>,
    pub end_time: i64,
    pub quality: Option<i64>,
    pub employee_id: Option<EmployeeId>,
    pub employee_first_name: Option<String>,
    pub employee_second_name: Option<String>,
    pub workstation_name: Option<String>,
}

/// Employee status row, as shown on the supervisor board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeStatusEntry {
    pub employee_id: EmployeeId,
    pub first_name: String,
    pub second_name: String,
    pub status: EmployeeStatus,
    pub workstation_id: Option<WorkstationId>,
}
