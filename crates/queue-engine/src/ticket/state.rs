//! Ticket lifecycle state machine
//!
//! ```text
//! Waiting ──call──▶ Called ──confirm──▶ Confirmed ──complete──▶ [archived]
//!    │                 │
//!    └────not-come─────┴──────────────▶ [deleted]
//! ```
//!
//! The employee that owns the ticket mirrors its progress:
//! `Available → Calling → Serving → Available`.

use serde::{Deserialize, Serialize};

use super::types::{EmployeeStatus, TicketId, TicketStatus};
use crate::error::{QueueEngineError, Result};

/// Something that happens to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketEvent {
    Call,
    Confirm,
    Complete,
    NotCome,
}

impl std::fmt::Display for TicketEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketEvent::Call => write!(f, "call"),
            TicketEvent::Confirm => write!(f, "confirm"),
            TicketEvent::Complete => write!(f, "complete"),
            TicketEvent::NotCome => write!(f, "not-come"),
        }
    }
}

/// What a permitted event does to the live ticket row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Row stays live with a new status
    Advance(TicketStatus),
    /// Row moves to the completed-tickets log
    Archive,
    /// Row is dropped without an archival record
    Delete,
}

impl TicketStatus {
    /// Transition for `event` from this status, if the pair is allowed.
    pub fn apply(self, event: TicketEvent) -> Option<Transition> {
        match (self, event) {
            (TicketStatus::Waiting, TicketEvent::Call) => {
                Some(Transition::Advance(TicketStatus::Called))
            }
            (TicketStatus::Called, TicketEvent::Confirm) => {
                Some(Transition::Advance(TicketStatus::Confirmed))
            }
            (TicketStatus::Confirmed, TicketEvent::Complete) => Some(Transition::Archive),
            (TicketStatus::Waiting | TicketStatus::Called, TicketEvent::NotCome) => {
                Some(Transition::Delete)
            }
            _ => None,
        }
    }
}

impl TicketEvent {
    /// Statuses this event may be applied from.
    pub fn sources(self) -> &'static [TicketStatus] {
        match self {
            TicketEvent::Call => &[TicketStatus::Waiting],
            TicketEvent::Confirm => &[TicketStatus::Called],
            TicketEvent::Complete => &[TicketStatus::Confirmed],
            TicketEvent::NotCome => &[TicketStatus::Waiting, TicketStatus::Called],
        }
    }

    /// Status the owning employee moves to once the event is applied.
    pub fn employee_status(self) -> EmployeeStatus {
        match self {
            TicketEvent::Call => EmployeeStatus::Calling,
            TicketEvent::Confirm => EmployeeStatus::Serving,
            TicketEvent::Complete | TicketEvent::NotCome => EmployeeStatus::Available,
        }
    }
}

/// Check `(status, event)` against the lifecycle table.
pub fn transition(ticket_id: TicketId, status: TicketStatus, event: TicketEvent) -> Result<Transition> {
    status.apply(event).ok_or(QueueEngineError::InvalidTransition {
        ticket_id,
        status,
        event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [TicketStatus; 3] = [
        TicketStatus::Waiting,
        TicketStatus::Called,
        TicketStatus::Confirmed,
    ];
    const ALL_EVENTS: [TicketEvent; 4] = [
        TicketEvent::Call,
        TicketEvent::Confirm,
        TicketEvent::Complete,
        TicketEvent::NotCome,
    ];

    #[test]
    fn test_happy_path_never_skips_a_state() {
        let called = TicketStatus::Waiting.apply(TicketEvent::Call);
        assert_eq!(called, Some(Transition::Advance(TicketStatus::Called)));

        let confirmed = TicketStatus::Called.apply(TicketEvent::Confirm);
        assert_eq!(confirmed, Some(Transition::Advance(TicketStatus::Confirmed)));

        assert_eq!(TicketStatus::Confirmed.apply(TicketEvent::Complete), Some(Transition::Archive));

        // No shortcuts
        assert_eq!(TicketStatus::Waiting.apply(TicketEvent::Confirm), None);
        assert_eq!(TicketStatus::Waiting.apply(TicketEvent::Complete), None);
        assert_eq!(TicketStatus::Called.apply(TicketEvent::Complete), None);
    }

    #[test]
    fn test_not_come_only_before_confirmation() {
        assert_eq!(TicketStatus::Waiting.apply(TicketEvent::NotCome), Some(Transition::Delete));
        assert_eq!(TicketStatus::Called.apply(TicketEvent::NotCome), Some(Transition::Delete));
        assert_eq!(TicketStatus::Confirmed.apply(TicketEvent::NotCome), None);
    }

    #[test]
    fn test_repeated_events_are_rejected() {
        assert_eq!(TicketStatus::Called.apply(TicketEvent::Call), None);
        assert_eq!(TicketStatus::Confirmed.apply(TicketEvent::Confirm), None);
    }

    #[test]
    fn test_sources_agree_with_apply() {
        for status in ALL_STATUSES {
            for event in ALL_EVENTS {
                assert_eq!(
                    event.sources().contains(&status),
                    status.apply(event).is_some(),
                    "{status} / {event}"
                );
            }
        }
    }

    #[test]
    fn test_transition_reports_invalid_pair() {
        let err = transition(7, TicketStatus::Waiting, TicketEvent::Confirm).unwrap_err();
        match err {
            QueueEngineError::InvalidTransition { ticket_id, status, event } => {
                assert_eq!(ticket_id, 7);
                assert_eq!(status, TicketStatus::Waiting);
                assert_eq!(event, TicketEvent::Confirm);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn test_employee_mirrors_ticket() {
        assert_eq!(TicketEvent::Call.employee_status(), EmployeeStatus::Calling);
        assert_eq!(TicketEvent::Confirm.employee_status(), EmployeeStatus::Serving);
        assert_eq!(TicketEvent::Complete.employee_status(), EmployeeStatus::Available);
        assert_eq!(TicketEvent::NotCome.employee_status(), EmployeeStatus::Available);
    }
}
