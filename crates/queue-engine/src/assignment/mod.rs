//! Candidate selection
//!
//! Picks the next ticket for an employee/workstation pair. The comparison key
//! is the weight of the matching entry in the pair's shared capability set,
//! not the priority stored on the ticket: the two diverge when a service's
//! weight is changed after tickets were issued.
//!
//! Only a strictly greater key replaces the current best, so among equal
//! weights the first ticket in scan order (the oldest) wins.

use serde::{Deserialize, Serialize};

use crate::capability::CapabilitySet;
use crate::ticket::{EmployeeId, Ticket, TicketId, TicketStatus, WorkstationId};

/// A ticket chosen for a pair, before it has been claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub ticket: &'a Ticket,
    /// Zero-based position in the scanned list
    pub position: usize,
    /// Weight used for the comparison
    pub weight: i64,
}

/// Select the best waiting ticket the shared capability set covers.
///
/// `queue` may hold tickets in any status; only Waiting ones are candidates.
pub fn select_candidate<'a>(queue: &'a [Ticket], shared: &CapabilitySet) -> Option<Candidate<'a>> {
    let mut best: Option<Candidate<'a>> = None;

    for (position, ticket) in queue.iter().enumerate() {
        if ticket.status != TicketStatus::Waiting {
            continue;
        }
        let Some(weight) = shared.priority_of(&ticket.service_type) else {
            continue;
        };
        if best.map_or(true, |b| weight > b.weight) {
            best = Some(Candidate { ticket, position, weight });
        }
    }

    best
}

/// A successfully claimed ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub ticket_id: TicketId,
    pub service_type: String,
    /// Zero-based place in the live queue (every status, id order) at the
    /// moment of the call. Informational only, not a stable handle.
    pub position: usize,
    pub employee_id: EmployeeId,
    pub workstation_id: WorkstationId,
    pub call_time: i64,
}

/// Result of a call request. `NoMatch` is a normal answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallOutcome {
    Assigned(Assignment),
    NoMatch,
}

impl CallOutcome {
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            CallOutcome::Assigned(a) => Some(a),
            CallOutcome::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, CallOutcome::Assigned(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;

    fn ticket(id: TicketId, service: &str, stored_priority: i64) -> Ticket {
        Ticket {
            id,
            priority: stored_priority,
            service_type: service.to_string(),
            workstation_id: None,
            status: TicketStatus::Waiting,
            created_at: 1_000 + id,
            call_time: None,
            confirm_time: None,
            quality: None,
        }
    }

    fn shared(items: &[(&str, i64)]) -> CapabilitySet {
        items.iter().map(|(n, p)| Capability::new(*n, *p)).collect()
    }

    #[test]
    fn test_fifo_within_equal_weight() {
        let waiting = vec![ticket(1, "Visa", 3), ticket(2, "Visa", 3), ticket(3, "Visa", 3)];
        let pick = select_candidate(&waiting, &shared(&[("Visa", 3)])).unwrap();
        assert_eq!(pick.ticket.id, 1);
        assert_eq!(pick.position, 0);
    }

    #[test]
    fn test_higher_weight_wins_over_older_ticket() {
        let waiting = vec![ticket(1, "Visa", 3), ticket(2, "Passport", 5), ticket(3, "Passport", 5)];
        let pick = select_candidate(&waiting, &shared(&[("Visa", 3), ("Passport", 5)])).unwrap();
        assert_eq!(pick.ticket.id, 2);
        assert_eq!(pick.position, 1);
        assert_eq!(pick.weight, 5);
    }

    #[test]
    fn test_capability_weight_not_stored_priority() {
        // Passport was re-weighted down to 1 after ticket 2 was issued at 9
        let waiting = vec![ticket(1, "Visa", 3), ticket(2, "Passport", 9)];
        let pick = select_candidate(&waiting, &shared(&[("Visa", 3), ("Passport", 1)])).unwrap();
        assert_eq!(pick.ticket.id, 1);
    }

    #[test]
    fn test_never_selects_outside_intersection() {
        let waiting = vec![ticket(1, "Taxes", 10), ticket(2, "Pensions", 10)];
        assert!(select_candidate(&waiting, &shared(&[("Visa", 3)])).is_none());
        assert!(select_candidate(&waiting, &CapabilitySet::default()).is_none());
        assert!(select_candidate(&[], &shared(&[("Visa", 3)])).is_none());
    }

    #[test]
    fn test_skips_tickets_already_called() {
        let mut called = ticket(1, "Visa", 3);
        called.status = TicketStatus::Called;
        called.workstation_id = Some(4);
        let waiting = vec![called, ticket(2, "Visa", 3)];

        let pick = select_candidate(&waiting, &shared(&[("Visa", 3)])).unwrap();
        assert_eq!(pick.ticket.id, 2);
    }

    #[test]
    fn test_call_outcome_json_shape() {
        let json = serde_json::to_value(CallOutcome::NoMatch).unwrap();
        assert_eq!(json, serde_json::json!({ "outcome": "no_match" }));

        let assigned = CallOutcome::Assigned(Assignment {
            ticket_id: 12,
            service_type: "Visa".to_string(),
            position: 0,
            employee_id: 1,
            workstation_id: 2,
            call_time: 1_700_000_000,
        });
        let json = serde_json::to_value(&assigned).unwrap();
        assert_eq!(json["outcome"], "assigned");
        assert_eq!(json["ticket_id"], 12);
    }
}
