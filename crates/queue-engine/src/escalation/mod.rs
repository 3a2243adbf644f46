//! Long-wait escalation
//!
//! Escalation tiers are wait-time thresholds. Ordered by threshold they cut the
//! time axis into buckets: a ticket waiting `w` seconds belongs to tier `k`
//! when `w >= tier[k]` and either `k` is the last tier or `w < tier[k + 1]`.
//! A ticket younger than the first threshold belongs to no tier.
//!
//! On each sweep every live ticket is placed in its bucket; when that tier is
//! active, each recipient bound to it gets one email. With
//! `repeat_notifications` enabled (the default) a ticket that stays in the same
//! bucket is reported again on every sweep.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::QueueEngineConfig;
use crate::database::QueueStore;
use crate::error::Result;
use crate::notifier::Notifier;
use crate::ticket::{Ticket, TicketId};

/// Tier identifier
pub type TierId = i64;

/// A wait-time threshold bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationTier {
    pub id: TierId,
    pub threshold_secs: i64,
    pub name: String,
    pub active: bool,
}

/// An email address bound to exactly one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRecipient {
    pub id: i64,
    pub email: String,
    pub tier_id: TierId,
}

/// Order tiers by ascending threshold. Equal thresholds keep their id order.
pub fn sort_tiers(tiers: &mut [EscalationTier]) {
    tiers.sort_by_key(|t| (t.threshold_secs, t.id));
}

/// Bucket a wait falls into; `tiers` must already be sorted.
pub fn bucket_for(wait_secs: i64, tiers: &[EscalationTier]) -> Option<&EscalationTier> {
    tiers.iter().enumerate().find_map(|(k, tier)| {
        let above = wait_secs >= tier.threshold_secs;
        let below_next = tiers
            .get(k + 1)
            .map_or(true, |next| wait_secs < next.threshold_secs);
        (above && below_next).then_some(tier)
    })
}

/// Subject line for a ticket that has waited `wait_secs`
pub fn escalation_subject(prefix: &str, wait_secs: i64) -> String {
    format!("{}Long queue wait: more than {} minutes", prefix, wait_secs / 60)
}

/// Message body naming the ticket, its service and the wait in whole minutes
pub fn escalation_body(ticket: &Ticket, wait_secs: i64) -> String {
    format!(
        "Client with ticket {} has been waiting for service \"{}\" for more than {} minutes",
        ticket.id,
        ticket.service_type,
        wait_secs / 60
    )
}

/// Counters from a single sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub tickets_scanned: usize,
    /// Tickets that matched an active tier and were reported
    pub tickets_escalated: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

/// Periodic long-wait scan
pub struct EscalationSweep {
    store: Arc<dyn QueueStore>,
    notifier: Arc<dyn Notifier>,
    subject_prefix: String,
    repeat_notifications: bool,
    /// Last tier each ticket was reported for, used when repeats are off
    notified: DashMap<TicketId, TierId>,
}

impl EscalationSweep {
    /// Create a new sweep
    pub fn new(
        store: Arc<dyn QueueStore>,
        notifier: Arc<dyn Notifier>,
        config: &QueueEngineConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            subject_prefix: config.notifications.subject_prefix.clone(),
            repeat_notifications: config.escalation.repeat_notifications,
            notified: DashMap::new(),
        }
    }

    /// Run one sweep against the current clock
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Utc::now().timestamp()).await
    }

    /// Run one sweep as if the time were `now` (unix seconds).
    ///
    /// Storage failures abort the sweep. Send failures are logged and counted;
    /// the remaining recipients are still notified.
    pub async fn sweep_at(&self, now: i64) -> Result<SweepReport> {
        let recipients = self.store.list_recipients().await?;
        let mut tiers = self.store.list_tiers().await?;
        let tickets = self.store.scan_tickets().await?;
        sort_tiers(&mut tiers);

        let mut report = SweepReport {
            tickets_scanned: tickets.len(),
            ..Default::default()
        };

        if !self.repeat_notifications {
            let live: HashSet<TicketId> = tickets.iter().map(|t| t.id).collect();
            self.notified.retain(|id, _| live.contains(id));
        }

        for ticket in &tickets {
            let wait = ticket.wait_seconds(now);
            let Some(tier) = bucket_for(wait, &tiers) else {
                continue;
            };
            if !tier.active {
                debug!("Ticket {} is in inactive tier '{}'", ticket.id, tier.name);
                continue;
            }
            if !self.repeat_notifications
                && self.notified.get(&ticket.id).map(|t| *t) == Some(tier.id)
            {
                continue;
            }

            let subject = escalation_subject(&self.subject_prefix, wait);
            let body = escalation_body(ticket, wait);
            let mut failed = 0;

            for recipient in recipients.iter().filter(|r| r.tier_id == tier.id) {
                match self.notifier.send(&recipient.email, &subject, &body).await {
                    Ok(()) => report.notifications_sent += 1,
                    Err(e) => {
                        warn!("Failed to notify {} about ticket {}: {}", recipient.email, ticket.id, e);
                        failed += 1;
                    }
                }
            }

            report.notifications_failed += failed;
            report.tickets_escalated += 1;
            if !self.repeat_notifications && failed == 0 {
                self.notified.insert(ticket.id, tier.id);
            }
        }

        if report.tickets_escalated > 0 {
            info!(
                "⏰ Escalation sweep: {} of {} tickets over threshold, {} notifications sent, {} failed",
                report.tickets_escalated,
                report.tickets_scanned,
                report.notifications_sent,
                report.notifications_failed
            );
        } else {
            debug!("Escalation sweep: {} tickets, nothing to report", report.tickets_scanned);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::TicketStatus;

    fn tier(id: TierId, threshold_secs: i64, name: &str, active: bool) -> EscalationTier {
        EscalationTier {
            id,
            threshold_secs,
            name: name.to_string(),
            active,
        }
    }

    fn tiers() -> Vec<EscalationTier> {
        let mut tiers = vec![tier(2, 120, "B", true), tier(1, 30, "A", true)];
        sort_tiers(&mut tiers);
        tiers
    }

    #[test]
    fn test_sort_ascending_by_threshold() {
        let names: Vec<_> = tiers().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_bucket_boundaries() {
        let tiers = tiers();
        assert_eq!(bucket_for(10, &tiers), None);
        assert_eq!(bucket_for(30, &tiers).map(|t| t.name.as_str()), Some("A"));
        assert_eq!(bucket_for(45, &tiers).map(|t| t.name.as_str()), Some("A"));
        assert_eq!(bucket_for(119, &tiers).map(|t| t.name.as_str()), Some("A"));
        assert_eq!(bucket_for(120, &tiers).map(|t| t.name.as_str()), Some("B"));
        assert_eq!(bucket_for(150, &tiers).map(|t| t.name.as_str()), Some("B"));
        assert_eq!(bucket_for(86_400, &tiers).map(|t| t.name.as_str()), Some("B"));
    }

    #[test]
    fn test_bucket_without_tiers() {
        assert_eq!(bucket_for(1_000, &[]), None);
    }

    #[test]
    fn test_message_text() {
        let ticket = Ticket {
            id: 17,
            priority: 5,
            service_type: "Passport".to_string(),
            workstation_id: None,
            status: TicketStatus::Waiting,
            created_at: 0,
            call_time: None,
            confirm_time: None,
            quality: None,
        };

        assert_eq!(
            escalation_subject("[Q] ", 185),
            "[Q] Long queue wait: more than 3 minutes"
        );
        assert_eq!(
            escalation_body(&ticket, 185),
            "Client with ticket 17 has been waiting for service \"Passport\" for more than 3 minutes"
        );
    }
}
