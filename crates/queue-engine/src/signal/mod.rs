//! Change signal and push channel
//!
//! Every mutation bumps one process-wide counter. A low-frequency poller
//! compares the counter against the last value it saw and, when it moved,
//! broadcasts a single `updated` event to every push subscriber. Observers
//! learn that *something* changed and re-read whatever they display; any
//! number of mutations between two polls collapse into one event.
//!
//! The counter starts at zero, lives only in memory and is dropped with the
//! engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Data carried by every push event
pub const UPDATED: &str = "updated";

/// Shared monotonic mutation counter
#[derive(Debug, Clone, Default)]
pub struct ChangeSignal {
    counter: Arc<AtomicU64>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mutation, returning the new value.
    pub fn bump(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

/// Event delivered to push subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub id: Uuid,
    pub channel: String,
    pub data: String,
}

/// Broadcast channel observers subscribe to
#[derive(Debug, Clone)]
pub struct PushChannel {
    path: String,
    sender: broadcast::Sender<PushEvent>,
}

impl PushChannel {
    /// Create a new PushChannel at `path` with room for `buffer` pending events
    /// per subscriber
    pub fn new(path: impl Into<String>, buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            path: path.into(),
            sender,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send `data` to every current subscriber, returning how many got it.
    pub fn broadcast(&self, data: &str) -> usize {
        let event = PushEvent {
            id: Uuid::new_v4(),
            channel: self.path.clone(),
            data: data.to_string(),
        };
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No subscribers on {}, push dropped", self.path);
                0
            }
        }
    }
}

/// Turns counter movement into push events
#[derive(Debug)]
pub struct ChangePoller {
    signal: ChangeSignal,
    channel: PushChannel,
    last_seen: u64,
}

impl ChangePoller {
    /// Create a new ChangePoller. Mutations made before this point are
    /// considered seen.
    pub fn new(signal: ChangeSignal, channel: PushChannel) -> Self {
        let last_seen = signal.current();
        Self {
            signal,
            channel,
            last_seen,
        }
    }

    /// Check the counter once; emits at most one event.
    pub fn poll_once(&mut self) -> bool {
        let current = self.signal.current();
        if current == self.last_seen {
            return false;
        }
        debug!("🔔 Change signal moved {} -> {}", self.last_seen, current);
        self.last_seen = current;
        self.channel.broadcast(UPDATED);
        true
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_is_monotonic() {
        let signal = ChangeSignal::new();
        assert_eq!(signal.current(), 0);
        assert_eq!(signal.bump(), 1);
        assert_eq!(signal.bump(), 2);

        let clone = signal.clone();
        clone.bump();
        assert_eq!(signal.current(), 3);
    }

    #[test]
    fn test_many_mutations_one_event() {
        let signal = ChangeSignal::new();
        let channel = PushChannel::new("/events/channel", 16);
        let mut rx = channel.subscribe();
        let mut poller = ChangePoller::new(signal.clone(), channel);

        for _ in 0..25 {
            signal.bump();
        }

        assert!(poller.poll_once());
        assert!(!poller.poll_once());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.data, UPDATED);
        assert_eq!(event.channel, "/events/channel");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_quiet_signal_emits_nothing() {
        let signal = ChangeSignal::new();
        signal.bump();
        let channel = PushChannel::new("/events/channel", 4);
        let mut rx = channel.subscribe();
        let mut poller = ChangePoller::new(signal, channel);

        assert!(!poller.poll_once());
        assert_eq!(poller.last_seen(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let channel = PushChannel::new("/events/channel", 4);
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(channel.broadcast(UPDATED), 0);
    }

    #[tokio::test]
    async fn test_concurrent_bumps_are_not_lost() {
        let signal = ChangeSignal::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let signal = signal.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    signal.bump();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(signal.current(), 8000);
    }
}
