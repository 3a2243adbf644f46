//! Outbound notification transport
//!
//! The escalation sweep hands each message to a [`Notifier`]. Delivery is
//! fire-and-forget: a failed send is reported to the caller, never retried.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{QueueEngineError, Result};

/// Sends a single message to a single recipient
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Writes every message to the log instead of delivering it
#[derive(Debug, Clone)]
pub struct LogNotifier {
    sender: String,
}

impl LogNotifier {
    /// Create a new LogNotifier sending as `sender`
    pub fn new(sender: impl Into<String>) -> Self {
        Self { sender: sender.into() }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(from = %self.sender, to = %to, subject = %subject, "📧 {}", body);
        Ok(())
    }
}

/// A message captured by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records messages in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `address` fail from now on
    pub fn fail_for(&self, address: impl Into<String>) {
        self.failing.lock().insert(address.into());
    }

    /// Messages delivered so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Delivered messages addressed to `to`
    pub fn sent_to(&self, to: &str) -> Vec<SentMessage> {
        self.sent.lock().iter().filter(|m| m.to == to).cloned().collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.failing.lock().contains(to) {
            return Err(QueueEngineError::notification(format!("delivery to {} refused", to)));
        }
        self.sent.lock().push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
