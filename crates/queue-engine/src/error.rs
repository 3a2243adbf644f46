use thiserror::Error;

use crate::ticket::{TicketEvent, TicketId, TicketStatus};

/// Queue engine errors
#[derive(Error, Debug)]
pub enum QueueEngineError {
    /// Storage collaborator failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Email collaborator failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// The ticket's current status does not permit the requested event
    #[error("Invalid transition: cannot {event} ticket {ticket_id} while it is {status}")]
    InvalidTransition {
        ticket_id: TicketId,
        status: TicketStatus,
        event: TicketEvent,
    },

    /// No responsibility is defined under this service name
    #[error("Unknown service type: {0}")]
    UnknownService(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueEngineError {
    /// Create a new Notification error
    pub fn notification<S: Into<String>>(msg: S) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a new NotFound error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new InvalidInput error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new Internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the failure came from the storage or email collaborator.
    pub fn is_collaborator(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Notification(_))
    }
}

impl From<config::ConfigError> for QueueEngineError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for queue engine operations
pub type Result<T> = std::result::Result<T, QueueEngineError>;
