use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QueueEngineError, Result};

/// Environment variable prefix, e.g. `DIGIQUEUE__DATABASE__URL`
pub const ENV_PREFIX: &str = "DIGIQUEUE";

/// Queue engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueEngineConfig {
    /// General server settings
    pub general: GeneralConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Queue rules
    pub queue: QueueConfig,

    /// Long-wait escalation configuration
    pub escalation: EscalationConfig,

    /// Push notification configuration
    pub push: PushConfig,

    /// Outbound notification configuration
    pub notifications: NotificationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// General server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// HTTP listen address
    pub bind_address: String,

    /// Path of the server-sent-events endpoint observers subscribe to
    pub push_channel: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL (`sqlite::memory:` for an in-memory store)
    pub url: String,

    /// Maximum database connections
    pub max_connections: u32,
}

/// Queue rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Lowest accepted service quality rating
    pub min_quality: i64,

    /// Highest accepted service quality rating
    pub max_quality: i64,
}

/// Long-wait escalation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Run the periodic sweep at all
    pub enabled: bool,

    /// Sweep interval (seconds)
    pub sweep_interval_secs: u64,

    /// Notify again on every sweep while a ticket stays in the same tier.
    /// When false, a ticket is only re-notified after it moves to another tier.
    pub repeat_notifications: bool,
}

/// Push notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Change signal poll interval (milliseconds)
    pub poll_interval_ms: u64,

    /// Broadcast buffer per subscriber
    pub buffer: usize,
}

/// Outbound notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Sender address used on escalation emails
    pub sender: String,

    /// Prefix prepended to every subject line
    pub subject_prefix: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl QueueEngineConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// `DIGIQUEUE__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        if self.general.bind_address.is_empty() {
            return Err(QueueEngineError::config("bind_address cannot be empty"));
        }

        if !self.general.push_channel.starts_with('/') || self.general.push_channel.len() < 2 {
            return Err(QueueEngineError::config(format!(
                "push_channel must be a non-root path, got '{}'",
                self.general.push_channel
            )));
        }

        let channel = self.general.push_channel.trim_end_matches('/');
        if channel == "/health" || channel == "/api" || channel.starts_with("/api/") {
            return Err(QueueEngineError::config(format!(
                "push_channel '{}' collides with the HTTP API routes",
                self.general.push_channel
            )));
        }

        if self.database.url.is_empty() {
            return Err(QueueEngineError::config("database url cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(QueueEngineError::config("max_connections must be greater than 0"));
        }

        if self.queue.min_quality > self.queue.max_quality {
            return Err(QueueEngineError::config(format!(
                "min_quality ({}) cannot exceed max_quality ({})",
                self.queue.min_quality, self.queue.max_quality
            )));
        }

        if self.escalation.sweep_interval_secs == 0 {
            return Err(QueueEngineError::config("sweep_interval_secs must be greater than 0"));
        }

        if self.push.poll_interval_ms == 0 {
            return Err(QueueEngineError::config("poll_interval_ms must be greater than 0"));
        }

        if self.push.buffer == 0 {
            return Err(QueueEngineError::config("push buffer must be greater than 0"));
        }

        Ok(())
    }
}

impl EscalationConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl PushConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            push_channel: "/events/channel".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://digiqueue.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            min_quality: 1,
            max_quality: 5,
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 60,
            repeat_notifications: true,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            buffer: 64,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            sender: "queue@digiqueue.local".to_string(),
            subject_prefix: "[DigiQueue] ".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = QueueEngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.escalation.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.push.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.general.push_channel, "/events/channel");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = QueueEngineConfig::default();
        config.escalation.sweep_interval_secs = 0;
        assert!(matches!(config.validate(), Err(QueueEngineError::Config(_))));

        let mut config = QueueEngineConfig::default();
        config.general.push_channel = "/".to_string();
        assert!(config.validate().is_err());

        for taken in ["/health", "/api/v1/queue", "/api/v1/escalation/tiers/", "/api"] {
            let mut config = QueueEngineConfig::default();
            config.general.push_channel = taken.to_string();
            assert!(
                matches!(config.validate(), Err(QueueEngineError::Config(_))),
                "{} should be rejected",
                taken
            );
        }

        let mut config = QueueEngineConfig::default();
        config.general.push_channel = "/apiary/events".to_string();
        assert!(config.validate().is_ok());

        let mut config = QueueEngineConfig::default();
        config.queue.min_quality = 6;
        assert!(config.validate().is_err());

        let mut config = QueueEngineConfig::default();
        config.database.url.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[escalation]
sweep_interval_secs = 5
repeat_notifications = false

[general]
push_channel = "/events/lobby"
"#
        )
        .unwrap();

        let config = QueueEngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.escalation.sweep_interval_secs, 5);
        assert!(!config.escalation.repeat_notifications);
        assert_eq!(config.general.push_channel, "/events/lobby");
        // Untouched sections keep their defaults
        assert_eq!(config.push.poll_interval_ms, 1000);
        assert_eq!(config.queue.max_quality, 5);
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        // SAFETY: serialized with every other test that reads the environment
        unsafe { std::env::set_var("DIGIQUEUE__PUSH__POLL_INTERVAL_MS", "250") };
        let config = QueueEngineConfig::load(None);
        unsafe { std::env::remove_var("DIGIQUEUE__PUSH__POLL_INTERVAL_MS") };

        assert_eq!(config.unwrap().push.poll_interval_ms, 250);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_an_error() {
        let result = QueueEngineConfig::load(Some(Path::new("/nonexistent/digiqueue.toml")));
        assert!(matches!(result, Err(QueueEngineError::Config(_))));
    }
}
