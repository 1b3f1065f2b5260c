//! Configuration for the dealroom service

use dealroom_lifecycle::timeline_from_labels;
use dealroom_notify::DEFAULT_CHANNEL_CAPACITY;
use dealroom_types::{TimelineStep, TimelineViolation};
use serde::{Deserialize, Serialize};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DealroomConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Audit log configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Notification configuration
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Document custody rules
    #[serde(default)]
    pub custody: CustodyConfig,

    /// Timeline defaults
    #[serde(default)]
    pub timeline: TimelineConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bounded queue size; overflow is dropped with a warning
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodyConfig {
    /// Allow verifying a rejected document without a re-upload
    #[serde(default = "default_true")]
    pub allow_rejected_override: bool,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            allow_rejected_override: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Step labels seeded into deals created without a timeline
    #[serde(default = "default_steps")]
    pub default_steps: Vec<String>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            default_steps: default_steps(),
        }
    }
}

impl TimelineConfig {
    /// The default timeline, checked against the same rules as any other.
    pub fn default_timeline(&self) -> Result<Vec<TimelineStep>, TimelineViolation> {
        timeline_from_labels(self.default_steps.as_slice())
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_steps() -> Vec<String> {
    ["Offer accepted", "Due diligence", "Financing", "Closing"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl DealroomConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `DEALROOM_`-prefixed environment variables
    /// (e.g. `DEALROOM_CUSTODY__ALLOW_REJECTED_OVERRIDE=false`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DealroomConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DEALROOM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
