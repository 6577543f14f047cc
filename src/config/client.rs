//! Client configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, expand_env_vars, require_non_empty, require_positive};

// =============================================================================
// Constants
// =============================================================================

/// Default liveness timer period (1 second).
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(1);

/// Default report job period (1 second).
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Default offset of the first report tick (1 second).
pub const DEFAULT_REPORT_DELAY: Duration = Duration::from_secs(1);

/// Default backoff time unit (1 second).
pub const DEFAULT_RETRY_UNIT: Duration = Duration::from_secs(1);

fn default_heartbeat() -> Duration {
    DEFAULT_HEARTBEAT
}

fn default_report_interval() -> Duration {
    DEFAULT_REPORT_INTERVAL
}

fn default_report_delay() -> Duration {
    DEFAULT_REPORT_DELAY
}

fn default_retry_unit() -> Duration {
    DEFAULT_RETRY_UNIT
}

// =============================================================================
// Views
// =============================================================================

/// Identity sent during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Client name announced to the collector.
    pub name: String,
    /// Shared secret proving the identity.
    pub auth_key: String,
}

/// Collector address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Collector host name or IP address.
    pub host: String,
    /// Collector TCP port.
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Scheduler cadence and backoff unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Liveness timer period.
    pub heartbeat: Duration,
    /// Report job period.
    pub report_interval: Duration,
    /// Offset of the first report tick after readiness.
    pub report_delay: Duration,
    /// One backoff time unit.
    pub retry_unit: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT,
            report_interval: DEFAULT_REPORT_INTERVAL,
            report_delay: DEFAULT_REPORT_DELAY,
            retry_unit: DEFAULT_RETRY_UNIT,
        }
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Collector host.
    pub host: String,

    /// Collector port.
    pub port: u16,

    /// Name announced during registration.
    pub client_name: String,

    /// Shared secret sent during registration.
    pub auth_key: String,

    /// Liveness timer period (default: 1s).
    #[serde(default = "default_heartbeat", with = "humantime_serde")]
    pub heartbeat: Duration,

    /// Report job period (default: 1s).
    #[serde(default = "default_report_interval", with = "humantime_serde")]
    pub report_interval: Duration,

    /// Offset of the first report tick (default: 1s).
    #[serde(default = "default_report_delay", with = "humantime_serde")]
    pub report_delay: Duration,

    /// Backoff time unit (default: 1s).
    #[serde(default = "default_retry_unit", with = "humantime_serde")]
    pub retry_unit: Duration,

    /// Verbose logging of inbound traffic and retries (default: false).
    #[serde(default)]
    pub debug: bool,
}

impl ClientConfig {
    /// Create a configuration with default timings.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        client_name: impl Into<String>,
        auth_key: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            client_name: client_name.into(),
            auth_key: auth_key.into(),
            heartbeat: DEFAULT_HEARTBEAT,
            report_interval: DEFAULT_REPORT_INTERVAL,
            report_delay: DEFAULT_REPORT_DELAY,
            retry_unit: DEFAULT_RETRY_UNIT,
            debug: false,
        }
    }

    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` references are expanded from the environment before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file without validating it.
    ///
    /// Used when overrides are applied before validation.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config = Self::parse_yaml(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(&expand_env_vars(content))?)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("host", &self.host)?;

        if self.port == 0 {
            return Err(ConfigError::ValidationError(
                "port must be non-zero".to_string(),
            ));
        }

        require_non_empty("client_name", &self.client_name)?;
        require_non_empty("auth_key", &self.auth_key)?;

        require_positive("heartbeat", self.heartbeat)?;
        require_positive("report_interval", self.report_interval)?;
        require_positive("report_delay", self.report_delay)?;
        require_positive("retry_unit", self.retry_unit)?;

        Ok(())
    }

    /// Set the liveness timer period.
    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Set the report job period.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Set the offset of the first report tick.
    pub fn with_report_delay(mut self, delay: Duration) -> Self {
        self.report_delay = delay;
        self
    }

    /// Set the backoff time unit.
    pub fn with_retry_unit(mut self, unit: Duration) -> Self {
        self.retry_unit = unit;
        self
    }

    /// Set debug logging.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Registration identity.
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            name: self.client_name.clone(),
            auth_key: self.auth_key.clone(),
        }
    }

    /// Collector address.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// Scheduler and backoff timings.
    pub fn timing(&self) -> TimingConfig {
        TimingConfig {
            heartbeat: self.heartbeat,
            report_interval: self.report_interval,
            report_delay: self.report_delay,
            retry_unit: self.retry_unit,
        }
    }
}
