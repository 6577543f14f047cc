//! Configuration module for the CTMA client.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Collector endpoint (host, port)
//! - Client identity (name, auth key)
//! - Scheduler cadence (heartbeat, report interval, report delay)
//! - Reconnect backoff unit

mod client;
mod validation;

pub use client::{ClientConfig, ClientIdentity, Endpoint, TimingConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use client::{DEFAULT_HEARTBEAT, DEFAULT_REPORT_DELAY, DEFAULT_REPORT_INTERVAL, DEFAULT_RETRY_UNIT};
