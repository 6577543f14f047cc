//! Telemetry sources gathered on every report cycle.
//!
//! The report job calls [`TelemetrySource::gather`] once per cycle and sends
//! whatever structured value comes back. A failed gather skips that cycle only.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use thiserror::Error;

/// Errors raised by a telemetry source.
#[derive(Debug, Error)]
pub enum GatherError {
    /// The producer failed to build a payload.
    #[error("telemetry unavailable: {0}")]
    Unavailable(String),

    /// The payload could not be serialized.
    #[error("telemetry serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Producer of the telemetry payload.
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync + 'static {
    /// Gather the payload for one report cycle.
    async fn gather(&self) -> Result<Value, GatherError>;
}

/// Adapts a closure into a [`TelemetrySource`].
///
/// ```
/// use ctma_client::telemetry::FnTelemetry;
/// use serde_json::json;
///
/// let source = FnTelemetry::new(|| Ok(json!({ "players": 3 })));
/// # let _ = source;
/// ```
pub struct FnTelemetry<F> {
    gather: F,
}

impl<F> FnTelemetry<F>
where
    F: Fn() -> Result<Value, GatherError> + Send + Sync + 'static,
{
    /// Wrap a gathering closure.
    pub fn new(gather: F) -> Self {
        Self { gather }
    }
}

impl<F> std::fmt::Debug for FnTelemetry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTelemetry").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<F> TelemetrySource for FnTelemetry<F>
where
    F: Fn() -> Result<Value, GatherError> + Send + Sync + 'static,
{
    async fn gather(&self) -> Result<Value, GatherError> {
        (self.gather)()
    }
}

/// Built-in source describing the running process.
#[derive(Debug, Clone)]
pub struct ProcessTelemetry {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl ProcessTelemetry {
    /// Start measuring uptime from now.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

impl Default for ProcessTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TelemetrySource for ProcessTelemetry {
    async fn gather(&self) -> Result<Value, GatherError> {
        Ok(json!({
            "pid": std::process::id(),
            "uptime_secs": self.started.elapsed().as_secs(),
            "started_at": self.started_at.to_rfc3339(),
            "client_version": env!("CARGO_PKG_VERSION"),
        }))
    }
}
