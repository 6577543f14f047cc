//! CTMA Client - Self-Healing Collector Client
//!
//! A long-lived TCP client that registers with a CTMA collector and then
//! periodically reports host telemetry as newline-delimited JSON events,
//! reconnecting on its own whenever the connection is lost.
//!
//! # Architecture
//!
//! - **Protocol**: `{evt, args}` line codec and inbound classification
//! - **Connection**: One TCP stream with a line reader and a serialized writer
//! - **Session**: State machine driving open, registration, read loop and teardown
//! - **Scheduler**: Liveness timer and telemetry report job of a Ready session
//! - **Supervisor**: Tiered reconnect backoff until shutdown
//!
//! # Example
//!
//! ```rust,no_run
//! use ctma_client::{Client, ClientConfig, FnTelemetry};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::load("config.yaml")?;
//!     let telemetry = FnTelemetry::new(|| Ok(json!({ "players": 12 })));
//!
//!     let client = Client::new(config, telemetry)?;
//!     client.connect().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
mod error;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod supervisor;
pub mod telemetry;

pub use config::{ClientConfig, ClientIdentity, ConfigError, Endpoint, TimingConfig};
pub use connection::{ConnectError, Connection, ConnectionError};
pub use error::ClientError;
pub use protocol::{CodecError, Inbound, Packet};
pub use session::{Client, SessionState};
pub use telemetry::{FnTelemetry, GatherError, ProcessTelemetry, TelemetrySource};
