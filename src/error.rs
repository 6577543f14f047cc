//! Errors surfaced by the public client API.
//!
//! Transport failures inside background tasks never reach callers; they are
//! logged and handed to the reconnect supervisor. Only direct calls such as
//! [`Client::emit`](crate::Client::emit) return these.

use thiserror::Error;

use crate::config::ConfigError;
use crate::connection::ConnectionError;
use crate::protocol::CodecError;

/// Errors returned by [`Client`](crate::Client) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The event could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Writing to the collector failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// No stream to the collector is open.
    #[error("not connected to collector")]
    NotConnected,

    /// The client was shut down and cannot be restarted.
    #[error("client has been shut down")]
    ShutDown,
}
