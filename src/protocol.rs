//! Wire Protocol
//!
//! Newline-delimited JSON over a plain TCP stream. Every outbound message is a
//! single-line envelope `{"evt": <name>, "args": [...]}`; inbound lines are
//! classified on the reserved `error` and `evt` keys.
//!
//! # Components
//!
//! - [`Packet`]: Outbound event envelope
//! - [`Inbound`]: Classified inbound message
//! - [`encode`] / [`decode`]: Line codec

mod codec;

pub use codec::{CodecError, Inbound, Packet, decode, encode};

/// Event name of the registration handshake.
pub const AUTH_EVENT: &str = "auth";

/// Client kind announced as the first argument of the handshake.
pub const CLIENT_KIND: &str = "ctma-client";

/// Event sent by the collector once the handshake is accepted.
pub const AUTH_SUCCESS_EVENT: &str = "auth-success";

/// Event carrying the liveness timestamp and the telemetry payload.
pub const HEARTBEAT_EVENT: &str = "server-heartbeat";
