//! Session Layer
//!
//! The state machine that drives one collector connection at a time:
//! open, register, read, dispatch, tear down.
//!
//! # Components
//!
//! - [`Client`]: Public handle; owns the shared session resources
//! - [`SessionState`]: Lifecycle states and their transition table

mod client;
mod runner;
mod state;

pub use client::Client;
pub use state::SessionState;

pub(crate) use client::Shared;
pub(crate) use runner::run_session;
