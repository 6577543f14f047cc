//! One session: open, register, read until the stream ends, tear down.

use std::sync::Arc;

use serde_json::json;

use super::client::Shared;
use super::state::SessionState;
use crate::connection::{ConnectError, Connection, ConnectionError};
use crate::protocol::{self, AUTH_EVENT, AUTH_SUCCESS_EVENT, CLIENT_KIND, Inbound};
use crate::scheduler::HeartbeatScheduler;

/// Why the read loop ended.
#[derive(Debug)]
enum LoopExit {
    /// The collector closed the stream.
    EndOfStream,
    /// Reading from the socket failed.
    Failed(ConnectionError),
    /// Shutdown was requested, or the connection was closed locally.
    Shutdown,
}

/// Run a single connection attempt to completion.
///
/// Every exit path leaves the connection closed, the scheduler stopped and the
/// state back at `Disconnected` (unless a shutdown owns the state).
pub(crate) async fn run_session(shared: Arc<Shared>) {
    let endpoint = &shared.endpoint;
    let reconnecting = shared.backoff.is_retrying();

    if !shared.state.advance(SessionState::Connecting) {
        return;
    }
    if reconnecting {
        tracing::debug!(%endpoint, attempt = shared.backoff.attempts(), "Connecting");
    } else {
        tracing::info!("Connecting to {}...", endpoint);
    }

    let opened = tokio::select! {
        _ = shared.shutdown.cancelled() => return,
        opened = Connection::open(endpoint) => opened,
    };

    let conn = match opened {
        Ok(conn) => Arc::new(conn),
        Err(e) => {
            log_connect_failure(&shared, &e, reconnecting);
            shared.state.advance(SessionState::Disconnected);
            return;
        }
    };

    shared.backoff.reset();
    *shared.connection.lock().await = Some(Arc::clone(&conn));

    if !shared.state.advance(SessionState::Connected) {
        teardown(&shared, &conn, None, LoopExit::Shutdown).await;
        return;
    }
    tracing::info!(peer = %conn.peer_addr(), "Connection established");

    register(&shared, &conn).await;

    let mut scheduler = None;
    let exit = read_loop(&shared, &conn, &mut scheduler).await;
    teardown(&shared, &conn, scheduler, exit).await;
}

fn log_connect_failure(shared: &Shared, err: &ConnectError, reconnecting: bool) {
    let endpoint = &shared.endpoint;
    if reconnecting {
        tracing::debug!(%endpoint, error = %err, "Reconnect attempt failed");
        return;
    }

    match err {
        ConnectError::Refused => {
            tracing::warn!("Could not connect to {} (Connection refused)", endpoint);
        }
        other => {
            tracing::warn!(error = ?other, "Could not connect to {} ({})", endpoint, other);
        }
    }
}

/// Send the authentication packet.
async fn register(shared: &Shared, conn: &Connection) {
    if !shared.state.advance(SessionState::Registering) {
        return;
    }

    let identity = &shared.identity;
    let args = [
        json!(CLIENT_KIND),
        json!(identity.name),
        json!(identity.auth_key),
    ];
    let sent = match protocol::encode(AUTH_EVENT, &args) {
        Ok(line) => conn.send_line(&line).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match sent {
        Ok(()) => tracing::debug!(name = %identity.name, "Registration sent"),
        // The read loop will observe the broken stream.
        Err(e) => tracing::warn!(error = %e, "Failed to send registration"),
    }
}

async fn read_loop(
    shared: &Arc<Shared>,
    conn: &Arc<Connection>,
    scheduler: &mut Option<HeartbeatScheduler>,
) -> LoopExit {
    loop {
        let read = tokio::select! {
            _ = shared.shutdown.cancelled() => return LoopExit::Shutdown,
            read = conn.read_line() => read,
        };

        let line = match read {
            Ok(Some(line)) => line,
            Ok(None) => return LoopExit::EndOfStream,
            Err(ConnectionError::Closed) => return LoopExit::Shutdown,
            Err(e) => return LoopExit::Failed(e),
        };

        if line.trim().is_empty() {
            continue;
        }

        match protocol::decode(&line) {
            Err(e) => {
                tracing::warn!(error = %e, line = %line, "Ignoring malformed packet");
            }
            Ok(Inbound::Error(message)) => {
                tracing::warn!(error = %message, "Collector reported an error");
            }
            Ok(Inbound::Event(packet)) if packet.evt == AUTH_SUCCESS_EVENT => {
                on_ready(shared, conn, scheduler);
            }
            Ok(Inbound::Event(packet)) => {
                tracing::debug!(evt = %packet.evt, "Ignoring unhandled event");
            }
            Ok(Inbound::Message(message)) => {
                if shared.debug {
                    tracing::info!(%message, "Received message from collector");
                } else {
                    tracing::debug!(%message, "Received message from collector");
                }
            }
        }
    }
}

/// Enter Ready and start the periodic jobs, at most once per connection.
fn on_ready(
    shared: &Arc<Shared>,
    conn: &Arc<Connection>,
    scheduler: &mut Option<HeartbeatScheduler>,
) {
    if scheduler.is_some() || !shared.state.advance(SessionState::Ready) {
        tracing::debug!("Duplicate auth-success ignored");
        return;
    }

    tracing::info!(name = %shared.identity.name, "Registered with collector");
    *scheduler = Some(HeartbeatScheduler::start(
        &shared.timing,
        Arc::clone(&shared.telemetry),
        Arc::clone(conn),
        Arc::clone(&shared.liveness),
        &shared.shutdown,
    ));
}

async fn teardown(
    shared: &Shared,
    conn: &Arc<Connection>,
    scheduler: Option<HeartbeatScheduler>,
    exit: LoopExit,
) {
    let shutting_down = shared.shutdown.is_cancelled();

    if let Some(scheduler) = &scheduler {
        scheduler.cancel();
    }
    conn.close().await;
    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    shared.release_connection(conn).await;

    if !shutting_down {
        match &exit {
            LoopExit::Failed(e) => {
                tracing::warn!(error = %e, "Connection error");
                tracing::warn!("Lost connection to server");
            }
            LoopExit::EndOfStream => tracing::warn!("Lost connection to server"),
            LoopExit::Shutdown => tracing::debug!("Connection closed locally"),
        }
    }

    shared.state.advance(SessionState::Disconnected);
}
