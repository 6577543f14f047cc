//! Public client handle and the resources shared with its background tasks.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::{SessionState, StateCell};
use crate::ClientError;
use crate::config::{ClientConfig, ClientIdentity, Endpoint, TimingConfig};
use crate::connection::Connection;
use crate::protocol;
use crate::scheduler::Liveness;
use crate::supervisor::{self, Backoff};
use crate::telemetry::TelemetrySource;

/// Resources shared by the client handle, the supervisor and the session tasks.
pub(crate) struct Shared {
    pub(crate) identity: ClientIdentity,
    pub(crate) endpoint: Endpoint,
    pub(crate) timing: TimingConfig,
    pub(crate) debug: bool,
    pub(crate) telemetry: Arc<dyn TelemetrySource>,
    pub(crate) state: StateCell,
    pub(crate) backoff: Backoff,
    pub(crate) liveness: Arc<Liveness>,
    /// The single live connection, if any.
    pub(crate) connection: Mutex<Option<Arc<Connection>>>,
    /// Cancelled once by [`Client::shutdown`].
    pub(crate) shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// Drop the connection slot if it still holds `conn`.
    pub(crate) async fn release_connection(&self, conn: &Arc<Connection>) {
        let mut slot = self.connection.lock().await;
        if slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, conn)) {
            slot.take();
        }
    }
}

/// Self-healing client for a CTMA collector.
///
/// Cloning yields another handle to the same session.
///
/// ```rust,no_run
/// use ctma_client::{Client, ClientConfig, ProcessTelemetry};
///
/// # async fn run() -> Result<(), ctma_client::ClientError> {
/// let config = ClientConfig::new("127.0.0.1", 7000, "lobby", "secret");
/// let client = Client::new(config, ProcessTelemetry::new())?;
/// client.connect().await?;
/// // ...
/// client.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.shared.identity.name)
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.shared.state.get())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client from a validated configuration.
    pub fn new(config: ClientConfig, telemetry: impl TelemetrySource) -> Result<Self, ClientError> {
        Self::with_source(config, Arc::new(telemetry))
    }

    /// Create a client sharing an existing telemetry source.
    pub fn with_source(
        config: ClientConfig,
        telemetry: Arc<dyn TelemetrySource>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let timing = config.timing();

        Ok(Self {
            shared: Arc::new(Shared {
                identity: config.identity(),
                endpoint: config.endpoint(),
                timing,
                debug: config.debug,
                telemetry,
                state: StateCell::new(),
                backoff: Backoff::new(timing.retry_unit),
                liveness: Arc::new(Liveness::default()),
                connection: Mutex::new(None),
                shutdown: CancellationToken::new(),
                supervisor: Mutex::new(None),
            }),
        })
    }

    /// Start connecting in the background.
    ///
    /// Returns immediately; connection failures are retried until shutdown.
    /// Calling it again while the client is running is a no-op.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(ClientError::ShutDown);
        }

        let mut slot = self.shared.supervisor.lock().await;
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!("Client already running, ignoring connect");
            return Ok(());
        }

        *slot = Some(tokio::spawn(supervisor::supervise(Arc::clone(&self.shared))));
        Ok(())
    }

    /// Send an application event to the collector.
    ///
    /// Sending before the session is Ready is allowed but the collector
    /// will most likely ignore it.
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), ClientError> {
        let line = protocol::encode(event, &args)?;
        let conn = self
            .shared
            .connection
            .lock()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)?;

        conn.send_line(&line).await?;
        Ok(())
    }

    /// Stop the client: cancel retries and jobs, then close the connection.
    ///
    /// Waits for the background tasks to finish. The client cannot be
    /// reconnected afterwards.
    pub async fn shutdown(&self) {
        if self.shared.shutdown.is_cancelled() {
            return;
        }

        self.shared.state.advance(SessionState::ShuttingDown);
        self.shared.shutdown.cancel();
        tracing::info!(endpoint = %self.shared.endpoint, "Shutting down client");

        let conn = self.shared.connection.lock().await.take();
        if let Some(conn) = conn {
            conn.close().await;
        }

        let supervisor = self.shared.supervisor.lock().await.take();
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Supervisor terminated abnormally");
            }
        }

        self.shared.state.advance(SessionState::Disconnected);
        tracing::info!("Connection to collector closed");
    }

    /// Client name announced during registration.
    pub fn name(&self) -> &str {
        &self.shared.identity.name
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    /// Watch receiver notified on every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Whether a stream to the collector is open.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Whether the collector accepted the registration.
    pub fn is_registered(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn connection_attempts(&self) -> u32 {
        self.shared.backoff.attempts()
    }

    /// Last liveness timestamp in unix seconds, 0 before the first tick.
    pub fn last_heartbeat(&self) -> i64 {
        self.shared.liveness.last()
    }
}
