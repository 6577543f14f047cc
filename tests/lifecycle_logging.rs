//! Lifecycle Logging Tests
//!
//! Captures the client's log output to tell a deliberate shutdown apart from
//! an unexpected drop. Each test runs on a current-thread runtime, so the
//! thread-local subscriber also sees events from the client's spawned tasks.

use std::io::{self, ErrorKind, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ctma_client::{Client, ClientConfig, FnTelemetry, SessionState};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

const WAIT: Duration = Duration::from_secs(3);
const LOST_CONNECTION: &str = "Lost connection to server";

// =============================================================================
// Test Helpers
// =============================================================================

#[derive(Clone, Default)]
struct LogCapture {
    bytes: Arc<Mutex<Vec<u8>>>,
}

struct LogCaptureWriter {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_target(false);
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new("ctma_client=debug"))
            .with(layer);
        tracing::subscriber::set_default(subscriber)
    }

    fn text(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).to_string()
    }
}

impl Write for LogCaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogCaptureWriter {
            bytes: Arc::clone(&self.bytes),
        }
    }
}

async fn bind() -> Option<TcpListener> {
    match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => Some(listener),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => None,
        Err(e) => panic!("Failed to bind mock collector: {e}"),
    }
}

fn client(port: u16) -> Client {
    let config = ClientConfig::new("127.0.0.1", port, "lobby", "s3cret")
        .with_report_interval(Duration::from_secs(60))
        .with_report_delay(Duration::from_secs(60))
        .with_retry_unit(Duration::from_millis(50));
    Client::new(config, FnTelemetry::new(|| Ok(json!({})))).unwrap()
}

async fn accept(listener: &TcpListener) -> TcpStream {
    tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("client should connect")
        .unwrap()
        .0
}

/// Accept, consume the auth packet, and acknowledge it.
async fn register(listener: &TcpListener, client: &Client) -> TcpStream {
    let stream = accept(listener).await;
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let auth = tokio::time::timeout(WAIT, lines.next_line())
        .await
        .expect("auth packet")
        .unwrap()
        .unwrap();
    assert!(auth.contains(r#""evt":"auth""#));
    write.write_all(b"{\"evt\":\"auth-success\"}\n").await.unwrap();

    let mut rx = client.subscribe_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == SessionState::Ready))
        .await
        .expect("client reaches ready")
        .unwrap();

    lines.into_inner().into_inner().reunite(write).unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_shutdown_from_ready_does_not_warn_lost_connection() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let Some(listener) = bind().await else {
        return;
    };

    let client = client(listener.local_addr().unwrap().port());
    client.connect().await.unwrap();
    let _stream = register(&listener, &client).await;

    client.shutdown().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let text = logs.text();
    assert!(text.contains("Shutting down client"), "logs: {text}");
    assert!(text.contains("Connection to collector closed"), "logs: {text}");
    assert!(!text.contains(LOST_CONNECTION), "logs: {text}");
}

#[tokio::test]
async fn test_shutdown_while_connecting_does_not_warn_lost_connection() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    // Non-routable address: the connect attempt hangs or fails, never succeeds.
    let config = ClientConfig::new("10.255.255.1", 80, "lobby", "s3cret")
        .with_retry_unit(Duration::from_millis(50));
    let client = Client::new(config, FnTelemetry::new(|| Ok(json!({})))).unwrap();
    client.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(WAIT, client.shutdown())
        .await
        .expect("shutdown completes while connecting");

    let text = logs.text();
    assert!(text.contains("Shutting down client"), "logs: {text}");
    assert!(!text.contains(LOST_CONNECTION), "logs: {text}");
}

#[tokio::test]
async fn test_unexpected_drop_warns_lost_connection() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let Some(listener) = bind().await else {
        return;
    };

    let client = client(listener.local_addr().unwrap().port());
    client.connect().await.unwrap();
    let stream = register(&listener, &client).await;
    assert!(!logs.text().contains(LOST_CONNECTION));

    drop(stream);

    // The reconnect attempt proves teardown has already run.
    let _again = accept(&listener).await;
    let text = logs.text();
    assert!(text.contains(LOST_CONNECTION), "logs: {text}");
    assert!(text.contains("WARN"), "logs: {text}");

    client.shutdown().await;
}
