//! Connection Layer
//!
//! Owns one TCP stream to the collector and exposes line-oriented primitives.
//! The connection never decides when to reconnect; that is the supervisor's job.
//!
//! The read half and the write half sit behind separate locks, so a send from
//! the report job never waits on a pending read. The write lock also guards
//! [`Connection::close`], so a send can never reach a released socket.

use std::io::ErrorKind;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::Endpoint;

/// Errors raised while opening a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The collector actively refused the connection.
    #[error("connection refused")]
    Refused,

    /// The connection attempt timed out at the OS level.
    #[error("connection timed out")]
    TimedOut,

    /// Any other I/O failure (DNS, unreachable network, ...).
    #[error("{0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for ConnectError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::ConnectionRefused => Self::Refused,
            ErrorKind::TimedOut => Self::TimedOut,
            _ => Self::Io(err),
        }
    }
}

/// Errors raised on an open connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection was closed locally.
    #[error("connection closed")]
    Closed,

    /// Socket I/O failed.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// A live connection to the collector.
pub struct Connection {
    peer: SocketAddr,
    reader: Mutex<Option<Lines<BufReader<OwnedReadHalf>>>>,
    writer: Mutex<Option<BufWriter<OwnedWriteHalf>>>,
    closed: CancellationToken,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a stream connection to the endpoint.
    pub async fn open(endpoint: &Endpoint) -> Result<Self, ConnectError> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        let peer = stream.peer_addr()?;
        Ok(Self::from_stream(stream, peer))
    }

    fn from_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            peer,
            reader: Mutex::new(Some(BufReader::new(read_half).lines())),
            writer: Mutex::new(Some(BufWriter::new(write_half))),
            closed: CancellationToken::new(),
        }
    }

    /// Remote address of the collector.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether [`Connection::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Read one newline-terminated line.
    ///
    /// Blocks until a line arrives, the peer closes the stream (`Ok(None)`),
    /// the socket fails, or the connection is closed locally.
    pub async fn read_line(&self) -> Result<Option<String>, ConnectionError> {
        let mut reader = self.reader.lock().await;
        let Some(lines) = reader.as_mut() else {
            return Err(ConnectionError::Closed);
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => {
                reader.take();
                Err(ConnectionError::Closed)
            }
            line = lines.next_line() => Ok(line?),
        }
    }

    /// Write one line followed by a flush.
    ///
    /// A write stalled on a peer that stops reading is abandoned once
    /// [`close`](Self::close) is called; the half-written stream is dropped.
    pub async fn send_line(&self, line: &str) -> Result<(), ConnectionError> {
        let mut writer = self.writer.lock().await;
        let Some(w) = writer.as_mut() else {
            return Err(ConnectionError::Closed);
        };

        let write = async {
            w.write_all(line.as_bytes()).await?;
            w.write_all(b"\n").await?;
            w.flush().await
        };
        let abandoned = tokio::select! {
            biased;
            _ = self.closed.cancelled() => true,
            res = write => {
                res?;
                false
            }
        };
        if abandoned {
            writer.take();
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }

    /// Flush and release the socket.
    ///
    /// Idempotent. Teardown errors are logged at debug and never returned.
    /// A send in progress gives up its writer as soon as the connection is
    /// marked closed, so close never waits on a peer that stopped reading.
    pub async fn close(&self) {
        self.closed.cancel();

        if let Some(mut w) = self.writer.lock().await.take() {
            if let Err(e) = w.flush().await {
                tracing::debug!(peer = %self.peer, error = %e, "Flush on close failed");
            }
            if let Err(e) = w.shutdown().await {
                tracing::debug!(peer = %self.peer, error = %e, "Socket shutdown failed");
            }
        }

        // A pending read holds the lock; it drops the reader once it sees the token.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
    }
}
