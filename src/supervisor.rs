//! Reconnect supervisor.
//!
//! Runs one session after another until shutdown. After every session that ends
//! without a shutdown request, the attempt counter grows and the next attempt
//! waits for a delay chosen from a fixed tier table:
//!
//! | consecutive failures | delay (units) |
//! |----------------------|---------------|
//! | 1 - 10               | 1             |
//! | 11 - 20              | 3             |
//! | > 20                 | 5             |

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::session::{SessionState, Shared, run_session};

/// Last attempt of the first backoff tier.
pub const FIRST_TIER_MAX_ATTEMPTS: u32 = 10;

/// Last attempt of the second backoff tier.
pub const SECOND_TIER_MAX_ATTEMPTS: u32 = 20;

/// Number of backoff units to wait before the given attempt.
pub fn backoff_units(attempt: u32) -> u32 {
    if attempt <= FIRST_TIER_MAX_ATTEMPTS {
        1
    } else if attempt <= SECOND_TIER_MAX_ATTEMPTS {
        3
    } else {
        5
    }
}

/// Consecutive-failure counter and delay policy.
#[derive(Debug)]
pub struct Backoff {
    attempts: AtomicU32,
    unit: Duration,
}

impl Backoff {
    /// Create a policy measuring delays in multiples of `unit`.
    pub fn new(unit: Duration) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            unit,
        }
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Whether a failure streak is in progress.
    pub fn is_retrying(&self) -> bool {
        self.attempts() > 0
    }

    /// Forget the failure streak after a successful open.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::Release);
    }

    /// Count one more failure and return it with the delay to wait.
    pub fn record_failure(&self) -> (u32, Duration) {
        let attempt = self
            .attempts
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);
        (attempt, self.unit * backoff_units(attempt))
    }
}

/// Drive sessions until shutdown is requested.
pub(crate) async fn supervise(shared: Arc<Shared>) {
    let shutdown = shared.shutdown.clone();

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let session = tokio::spawn(run_session(Arc::clone(&shared)));
        if let Err(e) = session.await {
            tracing::error!(error = %e, "Session task terminated abnormally");
            // A panicking session may have left the state mid-flight.
            shared.state.advance(SessionState::Disconnected);
        }

        if shutdown.is_cancelled() {
            break;
        }

        let (attempt, delay) = shared.backoff.record_failure();
        if attempt == 1 {
            tracing::info!("Trying to reconnect");
        }
        shared.state.advance(SessionState::Reconnecting);
        tracing::debug!(
            endpoint = %shared.endpoint,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("Reconnect supervisor stopped");
}
