//! Heartbeat and report jobs of a Ready session.
//!
//! Two independent periodic tasks are started on every Ready transition:
//!
//! - **Liveness**: records the wall-clock time every `heartbeat` period.
//! - **Report**: gathers telemetry every `report_interval`, starting after
//!   `report_delay`, and sends a `server-heartbeat` event.
//!
//! Both tasks observe a cancellation token between cycles, so a cycle that is
//! already running always completes before the task stops.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::TimingConfig;
use crate::connection::Connection;
use crate::protocol::{self, HEARTBEAT_EVENT};
use crate::telemetry::TelemetrySource;

/// Last liveness timestamp, in unix seconds (0 until the first tick).
#[derive(Debug, Default)]
pub struct Liveness(AtomicI64);

impl Liveness {
    /// Record the current wall-clock time.
    pub fn record_now(&self) {
        self.0.store(Utc::now().timestamp(), Ordering::Release);
    }

    /// Last recorded timestamp.
    pub fn last(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Running liveness and report jobs of one session.
#[derive(Debug)]
pub struct HeartbeatScheduler {
    cancel: CancellationToken,
    jobs: Vec<JoinHandle<()>>,
}

impl HeartbeatScheduler {
    /// Spawn both jobs; they stop when `parent` or [`HeartbeatScheduler::stop`] cancels them.
    pub fn start(
        timing: &TimingConfig,
        source: Arc<dyn TelemetrySource>,
        connection: Arc<Connection>,
        liveness: Arc<Liveness>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();

        let liveness_job = tokio::spawn(run_liveness(
            timing.heartbeat,
            Arc::clone(&liveness),
            cancel.clone(),
        ));
        let report_job = tokio::spawn(run_reports(
            *timing,
            source,
            connection,
            liveness,
            cancel.clone(),
        ));

        tracing::debug!(
            heartbeat_ms = timing.heartbeat.as_millis() as u64,
            report_ms = timing.report_interval.as_millis() as u64,
            "Heartbeat scheduler started"
        );

        Self {
            cancel,
            jobs: vec![liveness_job, report_job],
        }
    }

    /// Stop scheduling new cycles without waiting for the current ones.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel both jobs and wait for any in-flight cycle to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        for job in self.jobs {
            if let Err(e) = job.await {
                tracing::warn!(error = %e, "Scheduler job terminated abnormally");
            }
        }
        tracing::debug!("Heartbeat scheduler stopped");
    }
}

async fn run_liveness(
    period: std::time::Duration,
    liveness: Arc<Liveness>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => liveness.record_now(),
        }
    }
}

async fn run_reports(
    timing: TimingConfig,
    source: Arc<dyn TelemetrySource>,
    connection: Arc<Connection>,
    liveness: Arc<Liveness>,
    cancel: CancellationToken,
) {
    let start = Instant::now() + timing.report_delay;
    let mut ticker = tokio::time::interval_at(start, timing.report_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        report_once(&source, &connection, &liveness).await;
    }
}

/// Run one report cycle: gather, then send. Failures skip the cycle.
///
/// Gathering runs on its own task so a panicking source only loses the
/// current cycle.
async fn report_once(
    source: &Arc<dyn TelemetrySource>,
    connection: &Connection,
    liveness: &Liveness,
) {
    let gather = {
        let source = Arc::clone(source);
        tokio::spawn(async move { source.gather().await })
    };
    let payload = match gather.await {
        Ok(Ok(payload)) => payload,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Telemetry gathering failed, skipping report");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Telemetry source panicked, skipping report");
            return;
        }
    };

    let line = match protocol::encode(HEARTBEAT_EVENT, &[json!(liveness.last()), payload]) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode report");
            return;
        }
    };

    if let Err(e) = connection.send_line(&line).await {
        tracing::debug!(error = %e, "Report not sent");
    }
}
