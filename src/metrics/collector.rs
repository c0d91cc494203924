//! Metrics collection and registry.

use crate::connection::{ConnectionStats, RetryState};
use crate::detection::ProcessorStats;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for the recorder.
///
/// Cloning is cheap; clones share the same underlying metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,

    // Frame metrics
    frames_total: IntCounter,
    frames_saved_total: IntCounter,
    save_failures_total: IntCounter,
    difference_score: Gauge,

    // Connection metrics
    open_attempts_total: IntCounter,
    reconnects_total: IntCounter,
    retries_left: IntGauge,
    backoff_seconds: Gauge,
}

/// Increments `counter` up to `target`, since counters cannot be set.
fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

impl MetricsRegistry {
    /// Creates a new registry with all recorder metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_total = IntCounter::new(
            "motion_recorder_frames_total",
            "Total number of frames read from the camera",
        )?;
        let frames_saved_total = IntCounter::new(
            "motion_recorder_frames_saved_total",
            "Total number of frames written to disk",
        )?;
        let save_failures_total = IntCounter::new(
            "motion_recorder_save_failures_total",
            "Total number of frames that could not be written",
        )?;
        let difference_score = Gauge::new(
            "motion_recorder_difference_score",
            "Difference score of the most recent frame (0-255)",
        )?;

        let open_attempts_total = IntCounter::new(
            "motion_recorder_open_attempts_total",
            "Total number of attempts to open the stream",
        )?;
        let reconnects_total = IntCounter::new(
            "motion_recorder_reconnects_total",
            "Total number of sessions lost after opening",
        )?;
        let retries_left = IntGauge::new(
            "motion_recorder_retries_left",
            "Reconnect attempts left before giving up",
        )?;
        let backoff_seconds = Gauge::new(
            "motion_recorder_backoff_seconds",
            "Wait before the next reconnect attempt",
        )?;

        registry.register(Box::new(frames_total.clone()))?;
        registry.register(Box::new(frames_saved_total.clone()))?;
        registry.register(Box::new(save_failures_total.clone()))?;
        registry.register(Box::new(difference_score.clone()))?;
        registry.register(Box::new(open_attempts_total.clone()))?;
        registry.register(Box::new(reconnects_total.clone()))?;
        registry.register(Box::new(retries_left.clone()))?;
        registry.register(Box::new(backoff_seconds.clone()))?;

        Ok(Self {
            registry,
            frames_total,
            frames_saved_total,
            save_failures_total,
            difference_score,
            open_attempts_total,
            reconnects_total,
            retries_left,
            backoff_seconds,
        })
    }

    /// Updates frame metrics from processor counters.
    pub fn update_frames(&self, stats: &ProcessorStats) {
        advance(&self.frames_total, stats.frames_read);
        advance(&self.frames_saved_total, stats.frames_saved);
        advance(&self.save_failures_total, stats.save_failures);

        if let Some(score) = stats.last_score {
            self.difference_score.set(score);
        }
    }

    /// Updates connection metrics from supervisor counters.
    pub fn update_connection(&self, stats: &ConnectionStats, retry: &RetryState) {
        advance(&self.open_attempts_total, stats.attempts);
        advance(&self.reconnects_total, stats.interruptions + stats.faults);
        self.retries_left.set(i64::from(retry.retries_left()));
        self.backoff_seconds.set(retry.wait().as_secs_f64());
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
