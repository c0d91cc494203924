//! Reconnect loop around the frame processor.

use super::{RetryPolicy, RetryState};
use crate::capture::Connector;
use crate::detection::{FrameProcessor, SessionEnd};
use crate::metrics::MetricsRegistry;
use std::time::Duration;
use tracing::{error, info, warn};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The user asked to stop.
    UserExit,
    /// Every retry was spent without recovering.
    RetriesExhausted { attempts: u64 },
}

/// Counters for connection attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Open attempts made.
    pub attempts: u64,
    /// Open attempts that failed.
    pub open_failures: u64,
    /// Sessions that were lost after opening.
    pub interruptions: u64,
    /// Sessions lost to a backend fault.
    pub faults: u64,
}

/// Supervises capture sessions against a single source URL.
pub struct ConnectionManager<C: Connector> {
    url: String,
    connector: C,
    processor: FrameProcessor,
    policy: RetryPolicy,
    sleeper: Box<dyn FnMut(Duration)>,
    metrics: Option<MetricsRegistry>,
    stats: ConnectionStats,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        url: impl Into<String>,
        connector: C,
        processor: FrameProcessor,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            url: url.into(),
            connector,
            processor,
            policy,
            sleeper: Box::new(std::thread::sleep),
            metrics: None,
            stats: ConnectionStats::default(),
        }
    }

    /// Replaces the function used to wait between attempts.
    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Publishes connection counters to a metrics registry.
    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns connection counters.
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Returns the frame processor.
    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    /// Returns the connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Runs until the user exits or the retry budget is spent.
    pub fn run(&mut self) -> RunOutcome {
        let mut retry = RetryState::initial(&self.policy);

        let outcome = loop {
            if self.processor.exit_requested() {
                break RunOutcome::UserExit;
            }

            self.stats.attempts += 1;
            match self.connector.open(&self.url) {
                Err(e) => {
                    self.stats.open_failures += 1;
                    warn!(
                        error = %e,
                        wait_secs = retry.wait().as_secs_f64(),
                        retries_left = retry.retries_left(),
                        "Could not open stream, retrying"
                    );
                }
                Ok(mut session) => {
                    let meta = session.info().clone();
                    info!(
                        backend = %meta.backend,
                        resolution = %format!("{}x{}", meta.width, meta.height),
                        fps = meta.fps,
                        "Connected to camera"
                    );

                    retry = RetryState::initial(&self.policy);
                    let result = self.processor.process(session.as_mut(), retry);
                    retry = result.retry;
                    session.release();

                    match result.end {
                        SessionEnd::UserExit => break RunOutcome::UserExit,
                        SessionEnd::Interrupted(reason) => {
                            self.stats.interruptions += 1;
                            info!(reason = %reason, "Stream interrupted, attempting to reconnect...");
                        }
                        SessionEnd::Fault(reason) => {
                            self.stats.faults += 1;
                            error!(reason = %reason, "Failed");
                        }
                    }
                }
            }

            self.publish(&retry);
            (self.sleeper)(retry.wait());
            retry = retry.after_failure(&self.policy);

            if retry.is_exhausted() {
                error!(
                    attempts = self.stats.attempts,
                    "Retries exhausted, giving up"
                );
                break RunOutcome::RetriesExhausted {
                    attempts: self.stats.attempts,
                };
            }
        };

        self.publish(&retry);
        self.processor.close_preview();
        outcome
    }

    fn publish(&self, retry: &RetryState) {
        if let Some(metrics) = &self.metrics {
            metrics.update_connection(&self.stats, retry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Frame, ReadOutcome, ScriptedConnector};
    use crate::control::{CancellationToken, ExitSignal};
    use crate::detection::DetectionConfig;
    use crate::output::{FrameSink, OutputError};
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    struct NullSink;

    impl FrameSink for NullSink {
        fn persist(&mut self, _: &Frame, _: &str, _: f64) -> Result<PathBuf, OutputError> {
            Ok(PathBuf::new())
        }
    }

    /// Exit signal that fires once `remaining` frame polls have passed.
    struct ExitAfterFrames {
        remaining: Option<u32>,
    }

    impl ExitSignal for ExitAfterFrames {
        fn poll(&mut self, timeout: Duration) -> bool {
            match self.remaining.as_mut() {
                // Zero-timeout polls come from the reconnect loop
                Some(n) if timeout.is_zero() => *n == 0,
                Some(n) => {
                    *n = n.saturating_sub(1);
                    *n == 0
                }
                None => false,
            }
        }
    }

    fn manager(
        connector: ScriptedConnector,
        policy: RetryPolicy,
        exit_after: Option<u32>,
    ) -> (ConnectionManager<ScriptedConnector>, Rc<RefCell<Vec<Duration>>>) {
        let processor = FrameProcessor::new(
            DetectionConfig::default(),
            policy.clone(),
            Box::new(NullSink),
            Box::new(ExitAfterFrames {
                remaining: exit_after,
            }),
        )
        .with_poll_interval(Duration::from_millis(1));

        let waits = Rc::new(RefCell::new(Vec::new()));
        let recorded = Rc::clone(&waits);
        let manager = ConnectionManager::new("rtsp://camera/stream", connector, processor, policy)
            .with_sleeper(move |wait| recorded.borrow_mut().push(wait));
        (manager, waits)
    }

    fn frames(count: u64) -> Vec<Frame> {
        (1..=count).map(|i| Frame::solid(8, 8, [0, 0, 0], i)).collect()
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|&s| Duration::from_secs(s)).collect()
    }

    #[test]
    fn test_source_never_opens() {
        let (mut manager, waits) =
            manager(ScriptedConnector::new(8, 8), RetryPolicy::default(), None);

        let outcome = manager.run();

        assert_eq!(outcome, RunOutcome::RetriesExhausted { attempts: 10 });
        assert_eq!(manager.connector().open_attempts(), 10);
        assert_eq!(
            *waits.borrow(),
            secs(&[2, 4, 8, 16, 32, 64, 128, 256, 512, 1024])
        );
        assert_eq!(manager.stats().open_failures, 10);
    }

    #[test]
    fn test_user_exit_ends_run() {
        let connector = ScriptedConnector::new(8, 8).frames(frames(5));
        let (mut manager, waits) = manager(connector, RetryPolicy::default(), Some(2));

        assert_eq!(manager.run(), RunOutcome::UserExit);
        assert!(waits.borrow().is_empty());
        assert_eq!(manager.processor().stats().frames_read, 3);
    }

    #[test]
    fn test_mid_stream_failure_reconnects_with_reset_backoff() {
        let policy = RetryPolicy::immediate(3);
        let policy = RetryPolicy {
            min_wait: Duration::from_secs(2),
            ..policy
        };
        let connector = ScriptedConnector::new(8, 8)
            .fail_open()
            .fail_open()
            .session(vec![
                ReadOutcome::Frame(Frame::solid(8, 8, [0, 0, 0], 1)),
                ReadOutcome::EndOfStream,
            ]);
        let (mut manager, waits) = manager(connector, policy, None);

        let outcome = manager.run();

        // Two open failures (2s, 4s), then a read restored the full budget
        // of three at 2s; the lost session and two failed opens spend it.
        assert_eq!(outcome, RunOutcome::RetriesExhausted { attempts: 5 });
        assert_eq!(*waits.borrow(), secs(&[2, 4, 2, 4, 8]));
        assert_eq!(manager.stats().interruptions, 1);
    }

    #[test]
    fn test_fault_is_treated_as_reconnect() {
        let connector = ScriptedConnector::new(8, 8)
            .session(vec![ReadOutcome::FatalFault("decoder crashed".to_string())])
            .frames(frames(3));
        let (mut manager, _) = manager(connector, RetryPolicy::immediate(5), Some(1));

        assert_eq!(manager.run(), RunOutcome::UserExit);
        assert_eq!(manager.stats().faults, 1);
        assert_eq!(manager.connector().open_attempts(), 2);
    }

    #[test]
    fn test_open_success_without_frames_spends_a_retry() {
        let connector = ScriptedConnector::new(8, 8).session(Vec::new());
        let (mut manager, waits) = manager(connector, RetryPolicy::immediate(2), None);

        assert_eq!(
            manager.run(),
            RunOutcome::RetriesExhausted { attempts: 2 }
        );
        assert_eq!(waits.borrow().len(), 2);
    }

    #[test]
    fn test_exit_during_backoff_stops_before_next_open() {
        let token = CancellationToken::new();
        let processor = FrameProcessor::new(
            DetectionConfig::default(),
            RetryPolicy::default(),
            Box::new(NullSink),
            Box::new(token.clone()),
        );
        let sleeper_token = token.clone();
        let mut manager = ConnectionManager::new(
            "rtsp://camera/stream",
            ScriptedConnector::new(8, 8).fail_open(),
            processor,
            RetryPolicy::default(),
        )
        .with_sleeper(move |_| sleeper_token.cancel());

        assert_eq!(manager.run(), RunOutcome::UserExit);
        assert_eq!(manager.connector().open_attempts(), 1);
        assert_eq!(manager.stats().open_failures, 1);
    }
}
