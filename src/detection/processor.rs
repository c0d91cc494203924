//! Per-session detection loop.

use super::{difference_score, Baseline, BaselineUpdate, DetectionConfig, SaveCountdown};
use crate::capture::{ReadOutcome, StreamSession};
use crate::connection::{RetryPolicy, RetryState};
use crate::control::{ExitSignal, Preview};
use crate::metrics::MetricsRegistry;
use crate::output::{timestamp, FrameSink};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a processing session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user asked to stop; do not reconnect.
    UserExit,
    /// The stream ended or a frame could not be read; reconnect.
    Interrupted(String),
    /// The backend failed unexpectedly; release and reconnect.
    Fault(String),
}

/// Result of [`FrameProcessor::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub end: SessionEnd,
    /// Retry state to carry forward, reset if any frame was read.
    pub retry: RetryState,
}

/// Counters accumulated across all sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorStats {
    /// Frames successfully read.
    pub frames_read: u64,
    /// Frames that were compared against a baseline.
    pub frames_analysed: u64,
    /// Frames persisted by the sink.
    pub frames_saved: u64,
    /// Frames the sink failed to persist.
    pub save_failures: u64,
    /// Most recent difference score.
    pub last_score: Option<f64>,
}

/// Runs the detection loop over one open session at a time.
pub struct FrameProcessor {
    config: DetectionConfig,
    retry_policy: RetryPolicy,
    poll_interval: Duration,
    sink: Box<dyn FrameSink>,
    exit: Box<dyn ExitSignal>,
    preview: Option<Box<dyn Preview>>,
    metrics: Option<MetricsRegistry>,
    stats: ProcessorStats,
}

impl FrameProcessor {
    pub fn new(
        config: DetectionConfig,
        retry_policy: RetryPolicy,
        sink: Box<dyn FrameSink>,
        exit: Box<dyn ExitSignal>,
    ) -> Self {
        Self {
            config,
            retry_policy,
            poll_interval: Duration::from_millis(30),
            sink,
            exit,
            preview: None,
            metrics: None,
            stats: ProcessorStats::default(),
        }
    }

    /// Sets how long each exit poll may wait.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Shows every analysed frame in a preview.
    pub fn with_preview(mut self, preview: Box<dyn Preview>) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Publishes frame counters to a metrics registry.
    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns accumulated counters.
    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    /// Checks for a pending exit request without waiting.
    pub fn exit_requested(&mut self) -> bool {
        self.exit.poll(Duration::ZERO)
    }

    /// Closes the preview, if any.
    pub fn close_preview(&mut self) {
        if let Some(preview) = self.preview.as_mut() {
            preview.close();
        }
    }

    /// Consumes frames from `session` until it fails or the user exits.
    ///
    /// A fresh baseline and save countdown are used for every call, so
    /// nothing leaks from one session into the next.
    pub fn process(&mut self, session: &mut dyn StreamSession, retry: RetryState) -> ProcessOutcome {
        let mut retry = retry;
        let mut baseline = Baseline::new(self.config.baseline_alpha);
        let mut countdown =
            SaveCountdown::new(self.config.score_threshold, self.config.trailing_frames);

        loop {
            let frame = match session.read() {
                ReadOutcome::Frame(frame) if !frame.is_empty() => frame,
                ReadOutcome::Frame(_) => {
                    return self.interrupted(retry, "grabbed frame was empty".to_string());
                }
                ReadOutcome::EndOfStream => {
                    return self.interrupted(retry, "failed to grab frame".to_string());
                }
                ReadOutcome::TransientFault(reason) => return self.interrupted(retry, reason),
                ReadOutcome::FatalFault(reason) => {
                    return ProcessOutcome {
                        end: SessionEnd::Fault(reason),
                        retry,
                    };
                }
            };

            retry = RetryState::initial(&self.retry_policy);
            self.stats.frames_read += 1;

            let grey = frame.to_grey();
            match baseline.update(&grey) {
                BaselineUpdate::Seeded => {
                    info!("Establishing baseline...");
                    continue;
                }
                BaselineUpdate::Reseeded => {
                    warn!(
                        width = grey.width(),
                        height = grey.height(),
                        "Frame size changed, re-establishing baseline"
                    );
                    continue;
                }
                BaselineUpdate::Blended => {}
            }

            let Some(reference) = baseline.image() else {
                continue;
            };
            let score = difference_score(&grey, reference, self.config.pixel_threshold);
            let now = timestamp(&frame.captured_at());
            info!("{} score: {:.6}", now, score);

            self.stats.frames_analysed += 1;
            self.stats.last_score = Some(score);

            if countdown.observe(score) {
                match self.sink.persist(&frame, &now, score) {
                    Ok(path) => {
                        self.stats.frames_saved += 1;
                        debug!(path = %path.display(), remaining = countdown.remaining(), "Frame saved");
                    }
                    Err(e) => {
                        self.stats.save_failures += 1;
                        warn!(error = %e, "Failed to save frame");
                    }
                }
            }

            if let Some(metrics) = &self.metrics {
                metrics.update_frames(&self.stats);
            }

            if let Some(preview) = self.preview.as_mut() {
                preview.show(&frame);
            }

            if self.exit.poll(self.poll_interval) {
                return ProcessOutcome {
                    end: SessionEnd::UserExit,
                    retry,
                };
            }
        }
    }

    fn interrupted(&self, retry: RetryState, reason: String) -> ProcessOutcome {
        warn!(
            reason = %reason,
            wait_secs = retry.wait().as_secs_f64(),
            "Read failed, attempting to reconnect"
        );
        ProcessOutcome {
            end: SessionEnd::Interrupted(reason),
            retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Connector, Frame, ScriptedConnector};
    use crate::output::OutputError;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    type Saved = Rc<RefCell<Vec<(String, f64)>>>;

    struct RecordingSink(Saved);

    impl FrameSink for RecordingSink {
        fn persist(
            &mut self,
            _frame: &Frame,
            timestamp: &str,
            score: f64,
        ) -> Result<PathBuf, OutputError> {
            self.0.borrow_mut().push((timestamp.to_string(), score));
            Ok(PathBuf::from(crate::output::file_name(timestamp, score)))
        }
    }

    struct FailingSink;

    impl FrameSink for FailingSink {
        fn persist(&mut self, _: &Frame, _: &str, _: f64) -> Result<PathBuf, OutputError> {
            Err(OutputError::Io {
                path: PathBuf::from("images/x.jpg"),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    /// Requests exit on the n-th poll; never when `None`.
    struct ExitAfter(Option<usize>);

    impl ExitSignal for ExitAfter {
        fn poll(&mut self, _timeout: Duration) -> bool {
            match self.0.as_mut() {
                Some(0) => true,
                Some(n) => {
                    *n -= 1;
                    *n == 0
                }
                None => false,
            }
        }
    }

    fn processor(config: DetectionConfig, exit_after: Option<usize>) -> (FrameProcessor, Saved) {
        let saved = Saved::default();
        let processor = FrameProcessor::new(
            config,
            RetryPolicy::default(),
            Box::new(RecordingSink(Rc::clone(&saved))),
            Box::new(ExitAfter(exit_after)),
        )
        .with_poll_interval(Duration::ZERO);
        (processor, saved)
    }

    fn black(seq: u64) -> Frame {
        Frame::solid(51, 1, [0, 0, 0], seq)
    }

    /// One white pixel out of 51 scores exactly 5.0 against a black baseline.
    fn spike(seq: u64) -> Frame {
        let mut raster = black(seq).image().clone();
        raster.put_pixel(0, 0, image::Rgb([255, 255, 255]));
        Frame::new(raster, seq)
    }

    fn run(processor: &mut FrameProcessor, frames: Vec<Frame>) -> ProcessOutcome {
        let mut connector = ScriptedConnector::new(51, 1).frames(frames);
        let mut session = connector.open("rtsp://cam").unwrap();
        processor.process(session.as_mut(), RetryState::initial(&RetryPolicy::default()))
    }

    #[test]
    fn test_first_frame_only_seeds_baseline() {
        let (mut processor, saved) = processor(DetectionConfig::default(), None);

        let outcome = run(&mut processor, vec![spike(1)]);

        assert!(matches!(outcome.end, SessionEnd::Interrupted(_)));
        assert!(saved.borrow().is_empty());
        assert_eq!(processor.stats().frames_read, 1);
        assert_eq!(processor.stats().frames_analysed, 0);
    }

    #[test]
    fn test_identical_frames_write_nothing() {
        let (mut processor, saved) = processor(DetectionConfig::default(), None);

        run(&mut processor, vec![black(1), black(2), black(3)]);

        assert!(saved.borrow().is_empty());
        assert_eq!(processor.stats().last_score, Some(0.0));
    }

    #[test]
    fn test_trigger_writes_frame_and_trailing_frames() {
        let config = DetectionConfig {
            pixel_threshold: 100,
            ..DetectionConfig::default()
        };
        let (mut processor, saved) = processor(config, None);

        let mut frames = vec![black(1), spike(2)];
        frames.extend((3..20).map(black));
        run(&mut processor, frames);

        let saved = saved.borrow();
        assert_eq!(saved.len(), 10);
        assert_eq!(saved[0].1, 5.0);
        assert!(crate::output::file_name(&saved[0].0, saved[0].1).ends_with(" (5.000000).jpg"));
        assert!(saved[1..].iter().all(|(_, score)| *score <= 0.1));
        assert_eq!(processor.stats().frames_saved, 10);
    }

    #[test]
    fn test_user_exit_stops_processing() {
        let (mut processor, _) = processor(DetectionConfig::default(), Some(1));

        let outcome = run(&mut processor, vec![black(1), black(2), black(3)]);

        assert_eq!(outcome.end, SessionEnd::UserExit);
        assert_eq!(processor.stats().frames_read, 2);
    }

    #[test]
    fn test_successful_read_resets_retry_state() {
        let policy = RetryPolicy::default();
        let depleted = RetryState::initial(&policy)
            .after_failure(&policy)
            .after_failure(&policy)
            .after_failure(&policy);
        let (mut processor, _) = processor(DetectionConfig::default(), None);

        let mut connector = ScriptedConnector::new(51, 1).frames(vec![black(1)]);
        let mut session = connector.open("rtsp://cam").unwrap();
        let outcome = processor.process(session.as_mut(), depleted);

        assert_eq!(outcome.retry, RetryState::initial(&policy));
    }

    #[test]
    fn test_failure_without_reads_keeps_retry_state() {
        let policy = RetryPolicy::default();
        let depleted = RetryState::initial(&policy).after_failure(&policy);
        let (mut processor, _) = processor(DetectionConfig::default(), None);

        let mut connector = ScriptedConnector::new(51, 1).frames(Vec::new());
        let mut session = connector.open("rtsp://cam").unwrap();
        let outcome = processor.process(session.as_mut(), depleted);

        assert_eq!(outcome.retry, depleted);
        assert_eq!(
            outcome.end,
            SessionEnd::Interrupted("failed to grab frame".to_string())
        );
    }

    #[test]
    fn test_read_faults_map_to_session_end() {
        let (mut processor, _) = processor(DetectionConfig::default(), None);
        let mut connector = ScriptedConnector::new(51, 1)
            .session(vec![ReadOutcome::TransientFault("decode".to_string())])
            .session(vec![ReadOutcome::FatalFault("boom".to_string())])
            .session(vec![ReadOutcome::Frame(Frame::solid(0, 0, [0, 0, 0], 1))]);
        let retry = RetryState::initial(&RetryPolicy::default());

        let mut session = connector.open("rtsp://cam").unwrap();
        assert_eq!(
            processor.process(session.as_mut(), retry).end,
            SessionEnd::Interrupted("decode".to_string())
        );

        let mut session = connector.open("rtsp://cam").unwrap();
        assert_eq!(
            processor.process(session.as_mut(), retry).end,
            SessionEnd::Fault("boom".to_string())
        );

        let mut session = connector.open("rtsp://cam").unwrap();
        assert_eq!(
            processor.process(session.as_mut(), retry).end,
            SessionEnd::Interrupted("grabbed frame was empty".to_string())
        );
        assert_eq!(processor.stats().frames_read, 0);
    }

    #[test]
    fn test_each_session_starts_with_fresh_baseline() {
        let (mut processor, saved) = processor(DetectionConfig::default(), None);

        run(&mut processor, vec![black(1), black(2)]);
        // A bright first frame in a new session seeds instead of triggering
        run(&mut processor, vec![Frame::solid(51, 1, [255, 255, 255], 1)]);

        assert!(saved.borrow().is_empty());
    }

    #[test]
    fn test_sink_failure_does_not_end_session() {
        let mut processor = FrameProcessor::new(
            DetectionConfig::default(),
            RetryPolicy::default(),
            Box::new(FailingSink),
            Box::new(ExitAfter(None)),
        )
        .with_poll_interval(Duration::ZERO);

        let outcome = run(&mut processor, vec![black(1), spike(2), black(3)]);

        assert!(matches!(outcome.end, SessionEnd::Interrupted(_)));
        assert_eq!(processor.stats().frames_read, 3);
        assert_eq!(processor.stats().frames_saved, 0);
        assert_eq!(processor.stats().save_failures, 2);
    }
}
