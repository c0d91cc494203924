//! Motion detection on a live capture session.
//!
//! Each frame is converted to greyscale, compared against a running
//! baseline, and reduced to a single difference score. The save policy
//! then decides whether the colour frame is persisted.

mod baseline;
mod processor;
mod score;
mod trigger;

pub use baseline::{Baseline, BaselineUpdate};
pub use processor::{FrameProcessor, ProcessOutcome, ProcessorStats, SessionEnd};
pub use score::difference_score;
pub use trigger::SaveCountdown;

use serde::{Deserialize, Serialize};

/// Tuning of the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Weight of the existing baseline when blending in a frame (0..=1).
    pub baseline_alpha: f64,
    /// Per-pixel difference above which a pixel counts as changed.
    pub pixel_threshold: u8,
    /// Difference score above which a frame triggers saving.
    pub score_threshold: f64,
    /// Frames saved per trigger, including the triggering frame.
    pub trailing_frames: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            baseline_alpha: 0.5,
            pixel_threshold: 30,
            score_threshold: 0.1,
            trailing_frames: 10,
        }
    }
}
