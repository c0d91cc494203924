//! Prometheus metrics for the recorder.
//!
//! # Metrics Exposed
//!
//! ## Frame Metrics
//! - `motion_recorder_frames_total` - Frames read from the camera
//! - `motion_recorder_frames_saved_total` - Frames written to disk
//! - `motion_recorder_save_failures_total` - Frames that could not be written
//! - `motion_recorder_difference_score` - Score of the most recent frame
//!
//! ## Connection Metrics
//! - `motion_recorder_open_attempts_total` - Attempts to open the stream
//! - `motion_recorder_reconnects_total` - Sessions lost after opening
//! - `motion_recorder_retries_left` - Remaining retry budget
//! - `motion_recorder_backoff_seconds` - Wait before the next attempt
//!
//! The HTTP exporter is only built with the `metrics` feature.

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
