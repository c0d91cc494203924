//! Motion Recorder Library
//!
//! Watches a single network camera stream, compares each frame against
//! a running baseline image, and writes frames to disk when the scene
//! changes significantly.
//!
//! # Architecture
//!
//! The system is one synchronous control loop:
//!
//! ```text
//! connection (open / backoff) → detection (baseline, score, policy) → output
//!       ↑                               |
//!       └──── reconnect / exit ─────────┘
//! ```
//!
//! # Design Principles
//!
//! - **Single thread of control**: frames are read, analysed and saved in order
//! - **Failures are values**: read failures come back as [`ReadOutcome`]s
//!   and end the session; the connection layer decides whether to retry
//! - **Fresh state per session**: a reconnect never reuses an old baseline
//!
//! # Example
//!
//! ```no_run
//! use motion_recorder::{
//!     capture::{Frame, ScriptedConnector},
//!     connection::{ConnectionManager, RetryPolicy},
//!     control::CancellationToken,
//!     detection::{DetectionConfig, FrameProcessor},
//!     output::JpegDirectorySink,
//! };
//!
//! let frames = (1..=20).map(|i| Frame::solid(64, 48, [0, 0, 0], i)).collect();
//! let connector = ScriptedConnector::new(64, 48).frames(frames);
//!
//! let policy = RetryPolicy::immediate(3);
//! let processor = FrameProcessor::new(
//!     DetectionConfig::default(),
//!     policy.clone(),
//!     Box::new(JpegDirectorySink::new("images", 95)),
//!     Box::new(CancellationToken::new()),
//! );
//!
//! let mut manager = ConnectionManager::new("rtsp://camera/stream", connector, processor, policy);
//! let outcome = manager.run();
//! println!("{:?}", outcome);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod config;
pub mod connection;
pub mod control;
pub mod detection;
pub mod metrics;
pub mod output;

// Re-export commonly used types at crate root
pub use capture::{Connector, FfmpegConnector, Frame, ReadOutcome, SessionInfo, StreamSession};
pub use config::{FileConfig, RecorderConfig};
pub use connection::{ConnectionManager, RetryPolicy, RetryState, RunOutcome};
pub use control::{CancellationToken, ExitSignal};
pub use detection::{DetectionConfig, FrameProcessor, SessionEnd};
pub use output::{FrameSink, JpegDirectorySink};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
