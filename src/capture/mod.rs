//! Video source input and frame handling.
//!
//! This module provides abstractions for opening a capture session
//! against a camera URL and reading colour frames from it. Decoding is
//! delegated to an external backend (an `ffmpeg` subprocess by default,
//! or OpenCV when the `opencv` feature is enabled).

mod camera;
mod ffmpeg;
mod frame;
#[cfg(feature = "opencv")]
mod opencv_capture;

pub use camera::{
    CameraError, Connector, ReadOutcome, ScriptedConnector, ScriptedOpen, SessionInfo,
    StreamSession,
};
pub use ffmpeg::{FfmpegConnector, DEFAULT_STREAM_TIMEOUT};
pub use frame::Frame;
#[cfg(feature = "opencv")]
pub use opencv_capture::{HighGuiWindow, OpenCvConnector};
