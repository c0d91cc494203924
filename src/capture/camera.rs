//! Stream session abstraction for frame capture.
//!
//! A [`Connector`] opens sessions against a source URL; a
//! [`StreamSession`] hands out frames until it fails. This allows
//! swapping between real decoding backends and scripted sources for
//! testing.

use super::Frame;
use std::collections::VecDeque;
use thiserror::Error;

/// Errors that can occur while establishing a session.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to open stream {url}: {reason}")]
    OpenFailed { url: String, reason: String },
    #[error("stream {0} has no video track")]
    NoVideo(String),
    #[error("backend {0} is not available in this build")]
    BackendUnavailable(String),
}

/// Result of a single frame read.
///
/// Read failures are values, not errors: the caller decides whether
/// to reconnect.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A decoded, non-empty frame.
    Frame(Frame),
    /// The source stopped delivering frames.
    EndOfStream,
    /// Retrieval or decoding failed, or the frame was empty.
    TransientFault(String),
    /// The backend raised an unexpected error.
    FatalFault(String),
}

/// Metadata reported by an open session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Source URL the session was opened against.
    pub url: String,
    /// Name of the decoding backend.
    pub backend: String,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Nominal frame rate.
    pub fps: f64,
}

/// An open connection to a video source.
pub trait StreamSession {
    /// Returns connection metadata.
    fn info(&self) -> &SessionInfo;

    /// Blocks until the next frame is available or the session fails.
    fn read(&mut self) -> ReadOutcome;

    /// Releases the underlying OS resources. Further reads fail.
    fn release(&mut self);
}

/// Opens sessions against a source URL.
pub trait Connector {
    /// Attempts to open a capture session.
    fn open(&mut self, url: &str) -> Result<Box<dyn StreamSession>, CameraError>;
}

/// One scripted open attempt.
#[derive(Debug)]
pub enum ScriptedOpen {
    /// The open attempt fails.
    Fail,
    /// The open attempt succeeds and the session yields these outcomes
    /// in order, then `EndOfStream`.
    Session(Vec<ReadOutcome>),
}

/// Deterministic source that replays a programmed sequence of sessions.
///
/// Once the script is exhausted every further open attempt fails.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    script: VecDeque<ScriptedOpen>,
    width: u32,
    height: u32,
    opens: usize,
}

impl ScriptedConnector {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            script: VecDeque::new(),
            width,
            height,
            opens: 0,
        }
    }

    /// Appends a failing open attempt.
    pub fn fail_open(mut self) -> Self {
        self.script.push_back(ScriptedOpen::Fail);
        self
    }

    /// Appends a session that yields the given read outcomes.
    pub fn session(mut self, reads: Vec<ReadOutcome>) -> Self {
        self.script.push_back(ScriptedOpen::Session(reads));
        self
    }

    /// Appends a session that yields the given frames.
    pub fn frames(self, frames: Vec<Frame>) -> Self {
        self.session(frames.into_iter().map(ReadOutcome::Frame).collect())
    }

    /// Number of open attempts made so far.
    pub fn open_attempts(&self) -> usize {
        self.opens
    }
}

impl Connector for ScriptedConnector {
    fn open(&mut self, url: &str) -> Result<Box<dyn StreamSession>, CameraError> {
        self.opens += 1;

        match self.script.pop_front() {
            Some(ScriptedOpen::Session(reads)) => Ok(Box::new(ScriptedSession {
                info: SessionInfo {
                    url: url.to_string(),
                    backend: "SCRIPTED".to_string(),
                    width: self.width,
                    height: self.height,
                    fps: 25.0,
                },
                reads: reads.into(),
                released: false,
            })),
            Some(ScriptedOpen::Fail) | None => Err(CameraError::OpenFailed {
                url: url.to_string(),
                reason: "scripted failure".to_string(),
            }),
        }
    }
}

struct ScriptedSession {
    info: SessionInfo,
    reads: VecDeque<ReadOutcome>,
    released: bool,
}

impl StreamSession for ScriptedSession {
    fn info(&self) -> &SessionInfo {
        &self.info
    }

    fn read(&mut self) -> ReadOutcome {
        if self.released {
            return ReadOutcome::FatalFault("session released".to_string());
        }
        self.reads.pop_front().unwrap_or(ReadOutcome::EndOfStream)
    }

    fn release(&mut self) {
        self.released = true;
    }
}
