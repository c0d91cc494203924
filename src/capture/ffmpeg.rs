//! FFmpeg subprocess backend.
//!
//! Stream metadata comes from `ffprobe`; frames are decoded by an
//! `ffmpeg` child writing packed RGB24 rasters to its stdout.

use super::{CameraError, Connector, Frame, ReadOutcome, SessionInfo, StreamSession};
use serde::Deserialize;
use std::io::{self, ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

const BACKEND_NAME: &str = "FFMPEG";

/// Time allowed for the probe and for each decoded frame.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: String,
}

/// Parses an ffprobe rational such as `30000/1001`.
fn parse_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(n), Ok(d)) if d != 0.0 => n / d,
            _ => 0.0,
        },
        None => rate.parse().unwrap_or(0.0),
    }
}

/// Collects a child's output, killing it if it is still running after `timeout`.
fn wait_with_deadline(mut child: Child, timeout: Duration) -> Result<Output, String> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("ffprobe-output".to_string())
        .spawn(move || {
            let mut out = Vec::new();
            let mut err = Vec::new();
            if let Some(pipe) = stdout.as_mut() {
                let _ = pipe.read_to_end(&mut out);
            }
            if let Some(pipe) = stderr.as_mut() {
                let _ = pipe.read_to_end(&mut err);
            }
            let _ = tx.send((out, err));
        })
        .map_err(|e| format!("cannot start output reader: {}", e))?;

    match rx.recv_timeout(timeout) {
        Ok((stdout, stderr)) => {
            let status = child.wait().map_err(|e| e.to_string())?;
            Ok(Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(format!("no response within {:?}", timeout))
        }
    }
}

/// Reads fixed-size rasters off the decoder pipe on a dedicated thread.
///
/// The channel holds one frame so the decoder is never far ahead of the
/// processor. The thread ends after the first read error or once the
/// receiver is dropped.
fn spawn_reader(
    mut stdout: ChildStdout,
    frame_bytes: usize,
) -> io::Result<Receiver<io::Result<Vec<u8>>>> {
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("ffmpeg-reader".to_string())
        .spawn(move || loop {
            let mut pixels = vec![0u8; frame_bytes];
            let result = stdout.read_exact(&mut pixels).map(|()| pixels);
            let failed = result.is_err();
            if tx.send(result).is_err() || failed {
                break;
            }
        })?;
    Ok(rx)
}

/// Opens sessions by spawning `ffprobe` and `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegConnector {
    ffmpeg: String,
    ffprobe: String,
    timeout: Duration,
}

impl Default for FfmpegConnector {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }
}

impl FfmpegConnector {
    /// Uses `ffmpeg` and `ffprobe` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses explicit executable paths instead of looking them up on `PATH`.
    pub fn with_executables(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            ..Self::default()
        }
    }

    /// Sets how long the probe, and each frame read, may take.
    ///
    /// A source that stays silent longer than this is treated as lost.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the stall timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn probe(&self, url: &str) -> Result<SessionInfo, CameraError> {
        let open_failed = |reason: String| CameraError::OpenFailed {
            url: url.to_string(),
            reason,
        };

        let child = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate",
                "-of",
                "json",
            ])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| open_failed(format!("cannot run {}: {}", self.ffprobe, e)))?;

        let output = wait_with_deadline(child, self.timeout)
            .map_err(|reason| open_failed(format!("{}: {}", self.ffprobe, reason)))?;

        if !output.status.success() {
            return Err(open_failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| open_failed(format!("unreadable probe output: {}", e)))?;

        let stream = probe
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| CameraError::NoVideo(url.to_string()))?;

        match (stream.width, stream.height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => Ok(SessionInfo {
                url: url.to_string(),
                backend: BACKEND_NAME.to_string(),
                width,
                height,
                fps: parse_rate(&stream.r_frame_rate),
            }),
            _ => Err(CameraError::NoVideo(url.to_string())),
        }
    }
}

impl Connector for FfmpegConnector {
    fn open(&mut self, url: &str) -> Result<Box<dyn StreamSession>, CameraError> {
        let info = self.probe(url)?;

        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(url)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CameraError::OpenFailed {
                url: url.to_string(),
                reason: format!("cannot run {}: {}", self.ffmpeg, e),
            })?;

        let frame_bytes = (info.width as usize) * (info.height as usize) * 3;
        let frames = match child.stdout.take() {
            Some(stdout) => spawn_reader(stdout, frame_bytes).map_err(|e| e.to_string()),
            None => Err("decoder stdout unavailable".to_string()),
        };
        let frames = match frames {
            Ok(frames) => frames,
            Err(reason) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CameraError::OpenFailed {
                    url: url.to_string(),
                    reason,
                });
            }
        };

        Ok(Box::new(FfmpegSession {
            info,
            child: Some(child),
            frames: Some(frames),
            timeout: self.timeout,
            sequence: 0,
        }))
    }
}

struct FfmpegSession {
    info: SessionInfo,
    child: Option<Child>,
    frames: Option<Receiver<io::Result<Vec<u8>>>>,
    timeout: Duration,
    sequence: u64,
}

impl StreamSession for FfmpegSession {
    fn info(&self) -> &SessionInfo {
        &self.info
    }

    fn read(&mut self) -> ReadOutcome {
        let Some(frames) = self.frames.as_ref() else {
            return ReadOutcome::FatalFault("session released".to_string());
        };

        let pixels = match frames.recv_timeout(self.timeout) {
            Ok(Ok(pixels)) => pixels,
            Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => return ReadOutcome::EndOfStream,
            Ok(Err(e)) => return ReadOutcome::TransientFault(format!("decoder read failed: {}", e)),
            Err(RecvTimeoutError::Disconnected) => return ReadOutcome::EndOfStream,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    url = %self.info.url,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Stream stalled, stopping decoder"
                );
                self.release();
                return ReadOutcome::TransientFault(format!(
                    "no frame within {:?}",
                    self.timeout
                ));
            }
        };

        self.sequence += 1;
        match Frame::from_rgb(pixels, self.info.width, self.info.height, self.sequence) {
            Some(frame) if !frame.is_empty() => ReadOutcome::Frame(frame),
            _ => ReadOutcome::TransientFault("grabbed frame was empty".to_string()),
        }
    }

    fn release(&mut self) {
        self.frames = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(url = %self.info.url, "Decoder process released");
        }
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        self.release();
    }
}
