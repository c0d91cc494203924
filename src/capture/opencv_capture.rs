//! OpenCV backend using `VideoCapture` with the FFMPEG API preference.
//!
//! Also provides a highgui preview window that doubles as an exit
//! signal: any key press in the window requests a clean exit.

use super::ffmpeg::DEFAULT_STREAM_TIMEOUT;
use super::{CameraError, Connector, Frame, ReadOutcome, SessionInfo, StreamSession};
use crate::control::{CancellationToken, ExitSignal, Preview};
use opencv::{
    core::{self, Mat},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::time::Duration;

/// Opens sessions through OpenCV's video I/O module.
#[derive(Debug)]
pub struct OpenCvConnector {
    timeout: Duration,
}

impl Default for OpenCvConnector {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }
}

impl OpenCvConnector {
    /// Creates a connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the open and read timeouts handed to the FFMPEG backend.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Connector for OpenCvConnector {
    fn open(&mut self, url: &str) -> Result<Box<dyn StreamSession>, CameraError> {
        let open_failed = |reason: String| CameraError::OpenFailed {
            url: url.to_string(),
            reason,
        };

        let millis = i32::try_from(self.timeout.as_millis()).unwrap_or(i32::MAX);
        let params = core::Vector::<i32>::from_slice(&[
            videoio::CAP_PROP_OPEN_TIMEOUT_MSEC,
            millis,
            videoio::CAP_PROP_READ_TIMEOUT_MSEC,
            millis,
        ]);
        let capture = VideoCapture::from_file_with_params(url, videoio::CAP_FFMPEG, &params)
            .map_err(|e| open_failed(e.to_string()))?;

        if !capture.is_opened().map_err(|e| open_failed(e.to_string()))? {
            return Err(open_failed("capture did not open".to_string()));
        }

        let backend = capture
            .get_backend_name()
            .unwrap_or_else(|_| "UNKNOWN".to_string());
        let prop = |id: i32| capture.get(id).unwrap_or(0.0);

        let info = SessionInfo {
            url: url.to_string(),
            backend,
            width: prop(videoio::CAP_PROP_FRAME_WIDTH).max(0.0) as u32,
            height: prop(videoio::CAP_PROP_FRAME_HEIGHT).max(0.0) as u32,
            fps: prop(videoio::CAP_PROP_FPS),
        };

        Ok(Box::new(OpenCvSession {
            info,
            capture: Some(capture),
            sequence: 0,
        }))
    }
}

struct OpenCvSession {
    info: SessionInfo,
    capture: Option<VideoCapture>,
    sequence: u64,
}

impl OpenCvSession {
    fn grab_and_retrieve(capture: &mut VideoCapture) -> opencv::Result<Result<Mat, ReadOutcome>> {
        if !capture.grab()? {
            return Ok(Err(ReadOutcome::EndOfStream));
        }

        let mut bgr = Mat::default();
        if !capture.retrieve(&mut bgr, 0)? {
            return Ok(Err(ReadOutcome::TransientFault(
                "failed to retrieve grabbed frame".to_string(),
            )));
        }

        if bgr.empty() {
            return Ok(Err(ReadOutcome::TransientFault(
                "grabbed frame was empty".to_string(),
            )));
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB)?;
        Ok(Ok(rgb))
    }
}

impl StreamSession for OpenCvSession {
    fn info(&self) -> &SessionInfo {
        &self.info
    }

    fn read(&mut self) -> ReadOutcome {
        let Some(capture) = self.capture.as_mut() else {
            return ReadOutcome::FatalFault("session released".to_string());
        };

        let rgb = match Self::grab_and_retrieve(capture) {
            Ok(Ok(rgb)) => rgb,
            Ok(Err(outcome)) => return outcome,
            Err(e) => return ReadOutcome::FatalFault(e.to_string()),
        };

        let pixels = match rgb.data_bytes() {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => return ReadOutcome::FatalFault(e.to_string()),
        };

        self.sequence += 1;
        match Frame::from_rgb(pixels, rgb.cols() as u32, rgb.rows() as u32, self.sequence) {
            Some(frame) => ReadOutcome::Frame(frame),
            None => ReadOutcome::TransientFault("decoded frame has unexpected size".to_string()),
        }
    }

    fn release(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                tracing::warn!(error = %e, "Failed to release capture");
            }
        }
    }
}

impl Drop for OpenCvSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// On-screen preview window backed by highgui.
pub struct HighGuiWindow {
    name: String,
    token: CancellationToken,
}

impl HighGuiWindow {
    /// Creates a window handle; the window appears on the first frame.
    pub fn new(name: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            name: name.into(),
            token,
        }
    }

    fn to_bgr(frame: &Frame) -> opencv::Result<Mat> {
        let mut rgb = Mat::new_rows_cols_with_default(
            frame.height() as i32,
            frame.width() as i32,
            core::CV_8UC3,
            core::Scalar::all(0.0),
        )?;
        rgb.data_bytes_mut()?.copy_from_slice(frame.image().as_raw());

        let mut bgr = Mat::default();
        imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)?;
        Ok(bgr)
    }
}

impl Preview for HighGuiWindow {
    fn show(&mut self, frame: &Frame) {
        let shown = Self::to_bgr(frame).and_then(|bgr| highgui::imshow(&self.name, &bgr));
        if let Err(e) = shown {
            tracing::warn!(error = %e, "Preview failed");
        }
    }

    fn close(&mut self) {
        if let Err(e) = highgui::destroy_all_windows() {
            tracing::warn!(error = %e, "Failed to close preview windows");
        }
    }
}

impl ExitSignal for HighGuiWindow {
    fn poll(&mut self, timeout: Duration) -> bool {
        let delay = timeout.as_millis().clamp(1, i32::MAX as u128) as i32;
        let pressed = highgui::wait_key(delay).map(|key| key >= 0).unwrap_or(false);
        if pressed {
            self.token.cancel();
        }
        self.token.is_cancelled()
    }
}
