//! Frame sinks and file naming.

use crate::capture::Frame;
use chrono::{DateTime, TimeZone};
use image::codecs::jpeg::JpegEncoder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while persisting a frame.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Formats a capture time as `YYYY-MM-DD HH:MM:SS.mmm`.
pub fn timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Builds the file name for a persisted frame.
pub fn file_name(timestamp: &str, score: f64) -> String {
    format!("{} ({:.6}).jpg", timestamp, score)
}

/// Destination for frames selected by the detection policy.
pub trait FrameSink {
    /// Persists the colour frame and returns where it went.
    fn persist(&mut self, frame: &Frame, timestamp: &str, score: f64)
        -> Result<PathBuf, OutputError>;
}

/// Writes frames as JPEG files into an existing directory.
///
/// The directory is never created; a missing directory surfaces as
/// [`OutputError::Io`] on every write.
#[derive(Debug, Clone)]
pub struct JpegDirectorySink {
    dir: PathBuf,
    quality: u8,
}

impl JpegDirectorySink {
    pub fn new(dir: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            dir: dir.into(),
            quality: quality.clamp(1, 100),
        }
    }

    /// Returns the output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Encodes `frame` into `out`, surfacing errors from the final flush.
fn write_jpeg<W: Write>(
    out: W,
    frame: &Frame,
    quality: u8,
    path: &Path,
) -> Result<(), OutputError> {
    let mut writer = BufWriter::new(out);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode_image(frame.image())
        .map_err(|source| OutputError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    writer.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl FrameSink for JpegDirectorySink {
    fn persist(
        &mut self,
        frame: &Frame,
        timestamp: &str,
        score: f64,
    ) -> Result<PathBuf, OutputError> {
        let path = self.dir.join(file_name(timestamp, score));

        let file = File::create(&path).map_err(|source| OutputError::Io {
            path: path.clone(),
            source,
        })?;

        write_jpeg(file, frame, self.quality, &path)?;

        Ok(path)
    }
}
