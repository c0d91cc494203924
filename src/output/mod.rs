//! Persistence of frames that triggered or followed a detection.
//!
//! Frames are written as JPEG files named after their capture time and
//! difference score, e.g. `images/2024-05-01 13:45:12.345 (5.000000).jpg`.

mod sink;

pub use sink::{file_name, timestamp, FrameSink, JpegDirectorySink, OutputError};
