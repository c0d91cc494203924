//! Frame type representing a captured colour image with metadata.

use chrono::{DateTime, Local};
use image::{GrayImage, Rgb, RgbImage};

/// A single captured frame from the stream.
///
/// Holds the original colour raster, which is what gets persisted,
/// along with the metadata needed for naming and logging.
#[derive(Clone)]
pub struct Frame {
    /// Colour pixel data in RGB order.
    image: RgbImage,
    /// Wall-clock capture time.
    captured_at: DateTime<Local>,
    /// Monotonic sequence number within a session.
    sequence: u64,
}

impl Frame {
    /// Creates a new frame stamped with the current local time.
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            captured_at: Local::now(),
            sequence,
        }
    }

    /// Builds a frame from a packed RGB24 buffer.
    ///
    /// Returns `None` if the buffer length does not match the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Option<Self> {
        RgbImage::from_raw(width, height, pixels).map(|image| Self::new(image, sequence))
    }

    /// Builds a frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> Self {
        Self::new(RgbImage::from_pixel(width, height, image::Rgb(rgb)), sequence)
    }

    /// Returns the colour raster.
    #[inline]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Returns the capture time.
    #[inline]
    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns true if the frame carries no pixels.
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Converts the frame to a single-channel luma raster.
    ///
    /// Uses BT.601 weights (0.299 R + 0.587 G + 0.114 B), rounded to nearest.
    pub fn to_grey(&self) -> GrayImage {
        let (width, height) = self.image.dimensions();
        let luma = self
            .image
            .pixels()
            .map(|&Rgb([r, g, b])| {
                let weighted = 299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b);
                ((weighted + 500) / 1000) as u8
            })
            .collect();
        GrayImage::from_raw(width, height, luma)
            .unwrap_or_else(|| GrayImage::new(width, height))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("sequence", &self.sequence)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}
