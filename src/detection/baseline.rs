//! Exponential moving average of past greyscale frames.
//!
//! The baseline represents the "empty" scene. Each new frame is blended
//! in as `baseline = alpha * baseline + (1 - alpha) * frame`, so slow
//! lighting drift is absorbed while sudden changes stand out.

use image::GrayImage;

/// What a call to [`Baseline::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineUpdate {
    /// The baseline was empty and now holds the frame as-is.
    Seeded,
    /// The frame was blended into the existing baseline.
    Blended,
    /// The frame size changed, so the baseline restarted from it.
    Reseeded,
}

/// Running greyscale baseline for one capture session.
#[derive(Debug, Clone)]
pub struct Baseline {
    image: Option<GrayImage>,
    /// Weight of the existing baseline when mixing (0..=1).
    alpha: f64,
}

impl Baseline {
    /// Creates an empty baseline with the given blend weight.
    pub fn new(alpha: f64) -> Self {
        Self {
            image: None,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    /// Returns true before the first frame has been seen.
    pub fn is_empty(&self) -> bool {
        self.image.is_none()
    }

    /// Returns the current baseline raster.
    pub fn image(&self) -> Option<&GrayImage> {
        self.image.as_ref()
    }

    /// Returns the blend weight.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Folds a greyscale frame into the baseline.
    ///
    /// Blended values are rounded half-to-even and saturated to `u8`.
    pub fn update(&mut self, grey: &GrayImage) -> BaselineUpdate {
        let Some(current) = self.image.as_mut() else {
            self.image = Some(grey.clone());
            return BaselineUpdate::Seeded;
        };

        if current.dimensions() != grey.dimensions() {
            *current = grey.clone();
            return BaselineUpdate::Reseeded;
        }

        let alpha = self.alpha;
        let beta = 1.0 - alpha;
        for (b, g) in current.iter_mut().zip(grey.iter()) {
            let mixed = alpha * f64::from(*b) + beta * f64::from(*g);
            *b = mixed.round_ties_even().clamp(0.0, 255.0) as u8;
        }

        BaselineUpdate::Blended
    }

    /// Drops the baseline so the next frame seeds it again.
    pub fn reset(&mut self) {
        self.image = None;
    }
}
