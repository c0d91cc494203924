//! Difference score between a frame and the baseline.

use image::GrayImage;

/// Value assigned to pixels whose difference exceeds the threshold.
const MASK_ON: f64 = 255.0;

/// Computes the motion score of `grey` against `baseline`.
///
/// The per-pixel absolute difference is thresholded to a binary 0/255
/// mask (`diff > pixel_threshold` maps to 255) and the mean of that mask
/// is returned. The result is always within `0.0..=255.0`.
///
/// Both rasters must have the same dimensions; mismatched or empty
/// inputs score 0.
pub fn difference_score(grey: &GrayImage, baseline: &GrayImage, pixel_threshold: u8) -> f64 {
    if grey.dimensions() != baseline.dimensions() || grey.is_empty() {
        return 0.0;
    }

    let changed = grey
        .iter()
        .zip(baseline.iter())
        .filter(|&(&g, &b)| g.abs_diff(b) > pixel_threshold)
        .count();

    changed as f64 * MASK_ON / grey.len() as f64
}
