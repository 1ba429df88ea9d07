//! Capture quality scoring for enrollment.
//!
//! Averages three cheap checks — resolution, brightness, contrast — into a
//! [0, 1] score. Enrollment rejects captures below [`MIN_ENROLL_QUALITY`];
//! a blurry or underexposed reference would degrade every later verification.

use crate::normalize::NormalizedImage;

/// Minimum quality score accepted at enrollment.
pub const MIN_ENROLL_QUALITY: f32 = 0.5;

/// Pixel area at which the size score saturates.
const FULL_SIZE_AREA: f32 = 300.0 * 300.0;

/// Luma standard deviation at which the contrast score saturates.
const FULL_CONTRAST_STDDEV: f32 = 50.0;

/// Score a capture in [0, 1]; higher is better.
pub fn quality_score(image: &NormalizedImage) -> f32 {
    let w = image.width as usize;
    let h = image.height as usize;

    let size_score = (1.0f32).min((w * h) as f32 / FULL_SIZE_AREA);

    // Mean and stddev of luma in one pass.
    let n = (w * h) as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h {
        for x in 0..w {
            let l = image.luma_at(x, y) as f64;
            sum += l;
            sum_sq += l * l;
        }
    }
    let mean = (sum / n) as f32;
    let stddev = (sum_sq / n - (sum / n).powi(2)).max(0.0).sqrt() as f32;

    let brightness_score = 1.0 - (mean - 128.0).abs() / 128.0;
    let contrast_score = (1.0f32).min(stddev / FULL_CONTRAST_STDDEV);

    (size_score + brightness_score + contrast_score) / 3.0
}
