//! Confidence normalization.
//!
//! Model confidence arrives either as a fraction (0.72) or as a percentage
//! (72). Both are mapped onto one canonical integer scale so every surface
//! shows the same number.

/// Score shown when the model did not report a confidence.
pub const DEFAULT_CONFIDENCE: u8 = 65;

/// Map a raw confidence of unknown scale to an integer in `0..=100`.
///
/// - missing / NaN → 65
/// - ≤ 0 → 0
/// - (0, 1] → fraction, scaled by 100
/// - (1, 100] → already a percentage
/// - above 100 → clamped to 100
pub fn normalize(raw: Option<f64>) -> u8 {
    let Some(raw) = raw.filter(|r| !r.is_nan()) else {
        return DEFAULT_CONFIDENCE;
    };

    let score = if raw <= 0.0 {
        0.0
    } else if raw <= 1.0 {
        raw * 100.0
    } else {
        raw.min(100.0)
    };

    score.round().clamp(0.0, 100.0) as u8
}
