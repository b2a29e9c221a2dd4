//! Decibel and frequency-mapping helpers shared by the analyzer and the
//! response evaluator.

/// Lowest frequency shown on the analyzer and response plots (Hz)
pub const MIN_FREQUENCY: f32 = 20.0;

/// Highest frequency shown on the analyzer and response plots (Hz)
pub const MAX_FREQUENCY: f32 = 20000.0;

/// Convert linear gain to decibels, flooring at `minus_infinity_db`.
///
/// Zero, negative and tiny gains all map to the floor, so the result is
/// always finite.
#[inline]
pub fn gain_to_decibels(gain: f32, minus_infinity_db: f32) -> f32 {
    if gain > 0.0 {
        (20.0 * gain.log10()).max(minus_infinity_db)
    } else {
        minus_infinity_db
    }
}

/// Map a proportion in 0..=1 onto a logarithmic range `[min, max]`.
#[inline]
pub fn map_to_log10(proportion: f32, min: f32, max: f32) -> f32 {
    let log_min = min.log10();
    let log_max = max.log10();
    10.0_f32.powf(log_min + proportion.clamp(0.0, 1.0) * (log_max - log_min))
}
