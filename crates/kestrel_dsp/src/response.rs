//! Frequency-response evaluation
//!
//! Computes the analytic magnitude response of a [`ChainSnapshot`]: the
//! product of every active stage's `|H(e^jω)|`, bypassed stages counting
//! as 1. Used by the polling side to draw the EQ curve; never touches the
//! live chain, only snapshots handed over through a FIFO.

use rustfft::num_complex::Complex64;

use crate::chain::{ChainSnapshot, NUM_STAGES};
use crate::eq::CoefficientSet;
use crate::units::{gain_to_decibels, map_to_log10, MAX_FREQUENCY, MIN_FREQUENCY};

/// Floor applied when converting response magnitudes to dB
pub const RESPONSE_FLOOR_DB: f32 = -100.0;

/// `|H(e^jω)|` of one section at `frequency`.
///
/// Evaluated in f64: steep cascades multiply small numbers together.
pub fn stage_magnitude(coefficients: &CoefficientSet, frequency: f32, sample_rate: f32) -> f64 {
    let omega = 2.0 * std::f64::consts::PI * frequency as f64 / sample_rate as f64;
    // z^-1 and z^-2 on the unit circle
    let z1 = Complex64::from_polar(1.0, -omega);
    let z2 = z1 * z1;

    let numerator = Complex64::new(coefficients.b0 as f64, 0.0)
        + z1 * coefficients.b1 as f64
        + z2 * coefficients.b2 as f64;
    let denominator = Complex64::new(1.0, 0.0) + z1 * coefficients.a1 as f64 + z2 * coefficients.a2 as f64;

    numerator.norm() / denominator.norm()
}

impl ChainSnapshot {
    /// Composite linear magnitude at `frequency`
    pub fn magnitude_at(&self, frequency: f32) -> f64 {
        self.stages
            .iter()
            .filter(|stage| stage.is_active())
            .map(|stage| stage_magnitude(stage.coefficients(), frequency, self.sample_rate))
            .product()
    }

    /// Composite response at `frequency` in dB (`20·log10(magnitude)`)
    pub fn evaluate_response(&self, frequency: f32) -> f32 {
        gain_to_decibels(self.magnitude_at(frequency) as f32, RESPONSE_FLOOR_DB)
    }

    /// Response of a subset of stages, for inspecting one section
    pub fn magnitude_of_stages(&self, stages: std::ops::Range<usize>, frequency: f32) -> f64 {
        debug_assert!(stages.end <= NUM_STAGES);
        self.stages[stages]
            .iter()
            .filter(|stage| stage.is_active())
            .map(|stage| stage_magnitude(stage.coefficients(), frequency, self.sample_rate))
            .product()
    }
}

/// Frequency of point `index` in a log sweep of `points` samples across
/// 20 Hz - 20 kHz. Endpoints are included.
pub fn sweep_frequency(index: usize, points: usize) -> f32 {
    if points < 2 {
        return MIN_FREQUENCY;
    }
    let proportion = index as f32 / (points - 1) as f32;
    map_to_log10(proportion, MIN_FREQUENCY, MAX_FREQUENCY)
}

/// Cached response curve over a fixed log-spaced frequency grid.
///
/// Holds the latest snapshot it was given; `update` recomputes every point.
#[derive(Debug, Clone)]
pub struct ResponseCurve {
    snapshot: ChainSnapshot,
    frequencies: Vec<f32>,
    magnitudes_db: Vec<f32>,
}

impl ResponseCurve {
    /// Curve over `points` frequencies for a fully bypassed chain (flat 0 dB)
    pub fn new(points: usize, sample_rate: f32) -> Self {
        let frequencies: Vec<f32> = (0..points).map(|i| sweep_frequency(i, points)).collect();
        let mut curve = Self {
            snapshot: ChainSnapshot::bypassed(sample_rate),
            magnitudes_db: vec![0.0; frequencies.len()],
            frequencies,
        };
        curve.recompute();
        curve
    }

    /// Replace the snapshot and recompute. Returns whether anything changed.
    pub fn update(&mut self, snapshot: &ChainSnapshot) -> bool {
        if *snapshot == self.snapshot {
            return false;
        }
        self.snapshot = *snapshot;
        self.recompute();
        true
    }

    fn recompute(&mut self) {
        let snapshot = &self.snapshot;
        for (db, &frequency) in self.magnitudes_db.iter_mut().zip(&self.frequencies) {
            *db = snapshot.evaluate_response(frequency);
        }
    }

    /// Response at an arbitrary frequency for the current snapshot
    pub fn evaluate_response(&self, frequency: f32) -> f32 {
        self.snapshot.evaluate_response(frequency)
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    pub fn magnitudes_db(&self) -> &[f32] {
        &self.magnitudes_db
    }

    pub fn snapshot(&self) -> &ChainSnapshot {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainPosition, FilterChain};
    use crate::eq::{ChainSettings, Slope};

    const SAMPLE_RATE: f32 = 48000.0;

    fn peak_only(freq: f32, gain_db: f32, quality: f32) -> ChainSettings {
        ChainSettings {
            peak_freq: freq,
            peak_gain_db: gain_db,
            peak_quality: quality,
            low_cut_bypassed: true,
            high_cut_bypassed: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_all_bypassed_is_unity() {
        let snapshot = ChainSnapshot::bypassed(SAMPLE_RATE);
        for &f in &[20.0, 100.0, 1000.0, 10000.0, 20000.0] {
            assert_eq!(snapshot.evaluate_response(f), 0.0);
        }

        let settings = ChainSettings {
            low_cut_bypassed: true,
            peak_bypassed: true,
            high_cut_bypassed: true,
            peak_gain_db: 12.0,
            ..Default::default()
        };
        let chain = FilterChain::with_settings(&settings, SAMPLE_RATE).unwrap();
        assert_eq!(chain.snapshot().evaluate_response(1234.0), 0.0);
    }

    #[test]
    fn test_identity_stage_magnitude() {
        for &f in &[20.0, 1000.0, 23999.0] {
            let m = stage_magnitude(&CoefficientSet::IDENTITY, f, SAMPLE_RATE);
            assert!((m - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_peak_boost_scenario() {
        let chain = FilterChain::with_settings(&peak_only(1000.0, 6.0, 1.0), SAMPLE_RATE).unwrap();
        let snapshot = chain.snapshot();

        assert!((snapshot.evaluate_response(1000.0) - 6.0).abs() < 0.1);
        assert!(snapshot.evaluate_response(20.0).abs() < 0.1);
        assert!(snapshot.evaluate_response(20000.0).abs() < 0.1);
    }

    #[test]
    fn test_peak_cut_is_symmetric() {
        let boost = FilterChain::with_settings(&peak_only(2000.0, 9.0, 2.0), SAMPLE_RATE).unwrap();
        let cut = FilterChain::with_settings(&peak_only(2000.0, -9.0, 2.0), SAMPLE_RATE).unwrap();
        let at = |c: &FilterChain| c.snapshot().evaluate_response(2000.0);
        assert!((at(&boost) + at(&cut)).abs() < 0.05);
    }

    #[test]
    fn test_low_cut_24db_scenario() {
        let settings = ChainSettings {
            low_cut_freq: 500.0,
            low_cut_slope: Slope::Db24,
            peak_bypassed: true,
            high_cut_bypassed: true,
            ..Default::default()
        };
        let snapshot = FilterChain::with_settings(&settings, SAMPLE_RATE).unwrap().snapshot();

        let passband = snapshot.evaluate_response(10000.0);
        assert!(passband.abs() < 0.1);

        // Butterworth: -3 dB at cutoff
        assert!((snapshot.evaluate_response(500.0) + 3.01).abs() < 0.1);

        // One and two octaves down: ~24 dB/oct
        assert!((snapshot.evaluate_response(250.0) - passband + 24.1).abs() < 1.0);
        assert!((snapshot.evaluate_response(125.0) - passband + 48.2).abs() < 1.0);

        // Markedly attenuated well below cutoff
        assert!(snapshot.evaluate_response(50.0) < -60.0);
    }

    #[test]
    fn test_high_cut_slopes_steepen() {
        let mut previous = 0.0;
        for slope in Slope::ALL {
            let settings = ChainSettings {
                high_cut_freq: 2000.0,
                high_cut_slope: slope,
                low_cut_bypassed: true,
                peak_bypassed: true,
                ..Default::default()
            };
            let snapshot = FilterChain::with_settings(&settings, SAMPLE_RATE).unwrap().snapshot();
            let one_octave_up = snapshot.evaluate_response(4000.0);
            let expected = -(slope.db_per_octave() as f32);
            assert!(
                (one_octave_up - expected).abs() < 2.0,
                "{:?}: {} dB, expected about {}",
                slope,
                one_octave_up,
                expected
            );
            assert!(one_octave_up < previous);
            previous = one_octave_up;
        }
    }

    #[test]
    fn test_response_is_product_of_active_stages() {
        let settings = ChainSettings {
            low_cut_freq: 300.0,
            low_cut_slope: Slope::Db36,
            high_cut_freq: 6000.0,
            high_cut_slope: Slope::Db24,
            peak_freq: 1500.0,
            peak_gain_db: 4.5,
            ..Default::default()
        };
        let snapshot = FilterChain::with_settings(&settings, SAMPLE_RATE).unwrap().snapshot();

        for &f in &[60.0, 300.0, 1500.0, 7000.0] {
            let expected: f64 = snapshot
                .stages
                .iter()
                .filter(|s| s.is_active())
                .map(|s| stage_magnitude(s.coefficients(), f, SAMPLE_RATE))
                .product();
            assert!((snapshot.magnitude_at(f) - expected).abs() < 1e-12);

            let sections = snapshot.magnitude_of_stages(ChainPosition::LowCut.stages(), f)
                * snapshot.magnitude_of_stages(ChainPosition::Peak.stages(), f)
                * snapshot.magnitude_of_stages(ChainPosition::HighCut.stages(), f);
            assert!((sections - expected).abs() < 1e-12);
        }

        // Only three of four low-cut stages count
        let active_low: f64 = (0..3)
            .map(|i| stage_magnitude(snapshot.stages[i].coefficients(), 100.0, SAMPLE_RATE))
            .product();
        let section = snapshot.magnitude_of_stages(ChainPosition::LowCut.stages(), 100.0);
        assert!((section - active_low).abs() < 1e-12);
    }

    #[test]
    fn test_sweep_frequencies() {
        assert_eq!(sweep_frequency(0, 1), 20.0);
        assert!((sweep_frequency(0, 600) - 20.0).abs() < 1e-3);
        assert!((sweep_frequency(599, 600) - 20000.0).abs() < 0.5);
        for i in 1..600 {
            assert!(sweep_frequency(i, 600) > sweep_frequency(i - 1, 600));
        }
    }

    #[test]
    fn test_curve_updates_on_change_only() {
        let mut curve = ResponseCurve::new(64, SAMPLE_RATE);
        assert_eq!(curve.frequencies().len(), 64);
        assert!(curve.magnitudes_db().iter().all(|&db| db == 0.0));

        let chain = FilterChain::with_settings(&peak_only(1000.0, 6.0, 1.0), SAMPLE_RATE).unwrap();
        assert!(curve.update(&chain.snapshot()));
        assert!(!curve.update(&chain.snapshot()));

        let max = curve
            .magnitudes_db()
            .iter()
            .fold(f32::MIN, |m, &db| m.max(db));
        assert!(max > 5.0 && max <= 6.05);
        assert!((curve.evaluate_response(1000.0) - 6.0).abs() < 0.1);
    }
}
