//! Filter settings and coefficient synthesis
//!
//! Turns a [`ChainSettings`] snapshot into second-order section
//! coefficients for the three sections of the chain:
//! - low-cut: 1-4 cascaded Butterworth high-pass sections
//! - peak: one RBJ (Robert Bristow-Johnson) Audio EQ Cookbook peaking filter
//! - high-cut: 1-4 cascaded Butterworth low-pass sections

use std::f32::consts::PI;

use biquad::{Coefficients, ToHertz, Type};

use crate::error::DspError;

/// Maximum number of second-order sections in a cut cascade
pub const MAX_CUT_STAGES: usize = 4;

/// Cut frequencies are held just under Nyquist so low sample rates still
/// produce valid sections.
pub const NYQUIST_GUARD: f32 = 0.499;

/// Cut-filter steepness: 12 dB/octave per cascaded second-order section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Slope {
    #[default]
    Db12,
    Db24,
    Db36,
    Db48,
}

impl Slope {
    pub const ALL: [Slope; 4] = [Slope::Db12, Slope::Db24, Slope::Db36, Slope::Db48];

    /// Choice index as exposed by the parameter layout (0-3)
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Number of active second-order sections (1-4)
    pub fn stages(self) -> usize {
        self.index() + 1
    }

    pub fn from_stages(stages: usize) -> Option<Self> {
        stages.checked_sub(1).and_then(Self::from_index)
    }

    /// Overall Butterworth order of the cascade
    pub fn order(self) -> usize {
        self.stages() * 2
    }

    pub fn db_per_octave(self) -> u32 {
        12 * self.stages() as u32
    }

    /// Label shown by the parameter layout
    pub fn label(self) -> &'static str {
        match self {
            Slope::Db12 => "12 db/Oct",
            Slope::Db24 => "24 db/Oct",
            Slope::Db36 => "36 db/Oct",
            Slope::Db48 => "48 db/Oct",
        }
    }
}

/// Immutable snapshot of every user parameter the chain depends on.
///
/// Values are expected to be in range (frequencies 20-20000 Hz, quality
/// 0.1-10, gain ±24 dB); clamping happens where the snapshot is produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSettings {
    pub low_cut_freq: f32,
    pub high_cut_freq: f32,
    pub peak_freq: f32,
    pub peak_gain_db: f32,
    pub peak_quality: f32,
    pub low_cut_slope: Slope,
    pub high_cut_slope: Slope,
    pub low_cut_bypassed: bool,
    pub peak_bypassed: bool,
    pub high_cut_bypassed: bool,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            low_cut_freq: 20.0,
            high_cut_freq: 20000.0,
            peak_freq: 750.0,
            peak_gain_db: 0.0,
            peak_quality: 1.0,
            low_cut_slope: Slope::Db12,
            high_cut_slope: Slope::Db12,
            low_cut_bypassed: false,
            peak_bypassed: false,
            high_cut_bypassed: false,
        }
    }
}

/// The five taps of one second-order section, normalised so a0 = 1.
///
/// `y[n] = b0·x[n] + b1·x[n-1] + b2·x[n-2] - a1·y[n-1] - a2·y[n-2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoefficientSet {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl CoefficientSet {
    /// Pass-through section
    pub const IDENTITY: CoefficientSet = CoefficientSet {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    pub fn is_finite(&self) -> bool {
        self.b0.is_finite()
            && self.b1.is_finite()
            && self.b2.is_finite()
            && self.a1.is_finite()
            && self.a2.is_finite()
    }
}

impl Default for CoefficientSet {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Coefficients<f32>> for CoefficientSet {
    fn from(c: Coefficients<f32>) -> Self {
        Self {
            b0: c.b0,
            b1: c.b1,
            b2: c.b2,
            a1: c.a1,
            a2: c.a2,
        }
    }
}

impl From<CoefficientSet> for Coefficients<f32> {
    fn from(c: CoefficientSet) -> Self {
        Coefficients {
            a1: c.a1,
            a2: c.a2,
            b0: c.b0,
            b1: c.b1,
            b2: c.b2,
        }
    }
}

/// Sections for one cut cascade; only the first `len` are meaningful.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutCoefficients {
    sections: [CoefficientSet; MAX_CUT_STAGES],
    len: usize,
}

impl CutCoefficients {
    pub fn as_slice(&self) -> &[CoefficientSet] {
        &self.sections[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Q of section `section` in an even-order Butterworth cascade.
///
/// Poles of an order-N Butterworth prototype sit at angles
/// `(2k + 1)·π / (2N)`; each conjugate pair becomes one section with
/// `Q = 1 / (2·cos(angle))`.
pub fn butterworth_q(order: usize, section: usize) -> f32 {
    let angle = (2 * section + 1) as f32 * PI / (2 * order) as f32;
    1.0 / (2.0 * angle.cos())
}

#[inline]
fn nyquist_limited(frequency: f32, sample_rate: f32) -> f32 {
    frequency.min(sample_rate * NYQUIST_GUARD)
}

fn check_sample_rate(sample_rate: f32) -> Result<(), DspError> {
    if sample_rate > 0.0 && sample_rate.is_finite() {
        Ok(())
    } else {
        Err(DspError::InvalidSampleRate(sample_rate))
    }
}

fn design(
    filter: Type<f32>,
    frequency: f32,
    q: f32,
    sample_rate: f32,
) -> Result<CoefficientSet, DspError> {
    let f0 = nyquist_limited(frequency, sample_rate);
    let coeffs = Coefficients::<f32>::from_params(filter, sample_rate.hz(), f0.hz(), q)
        .map_err(|_| DspError::InvalidCoefficients {
            frequency,
            sample_rate,
        })?;

    let set = CoefficientSet::from(coeffs);
    if set.is_finite() {
        Ok(set)
    } else {
        Err(DspError::InvalidCoefficients {
            frequency,
            sample_rate,
        })
    }
}

/// Peaking (bell) section at `peak_freq` with `peak_quality`.
///
/// The gain is handed to `biquad` in dB; it derives the cookbook's
/// `A = sqrt(10^(dB/20))` internally.
pub fn make_peak_filter(
    settings: &ChainSettings,
    sample_rate: f32,
) -> Result<CoefficientSet, DspError> {
    check_sample_rate(sample_rate)?;
    design(
        Type::PeakingEQ(settings.peak_gain_db),
        settings.peak_freq,
        settings.peak_quality,
        sample_rate,
    )
}

#[derive(Debug, Clone, Copy)]
enum CutKind {
    HighPass,
    LowPass,
}

impl CutKind {
    fn filter_type(self) -> Type<f32> {
        match self {
            CutKind::HighPass => Type::HighPass,
            CutKind::LowPass => Type::LowPass,
        }
    }
}

fn make_butterworth_cascade(
    kind: CutKind,
    frequency: f32,
    slope: Slope,
    sample_rate: f32,
) -> Result<CutCoefficients, DspError> {
    check_sample_rate(sample_rate)?;

    let order = slope.order();
    let mut sections = [CoefficientSet::IDENTITY; MAX_CUT_STAGES];
    for (i, section) in sections.iter_mut().enumerate().take(slope.stages()) {
        *section = design(kind.filter_type(), frequency, butterworth_q(order, i), sample_rate)?;
    }

    Ok(CutCoefficients {
        sections,
        len: slope.stages(),
    })
}

/// High-pass Butterworth cascade of order `2 × low_cut_slope.stages()`
pub fn make_low_cut_filter(
    settings: &ChainSettings,
    sample_rate: f32,
) -> Result<CutCoefficients, DspError> {
    make_butterworth_cascade(
        CutKind::HighPass,
        settings.low_cut_freq,
        settings.low_cut_slope,
        sample_rate,
    )
}

/// Low-pass Butterworth cascade of order `2 × high_cut_slope.stages()`
pub fn make_high_cut_filter(
    settings: &ChainSettings,
    sample_rate: f32,
) -> Result<CutCoefficients, DspError> {
    make_butterworth_cascade(
        CutKind::LowPass,
        settings.high_cut_freq,
        settings.high_cut_slope,
        sample_rate,
    )
}
