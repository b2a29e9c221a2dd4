//! Parameter Storage
//!
//! The one place user parameters are clamped. Every parameter is an
//! individually atomic `f32` (bit-cast into an `AtomicU32`), so the UI or
//! an automation source can store from any thread while the audio thread
//! reads a [`ChainSettings`] snapshot at the start of each block.
//!
//! A snapshot is not atomic as a whole: a block may see some parameters
//! from before a multi-parameter change and some from after. The version
//! counter makes the next block pick up the rest.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use kestrel_dsp::{ChainSettings, Slope, MAX_FREQUENCY, MIN_FREQUENCY};

/// Frequency ranges are skewed so the lower decades get most of the travel
const FREQUENCY_SKEW: f32 = 0.25;

/// Number of user-facing parameters
pub const NUM_PARAMS: usize = 10;

/// Identifier of every user-facing parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamId {
    LowCutFreq,
    HighCutFreq,
    PeakFreq,
    PeakGain,
    PeakQuality,
    LowCutSlope,
    HighCutSlope,
    LowCutBypassed,
    PeakBypassed,
    HighCutBypassed,
}

impl ParamId {
    pub const ALL: [ParamId; NUM_PARAMS] = [
        ParamId::LowCutFreq,
        ParamId::HighCutFreq,
        ParamId::PeakFreq,
        ParamId::PeakGain,
        ParamId::PeakQuality,
        ParamId::LowCutSlope,
        ParamId::HighCutSlope,
        ParamId::LowCutBypassed,
        ParamId::PeakBypassed,
        ParamId::HighCutBypassed,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            ParamId::LowCutFreq => "LowCut Freq",
            ParamId::HighCutFreq => "HighCut Freq",
            ParamId::PeakFreq => "Peak Freq",
            ParamId::PeakGain => "Peak Gain",
            ParamId::PeakQuality => "Peak Quality",
            ParamId::LowCutSlope => "LowCut Slope",
            ParamId::HighCutSlope => "HighCut Slope",
            ParamId::LowCutBypassed => "LowCut Bypassed",
            ParamId::PeakBypassed => "Peak Bypassed",
            ParamId::HighCutBypassed => "HighCut Bypassed",
        }
    }

    pub fn range(self) -> ParamRange {
        match self {
            ParamId::LowCutFreq | ParamId::HighCutFreq | ParamId::PeakFreq => {
                ParamRange::new(MIN_FREQUENCY, MAX_FREQUENCY, 1.0, FREQUENCY_SKEW)
            }
            ParamId::PeakGain => ParamRange::new(-24.0, 24.0, 0.5, 1.0),
            ParamId::PeakQuality => ParamRange::new(0.1, 10.0, 0.05, 1.0),
            ParamId::LowCutSlope | ParamId::HighCutSlope => {
                ParamRange::new(0.0, (Slope::ALL.len() - 1) as f32, 1.0, 1.0)
            }
            ParamId::LowCutBypassed | ParamId::PeakBypassed | ParamId::HighCutBypassed => {
                ParamRange::new(0.0, 1.0, 1.0, 1.0)
            }
        }
    }

    pub fn default_value(self) -> f32 {
        match self {
            ParamId::LowCutFreq => 20.0,
            ParamId::HighCutFreq => 20000.0,
            ParamId::PeakFreq => 750.0,
            ParamId::PeakGain => 0.0,
            ParamId::PeakQuality => 1.0,
            ParamId::LowCutSlope | ParamId::HighCutSlope => Slope::default().index() as f32,
            ParamId::LowCutBypassed | ParamId::PeakBypassed | ParamId::HighCutBypassed => 0.0,
        }
    }

    /// Choice and toggle parameters only take whole values
    pub fn is_discrete(self) -> bool {
        matches!(
            self,
            ParamId::LowCutSlope
                | ParamId::HighCutSlope
                | ParamId::LowCutBypassed
                | ParamId::PeakBypassed
                | ParamId::HighCutBypassed
        )
    }

    /// Text for a value, e.g. "24 db/Oct" for a slope or "On" for a bypass
    pub fn display_value(self, value: f32) -> String {
        match self {
            ParamId::LowCutSlope | ParamId::HighCutSlope => slope_from_value(value).label().to_string(),
            ParamId::LowCutBypassed | ParamId::PeakBypassed | ParamId::HighCutBypassed => {
                let text = if value >= 0.5 { "On" } else { "Off" };
                text.to_string()
            }
            ParamId::PeakGain => format!("{:.1} dB", value),
            ParamId::PeakQuality => format!("{:.2}", value),
            _ => format!("{:.0} Hz", value),
        }
    }
}

/// Value range with step interval and skew
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub start: f32,
    pub end: f32,
    pub interval: f32,
    /// 1.0 is linear; below 1.0 spends more of the 0..1 travel near `start`
    pub skew: f32,
}

impl ParamRange {
    pub const fn new(start: f32, end: f32, interval: f32, skew: f32) -> Self {
        Self {
            start,
            end,
            interval,
            skew,
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.start, self.end)
    }

    /// Nearest legal value: clamped and snapped to the step interval
    pub fn snap(&self, value: f32) -> f32 {
        let value = self.clamp(value);
        if self.interval <= 0.0 {
            return value;
        }
        let steps = ((value - self.start) / self.interval).round();
        self.clamp(self.start + steps * self.interval)
    }

    /// Map a 0..1 proportion onto the range through the skew
    pub fn denormalize(&self, proportion: f32) -> f32 {
        let mut proportion = proportion.clamp(0.0, 1.0);
        if self.skew != 1.0 && proportion > 0.0 {
            proportion = (proportion.ln() / self.skew).exp();
        }
        self.start + (self.end - self.start) * proportion
    }

    /// Inverse of [`denormalize`](Self::denormalize)
    pub fn normalize(&self, value: f32) -> f32 {
        let proportion = ((value - self.start) / (self.end - self.start)).clamp(0.0, 1.0);
        if self.skew == 1.0 {
            proportion
        } else {
            proportion.powf(self.skew)
        }
    }
}

fn slope_from_value(value: f32) -> Slope {
    Slope::from_index(value.round().max(0.0) as usize).unwrap_or_default()
}

/// Lock-free store of every parameter
///
/// # Real-time Safety
/// `get`, `version` and `chain_settings` are plain atomic loads and may be
/// called from the audio thread. Setters may be called from any thread.
#[derive(Debug)]
pub struct ParameterStore {
    /// Rust pattern: AtomicF32 doesn't exist, so we use bit-casting
    values: [AtomicU32; NUM_PARAMS],
    /// Bumped after every store
    version: AtomicU64,
}

impl ParameterStore {
    /// Store holding every parameter's default
    pub fn new() -> Self {
        Self {
            values: ParamId::ALL.map(|id| AtomicU32::new(id.default_value().to_bits())),
            version: AtomicU64::new(0),
        }
    }

    /// Current value of `id`
    #[inline]
    pub fn get(&self, id: ParamId) -> f32 {
        f32::from_bits(self.values[id.index()].load(Ordering::Relaxed))
    }

    /// Clamp `value` into range and store it. Returns the stored value.
    ///
    /// NaN is ignored and leaves the current value in place.
    pub fn set(&self, id: ParamId, value: f32) -> f32 {
        if value.is_nan() {
            return self.get(id);
        }
        let range = id.range();
        let value = if id.is_discrete() {
            range.snap(value)
        } else {
            range.clamp(value)
        };
        self.store(id, value);
        value
    }

    /// Store from a 0..1 host value, mapped through the skewed range and
    /// snapped to the step interval. Returns the stored value.
    pub fn set_normalized(&self, id: ParamId, proportion: f32) -> f32 {
        if proportion.is_nan() {
            return self.get(id);
        }
        let range = id.range();
        let value = range.snap(range.denormalize(proportion));
        self.store(id, value);
        value
    }

    /// Current value of `id` as a 0..1 proportion
    pub fn normalized(&self, id: ParamId) -> f32 {
        id.range().normalize(self.get(id))
    }

    /// Current value of `id` as display text
    pub fn display_value(&self, id: ParamId) -> String {
        id.display_value(self.get(id))
    }

    pub fn set_bool(&self, id: ParamId, on: bool) {
        self.set(id, if on { 1.0 } else { 0.0 });
    }

    pub fn set_slope(&self, id: ParamId, slope: Slope) {
        self.set(id, slope.index() as f32);
    }

    fn store(&self, id: ParamId, value: f32) {
        self.values[id.index()].store(value.to_bits(), Ordering::Relaxed);
        // Release pairs with the Acquire in `version`: a reader that sees the
        // new version also sees the value stored before it.
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Change counter. Load this before reading values.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Snapshot of everything the filter chain depends on
    pub fn chain_settings(&self) -> ChainSettings {
        ChainSettings {
            low_cut_freq: self.get(ParamId::LowCutFreq),
            high_cut_freq: self.get(ParamId::HighCutFreq),
            peak_freq: self.get(ParamId::PeakFreq),
            peak_gain_db: self.get(ParamId::PeakGain),
            peak_quality: self.get(ParamId::PeakQuality),
            low_cut_slope: slope_from_value(self.get(ParamId::LowCutSlope)),
            high_cut_slope: slope_from_value(self.get(ParamId::HighCutSlope)),
            low_cut_bypassed: self.get(ParamId::LowCutBypassed) >= 0.5,
            peak_bypassed: self.get(ParamId::PeakBypassed) >= 0.5,
            high_cut_bypassed: self.get(ParamId::HighCutBypassed) >= 0.5,
        }
    }

    /// Store every field of `settings` (clamped)
    pub fn apply(&self, settings: &ChainSettings) {
        self.set(ParamId::LowCutFreq, settings.low_cut_freq);
        self.set(ParamId::HighCutFreq, settings.high_cut_freq);
        self.set(ParamId::PeakFreq, settings.peak_freq);
        self.set(ParamId::PeakGain, settings.peak_gain_db);
        self.set(ParamId::PeakQuality, settings.peak_quality);
        self.set_slope(ParamId::LowCutSlope, settings.low_cut_slope);
        self.set_slope(ParamId::HighCutSlope, settings.high_cut_slope);
        self.set_bool(ParamId::LowCutBypassed, settings.low_cut_bypassed);
        self.set_bool(ParamId::PeakBypassed, settings.peak_bypassed);
        self.set_bool(ParamId::HighCutBypassed, settings.high_cut_bypassed);
    }

    /// Restore every default
    pub fn reset_to_defaults(&self) {
        for id in ParamId::ALL {
            self.store(id, id.default_value());
        }
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}
