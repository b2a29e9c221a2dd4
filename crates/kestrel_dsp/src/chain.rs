//! Cascaded filter chain: low-cut → peak → high-cut
//!
//! The topology is fixed at nine second-order stages:
//!
//! ```text
//!  ┌──────────── low-cut ────────────┐ ┌peak┐ ┌──────────── high-cut ───────────┐
//!  │ stage 0 │ stage 1 │ stage 2 │ 3 │ │ 4  │ │ stage 5 │ stage 6 │ stage 7 │ 8 │
//!  └─────────────────────────────────┘ └────┘ └─────────────────────────────────┘
//! ```
//!
//! Coefficients live once in the [`FilterChain`]; each channel runs its own
//! `biquad` filters in a [`ChannelState`], which pick up the chain's
//! coefficients at block boundaries.
//! Inactive stages are skipped, not removed, so their registers are left
//! untouched when the slope changes.

use std::ops::Range;

use biquad::{Biquad, DirectForm2Transposed};

use crate::eq::{
    make_high_cut_filter, make_low_cut_filter, make_peak_filter, ChainSettings, CoefficientSet,
    CutCoefficients, Slope, MAX_CUT_STAGES,
};
use crate::error::DspError;

/// Total number of stages in the chain
pub const NUM_STAGES: usize = 2 * MAX_CUT_STAGES + 1;

/// The three sections of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainPosition {
    LowCut,
    Peak,
    HighCut,
}

impl ChainPosition {
    /// Stage indices belonging to this section
    pub fn stages(self) -> Range<usize> {
        match self {
            ChainPosition::LowCut => 0..MAX_CUT_STAGES,
            ChainPosition::Peak => MAX_CUT_STAGES..MAX_CUT_STAGES + 1,
            ChainPosition::HighCut => MAX_CUT_STAGES + 1..NUM_STAGES,
        }
    }
}

/// The two cut cascades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CutPosition {
    LowCut,
    HighCut,
}

impl From<CutPosition> for ChainPosition {
    fn from(position: CutPosition) -> Self {
        match position {
            CutPosition::LowCut => ChainPosition::LowCut,
            CutPosition::HighCut => ChainPosition::HighCut,
        }
    }
}

/// Whether a stage takes part in processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageMode {
    Active,
    #[default]
    Bypassed,
}

/// One second-order section: its coefficient set and whether it runs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterStage {
    coefficients: CoefficientSet,
    mode: StageMode,
}

impl FilterStage {
    pub fn coefficients(&self) -> &CoefficientSet {
        &self.coefficients
    }

    pub fn mode(&self) -> StageMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode == StageMode::Active
    }

    /// Replace the whole coefficient set in one assignment.
    ///
    /// Called only between blocks; a block runs entirely on one set.
    /// Returns whether the taps changed.
    #[inline]
    pub fn update_coefficients(&mut self, replacement: CoefficientSet) -> bool {
        let changed = self.coefficients != replacement;
        self.coefficients = replacement;
        changed
    }

    #[inline]
    pub fn set_mode(&mut self, mode: StageMode) -> bool {
        let changed = self.mode != mode;
        self.mode = mode;
        changed
    }
}

/// Per-channel filter runtime for every stage of the chain.
///
/// Each stage is a biquad in transposed direct form II. The coefficients
/// it runs with are copies of the chain's, refreshed at the start of a
/// block whenever the chain's generation has moved on. A state is driven
/// by a single chain for its whole life.
#[derive(Debug, Clone)]
pub struct ChannelState {
    filters: [DirectForm2Transposed<f32>; NUM_STAGES],
    generation: u64,
}

impl ChannelState {
    pub fn new() -> Self {
        Self {
            filters: [DirectForm2Transposed::<f32>::new(CoefficientSet::IDENTITY.into());
                NUM_STAGES],
            generation: 0,
        }
    }

    pub fn stage(&self, index: usize) -> &DirectForm2Transposed<f32> {
        &self.filters[index]
    }

    /// Whether a stage's delay registers are both zero
    pub fn is_stage_cleared(&self, index: usize) -> bool {
        let filter = &self.filters[index];
        filter.s1 == 0.0 && filter.s2 == 0.0
    }

    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset_state();
        }
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete, self-contained copy of the chain's response-relevant state.
///
/// Moved across threads as one value, so a reader sees either the old or
/// the new chain in full.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSnapshot {
    pub stages: [FilterStage; NUM_STAGES],
    pub sample_rate: f32,
}

impl ChainSnapshot {
    /// All stages bypassed
    pub fn bypassed(sample_rate: f32) -> Self {
        Self {
            stages: [FilterStage::default(); NUM_STAGES],
            sample_rate,
        }
    }
}

/// The nine-stage cascade shared by every channel.
///
/// Designed for real-time use: no allocations in `apply_settings()` or
/// `process()`.
#[derive(Debug, Clone)]
pub struct FilterChain {
    stages: [FilterStage; NUM_STAGES],
    sample_rate: f32,
    /// Bumped whenever any stage's coefficients change
    generation: u64,
}

impl FilterChain {
    /// Chain with every stage bypassed
    pub fn new(sample_rate: f32) -> Self {
        Self {
            stages: [FilterStage::default(); NUM_STAGES],
            sample_rate,
            generation: 1,
        }
    }

    /// Chain configured from `settings`
    pub fn with_settings(settings: &ChainSettings, sample_rate: f32) -> Result<Self, DspError> {
        let mut chain = Self::new(sample_rate);
        chain.apply_settings(settings)?;
        Ok(chain)
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Change the sample rate. Coefficients are stale until the next
    /// `apply_settings`.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub fn stages(&self) -> &[FilterStage; NUM_STAGES] {
        &self.stages
    }

    pub fn stage(&self, index: usize) -> &FilterStage {
        &self.stages[index]
    }

    /// Number of active stages in a section
    pub fn active_stages(&self, position: ChainPosition) -> usize {
        self.stages[position.stages()]
            .iter()
            .filter(|s| s.is_active())
            .count()
    }

    /// Synthesise coefficients for every section and hot-swap them in.
    ///
    /// All three sections are designed before anything is replaced; on
    /// error the chain keeps its previous coefficients and flags.
    /// Returns whether any tap or flag changed.
    pub fn apply_settings(&mut self, settings: &ChainSettings) -> Result<bool, DspError> {
        let low_cut = make_low_cut_filter(settings, self.sample_rate)?;
        let peak = make_peak_filter(settings, self.sample_rate)?;
        let high_cut = make_high_cut_filter(settings, self.sample_rate)?;

        let mut changed = self.update_cut_filter(
            CutPosition::LowCut,
            &low_cut,
            settings.low_cut_slope,
            settings.low_cut_bypassed,
        );
        changed |= self.update_peak_filter(peak, settings.peak_bypassed);
        changed |= self.update_cut_filter(
            CutPosition::HighCut,
            &high_cut,
            settings.high_cut_slope,
            settings.high_cut_bypassed,
        );
        Ok(changed)
    }

    /// Install peak coefficients and set the peak stage's mode
    pub fn update_peak_filter(&mut self, coefficients: CoefficientSet, bypassed: bool) -> bool {
        let stage = &mut self.stages[ChainPosition::Peak.stages().start];
        let retuned = stage.update_coefficients(coefficients);
        let mut changed = retuned;
        changed |= stage.set_mode(if bypassed {
            StageMode::Bypassed
        } else {
            StageMode::Active
        });
        if retuned {
            self.generation += 1;
        }
        changed
    }

    /// Install a cut cascade: the first `slope.stages()` stages receive new
    /// coefficients and become active, the rest are bypassed with whatever
    /// coefficients they last held. A bypassed section deactivates all four.
    pub fn update_cut_filter(
        &mut self,
        position: CutPosition,
        coefficients: &CutCoefficients,
        slope: Slope,
        bypassed: bool,
    ) -> bool {
        let active = slope.stages();
        let mut retuned = false;
        let mut changed = false;
        for (i, stage) in self.stages[ChainPosition::from(position).stages()]
            .iter_mut()
            .enumerate()
        {
            if let Some(&replacement) = coefficients.as_slice().get(i) {
                retuned |= stage.update_coefficients(replacement);
            }
            let mode = if i < active && !bypassed {
                StageMode::Active
            } else {
                StageMode::Bypassed
            };
            changed |= stage.set_mode(mode);
        }
        if retuned {
            self.generation += 1;
        }
        changed || retuned
    }

    /// Copy the chain's coefficients into a channel's filters if they are
    /// out of date. Registers are kept.
    #[inline]
    fn sync(&self, state: &mut ChannelState) {
        if state.generation == self.generation {
            return;
        }
        for (stage, filter) in self.stages.iter().zip(state.filters.iter_mut()) {
            filter.update_coefficients(stage.coefficients.into());
        }
        state.generation = self.generation;
    }

    /// Run one channel's samples through every active stage in place.
    ///
    /// # Real-time Safety
    /// No allocations, no locks. O(n × active stages).
    #[inline]
    pub fn process(&self, state: &mut ChannelState, samples: &mut [f32]) {
        self.sync(state);
        for (stage, filter) in self.stages.iter().zip(state.filters.iter_mut()) {
            if !stage.is_active() {
                continue;
            }
            for sample in samples.iter_mut() {
                *sample = filter.run(*sample);
            }
        }
    }

    /// Run a single sample through every active stage
    #[inline]
    pub fn process_sample(&self, state: &mut ChannelState, input: f32) -> f32 {
        self.sync(state);
        let mut x = input;
        for (stage, filter) in self.stages.iter().zip(state.filters.iter_mut()) {
            if stage.is_active() {
                x = filter.run(x);
            }
        }
        x
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            stages: self.stages,
            sample_rate: self.sample_rate,
        }
    }
}
