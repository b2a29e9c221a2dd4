//! Kestrel DSP - Digital Signal Processing Module
//!
//! This crate provides the real-time core of the Kestrel equalizer:
//! - Lock-free single-producer/single-consumer FIFOs with pre-sized slots
//! - A block accumulator that feeds one channel's audio to the analyzer
//! - A nine-stage cut/peak/cut filter chain built from BiQuad sections
//! - A sliding-window FFT spectrum estimator
//! - An analytic frequency-response evaluator for drawing the EQ curve
//!
//! # Architecture
//!
//! ```text
//! audio thread                              polling thread
//! ────────────                              ──────────────
//! ChainProcessor ──▶ BlockAccumulator ═FIFO═▶ BlockReceiver ──▶ SpectrumEstimator ═FIFO═▶ SpectrumFrames
//!       │
//!       └── ChainSnapshot ══════════FIFO═══════════════════▶ ResponseCurve
//! ```
//!
//! Everything on the audio side follows a strict "no allocation in audio
//! callback" rule: buffers are sized when a component is prepared, and
//! values cross threads by copying into recycled slots.

mod accumulator;
mod chain;
mod eq;
mod error;
mod fft;
mod fifo;
mod processor;
mod response;
mod units;

pub use accumulator::{block_channel, BlockAccumulator, BlockReceiver};
pub use chain::{
    ChainPosition, ChainSnapshot, ChannelState, CutPosition, FilterChain, FilterStage, StageMode,
    NUM_STAGES,
};
pub use eq::{
    butterworth_q, make_high_cut_filter, make_low_cut_filter, make_peak_filter, ChainSettings,
    CoefficientSet, CutCoefficients, Slope, MAX_CUT_STAGES, NYQUIST_GUARD,
};
pub use error::{DspError, FifoError};
pub use fft::{blackman_harris, EstimatorState, FftSize, SpectrumEstimator, SpectrumFrames, DEFAULT_FLOOR_DB};
pub use fifo::{Fifo, FifoReader, FifoWriter};
pub use processor::{AudioProcessor, ChainProcessor, ProcessContext};
pub use response::{stage_magnitude, sweep_frequency, ResponseCurve, RESPONSE_FLOOR_DB};
pub use units::{gain_to_decibels, map_to_log10, MAX_FREQUENCY, MIN_FREQUENCY};
