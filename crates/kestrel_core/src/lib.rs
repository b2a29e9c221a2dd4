//! Kestrel Core - EQ Engine
//!
//! This crate wires the DSP building blocks into an engine:
//! - Lock-free parameter storage, clamped at the point of entry
//! - The real-time `EqProcessor` a host drives block by block
//! - The polling `Analyzer` turning processed audio into spectra and
//!   response curves, optionally on its own `AnalyzerThread`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        UI Thread                            │
//! │  ParameterStore::set ──atomics──▶   ◀──events── Analyzer    │
//! └─────────────────────────────────────────────────────────────┘
//!              │ atomics                      ▲ rtrb FIFOs
//!              ▼                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Audio Thread                           │
//! │   EqProcessor: snapshot ─▶ FilterChain ─▶ accumulators      │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod analyzer;
mod config;
mod error;
mod message;
mod params;
mod processor;

pub use analyzer::{Analyzer, AnalyzerThread, ChannelReport, TickReport};
pub use config::{AnalyzerConfig, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use message::{Command, Event};
pub use params::{ParamId, ParamRange, ParameterStore, NUM_PARAMS};
pub use processor::{AnalyzerTaps, BusLayout, EqProcessor};

// Re-export DSP types for convenience
pub use kestrel_dsp::{
    AudioProcessor, ChainSettings, ChainSnapshot, FftSize, FilterChain, ProcessContext,
    ResponseCurve, Slope, SpectrumFrames,
};
