//! DSP Error Types

use thiserror::Error;

/// Errors that can occur while setting up DSP components
#[derive(Error, Debug)]
pub enum DspError {
    #[error("Invalid FIFO capacity: {0} (must be a non-zero power of two)")]
    InvalidFifoCapacity(usize),

    #[error("Invalid filter coefficients for frequency {frequency}Hz at sample rate {sample_rate}Hz")]
    InvalidCoefficients { frequency: f32, sample_rate: f32 },

    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(f32),

    #[error("Block size must be non-zero")]
    InvalidBlockSize,

    #[error("Unsupported FFT size: {0} (expected 2048, 4096 or 8192)")]
    UnsupportedFftSize(usize),
}

/// Outcome of a ring buffer operation that could not complete.
///
/// Both variants are expected and frequent: callers treat them as
/// "try again next cycle".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoError {
    #[error("FIFO overflow - no free slot for the write")]
    Overflow,

    #[error("FIFO underflow - nothing stored to read")]
    Underflow,
}
