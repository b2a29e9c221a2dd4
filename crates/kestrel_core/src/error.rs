//! Engine Error Types

use thiserror::Error;

/// Errors that can occur while setting up or driving the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unsupported channel layout: {inputs} in / {outputs} out (mono or stereo, inputs must equal outputs)")]
    UnsupportedLayout { inputs: usize, outputs: usize },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Processor has not been prepared")]
    NotPrepared,

    #[error("Failed to spawn analyzer thread: {0}")]
    ThreadSpawnError(String),

    #[error("DSP error: {0}")]
    DspError(#[from] kestrel_dsp::DspError),

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::UnsupportedLayout {
            inputs: 6,
            outputs: 2,
        };
        assert!(err.to_string().contains("6 in / 2 out"));

        let err = EngineError::ConfigError("fft size".into());
        assert!(err.to_string().contains("fft size"));
    }

    #[test]
    fn test_error_from_dsp() {
        let dsp_err = kestrel_dsp::DspError::UnsupportedFftSize(1000);
        let engine_err: EngineError = dsp_err.into();
        assert!(matches!(engine_err, EngineError::DspError(_)));
        assert!(engine_err.to_string().contains("1000"));
    }
}
