//! Engine and Analyzer Configuration

use serde::{Deserialize, Serialize};

use kestrel_dsp::{FftSize, DEFAULT_FLOOR_DB};

use crate::error::{EngineError, EngineResult};

/// Configuration of the polling analyzer and the queues that feed it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Analysis window length in samples: 2048, 4096 or 8192
    pub fft_size: usize,

    /// Complete blocks each channel may queue for the analyzer (power of two)
    pub block_fifo_capacity: usize,

    /// Spectrum frames each channel may queue for the UI (power of two)
    pub frame_fifo_capacity: usize,

    /// Chain snapshots queued for the response curve (power of two)
    pub snapshot_fifo_capacity: usize,

    /// Polling period of the analyzer thread
    pub refresh_interval_ms: u64,

    /// Points in the response curve's log sweep
    pub response_points: usize,

    /// Floor for spectrum magnitudes in dB
    pub floor_db: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            block_fifo_capacity: 32,
            frame_fifo_capacity: 32,
            snapshot_fifo_capacity: 4,
            // 16ms = ~60fps
            refresh_interval_ms: 16,
            response_points: 600,
            floor_db: DEFAULT_FLOOR_DB,
        }
    }
}

impl AnalyzerConfig {
    /// The analysis size as an [`FftSize`]
    pub fn analysis_size(&self) -> EngineResult<FftSize> {
        Ok(FftSize::from_len(self.fft_size)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if FftSize::from_len(self.fft_size).is_err() {
            return Err(format!("Invalid FFT size: {}", self.fft_size));
        }
        for (name, capacity) in [
            ("block FIFO", self.block_fifo_capacity),
            ("frame FIFO", self.frame_fifo_capacity),
            ("snapshot FIFO", self.snapshot_fifo_capacity),
        ] {
            if capacity == 0 || !capacity.is_power_of_two() {
                return Err(format!("Invalid {} capacity: {}", name, capacity));
            }
        }
        if self.refresh_interval_ms == 0 || self.refresh_interval_ms > 1000 {
            return Err(format!("Invalid refresh interval: {}ms", self.refresh_interval_ms));
        }
        if self.response_points < 2 {
            return Err(format!("Invalid response point count: {}", self.response_points));
        }
        if self.floor_db.is_nan() || self.floor_db >= 0.0 {
            return Err(format!("Invalid floor: {} dB", self.floor_db));
        }
        Ok(())
    }
}

/// Overall engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Analyzer configuration
    pub analyzer: AnalyzerConfig,

    /// Largest channel count `prepare` accepts (1 = mono, 2 = stereo)
    pub max_channels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            max_channels: 2,
        }
    }
}

impl EngineConfig {
    /// Create config optimized for a responsive display
    pub fn low_latency() -> Self {
        Self {
            analyzer: AnalyzerConfig {
                fft_size: 2048, // ~43ms window at 48kHz
                refresh_interval_ms: 8,
                ..Default::default()
            },
            max_channels: 2,
        }
    }

    /// Create config optimized for frequency resolution
    pub fn high_resolution() -> Self {
        Self {
            analyzer: AnalyzerConfig {
                fft_size: 8192, // ~5.9Hz bins at 48kHz
                frame_fifo_capacity: 16,
                refresh_interval_ms: 33,
                response_points: 1200,
                ..Default::default()
            },
            max_channels: 2,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_channels == 0 || self.max_channels > 2 {
            return Err(format!("Invalid channel count: {}", self.max_channels));
        }
        self.analyzer.validate()
    }

    /// [`validate`](Self::validate) as an engine error
    pub fn check(&self) -> EngineResult<()> {
        self.validate().map_err(EngineError::ConfigError)
    }
}
