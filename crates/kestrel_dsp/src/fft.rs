//! FFT Spectrum Analyzer
//!
//! Turns blocks of one channel's processed audio into magnitude spectra in
//! dB for visualization. Runs on the polling thread, never on the audio
//! thread: blocks arrive through a [`BlockReceiver`](crate::BlockReceiver),
//! finished frames leave through a [`Fifo`].
//!
//! # Pipeline
//!
//! ```text
//! block ─▶ slide analysis window ─▶ taper ─▶ FFT ─▶ |X[k]| / (N/2) ─▶ dB ─▶ frame FIFO
//! ```

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{DspError, FifoError};
use crate::fifo::{Fifo, FifoReader, FifoWriter};
use crate::units::gain_to_decibels;

/// Default floor for spectrum magnitudes (dB)
pub const DEFAULT_FLOOR_DB: f32 = -48.0;

/// Supported analysis sizes
///
/// 2048 samples at 48kHz = ~42ms window, ~23Hz resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FftSize {
    #[default]
    Order2048,
    Order4096,
    Order8192,
}

impl FftSize {
    /// Number of samples in the analysis window
    pub fn len(self) -> usize {
        match self {
            FftSize::Order2048 => 2048,
            FftSize::Order4096 => 4096,
            FftSize::Order8192 => 8192,
        }
    }

    /// Number of positive-frequency bins in a frame
    pub fn num_bins(self) -> usize {
        self.len() / 2
    }

    pub fn from_len(len: usize) -> Result<Self, DspError> {
        match len {
            2048 => Ok(FftSize::Order2048),
            4096 => Ok(FftSize::Order4096),
            8192 => Ok(FftSize::Order8192),
            other => Err(DspError::UnsupportedFftSize(other)),
        }
    }
}

/// 4-term Blackman-Harris window value at `n` of `size`.
///
/// Sidelobes sit around -92 dB, well under the analyzer floor.
pub fn blackman_harris(n: usize, size: usize) -> f32 {
    const A0: f32 = 0.358_75;
    const A1: f32 = 0.488_29;
    const A2: f32 = 0.141_28;
    const A3: f32 = 0.011_68;

    let x = 2.0 * std::f32::consts::PI * n as f32 / (size - 1) as f32;
    A0 - A1 * x.cos() + A2 * (2.0 * x).cos() - A3 * (3.0 * x).cos()
}

/// Where the estimator is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    /// No window update since the last frame
    Idle,
    /// Window updated but not yet filled with a full window of history
    Accumulating,
    /// Window updated with a full window of history
    Ready,
}

/// Consumer end of the spectrum frame queue, owned by the UI side.
pub struct SpectrumFrames {
    reader: FifoReader<Vec<f32>>,
    num_bins: usize,
}

impl SpectrumFrames {
    pub fn num_available_frames(&self) -> usize {
        self.reader.num_available()
    }

    /// Pull the oldest frame (`num_bins` values in dB) into `out`
    pub fn pull_frame(&mut self, out: &mut Vec<f32>) -> Result<(), FifoError> {
        self.reader.read(out)
    }

    /// Drain the queue, keeping only the newest frame. Returns whether one
    /// was available.
    pub fn pull_latest(&mut self, out: &mut Vec<f32>) -> bool {
        self.reader.read_latest(out) > 0
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }
}

/// Sliding-window spectrum estimator for one channel
pub struct SpectrumEstimator {
    size: FftSize,
    /// Most recent `size` samples, oldest first
    window: Vec<f32>,
    taper: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    frame: Vec<f32>,
    floor_db: f32,
    state: EstimatorState,
    samples_received: usize,
    frames: FifoWriter<Vec<f32>>,
    frames_dropped: u64,
}

impl SpectrumEstimator {
    /// Build an estimator and its frame queue.
    ///
    /// All buffers are sized here; nothing allocates afterwards.
    pub fn prepare(
        size: FftSize,
        frame_capacity: usize,
        floor_db: f32,
    ) -> Result<(Self, SpectrumFrames), DspError> {
        let len = size.len();
        let (frames, reader) = Fifo::prepare(frame_capacity, vec![floor_db; size.num_bins()])?.split();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(len);
        let scratch_len = fft.get_inplace_scratch_len();

        let estimator = Self {
            size,
            window: vec![0.0; len],
            taper: (0..len).map(|i| blackman_harris(i, len)).collect(),
            fft,
            buffer: vec![Complex::new(0.0, 0.0); len],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            frame: vec![floor_db; size.num_bins()],
            floor_db,
            state: EstimatorState::Idle,
            samples_received: 0,
            frames,
            frames_dropped: 0,
        };

        Ok((
            estimator,
            SpectrumFrames {
                reader,
                num_bins: size.num_bins(),
            },
        ))
    }

    /// Shift the window left by `block.len()` and append `block`.
    ///
    /// A block at least as long as the window replaces it with the block's
    /// tail.
    pub fn push_block(&mut self, block: &[f32]) {
        let len = self.window.len();
        let n = block.len();
        if n == 0 {
            return;
        }

        if n >= len {
            self.window.copy_from_slice(&block[n - len..]);
        } else {
            self.window.copy_within(n.., 0);
            self.window[len - n..].copy_from_slice(block);
        }

        self.samples_received = self.samples_received.saturating_add(n);
        self.state = if self.samples_received >= len {
            EstimatorState::Ready
        } else {
            EstimatorState::Accumulating
        };
    }

    /// If the window changed since the last frame, transform it and queue
    /// the frame.
    ///
    /// Returns `Ok(true)` when a frame was queued, `Ok(false)` when there
    /// was nothing new, and `Err(Overflow)` when the frame queue was full
    /// (the frame is dropped).
    pub fn produce_frame(&mut self) -> Result<bool, FifoError> {
        if self.state == EstimatorState::Idle {
            return Ok(false);
        }
        self.state = EstimatorState::Idle;

        self.transform();
        match self.frames.write(&self.frame) {
            Ok(()) => Ok(true),
            Err(e) => {
                self.frames_dropped += 1;
                Err(e)
            }
        }
    }

    fn transform(&mut self) {
        for ((out, &sample), &w) in self.buffer.iter_mut().zip(&self.window).zip(&self.taper) {
            *out = Complex::new(sample * w, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let num_bins = self.size.num_bins();
        let norm = num_bins as f32;
        for (db, bin) in self.frame.iter_mut().zip(&self.buffer[..num_bins]) {
            *db = gain_to_decibels(bin.norm() / norm, self.floor_db);
        }
    }

    pub fn state(&self) -> EstimatorState {
        self.state
    }

    /// Current analysis window, oldest sample first
    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Most recently computed frame
    pub fn last_frame(&self) -> &[f32] {
        &self.frame
    }

    pub fn size(&self) -> FftSize {
        self.size
    }

    pub fn floor_db(&self) -> f32 {
        self.floor_db
    }

    /// Frames dropped because the frame queue was full
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Centre frequency of bin `index` at `sample_rate`
    pub fn bin_frequency(&self, index: usize, sample_rate: f32) -> f32 {
        index as f32 * sample_rate / self.size.len() as f32
    }

    /// Clear the history
    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.frame.fill(self.floor_db);
        self.samples_received = 0;
        self.state = EstimatorState::Idle;
    }
}
