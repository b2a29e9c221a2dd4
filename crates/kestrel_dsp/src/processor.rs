//! Audio Processor Trait
//!
//! Defines the interface the host drives once per audio block, and
//! [`ChainProcessor`], which runs a [`FilterChain`] over every channel of a
//! buffer with one [`ChannelState`] per channel.

use crate::chain::{ChannelState, FilterChain};

/// Context passed to processors containing stream metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessContext {
    pub sample_rate: f32,
    pub channels: usize,
    /// Largest block the host will pass to `process`
    pub max_block_size: usize,
}

impl ProcessContext {
    pub fn new(sample_rate: f32, channels: usize, max_block_size: usize) -> Self {
        Self {
            sample_rate,
            channels,
            max_block_size,
        }
    }
}

/// Trait for per-block audio processors
///
/// # Real-time Safety Contract
///
/// Implementors MUST follow these rules in `process()`:
/// - NO heap allocations (no Vec::push, no Box::new, no String)
/// - NO syscalls (no file I/O, no network, no mutex locks)
/// - NO unbounded loops
///
/// Violating these rules causes audio dropouts ("glitches").
pub trait AudioProcessor: Send {
    /// Process audio in place, one slice per channel
    fn process(&mut self, channels: &mut [&mut [f32]]);

    /// Reset internal state (delay lines)
    fn reset(&mut self);

    /// Human-readable name for debugging/UI
    fn name(&self) -> &'static str;
}

/// A [`FilterChain`] applied to several channels.
///
/// All channels share the chain's coefficients; only the delay registers
/// are per channel.
#[derive(Debug, Clone)]
pub struct ChainProcessor {
    chain: FilterChain,
    states: Vec<ChannelState>,
}

impl ChainProcessor {
    /// Allocates state for `channels` channels. Call outside the audio
    /// callback.
    pub fn new(chain: FilterChain, channels: usize) -> Self {
        Self {
            chain,
            states: vec![ChannelState::new(); channels],
        }
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    /// Mutable access for coefficient updates between blocks
    pub fn chain_mut(&mut self) -> &mut FilterChain {
        &mut self.chain
    }

    pub fn num_channels(&self) -> usize {
        self.states.len()
    }

    pub fn channel_state(&self, channel: usize) -> &ChannelState {
        &self.states[channel]
    }

    /// Process planar channels. Channels beyond the prepared count are left
    /// untouched.
    #[inline]
    pub fn process_planar(&mut self, channels: &mut [&mut [f32]]) {
        for (samples, state) in channels.iter_mut().zip(self.states.iter_mut()) {
            self.chain.process(state, samples);
        }
    }

    /// Process an interleaved buffer: [L0, R0, L1, R1, ...]
    #[inline]
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for frame in buffer.chunks_exact_mut(channels) {
            for (sample, state) in frame.iter_mut().zip(self.states.iter_mut()) {
                *sample = self.chain.process_sample(state, *sample);
            }
        }
    }

    pub fn reset(&mut self) {
        for state in &mut self.states {
            state.reset();
        }
    }
}

impl AudioProcessor for ChainProcessor {
    fn process(&mut self, channels: &mut [&mut [f32]]) {
        self.process_planar(channels);
    }

    fn reset(&mut self) {
        ChainProcessor::reset(self);
    }

    fn name(&self) -> &'static str {
        "Cut/Peak/Cut Filter Chain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eq::ChainSettings;

    fn processor(channels: usize) -> ChainProcessor {
        let settings = ChainSettings {
            low_cut_freq: 200.0,
            peak_gain_db: 6.0,
            ..Default::default()
        };
        ChainProcessor::new(FilterChain::with_settings(&settings, 48000.0).unwrap(), channels)
    }

    #[test]
    fn test_process_context() {
        let ctx = ProcessContext::new(48000.0, 2, 512);
        assert_eq!(ctx.sample_rate, 48000.0);
        assert_eq!(ctx.channels, 2);
        assert_eq!(ctx.max_block_size, 512);
    }

    #[test]
    fn test_planar_matches_interleaved() {
        let left: Vec<f32> = (0..256).map(|i| (i as f32 * 0.05).sin()).collect();
        let right: Vec<f32> = (0..256).map(|i| (i as f32 * 0.11).cos() * 0.5).collect();

        let mut planar = processor(2);
        let mut l = left.clone();
        let mut r = right.clone();
        planar.process_planar(&mut [&mut l[..], &mut r[..]]);

        let mut interleaved = processor(2);
        let mut buffer: Vec<f32> = left.iter().zip(&right).flat_map(|(&a, &b)| [a, b]).collect();
        interleaved.process_interleaved(&mut buffer, 2);

        for i in 0..256 {
            assert!((buffer[2 * i] - l[i]).abs() < 1e-6);
            assert!((buffer[2 * i + 1] - r[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_channels_are_independent() {
        let mut p = processor(2);
        let mut left = vec![1.0; 64];
        let mut right = vec![0.0; 64];
        p.process(&mut [&mut left[..], &mut right[..]]);

        assert!(right.iter().all(|&s| s == 0.0));
        assert!((0..crate::chain::NUM_STAGES).all(|i| p.channel_state(1).is_stage_cleared(i)));
    }

    #[test]
    fn test_extra_channels_untouched() {
        let mut p = processor(1);
        let mut a = vec![0.5; 32];
        let mut b = vec![0.5; 32];
        p.process_planar(&mut [&mut a[..], &mut b[..]]);
        assert!(b.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_reset() {
        let mut p = processor(2);
        let mut buffer = vec![0.3; 128];
        p.process_interleaved(&mut buffer, 2);
        p.reset();
        for ch in 0..2 {
            assert!((0..crate::chain::NUM_STAGES).all(|i| p.channel_state(ch).is_stage_cleared(i)));
        }
        assert_eq!(p.name(), "Cut/Peak/Cut Filter Chain");
    }
}
