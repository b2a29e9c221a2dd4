//! Real-time EQ Processor
//!
//! The audio-thread side of the engine. A host calls
//! [`EqProcessor::prepare`] once per stream configuration and then
//! `process_*` for every block.
//!
//! # Per-block flow
//!
//! ```text
//! clear extra channels
//!   └─▶ parameter snapshot (only when the store's version moved)
//!         └─▶ synthesise + hot-swap coefficients
//!               └─▶ run the chain on every channel
//!                     └─▶ feed each channel's BlockAccumulator
//!                           └─▶ publish a ChainSnapshot if the chain changed
//! ```
//!
//! # Real-time Safety
//! `process_planar` and `process_interleaved` never allocate, lock, block
//! or log. Failures on this path are absorbed: a coefficient synthesis
//! error keeps the previous coefficients, a full FIFO drops the newest
//! item (snapshots are retried on the next block).

use std::sync::Arc;

use tracing::{debug, info};

use kestrel_dsp::{
    block_channel, AudioProcessor, BlockAccumulator, BlockReceiver, ChainProcessor,
    ChainSnapshot, FilterChain, Fifo, FifoReader, FifoWriter, ProcessContext,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::params::ParameterStore;

/// Input/output channel counts offered by a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusLayout {
    pub inputs: usize,
    pub outputs: usize,
}

impl BusLayout {
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self { inputs, outputs }
    }

    pub fn mono() -> Self {
        Self::new(1, 1)
    }

    pub fn stereo() -> Self {
        Self::new(2, 2)
    }
}

/// Polling-side ends of every queue the processor writes to.
///
/// Returned by [`EqProcessor::prepare`] and handed to the
/// [`Analyzer`](crate::Analyzer).
pub struct AnalyzerTaps {
    /// One receiver per processed channel
    pub blocks: Vec<BlockReceiver>,
    /// Chain snapshots, published whenever coefficients or flags change
    pub snapshots: FifoReader<ChainSnapshot>,
    pub sample_rate: f32,
}

/// Audio-thread state that only exists between `prepare` and the next
/// `prepare`.
struct Prepared {
    context: ProcessContext,
    processor: ChainProcessor,
    accumulators: Vec<BlockAccumulator>,
    snapshots: FifoWriter<ChainSnapshot>,
    /// Chain changed but the snapshot FIFO was full
    snapshot_pending: bool,
    /// Store version the chain was last built from
    applied_version: u64,
}

impl Prepared {
    /// Steps 2-3: re-derive coefficients when any parameter moved
    #[inline]
    fn update_filters(&mut self, params: &ParameterStore) {
        let version = params.version();
        if version == self.applied_version {
            return;
        }
        let settings = params.chain_settings();
        // On error the chain keeps its previous coefficients and the same
        // version is retried next block.
        if let Ok(changed) = self.processor.chain_mut().apply_settings(&settings) {
            self.applied_version = version;
            self.snapshot_pending |= changed;
        }
    }

    /// Step 6
    #[inline]
    fn publish_snapshot(&mut self) {
        if self.snapshot_pending && self.snapshots.write(&self.processor.chain().snapshot()).is_ok() {
            self.snapshot_pending = false;
        }
    }
}

/// The EQ as a host sees it: parameters in, processed audio out, analysis
/// data on the side.
pub struct EqProcessor {
    params: Arc<ParameterStore>,
    config: EngineConfig,
    prepared: Option<Prepared>,
}

impl EqProcessor {
    pub fn new(params: Arc<ParameterStore>, config: EngineConfig) -> Self {
        Self {
            params,
            config,
            prepared: None,
        }
    }

    /// Mono or stereo, with as many inputs as outputs
    pub fn is_layout_supported(layout: BusLayout) -> bool {
        matches!(layout.outputs, 1 | 2) && layout.inputs == layout.outputs
    }

    /// Allocate everything the audio thread needs for `context` and build
    /// the chain from the current parameters.
    ///
    /// Replaces any previous preparation; the analyzer built from the old
    /// taps simply stops receiving data.
    pub fn prepare(&mut self, context: ProcessContext) -> EngineResult<AnalyzerTaps> {
        self.config.check()?;

        let layout = BusLayout::new(context.channels, context.channels);
        if !Self::is_layout_supported(layout) || context.channels > self.config.max_channels {
            return Err(EngineError::UnsupportedLayout {
                inputs: layout.inputs,
                outputs: layout.outputs,
            });
        }
        if !(context.sample_rate > 0.0 && context.sample_rate.is_finite()) {
            return Err(kestrel_dsp::DspError::InvalidSampleRate(context.sample_rate).into());
        }

        let analyzer = &self.config.analyzer;

        let applied_version = self.params.version();
        let chain = FilterChain::with_settings(&self.params.chain_settings(), context.sample_rate)?;

        let mut accumulators = Vec::with_capacity(context.channels);
        let mut blocks = Vec::with_capacity(context.channels);
        for _ in 0..context.channels {
            let (accumulator, receiver) =
                block_channel(context.max_block_size, analyzer.block_fifo_capacity)?;
            accumulators.push(accumulator);
            blocks.push(receiver);
        }

        let (mut snapshots, snapshot_reader) =
            Fifo::prepare(analyzer.snapshot_fifo_capacity, ChainSnapshot::bypassed(context.sample_rate))?
                .split();
        // Retried from the first block if it could not be queued
        let snapshot_pending = snapshots.write(&chain.snapshot()).is_err();

        info!(
            "Prepared EQ processor: {} Hz, {} channel(s), max block {}",
            context.sample_rate, context.channels, context.max_block_size
        );
        debug!("Initial chain settings: {:?}", self.params.chain_settings());

        self.prepared = Some(Prepared {
            context,
            processor: ChainProcessor::new(chain, context.channels),
            accumulators,
            snapshots,
            snapshot_pending,
            applied_version,
        });

        Ok(AnalyzerTaps {
            blocks,
            snapshots: snapshot_reader,
            sample_rate: context.sample_rate,
        })
    }

    /// Process planar audio in place, one slice per channel.
    ///
    /// Channels beyond the prepared count are cleared. Does nothing before
    /// `prepare`.
    pub fn process_planar(&mut self, channels: &mut [&mut [f32]]) {
        let Some(prepared) = self.prepared.as_mut() else {
            return;
        };

        let active = prepared.context.channels.min(channels.len());
        for extra in channels[active..].iter_mut() {
            extra.fill(0.0);
        }

        prepared.update_filters(&self.params);

        let channels = &mut channels[..active];
        prepared.processor.process_planar(channels);

        for (accumulator, samples) in prepared.accumulators.iter_mut().zip(channels.iter()) {
            accumulator.push_samples(samples);
        }

        prepared.publish_snapshot();
    }

    /// Process an interleaved buffer in place: [L0, R0, L1, R1, ...]
    ///
    /// `channels` is the buffer's channel count; channels beyond the
    /// prepared count are cleared.
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) {
        let Some(prepared) = self.prepared.as_mut() else {
            return;
        };
        if channels == 0 {
            return;
        }

        let active = prepared.context.channels.min(channels);
        if active < channels {
            for frame in buffer.chunks_exact_mut(channels) {
                frame[active..].fill(0.0);
            }
        }

        prepared.update_filters(&self.params);

        prepared.processor.process_interleaved(buffer, channels);

        for (channel, accumulator) in prepared.accumulators.iter_mut().take(active).enumerate() {
            accumulator.push_interleaved(buffer, channels, channel);
        }

        prepared.publish_snapshot();
    }

    /// Clear filter state and partially gathered analysis blocks
    pub fn reset(&mut self) {
        if let Some(prepared) = self.prepared.as_mut() {
            prepared.processor.reset();
            for accumulator in &mut prepared.accumulators {
                accumulator.reset();
            }
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// Context of the last successful `prepare`
    pub fn context(&self) -> Option<ProcessContext> {
        self.prepared.as_ref().map(|p| p.context)
    }

    /// The live chain, for inspection outside the audio callback
    pub fn chain(&self) -> EngineResult<&FilterChain> {
        self.prepared
            .as_ref()
            .map(|p| p.processor.chain())
            .ok_or(EngineError::NotPrepared)
    }

    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl AudioProcessor for EqProcessor {
    fn process(&mut self, channels: &mut [&mut [f32]]) {
        self.process_planar(channels);
    }

    fn reset(&mut self) {
        EqProcessor::reset(self);
    }

    fn name(&self) -> &'static str {
        "Kestrel EQ"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamId;
    use kestrel_dsp::{ChainPosition, Slope};

    fn processor() -> (Arc<ParameterStore>, EqProcessor) {
        let params = Arc::new(ParameterStore::new());
        let processor = EqProcessor::new(Arc::clone(&params), EngineConfig::default());
        (params, processor)
    }

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 48000.0).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_layout_support() {
        assert!(EqProcessor::is_layout_supported(BusLayout::mono()));
        assert!(EqProcessor::is_layout_supported(BusLayout::stereo()));
        assert!(!EqProcessor::is_layout_supported(BusLayout::new(1, 2)));
        assert!(!EqProcessor::is_layout_supported(BusLayout::new(6, 6)));
        assert!(!EqProcessor::is_layout_supported(BusLayout::new(0, 0)));
    }

    #[test]
    fn test_prepare_rejects_bad_context() {
        let (_, mut p) = processor();
        assert!(matches!(
            p.prepare(ProcessContext::new(48000.0, 4, 512)),
            Err(EngineError::UnsupportedLayout { inputs: 4, outputs: 4 })
        ));
        assert!(matches!(
            p.prepare(ProcessContext::new(0.0, 2, 512)),
            Err(EngineError::DspError(_))
        ));
        assert!(p.prepare(ProcessContext::new(48000.0, 2, 0)).is_err());
        assert!(!p.is_prepared());
        assert!(matches!(p.chain(), Err(EngineError::NotPrepared)));
    }

    #[test]
    fn test_unprepared_process_is_noop() {
        let (_, mut p) = processor();
        let mut left = vec![0.5; 64];
        p.process_planar(&mut [&mut left[..]]);
        assert!(left.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_prepare_publishes_initial_snapshot() {
        let (params, mut p) = processor();
        params.set(ParamId::PeakGain, 6.0);
        let mut taps = p.prepare(ProcessContext::new(48000.0, 2, 256)).unwrap();

        assert_eq!(taps.blocks.len(), 2);
        assert_eq!(taps.sample_rate, 48000.0);

        let mut snapshot = ChainSnapshot::bypassed(1.0);
        assert_eq!(taps.snapshots.read_latest(&mut snapshot), 1);
        assert_eq!(snapshot, p.chain().unwrap().snapshot());
        assert!((snapshot.evaluate_response(750.0) - 6.0).abs() < 0.1);
    }

    #[test]
    fn test_parameter_change_reaches_chain_next_block() {
        let (params, mut p) = processor();
        let mut taps = p.prepare(ProcessContext::new(48000.0, 1, 128)).unwrap();
        let mut snapshot = ChainSnapshot::bypassed(48000.0);
        taps.snapshots.read_latest(&mut snapshot);

        params.set_slope(ParamId::LowCutSlope, Slope::Db36);
        assert_eq!(p.chain().unwrap().active_stages(ChainPosition::LowCut), 1);

        let mut block = vec![0.0; 128];
        p.process_planar(&mut [&mut block[..]]);
        assert_eq!(p.chain().unwrap().active_stages(ChainPosition::LowCut), 3);

        // Exactly one new snapshot, even after another unchanged block
        p.process_planar(&mut [&mut block[..]]);
        assert_eq!(taps.snapshots.read_latest(&mut snapshot), 1);
        assert_eq!(snapshot, p.chain().unwrap().snapshot());
    }

    #[test]
    fn test_snapshot_retried_when_fifo_full() {
        let (params, mut p) = processor();
        let mut taps = p.prepare(ProcessContext::new(48000.0, 1, 64)).unwrap();
        let mut block = vec![0.0; 64];

        // Default capacity 4, one slot taken by the initial snapshot
        for gain in 1..=6 {
            params.set(ParamId::PeakGain, gain as f32);
            p.process_planar(&mut [&mut block[..]]);
        }
        assert_eq!(taps.snapshots.num_available(), 4);

        let mut snapshot = ChainSnapshot::bypassed(48000.0);
        taps.snapshots.read_latest(&mut snapshot);

        // The next block publishes the current chain
        p.process_planar(&mut [&mut block[..]]);
        taps.snapshots.read_latest(&mut snapshot);
        assert_eq!(snapshot, p.chain().unwrap().snapshot());
        assert!((snapshot.evaluate_response(750.0) - 6.0).abs() < 0.1);
    }

    #[test]
    fn test_extra_channels_cleared() {
        let (_, mut p) = processor();
        p.prepare(ProcessContext::new(48000.0, 1, 64)).unwrap();

        let mut main = vec![0.25; 64];
        let mut extra = vec![0.25; 64];
        p.process_planar(&mut [&mut main[..], &mut extra[..]]);
        assert!(extra.iter().all(|&s| s == 0.0));

        let mut interleaved = vec![0.25; 128];
        p.process_interleaved(&mut interleaved, 2);
        assert!(interleaved.iter().skip(1).step_by(2).all(|&s| s == 0.0));
    }

    #[test]
    fn test_blocks_reach_analyzer() {
        let (_, mut p) = processor();
        let mut taps = p.prepare(ProcessContext::new(48000.0, 2, 100)).unwrap();

        let mut buffer: Vec<f32> = (0..200).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        p.process_interleaved(&mut buffer, 2);
        p.process_interleaved(&mut buffer, 2);

        for (channel, receiver) in taps.blocks.iter_mut().enumerate() {
            assert_eq!(receiver.num_complete_blocks_available(), 2);
            let mut block = Vec::new();
            receiver.pull_block(&mut block).unwrap();
            assert_eq!(block.len(), 100);
            let expected: Vec<f32> = buffer.iter().skip(channel).step_by(2).copied().collect();
            // Second pushed block is the last processed buffer
            receiver.pull_block(&mut block).unwrap();
            assert_eq!(block, expected);
        }
    }

    #[test]
    fn test_interleaved_narrower_than_prepared() {
        let (_, mut p) = processor();
        let mut taps = p.prepare(ProcessContext::new(48000.0, 2, 64)).unwrap();

        let mut mono = vec![0.1; 64];
        p.process_interleaved(&mut mono, 1);

        assert_eq!(taps.blocks[0].num_complete_blocks_available(), 1);
        assert_eq!(taps.blocks[1].num_complete_blocks_available(), 0);
        let mut block = Vec::new();
        taps.blocks[0].pull_block(&mut block).unwrap();
        assert_eq!(block, mono);
    }

    #[test]
    fn test_initial_snapshot_published_once() {
        let (_, mut p) = processor();
        let taps = p.prepare(ProcessContext::new(48000.0, 1, 64)).unwrap();

        let mut block = vec![0.0; 64];
        p.process_planar(&mut [&mut block[..]]);
        p.process_planar(&mut [&mut block[..]]);
        assert_eq!(taps.snapshots.num_available(), 1);
    }

    #[test]
    fn test_snapshots_are_never_torn() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let (params, mut p) = processor();

        let set_a = |params: &ParameterStore| {
            params.set(ParamId::PeakGain, 9.0);
            params.set(ParamId::PeakFreq, 1200.0);
            params.set(ParamId::LowCutFreq, 80.0);
            params.set(ParamId::HighCutFreq, 12000.0);
        };
        let set_b = |params: &ParameterStore| {
            params.set(ParamId::PeakGain, -6.0);
            params.set(ParamId::PeakFreq, 400.0);
            params.set(ParamId::LowCutFreq, 200.0);
            params.set(ParamId::HighCutFreq, 6000.0);
        };

        set_a(params.as_ref());
        let chain_a = FilterChain::with_settings(&params.chain_settings(), 48000.0)
            .unwrap()
            .snapshot();
        set_b(params.as_ref());
        let chain_b = FilterChain::with_settings(&params.chain_settings(), 48000.0)
            .unwrap()
            .snapshot();
        assert_ne!(chain_a, chain_b);

        let mut taps = p.prepare(ProcessContext::new(48000.0, 1, 32)).unwrap();
        let done = Arc::new(AtomicBool::new(false));

        let audio = {
            let params = Arc::clone(&params);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut block = vec![0.0; 32];
                for i in 0..2000 {
                    if i % 2 == 0 {
                        set_a(params.as_ref());
                    } else {
                        set_b(params.as_ref());
                    }
                    p.process_planar(&mut [&mut block[..]]);
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut snapshot = ChainSnapshot::bypassed(48000.0);
        let mut received = 0;
        loop {
            let finished = done.load(Ordering::Acquire);
            while taps.snapshots.read(&mut snapshot).is_ok() {
                assert!(snapshot == chain_a || snapshot == chain_b, "mixed coefficient sets");
                received += 1;
            }
            if finished {
                break;
            }
            thread::yield_now();
        }
        audio.join().unwrap();

        assert!(received > 1);
    }

    #[test]
    fn test_low_cut_removes_rumble() {
        let (params, mut p) = processor();
        params.set(ParamId::LowCutFreq, 1000.0);
        params.set_slope(ParamId::LowCutSlope, Slope::Db48);
        params.set_bool(ParamId::PeakBypassed, true);
        params.set_bool(ParamId::HighCutBypassed, true);
        p.prepare(ProcessContext::new(48000.0, 2, 4800)).unwrap();

        let mut low = sine(100.0, 4800);
        let mut high = sine(5000.0, 4800);
        p.process(&mut [&mut low[..], &mut high[..]]);

        assert!(rms(&low[2400..]) < 0.001);
        assert!((rms(&high[2400..]) - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.02);
    }

    #[test]
    fn test_all_bypassed_is_transparent() {
        let (params, mut p) = processor();
        for id in [ParamId::LowCutBypassed, ParamId::PeakBypassed, ParamId::HighCutBypassed] {
            params.set_bool(id, true);
        }
        p.prepare(ProcessContext::new(44100.0, 1, 256)).unwrap();

        let input = sine(440.0, 256);
        let mut output = input.clone();
        p.process_planar(&mut [&mut output[..]]);
        assert_eq!(input, output);
    }

    #[test]
    fn test_reset_and_reprepare() {
        let (_, mut p) = processor();
        p.prepare(ProcessContext::new(48000.0, 2, 64)).unwrap();
        let mut buffer = vec![0.1; 128];
        p.process_interleaved(&mut buffer, 2);
        p.reset();

        p.prepare(ProcessContext::new(96000.0, 1, 32)).unwrap();
        assert_eq!(p.context().unwrap().sample_rate, 96000.0);
        assert_eq!(p.chain().unwrap().sample_rate(), 96000.0);
        assert_eq!(p.name(), "Kestrel EQ");
    }
}
