//! Kestrel - offline render harness
//!
//! Stands in for a plugin host: prepares the EQ, renders a synthetic
//! stereo signal block by block at real-time pace while automating the
//! peak band, runs the analyzer thread alongside, and prints a JSON
//! summary of what the display side received.
//!
//! Usage: `kestrel [engine-config.json]`

use std::f32::consts::PI;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use kestrel_core::{
    Analyzer, AnalyzerThread, BusLayout, EngineConfig, EqProcessor, Event, ParamId, ParameterStore,
    ProcessContext, Slope,
};
use kestrel_dsp::sweep_frequency;

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZE: usize = 512;
const CHANNELS: usize = 2;
const RENDER_SECONDS: f32 = 2.0;

/// Test signal: three tones, the right channel an octave above the left
fn synth_block(buffer: &mut [f32], start_frame: usize) {
    for (i, frame) in buffer.chunks_exact_mut(CHANNELS).enumerate() {
        let t = (start_frame + i) as f32 / SAMPLE_RATE;
        let tones = |scale: f32| {
            [100.0, 1000.0, 8000.0]
                .iter()
                .map(|&hz| 0.2 * (2.0 * PI * hz * scale * t).sin())
                .sum::<f32>()
        };
        frame[0] = tones(1.0);
        frame[1] = tones(2.0);
    }
}

fn load_config() -> Result<EngineConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let config: EngineConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path))?;
    info!("Loaded configuration from {}", path);
    Ok(config)
}

fn main() -> Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kestrel=debug")),
        )
        .init();

    info!("Starting Kestrel render harness");

    let config = load_config()?;
    if let Err(e) = config.validate() {
        bail!("invalid configuration: {}", e);
    }

    if !EqProcessor::is_layout_supported(BusLayout::stereo()) {
        bail!("stereo layout rejected");
    }

    let params = Arc::new(ParameterStore::new());
    params.set(ParamId::LowCutFreq, 60.0);
    params.set_slope(ParamId::LowCutSlope, Slope::Db24);
    params.set(ParamId::HighCutFreq, 12000.0);
    params.set_slope(ParamId::HighCutSlope, Slope::Db48);
    params.set(ParamId::PeakGain, 6.0);

    let mut processor = EqProcessor::new(Arc::clone(&params), config.clone());
    let taps = processor.prepare(ProcessContext::new(SAMPLE_RATE, CHANNELS, BLOCK_SIZE))?;
    let (analyzer, mut frame_queues) = Analyzer::new(taps, &config.analyzer)?;
    let analyzer_thread = AnalyzerThread::spawn(analyzer, &config.analyzer)?;

    let total_blocks = (RENDER_SECONDS * SAMPLE_RATE) as usize / BLOCK_SIZE;
    let block_duration = Duration::from_secs_f32(BLOCK_SIZE as f32 / SAMPLE_RATE);
    let mut buffer = vec![0.0_f32; BLOCK_SIZE * CHANNELS];

    let mut latest_curve: Option<(Vec<f32>, Vec<f32>)> = None;
    let mut frames_seen = vec![0_usize; CHANNELS];
    let mut latest_frames = vec![Vec::new(); CHANNELS];
    let mut dropped_frames = 0_usize;
    let mut dropped_blocks = 0_u32;

    for block in 0..total_blocks {
        // Sweep the peak across the spectrum during the render
        let proportion = block as f32 / total_blocks as f32;
        params.set_normalized(ParamId::PeakFreq, 0.2 + 0.6 * proportion);

        synth_block(&mut buffer, block * BLOCK_SIZE);
        processor.process_interleaved(&mut buffer, CHANNELS);

        while let Some(event) = analyzer_thread.poll_event() {
            match event {
                Event::ResponseCurveUpdated {
                    frequencies,
                    magnitudes_db,
                } => latest_curve = Some((frequencies, magnitudes_db)),
                Event::SpectrumFramesReady { channel, frames } => {
                    frames_seen[channel] += frames;
                    frame_queues[channel].pull_latest(&mut latest_frames[channel]);
                }
                Event::FramesDropped { count, .. } => dropped_frames += count,
                Event::BlocksDropped { count, .. } => dropped_blocks += count,
                other => debug!("Analyzer event: {:?}", other),
            }
        }

        thread::sleep(block_duration);
    }

    analyzer_thread.request_response_curve()?;
    if let Some(Event::ResponseCurveUpdated {
        frequencies,
        magnitudes_db,
    }) = analyzer_thread.wait_event_timeout(Duration::from_millis(500))
    {
        latest_curve = Some((frequencies, magnitudes_db));
    }
    drop(analyzer_thread);

    let chain = processor.chain()?;
    let snapshot = chain.snapshot();
    let curve_points = config.analyzer.response_points;
    let response: Vec<_> = (0..curve_points)
        .step_by((curve_points / 10).max(1))
        .map(|i| {
            let hz = sweep_frequency(i, curve_points);
            json!({ "frequency": hz, "db": snapshot.evaluate_response(hz) })
        })
        .collect();

    let spectra: Vec<_> = latest_frames
        .iter()
        .enumerate()
        .map(|(channel, frame)| {
            let peak_bin = frame
                .iter()
                .enumerate()
                .fold((0, f32::MIN), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) });
            json!({
                "channel": channel,
                "frames": frames_seen[channel],
                "peak_bin": peak_bin.0,
                "peak_db": peak_bin.1,
                "peak_hz": peak_bin.0 as f32 * SAMPLE_RATE / config.analyzer.fft_size as f32,
            })
        })
        .collect();

    let summary = json!({
        "blocks_rendered": total_blocks,
        "final_settings": {
            "peak_freq": params.get(ParamId::PeakFreq),
            "peak_gain_db": params.get(ParamId::PeakGain),
            "low_cut": params.display_value(ParamId::LowCutSlope),
            "high_cut": params.display_value(ParamId::HighCutSlope),
        },
        "response": response,
        "curve_points_received": latest_curve.as_ref().map(|(f, _)| f.len()).unwrap_or(0),
        "spectra": spectra,
        "frames_dropped": dropped_frames,
        "blocks_dropped": dropped_blocks,
    });

    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!("Render finished");
    Ok(())
}
