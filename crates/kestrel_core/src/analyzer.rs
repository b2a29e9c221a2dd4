//! Polling Analyzer
//!
//! Everything that turns the audio thread's FIFO output into data for the
//! display: one spectrum path per channel and the response curve.
//!
//! # Architecture
//!
//! ```text
//!                        Analyzer thread, every refresh interval
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  BlockReceiver ─▶ SpectrumEstimator ══FIFO══▶ SpectrumFrames (UI)   │
//! │  snapshot FIFO ─▶ ResponseCurve ──────Event─▶ UI                    │
//! └─────────────────────────────────────────────────────────────────────┘
//!        ▲ Command (crossbeam-channel)          │ Event (crossbeam-channel)
//!        └────────────────── UI thread ◀────────┘
//! ```
//!
//! The audio thread never waits on any of this. If the analyzer stops,
//! the processor's FIFOs fill up and further writes are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info, warn};

use kestrel_dsp::{
    BlockReceiver, ChainSnapshot, FifoReader, ResponseCurve, SpectrumEstimator,
    SpectrumFrames,
};

use crate::config::AnalyzerConfig;
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, Event};
use crate::processor::AnalyzerTaps;

/// Events queued for the UI before new ones are dropped
const EVENT_QUEUE_CAPACITY: usize = 256;

/// One channel's path from processed audio to spectrum frames
struct SpectrumPath {
    blocks: BlockReceiver,
    estimator: SpectrumEstimator,
    block: Vec<f32>,
}

impl SpectrumPath {
    fn drain(&mut self) -> ChannelReport {
        let mut report = ChannelReport {
            blocks_dropped: self.blocks.take_dropped(),
            ..Default::default()
        };

        while self.blocks.num_complete_blocks_available() > 0 {
            if self.blocks.pull_block(&mut self.block).is_err() {
                break;
            }
            report.blocks_analyzed += 1;
            self.estimator.push_block(&self.block);

            match self.estimator.produce_frame() {
                Ok(true) => report.frames_produced += 1,
                Ok(false) => {}
                Err(_) => report.frames_dropped += 1,
            }
        }

        report
    }
}

/// What one channel did during a tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelReport {
    pub blocks_analyzed: usize,
    pub frames_produced: usize,
    /// Frames lost because the UI had not drained the frame queue
    pub frames_dropped: usize,
    /// Blocks lost on the audio thread since the previous tick
    pub blocks_dropped: u32,
}

/// Result of one [`Analyzer::tick`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub channels: Vec<ChannelReport>,
    /// The response curve was recomputed from a new snapshot
    pub curve_updated: bool,
}

/// Drains the processor's queues and produces spectra and response curves.
///
/// Not real-time: run it from a UI timer or an [`AnalyzerThread`].
pub struct Analyzer {
    paths: Vec<SpectrumPath>,
    snapshots: FifoReader<ChainSnapshot>,
    incoming: ChainSnapshot,
    curve: ResponseCurve,
}

impl Analyzer {
    /// Build an analyzer over `taps`. Returns it together with one frame
    /// queue per channel for the UI to pull from.
    pub fn new(taps: AnalyzerTaps, config: &AnalyzerConfig) -> EngineResult<(Self, Vec<SpectrumFrames>)> {
        config.validate().map_err(EngineError::ConfigError)?;
        let size = config.analysis_size()?;

        let mut paths = Vec::with_capacity(taps.blocks.len());
        let mut frames = Vec::with_capacity(taps.blocks.len());
        for blocks in taps.blocks {
            let (estimator, frame_queue) =
                SpectrumEstimator::prepare(size, config.frame_fifo_capacity, config.floor_db)?;
            paths.push(SpectrumPath {
                block: vec![0.0; blocks.block_size()],
                blocks,
                estimator,
            });
            frames.push(frame_queue);
        }

        debug!(
            "Analyzer ready: {} channel(s), {} point FFT, {} response points",
            paths.len(),
            size.len(),
            config.response_points
        );

        Ok((
            Self {
                paths,
                snapshots: taps.snapshots,
                incoming: ChainSnapshot::bypassed(taps.sample_rate),
                curve: ResponseCurve::new(config.response_points, taps.sample_rate),
            },
            frames,
        ))
    }

    /// Drain everything pending: every complete block of every channel, and
    /// the newest chain snapshot.
    pub fn tick(&mut self) -> TickReport {
        let channels = self.paths.iter_mut().map(SpectrumPath::drain).collect();

        let curve_updated =
            self.snapshots.read_latest(&mut self.incoming) > 0 && self.curve.update(&self.incoming);

        TickReport {
            channels,
            curve_updated,
        }
    }

    /// Response of the latest chain at `frequency`, in dB
    pub fn evaluate_response(&self, frequency: f32) -> f32 {
        self.curve.evaluate_response(frequency)
    }

    pub fn response_curve(&self) -> &ResponseCurve {
        &self.curve
    }

    pub fn num_channels(&self) -> usize {
        self.paths.len()
    }

    /// Forget every channel's analysis history
    pub fn reset_spectrum(&mut self) {
        for path in &mut self.paths {
            path.estimator.reset();
        }
    }
}

/// Runs an [`Analyzer`] on its own thread at the configured refresh rate
pub struct AnalyzerThread {
    /// Channel for sending commands to the analyzer thread
    command_sender: Sender<Command>,

    /// Channel for receiving events from the analyzer thread
    event_receiver: Receiver<Event>,

    /// Handle to the analyzer thread
    handle: Option<JoinHandle<()>>,

    /// Flag to signal shutdown
    shutdown_flag: Arc<AtomicBool>,

    /// Whether the loop is currently running
    is_running: Arc<AtomicBool>,
}

impl AnalyzerThread {
    /// Move `analyzer` onto a new thread ticking every `refresh_interval_ms`
    pub fn spawn(analyzer: Analyzer, config: &AnalyzerConfig) -> EngineResult<Self> {
        let (command_sender, command_receiver) = bounded::<Command>(32);
        let (event_sender, event_receiver) = bounded::<Event>(EVENT_QUEUE_CAPACITY);

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let is_running = Arc::new(AtomicBool::new(false));

        // Clone for analyzer thread
        let shutdown_clone = Arc::clone(&shutdown_flag);
        let running_clone = Arc::clone(&is_running);
        let interval = Duration::from_millis(config.refresh_interval_ms.max(1));

        let handle = thread::Builder::new()
            .name("kestrel-analyzer".into())
            .spawn(move || {
                Self::analyzer_thread_main(
                    analyzer,
                    command_receiver,
                    event_sender,
                    shutdown_clone,
                    running_clone,
                    interval,
                );
            })
            .map_err(|e| EngineError::ThreadSpawnError(e.to_string()))?;

        Ok(Self {
            command_sender,
            event_receiver,
            handle: Some(handle),
            shutdown_flag,
            is_running,
        })
    }

    /// Ask for the current response curve (answered with ResponseCurveUpdated)
    pub fn request_response_curve(&self) -> EngineResult<()> {
        self.send_command(Command::RequestResponseCurve)
    }

    /// Clear every channel's analysis history
    pub fn reset_spectrum(&self) -> EngineResult<()> {
        self.send_command(Command::ResetSpectrum)
    }

    /// Check if the analyzer loop is running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Get next event, giving up after `timeout`
    pub fn wait_event_timeout(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Send command to analyzer thread
    fn send_command(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::ChannelSendError)
    }

    fn emit(events: &Sender<Event>, event: Event) {
        if let Err(TrySendError::Full(event)) = events.try_send(event) {
            debug!("Event queue full, dropping {:?}", event);
        }
    }

    fn curve_event(analyzer: &Analyzer) -> Event {
        let curve = analyzer.response_curve();
        Event::ResponseCurveUpdated {
            frequencies: curve.frequencies().to_vec(),
            magnitudes_db: curve.magnitudes_db().to_vec(),
        }
    }

    /// Analyzer thread main loop
    fn analyzer_thread_main(
        mut analyzer: Analyzer,
        command_receiver: Receiver<Command>,
        event_sender: Sender<Event>,
        shutdown_flag: Arc<AtomicBool>,
        is_running: Arc<AtomicBool>,
        interval: Duration,
    ) {
        info!("Analyzer thread started");
        is_running.store(true, Ordering::SeqCst);
        Self::emit(&event_sender, Event::Started);

        let mut next_tick = Instant::now();

        while !shutdown_flag.load(Ordering::SeqCst) {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            match command_receiver.recv_timeout(timeout) {
                Ok(Command::RequestResponseCurve) => {
                    Self::emit(&event_sender, Self::curve_event(&analyzer));
                }
                Ok(Command::ResetSpectrum) => {
                    debug!("Resetting spectrum history");
                    analyzer.reset_spectrum();
                }
                Ok(Command::Shutdown) => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Command channel closed, stopping analyzer");
                    break;
                }
            }

            if Instant::now() < next_tick {
                continue;
            }
            next_tick += interval;
            // Fell far behind (e.g. suspended): don't try to catch up
            let now = Instant::now();
            if next_tick < now {
                next_tick = now + interval;
            }

            let report = analyzer.tick();

            if report.curve_updated {
                debug!("Response curve recomputed");
                Self::emit(&event_sender, Self::curve_event(&analyzer));
            }

            for (channel, stats) in report.channels.iter().enumerate() {
                if stats.frames_produced > 0 {
                    Self::emit(
                        &event_sender,
                        Event::SpectrumFramesReady {
                            channel,
                            frames: stats.frames_produced,
                        },
                    );
                }
                if stats.frames_dropped > 0 {
                    warn!(
                        "Channel {}: {} spectrum frame(s) dropped, frame queue full",
                        channel, stats.frames_dropped
                    );
                    Self::emit(
                        &event_sender,
                        Event::FramesDropped {
                            channel,
                            count: stats.frames_dropped,
                        },
                    );
                }
                if stats.blocks_dropped > 0 {
                    warn!(
                        "Channel {}: {} block(s) dropped on the audio thread",
                        channel, stats.blocks_dropped
                    );
                    Self::emit(
                        &event_sender,
                        Event::BlocksDropped {
                            channel,
                            count: stats.blocks_dropped,
                        },
                    );
                }
            }
        }

        is_running.store(false, Ordering::SeqCst);
        Self::emit(&event_sender, Event::Stopped);
        info!("Analyzer thread stopped");
    }
}

impl Drop for AnalyzerThread {
    fn drop(&mut self) {
        // Signal shutdown
        self.shutdown_flag.store(true, Ordering::SeqCst);

        // Wake the loop if it is waiting; a full queue is fine, the flag is set
        let _ = self.command_sender.try_send(Command::Shutdown);

        // Wait for analyzer thread to finish
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
