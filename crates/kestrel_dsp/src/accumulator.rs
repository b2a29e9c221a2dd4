//! Single-channel block accumulator
//!
//! Pulls one channel out of every processed audio buffer, gathers the
//! samples into fixed-size blocks and hands complete blocks to a [`Fifo`].
//! The audio thread owns the [`BlockAccumulator`]; the polling thread owns
//! the matching [`BlockReceiver`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{DspError, FifoError};
use crate::fifo::{Fifo, FifoReader, FifoWriter};

/// Audio-thread half: accumulates samples and enqueues complete blocks.
pub struct BlockAccumulator {
    block: Vec<f32>,
    fill: usize,
    writer: FifoWriter<Vec<f32>>,
    dropped: Arc<AtomicU32>,
}

/// Polling-thread half: pulls complete blocks.
pub struct BlockReceiver {
    reader: FifoReader<Vec<f32>>,
    block_size: usize,
    dropped: Arc<AtomicU32>,
}

/// Create a connected accumulator/receiver pair.
///
/// Every block holds `block_size` samples; up to `capacity` complete blocks
/// may wait for the receiver before new blocks are dropped.
pub fn block_channel(
    block_size: usize,
    capacity: usize,
) -> Result<(BlockAccumulator, BlockReceiver), DspError> {
    if block_size == 0 {
        return Err(DspError::InvalidBlockSize);
    }

    let (writer, reader) = Fifo::prepare(capacity, vec![0.0_f32; block_size])?.split();
    let dropped = Arc::new(AtomicU32::new(0));

    Ok((
        BlockAccumulator {
            block: vec![0.0; block_size],
            fill: 0,
            writer,
            dropped: Arc::clone(&dropped),
        },
        BlockReceiver {
            reader,
            block_size,
            dropped,
        },
    ))
}

impl BlockAccumulator {
    /// Push a contiguous run of samples from one channel.
    ///
    /// # Real-time Safety
    /// No allocations, no locks. A complete block that finds the FIFO full
    /// is discarded and counted; accumulation restarts either way.
    #[inline]
    pub fn push_samples(&mut self, samples: &[f32]) {
        let mut remaining = samples;
        while !remaining.is_empty() {
            let space = self.block.len() - self.fill;
            let take = space.min(remaining.len());
            self.block[self.fill..self.fill + take].copy_from_slice(&remaining[..take]);
            self.fill += take;
            remaining = &remaining[take..];

            if self.fill == self.block.len() {
                self.flush_block();
            }
        }
    }

    /// Push one channel of an interleaved buffer. Does nothing if `channel`
    /// is not present in a `channels`-wide frame.
    #[inline]
    pub fn push_interleaved(&mut self, buffer: &[f32], channels: usize, channel: usize) {
        if channel >= channels {
            return;
        }
        for frame in buffer.chunks_exact(channels) {
            self.block[self.fill] = frame[channel];
            self.fill += 1;
            if self.fill == self.block.len() {
                self.flush_block();
            }
        }
    }

    #[inline]
    fn flush_block(&mut self) {
        if self.writer.write(&self.block).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.fill = 0;
    }

    pub fn block_size(&self) -> usize {
        self.block.len()
    }

    /// Samples gathered towards the next block
    pub fn pending_samples(&self) -> usize {
        self.fill
    }

    /// Discard a partially gathered block
    pub fn reset(&mut self) {
        self.fill = 0;
    }
}

impl BlockReceiver {
    /// Number of complete blocks waiting to be pulled
    pub fn num_complete_blocks_available(&self) -> usize {
        self.reader.num_available()
    }

    /// Pull the oldest complete block into `out`
    pub fn pull_block(&mut self, out: &mut Vec<f32>) -> Result<(), FifoError> {
        self.reader.read(out)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Blocks dropped by the producer since the last call
    pub fn take_dropped(&self) -> u32 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}
