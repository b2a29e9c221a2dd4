//! Lock-free Single-Producer/Single-Consumer FIFO of pre-sized blocks
//!
//! Built from two `rtrb` ring buffers: one carries filled slots from the
//! producer to the consumer, the other returns consumed slots to the
//! producer. Every slot is allocated once in [`Fifo::prepare`]; afterwards
//! `write` only copies into a recycled slot, so the real-time side never
//! allocates as long as items fit the template's capacity.
//!
//! # Architecture
//!
//! ```text
//!   FifoWriter ──filled──▶ FifoReader
//!       ▲                      │
//!       └────────free──────────┘
//! ```
//!
//! The writer and reader halves are separate types, so "one producer, one
//! consumer" is enforced by ownership rather than by convention.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::{DspError, FifoError};

/// Producer half of a [`Fifo`]. Owned by the real-time thread.
pub struct FifoWriter<T> {
    filled: Producer<T>,
    free: Consumer<T>,
    capacity: usize,
}

/// Consumer half of a [`Fifo`]. Owned by the polling thread.
pub struct FifoReader<T> {
    filled: Consumer<T>,
    free: Producer<T>,
    capacity: usize,
}

/// A prepared FIFO before it is split across threads.
///
/// Single-threaded code (tests, offline rendering) can use it directly;
/// everything else calls [`Fifo::split`].
pub struct Fifo<T> {
    writer: FifoWriter<T>,
    reader: FifoReader<T>,
}

impl<T: Clone> Fifo<T> {
    /// Create a FIFO with `capacity` empty slots, each a clone of `template`.
    ///
    /// `capacity` must be a non-zero power of two.
    pub fn prepare(capacity: usize, template: T) -> Result<Self, DspError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(DspError::InvalidFifoCapacity(capacity));
        }

        let (filled_tx, filled_rx) = RingBuffer::<T>::new(capacity);
        let (mut free_tx, free_rx) = RingBuffer::<T>::new(capacity);

        for _ in 0..capacity {
            free_tx
                .push(template.clone())
                .map_err(|_| DspError::InvalidFifoCapacity(capacity))?;
        }

        Ok(Self {
            writer: FifoWriter {
                filled: filled_tx,
                free: free_rx,
                capacity,
            },
            reader: FifoReader {
                filled: filled_rx,
                free: free_tx,
                capacity,
            },
        })
    }

    /// Hand the two halves to their threads
    pub fn split(self) -> (FifoWriter<T>, FifoReader<T>) {
        (self.writer, self.reader)
    }

    pub fn write(&mut self, item: &T) -> Result<(), FifoError> {
        self.writer.write(item)
    }

    pub fn read(&mut self, out: &mut T) -> Result<(), FifoError> {
        self.reader.read(out)
    }

    pub fn num_available(&self) -> usize {
        self.reader.num_available()
    }

    pub fn capacity(&self) -> usize {
        self.writer.capacity
    }
}

impl<T: Clone> FifoWriter<T> {
    /// Copy `item` into a free slot and publish it.
    ///
    /// # Real-time Safety
    /// O(1), never blocks. Fails with [`FifoError::Overflow`] when every
    /// slot is waiting to be read; nothing is written in that case.
    #[inline]
    pub fn write(&mut self, item: &T) -> Result<(), FifoError> {
        let mut slot = self.free.pop().map_err(|_| FifoError::Overflow)?;
        slot.clone_from(item);

        // The filled queue holds `capacity` items and only slots taken from
        // the free queue enter it, so it can never be full here.
        let pushed = self.filled.push(slot);
        debug_assert!(pushed.is_ok(), "filled queue cannot overflow");
        pushed.map_err(|_| FifoError::Overflow)
    }

    /// Number of slots a write could currently claim
    pub fn free_slots(&self) -> usize {
        self.free.slots()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> FifoReader<T> {
    /// Remove the oldest stored item, copying it into `out`.
    ///
    /// The slot goes back to the producer with its allocation intact, so
    /// `out` may grow here (on the consumer thread) but the producer never
    /// has to.
    #[inline]
    pub fn read(&mut self, out: &mut T) -> Result<(), FifoError> {
        let slot = self.filled.pop().map_err(|_| FifoError::Underflow)?;
        out.clone_from(&slot);

        let returned = self.free.push(slot);
        debug_assert!(returned.is_ok(), "free queue cannot overflow");
        Ok(())
    }

    /// Number of complete items waiting to be read
    pub fn num_available(&self) -> usize {
        self.filled.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.filled.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read every pending item, keeping only the newest in `out`.
    ///
    /// Returns the number of items consumed.
    pub fn read_latest(&mut self, out: &mut T) -> usize {
        let mut count = 0;
        while self.read(out).is_ok() {
            count += 1;
        }
        count
    }
}
