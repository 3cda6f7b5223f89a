// src/engine/ring_buffer.rs

//! Fixed-capacity receive queue shared by every SDI-12 instance.
//!
//! The buffer is a single-producer / single-consumer queue:
//!
//! * `head` is written only by the producer ([`RingBuffer::write`], interrupt context),
//! * `tail` is written only by the consumer (`peek`/`read`, foreground context),
//! * `overflow` is set by the producer and cleared only by [`RingBuffer::clear`].
//!
//! Every field is a naturally atomic word, so no lock is needed for the
//! producer/consumer hand-off. `clear` touches both indices and therefore runs
//! inside a critical section.
//!
//! Indices run over `0..2N` so a completely full buffer (`N` unread bytes) can
//! be told apart from an empty one; the slot is `index % N`.

use crate::common::Sdi12Error;
use core::fmt::Debug;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// Default capacity: the longest legal response,
/// address (1) + values (75) + CRC (3) + CR (1) + LF (1).
pub const SDI12_BUFFER_SIZE: usize = 81;

pub struct RingBuffer<const N: usize = SDI12_BUFFER_SIZE> {
    buf: [AtomicU8; N],
    head: AtomicUsize,
    tail: AtomicUsize,
    overflow: AtomicBool,
}

impl<const N: usize> RingBuffer<N> {
    const NONZERO: () = assert!(N > 0, "RingBuffer capacity must be non-zero");

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NONZERO;
        RingBuffer {
            buf: [const { AtomicU8::new(0) }; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            overflow: AtomicBool::new(false),
        }
    }

    /// Number of bytes the buffer can hold.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    fn len_between(head: usize, tail: usize) -> usize {
        (head + 2 * N - tail) % (2 * N)
    }

    /// Number of unread bytes.
    ///
    /// Returns `Err(Sdi12Error::RxOverflow)` if a byte was dropped since the last
    /// [`clear`](Self::clear); the error is sticky until then.
    pub fn available<E: Debug>(&self) -> Result<usize, Sdi12Error<E>> {
        if self.overflow.load(Ordering::Acquire) {
            return Err(Sdi12Error::RxOverflow);
        }
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        Ok(Self::len_between(head, tail))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Relaxed)
    }

    /// `true` once a byte has been dropped, until the next [`clear`](Self::clear).
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.overflow.load(Ordering::Acquire)
    }

    /// Next unread byte, without consuming it.
    pub fn peek(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        Some(self.buf[tail % N].load(Ordering::Relaxed))
    }

    /// Consumes and returns the next unread byte.
    pub fn read(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let byte = self.buf[tail % N].load(Ordering::Relaxed);
        self.tail.store((tail + 1) % (2 * N), Ordering::Release);
        Some(byte)
    }

    /// Stores a byte. Producer side only.
    ///
    /// A full buffer drops `byte`, sets the overflow flag and returns `false`.
    pub fn write(&self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if Self::len_between(head, tail) >= N {
            self.overflow.store(true, Ordering::Release);
            return false;
        }
        self.buf[head % N].store(byte, Ordering::Relaxed);
        self.head.store((head + 1) % (2 * N), Ordering::Release);
        true
    }

    /// Empties the buffer and clears the overflow flag.
    pub fn clear(&self) {
        critical_section::with(|_| {
            self.head.store(0, Ordering::Relaxed);
            self.tail.store(0, Ordering::Relaxed);
            self.overflow.store(false, Ordering::Release);
        });
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> core::fmt::Debug for RingBuffer<N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &N)
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .field("overflow", &self.overflow.load(Ordering::Relaxed))
            .finish()
    }
}
