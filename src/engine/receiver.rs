// src/engine/receiver.rs

//! Character reconstruction from edge timestamps.
//!
//! A software serial receiver that samples in the middle of every bit would
//! keep the processor busy for the full 8.33 ms of each character. Instead the
//! pin interrupt hands every transition to [`CharReceiver::on_edge`], which
//! works out how many bit times passed since the previous edge and fills those
//! bits in one go. A run of identical bits produces no transition, so a single
//! edge can account for several bits. The work per edge is bounded by the frame
//! size and nothing here waits.
//!
//! `rx_state` tracks progress through the frame:
//!
//! | value | meaning                                  |
//! |-------|------------------------------------------|
//! | 0     | start bit seen                           |
//! | 1..=7 | data bit N-1 received                    |
//! | 8     | parity bit received                      |
//! | 9     | stop bit position                        |
//! | 255   | waiting for the next start bit           |
//!
//! The character is complete once the parity bit is known: the only bit left
//! is the stop bit, which is marking by definition.

use super::ring_buffer::RingBuffer;
use crate::common::frame::{parity_even_bit, LineLevel};

/// `rx_state` while waiting for a start bit; 0b11111111.
pub const WAITING_FOR_START_BIT: u8 = 0xFF;
/// `rx_state` once the parity bit has been received.
pub const PARITY_BIT: u8 = 8;
/// `rx_state` of the stop bit.
pub const STOP_BIT: u8 = 9;

/// Number of whole bit periods in `elapsed` ticks, rounded to nearest.
///
/// Rounding lets each edge drift by up to half a bit either way.
#[inline]
pub fn bit_times(elapsed: u32, ticks_per_bit: u32) -> u32 {
    let ticks_per_bit = ticks_per_bit.max(1);
    (elapsed / ticks_per_bit) + u32::from(elapsed % ticks_per_bit >= ticks_per_bit.div_ceil(2))
}

#[derive(Debug, Copy, Clone)]
pub struct CharReceiver {
    rx_state: u8,
    /// Single bit set at the position of the next bit to store.
    rx_mask: u8,
    /// Data bits 0..=6 plus the parity bit in bit 7.
    rx_value: u8,
    /// Timestamp of the previous accepted edge.
    prev_edge: u32,
    parity_failure: bool,
}

impl CharReceiver {
    pub const fn new() -> Self {
        CharReceiver {
            rx_state: WAITING_FOR_START_BIT,
            rx_mask: 0,
            rx_value: 0,
            prev_edge: 0,
            parity_failure: false,
        }
    }

    #[inline]
    pub const fn state(&self) -> u8 {
        self.rx_state
    }

    #[inline]
    pub const fn is_idle(&self) -> bool {
        self.rx_state == WAITING_FOR_START_BIT
    }

    /// Timestamp of the most recent edge that was accepted.
    #[inline]
    pub const fn last_edge(&self) -> u32 {
        self.prev_edge
    }

    /// `true` if the last completed character failed its parity check.
    ///
    /// The character is still delivered; the flag is overwritten by every
    /// character that follows.
    #[inline]
    pub const fn parity_failure(&self) -> bool {
        self.parity_failure
    }

    /// Drops any partially built character and waits for the next start bit.
    pub fn reset(&mut self) {
        self.rx_state = WAITING_FOR_START_BIT;
        self.rx_mask = 0;
        self.rx_value = 0;
    }

    /// Creates a blank slate for a new incoming character.
    #[inline]
    fn start_char(&mut self) {
        self.rx_state = 0;
        self.rx_mask = 0x01;
        self.rx_value = 0x00;
    }

    /// Stores `count` consecutive bits of the same line level.
    #[inline]
    fn shift_in(&mut self, count: u8, marking: bool) {
        for _ in 0..count {
            // inverse logic - LOW (marking) = 1
            if marking {
                self.rx_value |= self.rx_mask;
            }
            self.rx_mask <<= 1;
        }
    }

    /// Processes one transition of the data line.
    ///
    /// `level` is the line level sampled right after the transition and `now`
    /// the timer value read on entry into the interrupt. Completed characters
    /// are pushed into `sink`.
    pub fn on_edge<const N: usize>(
        &mut self,
        level: LineLevel,
        now: u32,
        ticks_per_bit: u32,
        sink: &RingBuffer<N>,
    ) {
        if self.rx_state == WAITING_FOR_START_BIT {
            self.prev_edge = now;
            // Only a change to spacing can be a start bit.
            if level == LineLevel::SPACING {
                self.start_char();
            }
            return;
        }

        let elapsed = now.wrapping_sub(self.prev_edge);
        let rx_bits = bit_times(elapsed, ticks_per_bit);
        if rx_bits == 0 {
            // Glitch shorter than half a bit; keep timing from the last real edge.
            return;
        }
        self.prev_edge = now;

        // Bits left up to and including the stop bit. rx_state is 0..=7 here.
        let bits_left = STOP_BIT - self.rx_state;
        let next_char_started = rx_bits > u32::from(bits_left);
        let bits_this_frame = if next_char_started {
            bits_left
        } else {
            rx_bits as u8
        };

        // The line held the opposite level for every bit since the previous
        // edge; that run ended where the new level starts.
        let held_marking = !level.is_marking();
        if next_char_started {
            self.shift_in(PARITY_BIT - self.rx_state, held_marking);
        } else {
            self.shift_in(bits_this_frame - 1, held_marking);
            if self.rx_state + bits_this_frame <= PARITY_BIT {
                self.shift_in(1, level.is_marking());
            }
        }
        self.rx_state += bits_this_frame;

        if self.rx_state >= PARITY_BIT {
            self.finish_char(sink);
            if next_char_started && level == LineLevel::SPACING {
                // The run went past the stop bit, so this spacing edge is
                // the start bit of the next character.
                self.start_char();
            } else {
                self.rx_state = WAITING_FOR_START_BIT;
            }
        }
    }

    /// Checks the parity bit and puts the finished character into the buffer.
    fn finish_char<const N: usize>(&mut self, sink: &RingBuffer<N>) {
        let data = self.rx_value & 0x7F;
        if cfg!(not(feature = "ignore-parity")) {
            let rx_parity = (self.rx_value >> 7) & 0x01;
            self.parity_failure = rx_parity != parity_even_bit(data);
        }
        sink.write(data);
        self.rx_mask = 0;
        self.rx_value = 0;
    }

    /// Idle-timeout policy, run from foreground context.
    ///
    /// If a character is in progress and no edge has been seen for more than
    /// `timeout_ticks`, the partial character is discarded. Returns `true`
    /// if that happened.
    ///
    /// An edge stamped after `now` gives an elapsed time above half the timer
    /// range and never counts as stale.
    pub fn expire(&mut self, now: u32, timeout_ticks: u32) -> bool {
        if self.is_idle() {
            return false;
        }
        let elapsed = now.wrapping_sub(self.prev_edge);
        if elapsed > timeout_ticks && elapsed <= u32::MAX / 2 {
            self.reset();
            true
        } else {
            false
        }
    }
}

impl Default for CharReceiver {
    fn default() -> Self {
        Self::new()
    }
}
