// src/engine/stream.rs

//! Byte-stream access to received characters.

use super::Sdi12;
use crate::common::{
    error::Sdi12Error,
    hal_traits::{Sdi12Pin, Sdi12Timer},
    timing,
};
use core::fmt::Debug;
use core::time::Duration;
use embedded_hal::delay::DelayNs;
use log::warn;

/// A source of received characters with a configurable timeout value.
///
/// The timeout value is what [`read_or_timeout`](Self::read_or_timeout)
/// returns when nothing arrives in time. It defaults to -9999, which no sensor
/// reading can be confused with, unlike 0.
pub trait ByteSource {
    /// Associated error type of the underlying pin.
    type Error: Debug;

    /// Number of unread characters, or `Err(Sdi12Error::RxOverflow)` if any
    /// were dropped since the buffer was last cleared.
    fn available(&mut self) -> Result<usize, Sdi12Error<Self::Error>>;

    /// Next unread character, without consuming it.
    fn peek(&mut self) -> Option<u8>;

    /// Consumes the next unread character.
    fn read(&mut self) -> Option<u8>;

    /// Discards all unread characters and clears the overflow flag.
    fn clear_buffer(&mut self);

    fn timeout_value(&self) -> i16;

    /// Waits up to the stream timeout for a character.
    fn read_timeout(&mut self) -> Result<u8, Sdi12Error<Self::Error>>;

    /// Like [`read_timeout`](Self::read_timeout), returning the timeout value
    /// instead of an error.
    fn read_or_timeout(&mut self) -> i16 {
        match self.read_timeout() {
            Ok(byte) => i16::from(byte),
            Err(_) => self.timeout_value(),
        }
    }
}

impl<P, T, D, const N: usize> Sdi12<'_, P, T, D, N>
where
    P: Sdi12Pin,
    T: Sdi12Timer,
    D: DelayNs,
{
    /// Applies the idle timeout to a character stuck half way.
    fn expire_stale_char(&self) {
        if !self.bus.is_active(self.id) {
            return;
        }
        let timeout_ticks = timing::duration_to_ticks(self.config.idle_timeout, self.timer.ticks_per_bit());
        if self.bus.expire_receiver(|| self.timer.now(), timeout_ticks) {
            warn!(
                "SDI-12 instance {}: no edge for {:?}, partial character dropped",
                self.id.get(),
                self.config.idle_timeout
            );
        }
    }

    /// Non-blocking read.
    pub fn read_nb(&mut self) -> nb::Result<u8, Sdi12Error<P::Error>> {
        self.drop_stale_listen()?;
        self.expire_stale_char();
        self.bus.buffer().read().ok_or(nb::Error::WouldBlock)
    }

    /// Repeats `f` until it stops returning `WouldBlock`, for at most `timeout`.
    ///
    /// Time is counted in polling intervals spent in the delay, so the result
    /// does not depend on the width or rate of the timer.
    fn poll_with_timeout<R, F>(&mut self, timeout: Duration, mut f: F) -> Result<R, Sdi12Error<P::Error>>
    where
        F: FnMut(&mut Self) -> nb::Result<R, Sdi12Error<P::Error>>,
    {
        let mut waited = Duration::ZERO;
        let poll = Duration::from_micros(u64::from(timing::READ_POLL_MICROS));
        loop {
            match f(&mut *self) {
                Ok(result) => return Ok(result),
                Err(nb::Error::WouldBlock) => {
                    if waited >= timeout {
                        return Err(Sdi12Error::Timeout);
                    }
                    self.delay.delay_us(timing::READ_POLL_MICROS);
                    waited += poll;
                }
                Err(nb::Error::Other(e)) => return Err(e),
            }
        }
    }

    /// Reads one line, up to and including `<CR><LF>`, into `buffer`.
    ///
    /// Every character, the first included, may take up to the stream timeout
    /// to arrive. Some characters are only complete once the next start bit
    /// shows up, so two buffer writes can be 12 bit times plus two
    /// inter-character gaps apart even on a well-behaved bus.
    ///
    /// # Returns
    ///
    /// * `Ok(line)` including the line ending.
    /// * `Err(Sdi12Error::Timeout)` if nothing arrived at all.
    /// * `Err(Sdi12Error::InvalidFormat)` if the line stopped before `<CR><LF>`.
    /// * `Err(Sdi12Error::BufferOverflow)` if `buffer` is too small.
    pub fn read_line<'buf>(&mut self, buffer: &'buf mut [u8]) -> Result<&'buf [u8], Sdi12Error<P::Error>> {
        let mut bytes_read = 0;
        loop {
            if bytes_read >= buffer.len() {
                return Err(Sdi12Error::BufferOverflow {
                    needed: bytes_read + 1,
                    got: buffer.len(),
                });
            }

            let timeout = self.config.stream_timeout;
            match self.poll_with_timeout(timeout, |s| s.read_nb()) {
                Ok(byte) => {
                    buffer[bytes_read] = byte;
                    bytes_read += 1;

                    if bytes_read >= 2 && buffer[bytes_read - 2] == b'\r' && buffer[bytes_read - 1] == b'\n' {
                        return Ok(&buffer[..bytes_read]);
                    }
                }
                Err(Sdi12Error::Timeout) if bytes_read > 0 => return Err(Sdi12Error::InvalidFormat),
                Err(e) => return Err(e),
            }
        }
    }
}

impl<P, T, D, const N: usize> ByteSource for Sdi12<'_, P, T, D, N>
where
    P: Sdi12Pin,
    T: Sdi12Timer,
    D: DelayNs,
{
    type Error = P::Error;

    fn available(&mut self) -> Result<usize, Sdi12Error<P::Error>> {
        self.drop_stale_listen()?;
        self.expire_stale_char();
        let result = self.bus.buffer().available();
        if matches!(result, Err(Sdi12Error::RxOverflow)) && !self.overflow_reported {
            warn!("SDI-12 receive buffer overflowed, characters were dropped");
            self.overflow_reported = true;
        }
        result
    }

    fn peek(&mut self) -> Option<u8> {
        self.expire_stale_char();
        self.bus.buffer().peek()
    }

    fn read(&mut self) -> Option<u8> {
        self.read_nb().ok()
    }

    fn clear_buffer(&mut self) {
        self.bus.buffer().clear();
        self.overflow_reported = false;
    }

    fn timeout_value(&self) -> i16 {
        self.config.timeout_value
    }

    fn read_timeout(&mut self) -> Result<u8, Sdi12Error<P::Error>> {
        let timeout = self.config.stream_timeout;
        self.poll_with_timeout(timeout, |s| s.read_nb())
    }
}
