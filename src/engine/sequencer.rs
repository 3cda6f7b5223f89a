// src/engine/sequencer.rs

//! Outbound bus sequencing: wake, bit-banged characters, commands and responses.
//!
//! Everything here blocks for protocol-mandated times, from one bit (833 us)
//! up to a full wake sequence (about 20 ms plus any extra wake delay).

use super::{LineState, Sdi12};
use crate::common::{
    crc::{calculate_crc16, encode_crc_ascii, strip_line_ending},
    error::Sdi12Error,
    frame::{CharFrame, LineLevel},
    hal_traits::{Sdi12Pin, Sdi12Timer},
    timing,
};
use embedded_hal::delay::DelayNs;
use log::{debug, trace};

const BIT_NANOS: u32 = timing::BIT_DURATION.as_nanos() as u32;

impl<P, T, D, const N: usize> Sdi12<'_, P, T, D, N>
where
    P: Sdi12Pin,
    T: Sdi12Timer,
    D: DelayNs,
{
    /// Drives `level` and holds it for `micros`.
    fn hold_level(&mut self, level: LineLevel, micros: u32) -> Result<(), Sdi12Error<P::Error>> {
        let pin = self.pin.as_mut().ok_or(Sdi12Error::PinNotConfigured)?;
        pin.set_level(level).map_err(Sdi12Error::Io)?;
        self.delay.delay_us(micros);
        Ok(())
    }

    /// Wakes every sensor on the bus.
    ///
    /// Sends a break (spacing for 12.1 ms plus `extra_wake_ms`) followed by
    /// 8.4 ms of marking. Leaves the instance in `Transmitting`, ready for the
    /// first command character.
    ///
    /// # Arguments
    ///
    /// * `extra_wake_ms` - Additional break time for slow sensors. Must be
    ///   below 100, since sensors must wake within 100 ms of a break.
    pub fn wake(&mut self, extra_wake_ms: u8) -> Result<(), Sdi12Error<P::Error>> {
        self.ensure_active()?;
        if u64::from(extra_wake_ms) >= timing::SENSOR_WAKEUP_TIME_MAX.as_millis() as u64 {
            return Err(Sdi12Error::WakeDelayTooLong(extra_wake_ms));
        }
        self.set_state(LineState::Transmitting)?;
        debug!("SDI-12 wake: break {} us + {} ms", timing::LINE_BREAK_MICROS, extra_wake_ms);

        self.hold_level(LineLevel::SPACING, timing::LINE_BREAK_MICROS)?;
        self.delay.delay_ms(u32::from(extra_wake_ms));
        self.hold_level(LineLevel::MARKING, timing::LINE_MARK_MICROS)
    }

    /// Sends one 10-bit frame. The line must already be in `Transmitting`.
    fn write_char(&mut self, byte: u8) -> Result<(), Sdi12Error<P::Error>> {
        let frame = CharFrame::new(byte);
        let pin = self.pin.as_mut().ok_or(Sdi12Error::PinNotConfigured)?;
        let delay = &mut self.delay;
        trace!("SDI-12 tx {:#04x}", frame.data());

        // Other interrupts would stretch individual bits.
        critical_section::with(|_| -> Result<(), P::Error> {
            for level in frame.levels() {
                pin.set_level(level)?;
                delay.delay_ns(BIT_NANOS);
            }
            Ok(())
        })
        .map_err(Sdi12Error::Io)
    }

    /// Sends a single character and goes back to listening.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), Sdi12Error<P::Error>> {
        self.ensure_active()?;
        self.set_state(LineState::Transmitting)?;
        self.write_char(byte)?;
        self.set_state(LineState::Listening)
    }

    /// Wakes the bus, sends `command` and starts listening for the answer.
    ///
    /// # Arguments
    ///
    /// * `command` - The full command, e.g. `b"0R0!"`.
    /// * `extra_wake_ms` - See [`wake`](Self::wake).
    pub fn send_command(&mut self, command: &[u8], extra_wake_ms: u8) -> Result<(), Sdi12Error<P::Error>> {
        self.wake(extra_wake_ms)?;
        for &byte in command {
            self.write_char(byte)?;
        }
        debug!("SDI-12 sent command ({} bytes)", command.len());
        self.set_state(LineState::Listening)
    }

    /// [`send_command`](Self::send_command) with the wake delay taken from
    /// [`Sdi12Config::wake_delay_ms`](crate::Sdi12Config::wake_delay_ms).
    pub fn send_command_default_wake(&mut self, command: &[u8]) -> Result<(), Sdi12Error<P::Error>> {
        let extra_wake_ms = self.config.wake_delay_ms;
        self.send_command(command, extra_wake_ms)
    }

    /// Sends a sensor response, terminated with `<CR><LF>`.
    ///
    /// Any line ending already present in `response` is dropped. With
    /// `add_crc`, the three CRC characters covering the response are sent
    /// before `<CR><LF>`.
    pub fn send_response(&mut self, response: &[u8], add_crc: bool) -> Result<(), Sdi12Error<P::Error>> {
        self.ensure_active()?;
        let payload = strip_line_ending(response);
        self.set_state(LineState::Transmitting)?;
        self.hold_level(LineLevel::MARKING, timing::LINE_MARK_MICROS)?;

        for &byte in payload {
            self.write_char(byte)?;
        }
        if add_crc {
            for byte in encode_crc_ascii(calculate_crc16(payload)) {
                self.write_char(byte)?;
            }
        }
        self.write_char(b'\r')?;
        self.write_char(b'\n')?;
        debug!("SDI-12 sent response ({} bytes, crc: {})", payload.len(), add_crc);
        self.set_state(LineState::Listening)
    }

    /// Nothing to do: every write returns only once its last bit is on the wire.
    #[inline]
    pub fn flush(&mut self) {}
}
