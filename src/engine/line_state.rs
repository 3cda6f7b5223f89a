// src/engine/line_state.rs

use super::Sdi12;
use crate::common::{
    error::Sdi12Error,
    frame::{LineLevel, PinMode},
    hal_traits::{Sdi12Pin, Sdi12Timer},
};
use embedded_hal::delay::DelayNs;

/// Condition of the data line as seen by one instance.
///
/// | State        | Interrupts | Pin Mode | Drive   |
/// |--------------|------------|----------|---------|
/// | Disabled     | off        | input    | -       |
/// | Enabled      | off        | input    | -       |
/// | Holding      | off        | output   | low     |
/// | Transmitting | off        | output   | varying |
/// | Listening    | on         | input    | -       |
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LineState {
    Disabled,
    Enabled,
    /// Line held at marking, ready to send.
    Holding,
    Transmitting,
    /// Line released, edges go to the character reconstructor.
    Listening,
}

impl LineState {
    #[inline]
    pub const fn interrupts_enabled(self) -> bool {
        matches!(self, LineState::Listening)
    }

    pub const fn pin_mode(self) -> PinMode {
        match self {
            LineState::Holding | LineState::Transmitting => PinMode::Output,
            LineState::Disabled | LineState::Enabled | LineState::Listening => PinMode::Input,
        }
    }

    /// Level the line is driven to on entry, if any.
    pub const fn drive_level(self) -> Option<LineLevel> {
        match self {
            LineState::Holding => Some(LineLevel::MARKING),
            _ => None,
        }
    }
}

impl<P, T, D, const N: usize> Sdi12<'_, P, T, D, N>
where
    P: Sdi12Pin,
    T: Sdi12Timer,
    D: DelayNs,
{
    /// Reconfigures the pin for `state`.
    ///
    /// The interrupt is disarmed first and only re-armed once the pin is
    /// configured, all inside one critical section, so no edge caused by
    /// the reconfiguration reaches the reconstructor.
    pub(crate) fn set_state(&mut self, state: LineState) -> Result<(), Sdi12Error<P::Error>> {
        let Some(pin) = self.pin.as_mut() else {
            if state == LineState::Disabled {
                self.state = state;
                return Ok(());
            }
            return Err(Sdi12Error::PinNotConfigured);
        };

        let entering_listen = state == LineState::Listening && self.state != LineState::Listening;
        critical_section::with(|_| -> Result<(), P::Error> {
            pin.set_edge_interrupt(false)?;
            pin.set_mode(state.pin_mode())?;
            if let Some(level) = state.drive_level() {
                pin.set_level(level)?;
            }
            if entering_listen {
                self.bus.reset_receiver();
            }
            if state.interrupts_enabled() {
                pin.set_edge_interrupt(true)?;
            }
            Ok(())
        })
        .map_err(Sdi12Error::Io)?;

        self.state = state;
        Ok(())
    }

    /// Unconditionally returns to `Holding`, silencing the bus.
    pub fn force_hold(&mut self) -> Result<(), Sdi12Error<P::Error>> {
        self.set_state(LineState::Holding)
    }

    /// Unconditionally starts listening, e.g. when acting as a sensor.
    pub fn force_listen(&mut self) -> Result<(), Sdi12Error<P::Error>> {
        self.set_state(LineState::Listening)
    }
}
