// src/common/hal_traits.rs

use super::frame::{LineLevel, PinMode};
use core::fmt::Debug;

/// Abstraction over the single SDI-12 data pin and its edge interrupt.
///
/// Blocking delays are not part of this trait; the engine takes an
/// `embedded_hal::delay::DelayNs` for break/mark holds and bit timing.
pub trait Sdi12Pin {
    /// Associated error type for pin operations.
    type Error: Debug;

    /// Switches the pin between driving the line and releasing it.
    fn set_mode(&mut self, mode: PinMode) -> Result<(), Self::Error>;

    /// Drives the line to `level`. Only meaningful in `PinMode::Output`.
    fn set_level(&mut self, level: LineLevel) -> Result<(), Self::Error>;

    /// Samples the current level of the line.
    fn level(&mut self) -> Result<LineLevel, Self::Error>;

    /// Arms or disarms the interrupt that fires on every transition of the pin.
    ///
    /// The handler registered for that interrupt must call
    /// `Sdi12::handle_interrupt` on the engine that owns this pin.
    fn set_edge_interrupt(&mut self, enabled: bool) -> Result<(), Self::Error>;
}

/// Free-running timestamp source used to measure the time between edges.
///
/// Implementations must be callable from interrupt context.
pub trait Sdi12Timer {
    /// Current value of the free-running counter. Expected to wrap.
    fn now(&self) -> u32;

    /// Length of one SDI-12 bit (1/1200 s) in counter ticks.
    fn ticks_per_bit(&self) -> u32;
}

impl<T: Sdi12Timer + ?Sized> Sdi12Timer for &T {
    fn now(&self) -> u32 {
        (**self).now()
    }

    fn ticks_per_bit(&self) -> u32 {
        (**self).ticks_per_bit()
    }
}
