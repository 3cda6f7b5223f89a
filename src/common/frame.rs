// src/common/frame.rs

//! Line levels and the 10-bit SDI-12 character frame.
//!
//! SDI-12 uses inverse logic on the data line:
//!
//! | LINE CONDITION | BINARY STATE | VOLTAGE RANGE     |
//! |----------------|--------------|-------------------|
//! | marking        |      1       | -0.5 to 1.0 volts |
//! | spacing        |      0       | 3.5 to 5.5 volts  |
//!
//! Each character is sent as 1 start bit, 7 data bits (LSB first),
//! 1 even parity bit and 1 stop bit.

use embedded_hal::digital::PinState;

/// Number of data bits in a character.
pub const DATA_BITS: u8 = 7;
/// Total number of bits in one character frame.
pub const FRAME_BITS: u8 = 10;

/// Voltage level of the data line.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LineLevel {
    /// Low voltage: marking, logical 1.
    Low,
    /// High voltage: spacing, logical 0.
    High,
}

impl LineLevel {
    /// Line condition for a logical 1 (and for the stop bit / idle line).
    pub const MARKING: LineLevel = LineLevel::Low;
    /// Line condition for a logical 0 (and for the start bit / break).
    pub const SPACING: LineLevel = LineLevel::High;

    /// Converts a logical bit value into its (inverted) line level.
    #[inline]
    pub const fn for_bit(bit: bool) -> Self {
        if bit {
            Self::MARKING
        } else {
            Self::SPACING
        }
    }

    #[inline]
    pub const fn is_marking(self) -> bool {
        matches!(self, LineLevel::Low)
    }

    #[inline]
    pub const fn inverted(self) -> Self {
        match self {
            LineLevel::Low => LineLevel::High,
            LineLevel::High => LineLevel::Low,
        }
    }
}

impl From<PinState> for LineLevel {
    fn from(state: PinState) -> Self {
        match state {
            PinState::Low => LineLevel::Low,
            PinState::High => LineLevel::High,
        }
    }
}

impl From<LineLevel> for PinState {
    fn from(level: LineLevel) -> Self {
        match level {
            LineLevel::Low => PinState::Low,
            LineLevel::High => PinState::High,
        }
    }
}

/// Direction of the data pin.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PinMode {
    /// High impedance, the line is released to the bus.
    Input,
    /// The pin drives the line.
    Output,
}

/// Returns the even parity bit (0 or 1) for the low 7 bits of `value`.
#[inline]
pub const fn parity_even_bit(value: u8) -> u8 {
    ((value & 0x7F).count_ones() & 1) as u8
}

/// A single character laid out as the 10 bits that go on the wire.
///
/// Bit 0 is the start bit, bits 1..=7 are the data bits LSB first,
/// bit 8 is the even parity bit and bit 9 is the stop bit.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CharFrame(u16);

impl CharFrame {
    /// Builds the frame for the low 7 bits of `byte`. Bit 7 is ignored.
    pub const fn new(byte: u8) -> Self {
        let data = (byte & 0x7F) as u16;
        let parity = parity_even_bit(byte) as u16;
        // start bit (0) | data | parity | stop bit (1)
        CharFrame((data << 1) | (parity << 8) | (1 << 9))
    }

    /// The logical value of bit `index` (0..10) of the frame.
    #[inline]
    pub const fn bit(&self, index: u8) -> bool {
        (self.0 >> index) & 1 == 1
    }

    /// The 7-bit character carried by this frame.
    #[inline]
    pub const fn data(&self) -> u8 {
        ((self.0 >> 1) & 0x7F) as u8
    }

    /// The parity bit carried by this frame.
    #[inline]
    pub const fn parity(&self) -> u8 {
        ((self.0 >> 8) & 1) as u8
    }

    /// Line levels for the frame, start bit first.
    pub fn levels(&self) -> impl Iterator<Item = LineLevel> + '_ {
        (0..FRAME_BITS).map(move |i| LineLevel::for_bit(self.bit(i)))
    }
}
