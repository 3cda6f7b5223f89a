// src/common/timing.rs

use core::time::Duration;

// Note: Tolerances are generally +/- 0.40 ms according to SDI-12 v1.4 (Sec 7.0),
// except for inter-character time. The break and mark values below already
// include a small margin over the protocol minimums.

// === Byte Timing at 1200 Baud (7E1) ===
// 1 start bit + 7 data bits + 1 parity bit + 1 stop bit = 10 bits per byte
// Time per bit = 1 / 1200 seconds = 0.8333... ms
// Time per byte = 10 * (1 / 1200) seconds = 8.333... ms

/// Nominal width of a single bit at 1200 baud, in microseconds.
pub const BIT_WIDTH_MICROS: u32 = 833;
/// Nominal duration of a single bit at 1200 baud.
pub const BIT_DURATION: Duration = Duration::from_nanos(833_333);
/// Nominal duration of a single byte (10 bits total) at 1200 baud (7E1 format).
pub const BYTE_DURATION: Duration = Duration::from_micros(8333);

// === Break / Mark (Sec 7.0, 7.1) ===

/// Break sent before every command. The line is HIGH (spacing) for the break.
/// Protocol minimum is 12 ms.
pub const LINE_BREAK_MICROS: u32 = 12_100;
/// Marking sent after a break and before a response. The line is LOW.
/// Protocol minimum is 8.33 ms.
pub const LINE_MARK_MICROS: u32 = 8_400;

/// Maximum time for sensor to wake up after detecting a break and be ready for command start bit.
/// Any extra wake delay requested by the caller must stay below this.
pub const SENSOR_WAKEUP_TIME_MAX: Duration = Duration::from_millis(100);

// === Reception ===

/// Maximum marking time allowed between characters in a command or response.
/// (SDI-12 v1.4 says 1.66 ms with *no* tolerance).
pub const INTER_CHARACTER_MARKING_MAX: Duration = Duration::from_micros(1660);

/// Time without any edge after which a half-received character is abandoned.
pub const RX_IDLE_TIMEOUT: Duration = Duration::from_micros(8333 + 1660);

/// Time between lines for multi-line text responses (Sec 4.4.13.1). Max 150ms.
/// Used as the default stream timeout for timed reads.
pub const MULTILINE_INTER_LINE_DELAY_MAX: Duration = Duration::from_millis(150);

/// Polling interval used by timed reads while waiting on the receive buffer.
pub const READ_POLL_MICROS: u32 = 100;

/// Converts a duration into timer ticks given the current bit period.
#[inline]
pub fn duration_to_ticks(duration: Duration, ticks_per_bit: u32) -> u32 {
    let ticks = duration.as_micros() * u128::from(ticks_per_bit) / u128::from(BIT_WIDTH_MICROS);
    u32::try_from(ticks).unwrap_or(u32::MAX)
}
