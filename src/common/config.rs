// src/common/config.rs

use super::timing;
use core::time::Duration;

/// Value returned by timed reads when nothing arrives in time.
///
/// Zero is a perfectly good sensor reading, so timeouts use a value that no
/// environmental sensor reports.
pub const DEFAULT_TIMEOUT_VALUE: i16 = -9999;

/// Runtime settings of one SDI-12 instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Sdi12Config {
    /// Returned by [`read_or_timeout`](crate::engine::ByteSource::read_or_timeout) on timeout.
    pub timeout_value: i16,
    /// How long timed reads wait for each character.
    pub stream_timeout: Duration,
    /// Quiet time after which a half-received character is abandoned.
    pub idle_timeout: Duration,
    /// Extra time added to the break by
    /// [`send_command_default_wake`](crate::Sdi12::send_command_default_wake), in ms.
    /// Must be < 100.
    pub wake_delay_ms: u8,
}

impl Sdi12Config {
    pub const fn new() -> Self {
        Sdi12Config {
            timeout_value: DEFAULT_TIMEOUT_VALUE,
            stream_timeout: timing::MULTILINE_INTER_LINE_DELAY_MAX,
            idle_timeout: timing::RX_IDLE_TIMEOUT,
            wake_delay_ms: 0,
        }
    }

    pub const fn with_timeout_value(mut self, value: i16) -> Self {
        self.timeout_value = value;
        self
    }

    pub const fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub const fn with_wake_delay_ms(mut self, ms: u8) -> Self {
        self.wake_delay_ms = ms;
        self
    }
}

impl Default for Sdi12Config {
    fn default() -> Self {
        Self::new()
    }
}
