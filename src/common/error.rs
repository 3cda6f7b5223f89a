// src/common/error.rs

#[derive(Debug, thiserror::Error)]
pub enum Sdi12Error<E = ()>
where
    E: core::fmt::Debug, // Still need Debug for the generic Io error
{
    /// Underlying I/O error from the pin implementation.
    #[error("I/O error: {0:?}")] // Format string requires Debug on E
    Io(E),

    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// Received message format is invalid or unexpected.
    #[error("Invalid response format")]
    InvalidFormat,

    /// Buffer provided was too small.
    #[error("Buffer overflow: needed {needed}, got {got}")]
    BufferOverflow { needed: usize, got: usize },

    /// The shared receive buffer dropped at least one character since it was last cleared.
    #[error("Receive buffer overflowed")]
    RxOverflow,

    /// Received CRC does not match calculated CRC.
    #[error("CRC mismatch: expected {expected:#06x}, calculated {calculated:#06x}")]
    CrcMismatch { expected: u16, calculated: u16 },

    /// No data pin has been assigned to the instance.
    #[error("Data pin not configured")]
    PinNotConfigured,

    /// The operation needs the bus but another instance is active.
    #[error("Instance is not the active SDI-12 instance")]
    NotActive,

    /// Requested extra wake time is not below the 100 ms sensor wake limit.
    #[error("Extra wake delay of {0} ms is too long")]
    WakeDelayTooLong(u8),
}

// Note: For the Io(E) variant's #[error("...")] message to work correctly even
// in no_std, the underlying error type `E` must implement `core::fmt::Debug`.
