// src/common/mod.rs

// --- Declare all public modules within common ---
pub mod config;
pub mod crc;
pub mod error;
pub mod frame;
pub mod hal_traits;
pub mod timing;

// --- Re-export key types/traits/functions for easier access ---

// From config.rs
pub use config::{Sdi12Config, DEFAULT_TIMEOUT_VALUE};

// From crc.rs
pub use crc::{
    calculate_crc, calculate_crc16, crc_to_string, decode_crc_ascii, encode_crc_ascii, verify_crc,
    verify_response_crc_ascii,
};

// From error.rs
pub use error::Sdi12Error;

// From frame.rs
pub use frame::{parity_even_bit, CharFrame, LineLevel, PinMode};

// From hal_traits.rs
pub use hal_traits::{Sdi12Pin, Sdi12Timer};

// From timing.rs (constants - users can access via common::timing::*)
