// src/lib.rs

#![cfg_attr(not(test), no_std)] // Host tests get std for the mocks

pub mod common;
pub mod engine;

// Re-export key types for convenience
pub use common::{LineLevel, PinMode, Sdi12Config, Sdi12Error, Sdi12Pin, Sdi12Timer};
pub use engine::{ByteSource, InstanceId, LineState, Sdi12, SharedBus, SDI12_BUFFER_SIZE};
