//! qdt-core: Shared library for the qdt data-transfer client.
//!
//! This crate provides:
//! - The line-oriented command codec and response framing
//! - Read-rate throttling
//! - Progress tracking and the background progress reporter
//! - Error types, constants and logging setup

pub mod constants;
pub mod error;
pub mod logging;
pub mod progress;
pub mod protocol;
pub mod rate;
pub mod transfer;

pub use error::{Error, Result};
pub use logging::{LogFormat, init_logging};
pub use protocol::Command;
pub use rate::RateLimit;
pub use transfer::TransferSession;
