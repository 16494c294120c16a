//! qdt-client: QUIC data-transfer client library.
//!
//! This crate provides:
//! - Command-line definitions
//! - QUIC connection setup with optional certificate pinning
//! - The command pipeline (listing and throttled, progress-tracked downloads)
//! - Terminal progress rendering

pub mod cli;
pub mod connection;
pub mod pipeline;
pub mod render;

pub use cli::{Cli, CliCommand, ProgressMode};
pub use connection::{ConnectionConfig, DataConnection};
pub use pipeline::{CommandOutcome, Pipeline, TransferOptions, TransferResult};
