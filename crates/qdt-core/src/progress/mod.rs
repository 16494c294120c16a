//! Progress tracking for downloads.
//!
//! The [`ProgressReader`] decorator counts bytes as they pass through into a
//! shared [`ByteCounter`]. A [`ProgressReporter`] task samples that counter on
//! a fixed interval and turns the samples into [`ProgressEvent`]s for a
//! [`ProgressCallback`].

mod event;
mod reporter;
mod sample;
mod tracker;

pub use event::{FnCallback, NoOpCallback, ProgressCallback, ProgressEvent, callback};
pub use reporter::{ProgressReporter, ReporterHandle, ReporterOutcome};
pub use sample::{ProgressSample, ProgressStatus};
pub use tracker::{ByteCounter, ProgressReader};
