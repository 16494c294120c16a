//! Progress events and callbacks.

use std::sync::Arc;
use std::time::Duration;

use super::sample::ProgressStatus;

/// Events emitted while a download is tracked.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Reporting began; the declared total is known.
    Started { total: u64 },
    /// Periodic status update.
    Progress(ProgressStatus),
    /// The declared total was reached. Emitted at most once.
    Completed { total: u64, elapsed: Duration },
    /// Reporting was stopped before the declared total was reached.
    Aborted { bytes: u64, total: u64 },
}

/// Callback for progress events.
///
/// Invoked from the reporter task, so implementations must not block.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// A no-op progress callback that ignores all events.
pub struct NoOpCallback;

impl ProgressCallback for NoOpCallback {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// A function-based progress callback.
pub struct FnCallback<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    f: F,
}

impl<F> FnCallback<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ProgressCallback for FnCallback<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        (self.f)(event)
    }
}

/// Helper to create an Arc-wrapped callback from a closure.
pub fn callback<F>(f: F) -> Arc<dyn ProgressCallback>
where
    F: Fn(ProgressEvent) + Send + Sync + 'static,
{
    Arc::new(FnCallback::new(f))
}
