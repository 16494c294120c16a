use std::sync::{Arc, Mutex};

use qdt_core::progress::{ProgressCallback, ProgressEvent};

/// Progress callback that records every event for later inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingCallback {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Percentages in emission order; a completion counts as 100.
    pub fn percentages(&self) -> Vec<f64> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Progress(status) => Some(status.percent()),
                ProgressEvent::Completed { .. } => Some(100.0),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Completed { .. }))
            .count()
    }

    pub fn aborted(&self) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, ProgressEvent::Aborted { .. }))
    }
}

impl ProgressCallback for RecordingCallback {
    fn on_progress(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
