//! Terminal rendering of progress events.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use qdt_core::progress::{NoOpCallback, ProgressCallback, ProgressEvent, ProgressStatus};

use crate::cli::ProgressMode;

/// Format bytes in human-readable form.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// One status line: percentage and speed in KB/s.
pub fn format_status(status: &ProgressStatus) -> String {
    format!("{:.2}% - {:.2} KB/s", status.percent(), status.speed / 1024.0)
}

/// Plain status line rewritten in place with `\r`.
pub struct ConsoleProgress<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleProgress<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> ConsoleProgress<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn render(&self, line: &str) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }
}

impl<W: Write + Send> ProgressCallback for ConsoleProgress<W> {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { .. } => {}
            ProgressEvent::Progress(status) => self.render(&format!("\r{}", format_status(&status))),
            ProgressEvent::Completed { .. } => self.render("\r100.00% - completed\n"),
            ProgressEvent::Aborted { bytes, total } => {
                let status = ProgressStatus {
                    bytes,
                    total,
                    speed: 0.0,
                };
                self.render(&format!("\r{:.2}% - aborted\n", status.percent()));
            }
        }
    }
}

/// Progress bar rendered with indicatif.
pub struct IndicatifProgress {
    bar: ProgressBar,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn with_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, target);
        bar.set_style(Self::style());
        Self { bar }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for IndicatifProgress {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { total } => self.bar.set_length(total),
            ProgressEvent::Progress(status) => self.bar.set_position(status.bytes),
            ProgressEvent::Completed { total, .. } => {
                self.bar.set_position(total);
                self.bar.finish_with_message("completed");
            }
            ProgressEvent::Aborted { bytes, .. } => {
                self.bar.set_position(bytes);
                self.bar.abandon_with_message("aborted");
            }
        }
    }
}

/// Build the progress callback for a display mode.
pub fn progress_callback(mode: ProgressMode) -> Arc<dyn ProgressCallback> {
    match mode {
        ProgressMode::Plain => Arc::new(ConsoleProgress::stderr()),
        ProgressMode::Bar => Arc::new(IndicatifProgress::new()),
        ProgressMode::Off => Arc::new(NoOpCallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn status_line_shows_percent_and_speed() {
        let status = ProgressStatus {
            bytes: 512,
            total: 1024,
            speed: 2048.0,
        };
        assert_eq!(format_status(&status), "50.00% - 2.00 KB/s");
    }

    #[test]
    fn console_renders_in_place_then_completes() {
        let console = ConsoleProgress::new(Vec::new());
        console.on_progress(ProgressEvent::Started { total: 100 });
        console.on_progress(ProgressEvent::Progress(ProgressStatus {
            bytes: 25,
            total: 100,
            speed: 1024.0,
        }));
        console.on_progress(ProgressEvent::Completed {
            total: 100,
            elapsed: Duration::from_secs(1),
        });

        let out = String::from_utf8(console.into_inner()).unwrap();
        assert_eq!(out, "\r25.00% - 1.00 KB/s\r100.00% - completed\n");
    }

    #[test]
    fn console_reports_abort() {
        let console = ConsoleProgress::new(Vec::new());
        console.on_progress(ProgressEvent::Aborted { bytes: 90, total: 100 });

        let out = String::from_utf8(console.into_inner()).unwrap();
        assert_eq!(out, "\r90.00% - aborted\n");
    }

    #[test]
    fn indicatif_tracks_position() {
        let bar = IndicatifProgress::with_target(ProgressDrawTarget::hidden());
        bar.on_progress(ProgressEvent::Started { total: 10 });
        bar.on_progress(ProgressEvent::Aborted { bytes: 4, total: 10 });
        assert_eq!(bar.position(), 4);
    }
}
