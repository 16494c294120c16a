//! Command pipeline.
//!
//! Runs one command over one stream. For a download the payload flows through
//! `payload -> ThrottledReader -> ProgressReader -> destination` while a
//! progress reporter samples the byte counter in the background.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use qdt_core::constants::{COPY_BUFFER_SIZE, REPORT_INTERVAL};
use qdt_core::error::{Error, Result};
use qdt_core::progress::{
    NoOpCallback, ProgressCallback, ProgressReader, ProgressReporter, ReporterOutcome,
};
use qdt_core::protocol::{Command, ListingReader, Verb, open_download};
use qdt_core::rate::{RateLimit, ThrottledReader};
use qdt_core::transfer::TransferSession;

/// Options for one transfer.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Read-rate cap for the payload.
    pub limit: RateLimit,
    /// Interval between progress samples.
    pub report_interval: Duration,
    /// Copy buffer size.
    pub buffer_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            limit: RateLimit::UNLIMITED,
            report_interval: REPORT_INTERVAL,
            buffer_size: COPY_BUFFER_SIZE,
        }
    }
}

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult {
    /// Bytes written to the destination.
    pub bytes: u64,
    pub elapsed: Duration,
    /// How the progress reporter ended.
    pub reporter: ReporterOutcome,
}

impl TransferResult {
    /// Average rate over the whole transfer, in bytes per second.
    pub fn average_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.bytes as f64 / secs } else { 0.0 }
    }
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Listed { entries: u64 },
    Downloaded(TransferResult),
}

/// Executes commands against an open stream.
pub struct Pipeline {
    options: TransferOptions,
    callback: Arc<dyn ProgressCallback>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(options: TransferOptions) -> Self {
        Self {
            options,
            callback: Arc::new(NoOpCallback),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the callback that receives progress events.
    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Run `command`, writing listing lines or payload bytes to `out`.
    pub async fn execute<S, R, O>(
        &self,
        command: &Command,
        send: &mut S,
        recv: R,
        out: &mut O,
    ) -> Result<CommandOutcome>
    where
        S: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        match command.verb() {
            Verb::List => {
                let entries = self.run_list(command, send, recv, out).await?;
                Ok(CommandOutcome::Listed { entries })
            }
            Verb::Get => {
                let result = self.run_download(command, send, recv, out).await?;
                Ok(CommandOutcome::Downloaded(result))
            }
        }
    }

    /// Send `ls` and relay every entry to `out`, one per line, in arrival order.
    pub async fn list<S, R, O>(&self, send: &mut S, recv: R, out: &mut O) -> Result<u64>
    where
        S: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        self.run_list(&Command::list(), send, recv, out).await
    }

    /// Send `get <filename>` and copy the payload into `dest`.
    pub async fn download<S, R, W>(
        &self,
        send: &mut S,
        recv: R,
        filename: &str,
        dest: &mut W,
    ) -> Result<TransferResult>
    where
        S: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let command = Command::get(filename)?;
        self.run_download(&command, send, recv, dest).await
    }

    async fn run_list<S, R, O>(
        &self,
        command: &Command,
        send: &mut S,
        recv: R,
        out: &mut O,
    ) -> Result<u64>
    where
        S: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        self.send_command(command, send).await?;

        let mut listing = ListingReader::new(recv);
        loop {
            let entry = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                entry = listing.next_entry() => entry?,
            };
            let Some(entry) = entry else { break };

            let mut line = entry;
            line.push(b'\n');
            out.write_all(&line)
                .await
                .map_err(|e| Error::local_io("writing listing", e))?;
        }
        out.flush()
            .await
            .map_err(|e| Error::local_io("writing listing", e))?;

        debug!(entries = listing.entries(), "Listing complete");
        Ok(listing.entries())
    }

    async fn run_download<S, R, W>(
        &self,
        command: &Command,
        send: &mut S,
        recv: R,
        dest: &mut W,
    ) -> Result<TransferResult>
    where
        S: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.send_command(command, send).await?;

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            response = open_download(recv) => response?,
        };

        let session = TransferSession::new(response.declared_size());
        info!(
            declared = session.declared_total(),
            limit = %self.options.limit,
            "Download started"
        );

        let throttled = ThrottledReader::new(response.into_payload(), self.options.limit);
        let mut source = ProgressReader::new(throttled, session.counter().clone());

        let reporter = ProgressReporter::new(self.callback.clone())
            .with_interval(self.options.report_interval)
            .start(session.counter().clone(), session.declared_total());

        let started = Instant::now();
        let copied = self.copy(&mut source, dest).await;
        // The reporter is retired on every path, before any error propagates.
        let reporter_outcome = match &copied {
            Ok(_) => reporter.finish().await,
            Err(_) => reporter.abort().await,
        };
        let bytes = copied?;

        if let Err(e) = session.verify(bytes) {
            warn!(
                expected = session.declared_total(),
                received = bytes,
                missing = session.remaining(),
                "Stream ended before the declared size"
            );
            return Err(e);
        }

        let result = TransferResult {
            bytes,
            elapsed: started.elapsed(),
            reporter: reporter_outcome,
        };
        info!(
            bytes = result.bytes,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Download complete"
        );
        Ok(result)
    }

    async fn send_command<S>(&self, command: &Command, send: &mut S) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            sent = command.write_to(send) => sent?,
        }
        debug!(%command, "Command sent");
        Ok(())
    }

    async fn copy<R, W>(&self, source: &mut R, dest: &mut W) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.options.buffer_size.max(1)];
        let mut written = 0u64;

        loop {
            let step = async {
                let n = source.read(&mut buf).await.map_err(|e| Error::Stream {
                    message: format!("payload read failed: {}", e),
                })?;
                if n > 0 {
                    dest.write_all(&buf[..n])
                        .await
                        .map_err(|e| Error::local_io("writing destination", e))?;
                }
                Ok::<_, Error>(n)
            };

            let n = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(written, "Download cancelled");
                    return Err(Error::Cancelled);
                }
                n = step => n?,
            };
            if n == 0 {
                break;
            }
            written += n as u64;
        }

        dest.flush()
            .await
            .map_err(|e| Error::local_io("flushing destination", e))?;
        Ok(written)
    }
}
