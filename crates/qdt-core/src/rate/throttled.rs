//! Throttled reader for bandwidth limiting.
//!
//! Each read is capped at one slice of the per-second budget. When the
//! underlying source answers faster than the limit allows, the bytes are held
//! back until the expected duration for them has passed, then handed out.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{Instant, Sleep, sleep};
use tracing::trace;

use super::budget::{RateBudget, RateLimit};

/// A reader that limits the long-run average read rate of its source.
///
/// With an unlimited [`RateLimit`] every call is passed straight through.
pub struct ThrottledReader<R> {
    inner: R,
    budget: Option<RateBudget>,
    /// Bytes read from `inner` but not yet handed to the caller.
    staged: Vec<u8>,
    staged_pos: usize,
    delay: Option<Pin<Box<Sleep>>>,
}

impl<R> ThrottledReader<R> {
    /// Wrap `inner`, throttling it to `limit`.
    pub fn new(inner: R, limit: RateLimit) -> Self {
        Self {
            inner,
            budget: limit.get().map(RateBudget::new),
            staged: Vec::new(),
            staged_pos: 0,
            delay: None,
        }
    }

    pub fn is_throttled(&self) -> bool {
        self.budget.is_some()
    }

    /// Pacing state, if throttling is enabled.
    pub fn budget(&self) -> Option<&RateBudget> {
        self.budget.as_ref()
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ThrottledReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        let Some(budget) = this.budget.as_mut() else {
            return Pin::new(&mut this.inner).poll_read(cx, buf);
        };

        loop {
            if let Some(delay) = this.delay.as_mut() {
                ready!(delay.as_mut().poll(cx));
                this.delay = None;
                budget.mark(Instant::now());
            }

            if this.staged_pos < this.staged.len() {
                let available = &this.staged[this.staged_pos..];
                let n = available.len().min(buf.remaining());
                buf.put_slice(&available[..n]);
                this.staged_pos += n;
                if this.staged_pos == this.staged.len() {
                    this.staged.clear();
                    this.staged_pos = 0;
                }
                return Poll::Ready(Ok(()));
            }

            if buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }

            budget.begin(Instant::now());
            let want = budget.grant(buf.remaining());
            this.staged.resize(want, 0);

            let mut staging = ReadBuf::new(&mut this.staged);
            let polled = Pin::new(&mut this.inner).poll_read(cx, &mut staging);
            let n = staging.filled().len();

            match polled {
                Poll::Pending => {
                    this.staged.clear();
                    return Poll::Pending;
                }
                Poll::Ready(Err(e)) => {
                    this.staged.clear();
                    return Poll::Ready(Err(e));
                }
                Poll::Ready(Ok(())) => {
                    this.staged.truncate(n);
                }
            }

            let now = Instant::now();
            match budget.settle(n, now) {
                Some(wait) => {
                    trace!(bytes = n, wait_ms = wait.as_millis() as u64, "Throttling read");
                    this.delay = Some(Box::pin(sleep(wait)));
                }
                None => {
                    budget.mark(now);
                    if n == 0 {
                        return Poll::Ready(Ok(()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn unlimited_reader_passes_through() {
        let data = vec![7u8; 100_000];
        let mut reader = ThrottledReader::new(&data[..], RateLimit::UNLIMITED);
        assert!(!reader.is_throttled());

        let mut buf = vec![0u8; 100_000];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(n, 100_000);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_are_capped_at_one_slice() {
        let data = vec![1u8; 4096];
        let mut reader = ThrottledReader::new(&data[..], RateLimit::bytes_per_second(1000));

        let mut buf = vec![0u8; 4096];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(n, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_read_takes_expected_time() {
        let data = vec![1u8; 1000];
        let mut reader = ThrottledReader::new(&data[..], RateLimit::bytes_per_second(1000));

        let start = Instant::now();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, data);
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(reader.budget().map(RateBudget::granted), Some(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn small_caller_buffer_receives_staged_bytes_in_order() {
        let data: Vec<u8> = (0..=255).collect();
        let mut reader = ThrottledReader::new(&data[..], RateLimit::bytes_per_second(2560));

        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_input_is_reported() {
        let mut reader = ThrottledReader::new(&b""[..], RateLimit::bytes_per_second(10));
        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }
}
