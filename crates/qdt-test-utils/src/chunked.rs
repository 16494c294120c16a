use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// In-memory source that never returns more than `chunk` bytes per read.
#[derive(Debug)]
pub struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    reads: usize,
}

impl ChunkedReader {
    pub fn new(data: Vec<u8>, chunk: usize) -> Self {
        Self {
            data,
            pos: 0,
            chunk: chunk.max(1),
            reads: 0,
        }
    }

    /// Number of non-empty reads served so far.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let left = &this.data[this.pos..];
        let n = left.len().min(this.chunk).min(buf.remaining());
        if n > 0 {
            buf.put_slice(&left[..n]);
            this.pos += n;
            this.reads += 1;
        }
        Poll::Ready(Ok(()))
    }
}
