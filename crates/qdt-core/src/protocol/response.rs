//! Response framings: line listing and size-prefixed payload.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader, Take};
use tracing::debug;

use crate::constants::MAX_SIZE_LINE_LEN;
use crate::error::{Error, Result};

// =============================================================================
// Listing mode
// =============================================================================

/// Lazy sequence of listing entries, one per line of the response.
///
/// Entries are raw bytes without the line terminator. Ends when the server
/// closes the stream. Not restartable.
pub struct ListingReader<R> {
    reader: BufReader<R>,
    entries: u64,
}

impl<R: AsyncRead + Unpin> ListingReader<R> {
    /// Wrap the receive half of a stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            entries: 0,
        }
    }

    /// Next entry, or `None` once the stream has ended.
    ///
    /// A trailing `\r` is stripped so CRLF servers list cleanly. Entries need
    /// not be valid UTF-8.
    pub async fn next_entry(&mut self) -> Result<Option<Vec<u8>>> {
        let mut entry = Vec::new();
        let read = self
            .reader
            .read_until(b'\n', &mut entry)
            .await
            .map_err(|e| Error::Stream {
                message: format!("failed to read listing: {e}"),
            })?;
        if read == 0 {
            return Ok(None);
        }

        if entry.last() == Some(&b'\n') {
            entry.pop();
        }
        if entry.last() == Some(&b'\r') {
            entry.pop();
        }
        self.entries += 1;
        Ok(Some(entry))
    }

    /// Entries produced so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }
}

// =============================================================================
// Download mode
// =============================================================================

/// Read and parse the size line that precedes a download payload.
///
/// The line must be a non-empty run of ASCII digits terminated by `\n`
/// (a `\r` before the newline is tolerated).
pub async fn read_declared_size<R>(reader: &mut R) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::with_capacity(MAX_SIZE_LINE_LEN);
    let read = reader
        .take(MAX_SIZE_LINE_LEN as u64)
        .read_until(b'\n', &mut raw)
        .await
        .map_err(|e| Error::Stream {
            message: format!("failed to read size line: {e}"),
        })?;

    if read == 0 {
        return Err(Error::Protocol {
            message: "missing size line".into(),
        });
    }

    if raw.last() != Some(&b'\n') {
        let message = if raw.len() >= MAX_SIZE_LINE_LEN {
            format!("size line exceeds {MAX_SIZE_LINE_LEN} bytes")
        } else {
            "size line not terminated by newline".to_string()
        };
        return Err(Error::Protocol { message });
    }

    parse_size_line(&raw)
}

fn parse_size_line(raw: &[u8]) -> Result<u64> {
    let mut digits = &raw[..raw.len() - 1];
    if let Some(stripped) = digits.strip_suffix(b"\r") {
        digits = stripped;
    }

    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(Error::Protocol {
            message: format!(
                "size line is not a non-negative integer: {:?}",
                String::from_utf8_lossy(digits)
            ),
        });
    }

    // Only ASCII digits remain, so the str conversion cannot fail.
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| Error::Protocol {
            message: "declared size does not fit in 64 bits".into(),
        })
}

/// A `get` response whose size line has been consumed.
pub struct DownloadResponse<R> {
    declared_size: u64,
    payload: Take<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> DownloadResponse<R> {
    /// Declared total size in bytes.
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    /// The payload bytes, capped at the declared size.
    ///
    /// Reading past the cap yields end-of-input, so no more than the declared
    /// count can ever reach the destination.
    pub fn into_payload(self) -> Take<BufReader<R>> {
        self.payload
    }
}

/// Start reading a `get` response: parse the size line, keep the rest as payload.
pub async fn open_download<R>(reader: R) -> Result<DownloadResponse<R>>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let declared_size = read_declared_size(&mut reader).await?;
    debug!(declared_size, "Read declared size");

    Ok(DownloadResponse {
        declared_size,
        payload: reader.take(declared_size),
    })
}
