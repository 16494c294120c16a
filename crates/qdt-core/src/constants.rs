//! Protocol and timing constants for qdt.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// ALPN identifier for QUIC connections.
pub const ALPN: &[u8] = b"data-transfer";

/// Verb that requests a directory listing.
pub const VERB_LIST: &str = "ls";

/// Verb that requests a file download.
pub const VERB_GET: &str = "get";

/// Longest accepted size line, newline included.
///
/// `u64::MAX` has 20 digits; anything much longer is not a size.
pub const MAX_SIZE_LINE_LEN: usize = 32;

// =============================================================================
// Transfer Constants
// =============================================================================

/// Number of slices one second of throttled reading is divided into.
pub const SLICES_PER_SECOND: u64 = 10;

/// Interval between two progress samples.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Buffer size used by the copy loop.
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

// =============================================================================
// Connection Constants
// =============================================================================

/// Default TLS server name presented during the handshake.
pub const DEFAULT_SERVER_NAME: &str = "localhost";

/// Default connection establishment timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// QUIC idle timeout.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// QUIC keep-alive interval.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);
