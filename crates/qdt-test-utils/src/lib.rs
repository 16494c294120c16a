//! qdt-test-utils: Test infrastructure for qdt.
//!
//! Provides:
//! - Scripted in-memory server streams for pipeline tests without network
//! - ChunkedReader: a source that returns short reads
//! - FailingReader, FailingWriter, StalledWriter: I/O that errors or never completes
//! - RecordingCallback: a progress callback that keeps every event
//! - LoopbackServer: a real QUIC server on 127.0.0.1 with a self-signed certificate

mod chunked;
mod faulty;
mod loopback;
mod mock_transport;
mod recording;

pub use chunked::ChunkedReader;
pub use faulty::{FailingReader, FailingWriter, StalledWriter};
pub use loopback::LoopbackServer;
pub use mock_transport::{MockRecv, MockSend, ServerScript, mock_stream_pair};
pub use recording::RecordingCallback;
