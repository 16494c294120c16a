//! Scripted server side of one command stream.
//!
//! The server half runs in its own task: it reads the command line the client
//! sends, answers with the scripted bytes and then ends the stream, the same
//! way a real server finishes its send side.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tracing::debug;

/// Buffer size of the in-memory pipe.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Client half used to send the command.
pub type MockSend = WriteHalf<DuplexStream>;

/// Client half used to read the response.
pub type MockRecv = ReadHalf<DuplexStream>;

/// What the scripted server answers after receiving the command line.
#[derive(Debug, Clone)]
pub enum ServerScript {
    /// One line per entry, then end of stream.
    Listing(Vec<String>),
    /// A size line declaring `declared` bytes, then `body` (which may be shorter
    /// or longer than declared), then end of stream.
    Payload { declared: u64, body: Vec<u8> },
    /// Exactly these bytes, then end of stream.
    Raw(Vec<u8>),
    /// Like `Payload`, but the stream stays open until the client goes away.
    Stall { declared: u64, body: Vec<u8> },
}

impl ServerScript {
    pub fn listing<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ServerScript::Listing(entries.into_iter().map(Into::into).collect())
    }

    /// A well-formed payload whose declared size matches its body.
    pub fn file(body: Vec<u8>) -> Self {
        ServerScript::Payload {
            declared: body.len() as u64,
            body,
        }
    }

    fn response(&self) -> Vec<u8> {
        match self {
            ServerScript::Listing(entries) => entries
                .iter()
                .flat_map(|e| e.bytes().chain(std::iter::once(b'\n')))
                .collect(),
            ServerScript::Payload { declared, body } | ServerScript::Stall { declared, body } => {
                let mut out = format!("{declared}\n").into_bytes();
                out.extend_from_slice(body);
                out
            }
            ServerScript::Raw(bytes) => bytes.clone(),
        }
    }
}

/// Create a client stream pair connected to a scripted server task.
///
/// The task resolves to the command line it received, without the newline.
pub fn mock_stream_pair(script: ServerScript) -> (MockSend, MockRecv, JoinHandle<String>) {
    let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
    let (recv, send) = tokio::io::split(client);

    let task = tokio::spawn(async move {
        let (server_recv, mut server_send) = tokio::io::split(server);
        let mut reader = BufReader::new(server_recv);

        let mut line = String::new();
        if reader.read_line(&mut line).await.is_err() {
            return line;
        }
        let command = line.trim_end_matches(['\n', '\r']).to_string();
        debug!(command = %command, "Mock server received command");

        // The client may hang up early; a failed write just ends the script.
        let _ = server_send.write_all(&script.response()).await;
        let _ = server_send.flush().await;

        if matches!(script, ServerScript::Stall { .. }) {
            let mut sink = Vec::new();
            let _ = reader.read_to_end(&mut sink).await;
        }
        let _ = server_send.shutdown().await;
        command
    });

    (send, recv, task)
}
