//! Line-oriented command protocol spoken over one bidirectional stream.
//!
//! Wire format:
//! - client to server: `<verb>[ <argument>]\n`
//! - `ls`: zero or more `<entry>\n` lines, then end of stream
//! - `get <name>`: `<decimal size>\n`, exactly that many raw bytes, then end of stream

mod command;
mod response;

pub use command::{Command, Verb};
pub use response::{DownloadResponse, ListingReader, open_download, read_declared_size};
