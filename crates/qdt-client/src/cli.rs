//! Command-line interface.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use qdt_core::constants::DEFAULT_SERVER_NAME;
use qdt_core::error::{Error, Result};
use qdt_core::protocol::Command;
use qdt_core::{LogFormat, RateLimit};

use crate::connection::ConnectionConfig;
use crate::pipeline::TransferOptions;

/// Length of a SHA-256 certificate hash in bytes.
const CERT_HASH_LEN: usize = 32;

/// List or download files from a data-transfer server over QUIC.
#[derive(Debug, Parser)]
#[command(name = "qdt-client", version, about)]
pub struct Cli {
    /// Server address
    #[arg(value_name = "HOST:PORT")]
    pub server: String,

    /// Download rate limit in bytes per second (suffixes K, M, G; 0 = unlimited)
    #[arg(long, value_name = "RATE", default_value = "0", allow_hyphen_values = true)]
    pub limit: RateLimit,

    /// TLS server name
    #[arg(long = "server-name", value_name = "NAME", default_value = DEFAULT_SERVER_NAME)]
    pub server_name: String,

    /// Expected SHA-256 hash of the server certificate (base64)
    #[arg(long = "cert-hash", value_name = "BASE64")]
    pub cert_hash: Option<String>,

    /// Connection timeout in seconds
    #[arg(long = "connect-timeout", value_name = "SECS", default_value = "10")]
    pub connect_timeout: u64,

    /// How download progress is displayed
    #[arg(long, value_enum, default_value_t = ProgressMode::Plain)]
    pub progress: ProgressMode,

    /// Increase verbosity
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log to file
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long = "log-json")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// List files available on the server
    Ls,
    /// Download a file
    Get {
        /// Name of the file on the server
        filename: String,

        /// Destination path (defaults to the file name in the current directory)
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Progress display style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ProgressMode {
    /// Single status line rewritten in place
    #[default]
    Plain,
    /// Progress bar
    Bar,
    /// No progress output
    #[value(name = "none")]
    Off,
}

impl Cli {
    /// The command line sent to the server.
    pub fn protocol_command(&self) -> Result<Command> {
        match &self.command {
            CliCommand::Ls => Ok(Command::list()),
            CliCommand::Get { filename, .. } => Command::get(filename.as_str()),
        }
    }

    /// Where a download is written, `None` for `ls`.
    pub fn destination(&self) -> Result<Option<PathBuf>> {
        match &self.command {
            CliCommand::Ls => Ok(None),
            CliCommand::Get {
                output: Some(path), ..
            } => Ok(Some(path.clone())),
            CliCommand::Get {
                filename,
                output: None,
            } => default_destination(filename).map(Some),
        }
    }

    pub fn decode_cert_hash(&self) -> Result<Option<Vec<u8>>> {
        self.cert_hash.as_deref().map(decode_cert_hash).transpose()
    }

    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        Ok(ConnectionConfig {
            server: self.server.clone(),
            server_name: self.server_name.clone(),
            cert_hash: self.decode_cert_hash()?,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            ..ConnectionConfig::default()
        })
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            limit: self.limit,
            ..TransferOptions::default()
        }
    }

    pub fn log_format(&self) -> LogFormat {
        if self.log_json {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// The final path component of `filename`.
pub fn default_destination(filename: &str) -> Result<PathBuf> {
    Path::new(filename)
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| Error::InvalidConfig {
            message: format!("cannot derive a destination from {:?}; use --output", filename),
        })
}

/// Decode a base64 SHA-256 certificate hash.
pub fn decode_cert_hash(encoded: &str) -> Result<Vec<u8>> {
    let hash = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::InvalidConfig {
            message: format!("invalid certificate hash: {}", e),
        })?;
    if hash.len() != CERT_HASH_LEN {
        return Err(Error::InvalidConfig {
            message: format!(
                "certificate hash must be {} bytes, got {}",
                CERT_HASH_LEN,
                hash.len()
            ),
        });
    }
    Ok(hash)
}
