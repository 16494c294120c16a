//! Loopback QUIC server for end-to-end tests.
//!
//! Serves a fixed set of in-memory files over the line protocol on
//! `127.0.0.1` with a freshly generated self-signed certificate for
//! `localhost`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use quinn::crypto::rustls::QuicServerConfig;
use quinn::{Connection, Endpoint, RecvStream, SendStream};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use qdt_core::constants::ALPN;
use qdt_core::error::{Error, Result};
use qdt_core::protocol::{Command, Verb};

type Files = Arc<BTreeMap<String, Vec<u8>>>;

/// A running loopback server.
pub struct LoopbackServer {
    endpoint: Endpoint,
    addr: SocketAddr,
    cert_hash: Vec<u8>,
    task: JoinHandle<()>,
}

impl LoopbackServer {
    /// Bind to an ephemeral port and start serving `files`.
    ///
    /// `ls` lists file names in sorted order. `get` of an unknown name ends
    /// the stream without a size line.
    pub fn start(files: BTreeMap<String, Vec<u8>>) -> Result<Self> {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).map_err(
            |e| Error::Connection {
                message: format!("failed to generate certificate: {}", e),
            },
        )?;
        let cert_der = CertificateDer::from(cert.cert.der().to_vec());
        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der()));
        let cert_hash = {
            use sha2::{Digest, Sha256};
            Sha256::digest(cert_der.as_ref()).to_vec()
        };

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut crypto = rustls::ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])
            .and_then(|b| b.with_no_client_auth().with_single_cert(vec![cert_der], key_der))
            .map_err(|e| Error::Connection {
                message: format!("failed to create server config: {}", e),
            })?;
        crypto.alpn_protocols = vec![ALPN.to_vec()];

        let quic = QuicServerConfig::try_from(crypto).map_err(|e| Error::Connection {
            message: format!("failed to create QUIC server config: {}", e),
        })?;
        let server_config = quinn::ServerConfig::with_crypto(Arc::new(quic));

        let bind_addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let endpoint = Endpoint::server(server_config, bind_addr).map_err(|e| Error::Connection {
            message: format!("failed to bind server: {}", e),
        })?;
        let addr = endpoint.local_addr()?;

        let files: Files = Arc::new(files);
        let task = tokio::spawn(accept_loop(endpoint.clone(), files));
        debug!(%addr, "Loopback server listening");

        Ok(Self {
            endpoint,
            addr,
            cert_hash,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// SHA-256 of the server certificate.
    pub fn cert_hash(&self) -> &[u8] {
        &self.cert_hash
    }

    pub fn shutdown(self) {
        self.endpoint.close(0u32.into(), b"shutdown");
        self.task.abort();
    }
}

async fn accept_loop(endpoint: Endpoint, files: Files) {
    while let Some(incoming) = endpoint.accept().await {
        let files = files.clone();
        tokio::spawn(async move {
            match incoming.await {
                Ok(conn) => serve_connection(conn, files).await,
                Err(e) => debug!(error = %e, "Loopback handshake failed"),
            }
        });
    }
}

async fn serve_connection(conn: Connection, files: Files) {
    loop {
        match conn.accept_bi().await {
            Ok((send, recv)) => {
                let files = files.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_stream(send, recv, files).await {
                        warn!(error = %e, "Loopback stream failed");
                    }
                });
            }
            Err(e) => {
                debug!(error = %e, "Loopback connection ended");
                return;
            }
        }
    }
}

async fn serve_stream(mut send: SendStream, recv: RecvStream, files: Files) -> Result<()> {
    let mut reader = BufReader::new(recv);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let command = Command::parse(&line)?;
    debug!(%command, "Loopback server received command");

    let response = match command.verb() {
        Verb::List => files
            .keys()
            .flat_map(|name| name.bytes().chain(std::iter::once(b'\n')))
            .collect(),
        Verb::Get => match command.argument().and_then(|name| files.get(name)) {
            Some(body) => {
                let mut out = format!("{}\n", body.len()).into_bytes();
                out.extend_from_slice(body);
                out
            }
            None => Vec::new(),
        },
    };

    send.write_all(&response).await.map_err(|e| Error::Stream {
        message: e.to_string(),
    })?;
    send.finish().map_err(|e| Error::Stream {
        message: e.to_string(),
    })?;
    let _ = send.stopped().await;
    Ok(())
}
