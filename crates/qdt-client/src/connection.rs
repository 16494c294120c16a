//! Client connection management.
//!
//! Establishes the QUIC connection a command runs over:
//! 1. Resolve the server address
//! 2. TLS 1.3 handshake with ALPN `data-transfer` and optional cert pinning
//! 3. One bidirectional stream per command
//! 4. Graceful close

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use quinn::crypto::rustls::QuicClientConfig;
use quinn::{ClientConfig, Endpoint, IdleTimeout, RecvStream, SendStream, TransportConfig};
use tracing::{debug, info};

use qdt_core::constants::{
    ALPN, CONNECT_TIMEOUT, DEFAULT_SERVER_NAME, IDLE_TIMEOUT, KEEP_ALIVE_INTERVAL,
};
use qdt_core::error::{Error, Result};

/// Client connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address, `host:port`.
    pub server: String,
    /// Name presented for SNI and certificate checks.
    pub server_name: String,
    /// Expected SHA-256 of the server certificate (optional, for pinning).
    pub cert_hash: Option<Vec<u8>>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub keep_alive_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:4242".to_string(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
            cert_hash: None,
            connect_timeout: CONNECT_TIMEOUT,
            idle_timeout: IDLE_TIMEOUT,
            keep_alive_interval: KEEP_ALIVE_INTERVAL,
        }
    }
}

/// Resolve `host:port` to the first socket address it names.
pub fn resolve_server_addr(server: &str) -> Result<SocketAddr> {
    server
        .to_socket_addrs()
        .map_err(|e| Error::Connection {
            message: format!("cannot resolve {}: {}", server, e),
        })?
        .next()
        .ok_or_else(|| Error::Connection {
            message: format!("no address found for {}", server),
        })
}

/// SHA-256 of a DER-encoded certificate.
pub fn cert_hash(cert_der: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(cert_der);
    hasher.finalize().to_vec()
}

/// Create a client TLS configuration that accepts self-signed certificates
/// and optionally verifies the certificate hash.
///
/// Handshake signatures are always checked against the presented certificate.
pub fn client_crypto_config(expected_cert_hash: Option<&[u8]>) -> Result<rustls::ClientConfig> {
    use rustls::DigitallySignedStruct;
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};

    /// Custom certificate verifier that optionally checks cert hash
    #[derive(Debug)]
    struct CertHashVerifier {
        expected_hash: Option<Vec<u8>>,
        provider: Arc<CryptoProvider>,
    }

    impl ServerCertVerifier for CertHashVerifier {
        fn verify_server_cert(
            &self,
            end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, rustls::Error> {
            if let Some(expected) = &self.expected_hash {
                if cert_hash(end_entity.as_ref()) != *expected {
                    return Err(rustls::Error::General(
                        "certificate hash mismatch".to_string(),
                    ));
                }
            }
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls12_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            verify_tls13_signature(
                message,
                cert,
                dss,
                &self.provider.signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.provider
                .signature_verification_algorithms
                .supported_schemes()
        }
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(CertHashVerifier {
        expected_hash: expected_cert_hash.map(|h| h.to_vec()),
        provider: provider.clone(),
    });

    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| Error::Connection {
            message: format!("failed to create TLS config: {}", e),
        })?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN.to_vec()];

    Ok(config)
}

/// An established QUIC connection to a data-transfer server.
pub struct DataConnection {
    endpoint: Endpoint,
    conn: quinn::Connection,
}

impl DataConnection {
    /// Establish a new connection to the server.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let server_addr = resolve_server_addr(&config.server)?;
        info!(addr = %server_addr, "Connecting to server");

        let bind_addr: SocketAddr = if server_addr.is_ipv6() {
            SocketAddr::from(([0u16; 8], 0))
        } else {
            SocketAddr::from(([0, 0, 0, 0], 0))
        };
        let mut endpoint = Endpoint::client(bind_addr).map_err(|e| Error::Connection {
            message: format!("failed to create QUIC endpoint: {}", e),
        })?;

        let crypto = client_crypto_config(config.cert_hash.as_deref())?;
        let mut client_config = ClientConfig::new(Arc::new(
            QuicClientConfig::try_from(crypto).map_err(|e| Error::Connection {
                message: format!("failed to create QUIC config: {}", e),
            })?,
        ));
        let mut transport = TransportConfig::default();
        transport.keep_alive_interval(Some(config.keep_alive_interval));
        transport.max_idle_timeout(IdleTimeout::try_from(config.idle_timeout).ok());
        client_config.transport_config(Arc::new(transport));
        endpoint.set_default_client_config(client_config);

        let connecting = endpoint
            .connect(server_addr, &config.server_name)
            .map_err(|e| Error::Connection {
                message: format!("failed to initiate connection: {}", e),
            })?;

        let conn = tokio::time::timeout(config.connect_timeout, connecting)
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| Error::Connection {
                message: format!("connection failed: {}", e),
            })?;

        info!(rtt_ms = conn.rtt().as_millis() as u64, "QUIC connection established");
        Ok(Self { endpoint, conn })
    }

    /// Open the bidirectional stream one command runs on.
    pub async fn open_stream(&self) -> Result<(SendStream, RecvStream)> {
        let pair = self.conn.open_bi().await.map_err(|e| Error::Connection {
            message: format!("failed to open stream: {}", e),
        })?;
        debug!("Command stream opened");
        Ok(pair)
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.conn.remote_address()
    }

    pub fn rtt(&self) -> Duration {
        self.conn.rtt()
    }

    /// Close the connection and wait for the peer to acknowledge.
    pub async fn close(self) {
        self.conn.close(0u32.into(), b"done");
        self.endpoint.wait_idle().await;
        debug!("Connection closed");
    }
}
