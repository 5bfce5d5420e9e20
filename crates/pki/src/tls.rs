//! Mutual-TLS configurations for the dialing and listening sides.

use crate::anchor::{LeafCertificate, TrustAnchor};
use crate::error::{Error, Result};

use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::ServerName;

/// Application protocol token negotiated during the handshake.
pub const ALPN_PROTOCOL: &[u8] = b"ferry/1";

/// TLS configuration of the accepting side. Presents a leaf and requires a
/// client certificate chaining to the trust anchor.
#[derive(Debug, Clone)]
pub struct ServerTlsConfig {
    inner: Arc<ServerConfig>,
}

impl ServerTlsConfig {
    /// Replaces the negotiated application protocol token.
    #[must_use]
    pub fn with_alpn(mut self, protocol: impl Into<Vec<u8>>) -> Self {
        Arc::make_mut(&mut self.inner).alpn_protocols = vec![protocol.into()];
        self
    }

    /// The underlying rustls configuration.
    #[must_use]
    pub fn rustls(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.inner)
    }
}

/// TLS configuration of the dialing side. Presents a leaf, trusts only the
/// anchor and checks the server against `server_name`.
#[derive(Debug, Clone)]
pub struct ClientTlsConfig {
    inner: Arc<ClientConfig>,
    server_name: String,
}

impl ClientTlsConfig {
    /// Replaces the negotiated application protocol token.
    #[must_use]
    pub fn with_alpn(mut self, protocol: impl Into<Vec<u8>>) -> Self {
        Arc::make_mut(&mut self.inner).alpn_protocols = vec![protocol.into()];
        self
    }

    /// The name the server certificate is validated against.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// The underlying rustls configuration.
    #[must_use]
    pub fn rustls(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.inner)
    }
}

/// Builds the listening side configuration.
///
/// # Errors
///
/// Returns an error if the anchor cannot be used as a root or the leaf key
/// is rejected.
pub fn server_tls_config(cert: &LeafCertificate, anchor: &TrustAnchor) -> Result<ServerTlsConfig> {
    let provider = crypto_provider();
    let verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::new(root_store(anchor)?), provider.clone())
            .build()?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_client_cert_verifier(verifier)
        .with_single_cert(vec![cert.cert_der().clone()], cert.private_key_der())?;
    config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    Ok(ServerTlsConfig {
        inner: Arc::new(config),
    })
}

/// Builds the dialing side configuration.
///
/// # Errors
///
/// Returns an error if `expected_server_name` is not a DNS name or IP
/// address, the anchor cannot be used as a root, or the leaf key is rejected.
pub fn client_tls_config(
    cert: &LeafCertificate,
    anchor: &TrustAnchor,
    expected_server_name: &str,
) -> Result<ClientTlsConfig> {
    ServerName::try_from(expected_server_name)
        .map_err(|e| Error::InvalidServerName(format!("{expected_server_name}: {e}")))?;

    let mut config = ClientConfig::builder_with_provider(crypto_provider())
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_root_certificates(root_store(anchor)?)
        .with_client_auth_cert(vec![cert.cert_der().clone()], cert.private_key_der())?;
    config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    Ok(ClientTlsConfig {
        inner: Arc::new(config),
        server_name: expected_server_name.to_string(),
    })
}

fn root_store(anchor: &TrustAnchor) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    roots.add(anchor.cert_der().clone())?;
    Ok(roots)
}

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}
