use crate::config::QuicConfig;
use crate::conn::{CLOSE_CODE_SETUP_FAILED, QuicConnection};
use crate::error::{Error, Result};
use crate::purpose::{Purpose, write_purpose};
use crate::stream::abandon;

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use ferry_pki::ClientTlsConfig;
use ferry_transport::Dialer;
use quinn::Endpoint;
use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Connects to `address` (`host:port`) and opens the initial stream.
///
/// The handshake is bounded by [`QuicConfig::handshake_timeout`]. The
/// initial stream is tagged [`Purpose::Control`]. Dropping the returned
/// future cancels the attempt.
///
/// # Errors
///
/// Returns [`Error::Resolve`], [`Error::Bind`] or [`Error::Connect`] if the
/// attempt cannot start, [`Error::Handshake`] or [`Error::HandshakeTimeout`]
/// if the handshake fails, and [`Error::StreamOpen`] or
/// [`Error::PurposeWrite`] if the initial stream cannot be set up. In the
/// last case the connection is closed with code `1` first.
pub async fn dial(
    address: &str,
    tls: &ClientTlsConfig,
    config: &QuicConfig,
) -> Result<QuicConnection> {
    let remote = resolve(address).await?;

    let bind_addr = if remote.is_ipv6() {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    };

    let mut endpoint = Endpoint::client(bind_addr).map_err(|source| Error::Bind {
        addr: bind_addr,
        source,
    })?;
    endpoint.set_default_client_config(config.client_config(tls)?);
    let local_addr = endpoint.local_addr()?;

    let connecting = endpoint
        .connect(remote, tls.server_name())
        .map_err(|source| Error::Connect {
            addr: remote,
            source,
        })?;

    let connection = match timeout(config.handshake_timeout, connecting).await {
        Ok(Ok(connection)) => connection,
        Ok(Err(e)) => {
            warn!(%remote, "handshake failed: {e}");
            return Err(Error::Handshake(e));
        }
        Err(_) => {
            warn!(%remote, "handshake timed out");
            return Err(Error::HandshakeTimeout(config.handshake_timeout));
        }
    };
    debug!(%remote, "handshake complete");

    let (mut send, recv) = match connection.open_bi().await {
        Ok(stream) => stream,
        Err(e) => {
            connection.close(CLOSE_CODE_SETUP_FAILED, b"failed to open stream");
            return Err(Error::StreamOpen(e));
        }
    };

    if let Err(e) = write_purpose(&mut send, Purpose::Control).await {
        abandon(send, recv);
        connection.close(CLOSE_CODE_SETUP_FAILED, b"failed to open stream");
        return Err(e);
    }

    info!(%remote, %local_addr, "connected");

    Ok(QuicConnection::new(
        connection,
        (send, recv),
        local_addr,
        Purpose::Control,
        Some(endpoint),
    ))
}

async fn resolve(address: &str) -> Result<SocketAddr> {
    let resolve_error = |reason: String| Error::Resolve {
        address: address.to_string(),
        reason,
    };

    lookup_host(address)
        .await
        .map_err(|e| resolve_error(e.to_string()))?
        .next()
        .ok_or_else(|| resolve_error("no addresses found".to_string()))
}

/// Dials repeatedly with one TLS and transport configuration.
#[derive(Debug, Clone)]
pub struct QuicDialer {
    tls: ClientTlsConfig,
    config: QuicConfig,
}

impl QuicDialer {
    /// Creates a dialer.
    #[must_use]
    pub const fn new(tls: ClientTlsConfig, config: QuicConfig) -> Self {
        Self { tls, config }
    }
}

#[async_trait]
impl Dialer for QuicDialer {
    type Connection = QuicConnection;
    type Error = Error;

    async fn dial(&self, address: &str) -> Result<QuicConnection> {
        dial(address, &self.tls, &self.config).await
    }
}
