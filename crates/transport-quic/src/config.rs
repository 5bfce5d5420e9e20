use crate::error::{Error, Result};

use std::sync::Arc;
use std::time::Duration;

use ferry_pki::{ClientTlsConfig, ServerTlsConfig};
use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use quinn::{IdleTimeout, TransportConfig, VarInt};

/// QUIC transport configuration.
#[derive(Debug, Clone)]
pub struct QuicConfig {
    /// Upper bound on the secure handshake.
    pub handshake_timeout: Duration,
    /// How long a listener waits for the dialer's initial stream.
    pub initial_stream_timeout: Duration,
    /// Idle period after which the connection is dropped.
    pub max_idle_timeout: Duration,
    /// Keep-alive interval. `None` disables keep-alives.
    pub keep_alive_interval: Option<Duration>,
    /// Maximum bidirectional streams the peer may have open at once.
    pub max_concurrent_bidi_streams: u32,
}

impl Default for QuicConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            initial_stream_timeout: Duration::from_secs(10),
            max_idle_timeout: Duration::from_secs(30),
            keep_alive_interval: Some(Duration::from_secs(5)),
            max_concurrent_bidi_streams: 256,
        }
    }
}

impl QuicConfig {
    fn transport_config(&self) -> Result<TransportConfig> {
        let idle_timeout = IdleTimeout::try_from(self.max_idle_timeout)
            .map_err(|e| Error::Config(format!("max_idle_timeout: {e}")))?;

        if let Some(interval) = self.keep_alive_interval {
            if interval >= self.max_idle_timeout {
                return Err(Error::Config(format!(
                    "keep_alive_interval {interval:?} must be shorter than max_idle_timeout {:?}",
                    self.max_idle_timeout
                )));
            }
        }

        let mut transport = TransportConfig::default();
        transport
            .max_idle_timeout(Some(idle_timeout))
            .keep_alive_interval(self.keep_alive_interval)
            .max_concurrent_bidi_streams(VarInt::from_u32(self.max_concurrent_bidi_streams))
            .max_concurrent_uni_streams(VarInt::from_u32(0));

        Ok(transport)
    }

    pub(crate) fn server_config(&self, tls: &ServerTlsConfig) -> Result<quinn::ServerConfig> {
        let crypto = QuicServerConfig::try_from(tls.rustls())?;
        let mut config = quinn::ServerConfig::with_crypto(Arc::new(crypto));
        config.transport_config(Arc::new(self.transport_config()?));
        Ok(config)
    }

    pub(crate) fn client_config(&self, tls: &ClientTlsConfig) -> Result<quinn::ClientConfig> {
        let crypto = QuicClientConfig::try_from(tls.rustls())?;
        let mut config = quinn::ClientConfig::new(Arc::new(crypto));
        config.transport_config(Arc::new(self.transport_config()?));
        Ok(config)
    }
}
