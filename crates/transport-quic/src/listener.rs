use crate::config::QuicConfig;
use crate::conn::{CLOSE_CODE_SETUP_FAILED, QuicConnection};
use crate::error::{Error, Result};
use crate::purpose::{Purpose, read_purpose};
use crate::stream::abandon;

use std::net::SocketAddr;

use async_trait::async_trait;
use ferry_pki::ServerTlsConfig;
use ferry_transport::Listener;
use futures::Stream;
use quinn::{Endpoint, Incoming, RecvStream, SendStream};
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Connections that finished setup and wait for [`QuicListener::accept`].
const ACCEPT_BACKLOG: usize = 64;

type Accepted = Result<QuicConnection>;

/// Accepts QUIC connections and their initial stream.
///
/// Every peer is set up in its own task, so a peer that stalls during the
/// handshake or never opens its initial stream does not hold up others.
#[derive(Debug)]
pub struct QuicListener {
    endpoint: Endpoint,
    local_addr: SocketAddr,
    ready: Mutex<mpsc::Receiver<Accepted>>,
    shutdown: CancellationToken,
}

impl QuicListener {
    /// Binds a UDP socket at `addr` and starts accepting in the background.
    /// Port `0` picks a free port. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the socket cannot be bound, or
    /// [`Error::Config`]/[`Error::Crypto`] if the configuration is unusable.
    pub fn bind(addr: SocketAddr, tls: &ServerTlsConfig, config: &QuicConfig) -> Result<Self> {
        let server_config = config.server_config(tls)?;
        let endpoint =
            Endpoint::server(server_config, addr).map_err(|source| Error::Bind { addr, source })?;
        let local_addr = endpoint.local_addr()?;

        let (ready_tx, ready_rx) = mpsc::channel(ACCEPT_BACKLOG);
        let shutdown = CancellationToken::new();

        tokio::spawn(accept_loop(
            endpoint.clone(),
            config.clone(),
            local_addr,
            ready_tx,
            shutdown.clone(),
        ));

        info!(%local_addr, "QUIC listener bound");

        Ok(Self {
            endpoint,
            local_addr,
            ready: Mutex::new(ready_rx),
            shutdown,
        })
    }

    /// The bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the next peer that completed the handshake and opened its
    /// initial stream.
    ///
    /// Failed or timed-out handshakes are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ListenerClosed`] once the listener is closed. If a
    /// peer's initial stream cannot be accepted within
    /// [`QuicConfig::initial_stream_timeout`], that connection is closed with
    /// code `1` and [`Error::InitialStreamTimeout`], [`Error::StreamAccept`]
    /// or [`Error::PurposeRead`] is returned; later calls keep accepting.
    pub async fn accept(&self) -> Result<QuicConnection> {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(Error::ListenerClosed),
            next = async { self.ready.lock().await.recv().await } => {
                next.unwrap_or(Err(Error::ListenerClosed))
            }
        }
    }

    /// Accepted connections as a stream. Ends when the listener is closed.
    pub fn incoming(&self) -> impl Stream<Item = Result<QuicConnection>> + '_ {
        futures::stream::unfold(self, |listener| async move {
            match listener.accept().await {
                Err(Error::ListenerClosed) => None,
                result => Some((result, listener)),
            }
        })
    }

    /// Stops accepting connections. Peers still being set up are dropped;
    /// established connections stay open.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        self.endpoint.set_server_config(None);
        self.shutdown.cancel();
        info!(local_addr = %self.local_addr, "QUIC listener closed");
    }
}

impl Drop for QuicListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(
    endpoint: Endpoint,
    config: QuicConfig,
    local_addr: SocketAddr,
    ready: mpsc::Sender<Accepted>,
    shutdown: CancellationToken,
) {
    loop {
        let incoming = tokio::select! {
            () = shutdown.cancelled() => break,
            incoming = endpoint.accept() => match incoming {
                Some(incoming) => incoming,
                None => break,
            },
        };

        let config = config.clone();
        let ready = ready.clone();
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            let accepted = tokio::select! {
                () = shutdown.cancelled() => return,
                accepted = set_up(incoming, &config, local_addr) => accepted,
            };

            if let Some(accepted) = accepted {
                tokio::select! {
                    () = shutdown.cancelled() => {}
                    _ = ready.send(accepted) => {}
                }
            }
        });
    }

    debug!(%local_addr, "accept loop stopped");
}

/// Runs the handshake and reads the initial stream of one peer. `None` means
/// the peer never got as far as a connection.
async fn set_up(
    incoming: Incoming,
    config: &QuicConfig,
    local_addr: SocketAddr,
) -> Option<Accepted> {
    let remote = incoming.remote_address();

    let connecting = match incoming.accept() {
        Ok(connecting) => connecting,
        Err(e) => {
            warn!(%remote, "failed to accept connection: {e}");
            return None;
        }
    };

    let connection = match timeout(config.handshake_timeout, connecting).await {
        Ok(Ok(connection)) => connection,
        Ok(Err(e)) => {
            warn!(%remote, "handshake failed: {e}");
            return None;
        }
        Err(_) => {
            warn!(%remote, "handshake timed out");
            return None;
        }
    };
    debug!(%remote, "handshake complete");

    let initial = timeout(
        config.initial_stream_timeout,
        accept_initial_stream(&connection),
    )
    .await
    .unwrap_or(Err(Error::InitialStreamTimeout(config.initial_stream_timeout)));

    Some(match initial {
        Ok((stream, purpose)) => {
            info!(%remote, %purpose, "accepted connection");
            Ok(QuicConnection::new(connection, stream, local_addr, purpose, None))
        }
        Err(e) => {
            warn!(%remote, "failed to accept initial stream: {e}");
            connection.close(CLOSE_CODE_SETUP_FAILED, b"failed to accept stream");
            Err(e)
        }
    })
}

async fn accept_initial_stream(
    connection: &quinn::Connection,
) -> Result<((SendStream, RecvStream), Purpose)> {
    let (send, mut recv) = connection.accept_bi().await.map_err(Error::StreamAccept)?;

    match read_purpose(&mut recv).await {
        Ok(purpose) => Ok(((send, recv), purpose)),
        Err(e) => {
            abandon(send, recv);
            Err(e)
        }
    }
}

#[async_trait]
impl Listener for QuicListener {
    type Connection = QuicConnection;
    type Error = Error;

    async fn accept(&self) -> Result<QuicConnection> {
        Self::accept(self).await
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    fn close(&self) {
        Self::close(self);
    }
}
