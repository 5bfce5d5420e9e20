//! A secure connection exposed through its initial stream.

use crate::error::{Error, Result};
use crate::lifecycle::ConnectionState;
use crate::mux::MuxConnection;
use crate::purpose::Purpose;
use crate::stream::{DuplexStream, forward_duplex};

use std::net::SocketAddr;

use ferry_pki::Identity;
use quinn::{Endpoint, RecvStream, SendStream, StreamId, VarInt};
use rustls_pki_types::CertificateDer;

/// Application close code for an orderly shutdown.
pub const CLOSE_CODE_OK: VarInt = VarInt::from_u32(0);

/// Application close code used when connection setup fails.
pub const CLOSE_CODE_SETUP_FAILED: VarInt = VarInt::from_u32(1);

pub(crate) const CLOSE_REASON: &[u8] = b"closing";

/// A QUIC connection together with the stream opened when it was set up.
///
/// Reads and writes go to that initial stream. Other streams can be opened on
/// the same connection through [`QuicConnection::multiplexer`]; every handle
/// shares one closed flag with the adapter itself.
#[derive(Debug)]
pub struct QuicConnection {
    stream: DuplexStream,
    mux: MuxConnection,
    // Client endpoints are owned per dial and drained on close.
    endpoint: Option<Endpoint>,
    purpose: Purpose,
}

impl QuicConnection {
    pub(crate) fn new(
        connection: quinn::Connection,
        (send, recv): (SendStream, RecvStream),
        local_addr: SocketAddr,
        purpose: Purpose,
        endpoint: Option<Endpoint>,
    ) -> Self {
        let stream = DuplexStream::new(send, recv, local_addr, connection.remote_address());

        Self {
            stream,
            mux: MuxConnection::new(connection, local_addr),
            endpoint,
            purpose,
        }
    }

    /// Purpose tag of the initial stream.
    #[must_use]
    pub const fn purpose(&self) -> Purpose {
        self.purpose
    }

    /// The underlying QUIC connection.
    #[must_use]
    pub fn connection(&self) -> &quinn::Connection {
        self.mux.connection()
    }

    /// ID of the initial stream.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream.id()
    }

    /// The same physical connection for purpose-tagged streams.
    ///
    /// All returned handles are clones of one [`MuxConnection`], so closing
    /// any of them, or this adapter, closes them all.
    #[must_use]
    pub fn multiplexer(&self) -> MuxConnection {
        self.mux.clone()
    }

    /// Identity carried by the peer's certificate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPeerIdentity`] if the peer sent no certificate, or
    /// [`Error::Pki`] if its certificate carries no valid identity.
    pub fn peer_identity(&self) -> Result<Identity> {
        self.mux.peer_identity()
    }

    /// Current lifecycle state. A connection torn down by the peer reports
    /// [`ConnectionState::Closed`].
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.mux.state()
    }

    /// Abandons the send direction of the initial stream. The peer's reads
    /// fail with `code`; the connection stays open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamClose`] if the stream was already reset.
    pub fn reset(&mut self, code: VarInt) -> Result<()> {
        self.stream.reset(code).map_err(Error::StreamClose)
    }

    /// Finishes the initial stream, then closes the connection.
    ///
    /// The connection is only closed if the stream finished cleanly. A send
    /// half already finished with `shutdown` counts as finished. Once closed,
    /// later calls return the recorded result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamClose`] if the stream had been reset; the
    /// connection is left open in that case. Returns
    /// [`Error::ConnectionLost`] if the connection had already failed.
    pub async fn close(&mut self) -> Result<()> {
        if !self.mux.is_closed() && self.connection().close_reason().is_none() {
            self.stream.finish().map_err(Error::StreamClose)?;
        }

        let result = self.mux.close();
        if let Some(endpoint) = &self.endpoint {
            endpoint.wait_idle().await;
        }

        result
    }
}

forward_duplex!(QuicConnection);

pub(crate) fn peer_identity(connection: &quinn::Connection) -> Result<Identity> {
    let certs = connection
        .peer_identity()
        .and_then(|identity| identity.downcast::<Vec<CertificateDer<'static>>>().ok())
        .ok_or(Error::NoPeerIdentity)?;

    let leaf = certs.first().ok_or(Error::NoPeerIdentity)?;
    Ok(Identity::from_certificate_der(leaf.as_ref())?)
}
