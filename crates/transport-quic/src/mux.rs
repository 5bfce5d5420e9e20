//! Purpose-tagged logical streams over one QUIC connection.

use crate::close_once::CloseOnce;
use crate::conn::{CLOSE_CODE_OK, CLOSE_REASON, peer_identity};
use crate::error::{Error, Result};
use crate::lifecycle::{ConnectionState, Lifecycle};
use crate::purpose::{Purpose, read_purpose, write_purpose};
use crate::stream::{DuplexStream, abandon, forward_duplex};

use std::net::SocketAddr;
use std::sync::Arc;

use ferry_pki::Identity;
use quinn::{ConnectionError, StreamId, VarInt};
use tracing::{debug, info};

#[derive(Debug)]
struct Inner {
    connection: quinn::Connection,
    local_addr: SocketAddr,
    close: CloseOnce<ConnectionError>,
    lifecycle: Lifecycle,
}

/// An established connection carrying purpose-tagged streams.
///
/// Clones share the closed flag, so [`MuxConnection::close`] tears the
/// connection down exactly once no matter how many holders call it.
#[derive(Debug, Clone)]
pub struct MuxConnection {
    inner: Arc<Inner>,
}

impl MuxConnection {
    /// Wraps an established connection. `local_addr` is the address of the
    /// endpoint that owns it.
    #[must_use]
    pub fn new(connection: quinn::Connection, local_addr: SocketAddr) -> Self {
        let lifecycle = Lifecycle::new(ConnectionState::Established);

        Self {
            inner: Arc::new(Inner {
                connection,
                local_addr,
                close: CloseOnce::new(),
                lifecycle,
            }),
        }
    }

    /// Opens a stream and writes its purpose tag.
    ///
    /// A [`Purpose::Unrecognized`] value holding a known tag byte is sent
    /// and reported as that known purpose.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] without any I/O once the connection has been
    /// closed, [`Error::StreamOpen`] if the connection cannot open a stream,
    /// or [`Error::PurposeWrite`] if the tag could not be written. The stream
    /// is released before the error returns.
    pub async fn open_stream(&self, purpose: Purpose) -> Result<MuxStream> {
        self.ensure_open()?;
        let purpose = Purpose::from_byte(purpose.as_byte());

        let (mut send, recv) = self.inner.connection.open_bi().await.map_err(|e| {
            self.inner.lifecycle.advance(ConnectionState::Closing);
            Error::StreamOpen(e)
        })?;

        if let Err(e) = write_purpose(&mut send, purpose).await {
            abandon(send, recv);
            return Err(e);
        }

        let stream = MuxStream::new(self.duplex(send, recv), purpose);
        debug!(id = %stream.id(), %purpose, "opened stream");

        Ok(stream)
    }

    /// Accepts the next stream the peer opens and reads its purpose tag.
    ///
    /// Tags outside the known set come back as [`Purpose::Unrecognized`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] without any I/O once the connection has been
    /// closed, [`Error::StreamAccept`] if the connection fails, or
    /// [`Error::PurposeRead`] if the peer ended the stream before its tag.
    pub async fn accept_stream(&self) -> Result<(MuxStream, Purpose)> {
        self.ensure_open()?;

        let (send, mut recv) = self.inner.connection.accept_bi().await.map_err(|e| {
            self.inner.lifecycle.advance(ConnectionState::Closing);
            Error::StreamAccept(e)
        })?;

        let purpose = match read_purpose(&mut recv).await {
            Ok(purpose) => purpose,
            Err(e) => {
                abandon(send, recv);
                return Err(e);
            }
        };

        let stream = MuxStream::new(self.duplex(send, recv), purpose);
        debug!(id = %stream.id(), %purpose, "accepted stream");

        Ok((stream, purpose))
    }

    /// Closes the connection with code `0`.
    ///
    /// Only the first call performs the close; every call returns the same
    /// recorded result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionLost`] if the connection had already failed
    /// before it was closed.
    pub fn close(&self) -> Result<()> {
        let inner = &*self.inner;

        inner
            .close
            .close_with(|| {
                inner.lifecycle.advance(ConnectionState::Closing);
                let prior = inner.connection.close_reason();
                inner.connection.close(CLOSE_CODE_OK, CLOSE_REASON);
                inner.lifecycle.advance(ConnectionState::Closed);
                info!(remote = %inner.connection.remote_address(), "connection closed");

                match prior {
                    None
                    | Some(ConnectionError::LocallyClosed | ConnectionError::ApplicationClosed(_)) => {
                        Ok(())
                    }
                    Some(reason) => Err(reason),
                }
            })
            .map_err(Error::ConnectionLost)
    }

    /// Whether [`MuxConnection::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.close.is_closed()
    }

    /// Waits for the connection to terminate and returns why.
    pub async fn closed(&self) -> ConnectionError {
        self.inner.connection.closed().await
    }

    /// Current lifecycle state. A connection torn down by the peer or by a
    /// fatal error reports [`ConnectionState::Closed`].
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.inner.connection.close_reason().is_some() {
            ConnectionState::Closed
        } else {
            self.inner.lifecycle.get()
        }
    }

    /// Local address of the owning endpoint.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Address of the peer.
    #[must_use]
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.connection.remote_address()
    }

    /// Identity carried by the peer's certificate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPeerIdentity`] or [`Error::Pki`] if the peer's
    /// certificate carries no valid identity.
    pub fn peer_identity(&self) -> Result<Identity> {
        peer_identity(&self.inner.connection)
    }

    pub(crate) fn connection(&self) -> &quinn::Connection {
        &self.inner.connection
    }

    fn ensure_open(&self) -> Result<()> {
        match self.inner.close.result() {
            Some(recorded) => Err(Error::Closed(recorded.err())),
            None => Ok(()),
        }
    }

    fn duplex(&self, send: quinn::SendStream, recv: quinn::RecvStream) -> DuplexStream {
        DuplexStream::new(send, recv, self.inner.local_addr, self.remote_addr())
    }
}

/// A logical stream of a [`MuxConnection`].
///
/// Closing it leaves the connection and its other streams usable.
#[derive(Debug)]
pub struct MuxStream {
    stream: DuplexStream,
    purpose: Purpose,
}

impl MuxStream {
    const fn new(stream: DuplexStream, purpose: Purpose) -> Self {
        Self { stream, purpose }
    }

    /// The purpose tag the stream was opened with.
    #[must_use]
    pub const fn purpose(&self) -> Purpose {
        self.purpose
    }

    /// Stream ID within the connection.
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.stream.id()
    }

    /// Finishes the send direction. The peer reads any buffered data, then
    /// end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamClose`] if the stream was reset. Closing a
    /// finished stream again succeeds.
    pub fn close(&mut self) -> Result<()> {
        self.stream.finish().map_err(Error::StreamClose)
    }

    /// Abandons the send direction. The peer's reads fail with `code`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StreamClose`] if the stream was already reset.
    pub fn reset(&mut self, code: VarInt) -> Result<()> {
        self.stream.reset(code).map_err(Error::StreamClose)
    }
}

forward_duplex!(MuxStream);
