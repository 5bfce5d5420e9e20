//! Error types for the QUIC transport.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to bind a UDP socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address we tried to bind.
        addr: SocketAddr,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Failed to resolve a dial address.
    #[error("failed to resolve {address}: {reason}")]
    Resolve {
        /// The address as given.
        address: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The connection attempt could not be started.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// The address we tried to connect to.
        addr: SocketAddr,
        /// The underlying error.
        #[source]
        source: quinn::ConnectError,
    },

    /// The secure handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(#[source] quinn::ConnectionError),

    /// The secure handshake did not complete in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Opening a stream failed.
    #[error("failed to open stream: {0}")]
    StreamOpen(#[source] quinn::ConnectionError),

    /// Accepting a stream failed.
    #[error("failed to accept stream: {0}")]
    StreamAccept(#[source] quinn::ConnectionError),

    /// The peer opened no stream after the handshake.
    #[error("peer opened no stream within {0:?}")]
    InitialStreamTimeout(Duration),

    /// Writing the purpose tag of a new stream failed.
    #[error("failed to write stream purpose: {0}")]
    PurposeWrite(#[source] quinn::WriteError),

    /// The peer closed or failed a stream before sending its purpose tag.
    #[error("failed to read stream purpose: {0}")]
    PurposeRead(#[source] quinn::ReadExactError),

    /// The connection was closed with [`crate::MuxConnection::close`].
    #[error("connection closed{}", cause(.0))]
    Closed(Option<quinn::ConnectionError>),

    /// The connection had already terminated when it was closed.
    #[error("connection lost before close: {0}")]
    ConnectionLost(#[source] quinn::ConnectionError),

    /// Finishing a stream failed.
    #[error("failed to close stream: {0}")]
    StreamClose(#[source] quinn::ClosedStream),

    /// The listener no longer accepts connections.
    #[error("listener closed")]
    ListenerClosed,

    /// The peer presented no certificate identity.
    #[error("peer presented no certificate identity")]
    NoPeerIdentity,

    /// Invalid transport configuration.
    #[error("invalid transport configuration: {0}")]
    Config(String),

    /// The TLS configuration cannot be used for QUIC.
    #[error(transparent)]
    Crypto(#[from] quinn::crypto::rustls::NoInitialCipherSuite),

    /// Certificate handling failed.
    #[error(transparent)]
    Pki(#[from] ferry_pki::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the error ends the whole connection rather than a single
    /// stream.
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::Handshake(_)
                | Self::HandshakeTimeout(_)
                | Self::StreamOpen(_)
                | Self::StreamAccept(_)
                | Self::InitialStreamTimeout(_)
                | Self::Closed(_)
                | Self::ConnectionLost(_)
        )
    }
}

fn cause(reason: &Option<quinn::ConnectionError>) -> String {
    reason
        .as_ref()
        .map(|reason| format!(": {reason}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_display() {
        assert_eq!(Error::Closed(None).to_string(), "connection closed");
        assert_eq!(
            Error::Closed(Some(quinn::ConnectionError::TimedOut)).to_string(),
            "connection closed: timed out"
        );
    }

    #[test]
    fn test_connection_fatal_classification() {
        assert!(Error::HandshakeTimeout(Duration::from_secs(1)).is_connection_fatal());
        assert!(Error::Closed(None).is_connection_fatal());
        assert!(!Error::ListenerClosed.is_connection_fatal());
        assert!(!Error::PurposeRead(quinn::ReadExactError::FinishedEarly(0)).is_connection_fatal());
    }
}
