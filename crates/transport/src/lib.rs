//! Transport contracts for stream-based RPC layers.
//!
//! This crate defines what an RPC framework needs from a transport: a
//! byte-duplex connection with addressing and deadline controls, a way to
//! dial one, and a way to accept them. Concrete transports (QUIC, ...) are
//! provided in separate crates.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

/// A bidirectional byte connection.
///
/// Reads and writes block until they complete, fail, or the deadline set for
/// their direction elapses. An elapsed deadline surfaces as
/// [`std::io::ErrorKind::TimedOut`]. `None` means no deadline.
pub trait Connector: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Local address of the connection.
    fn local_addr(&self) -> SocketAddr;

    /// Address of the remote peer.
    fn remote_addr(&self) -> SocketAddr;

    /// Sets the deadline for reads.
    fn set_read_deadline(&mut self, deadline: Option<Instant>);

    /// Sets the deadline for writes.
    fn set_write_deadline(&mut self, deadline: Option<Instant>);

    /// Sets the deadline for both directions.
    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.set_read_deadline(deadline);
        self.set_write_deadline(deadline);
    }
}

/// Establishes outbound connections.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// The connection type produced.
    type Connection: Connector;

    /// The error returned when dialing fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connects to `address` (`host:port`).
    async fn dial(&self, address: &str) -> Result<Self::Connection, Self::Error>;
}

/// Accepts inbound connections.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// The connection type produced.
    type Connection: Connector;

    /// The error returned when accepting fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Waits for the next connection.
    async fn accept(&self) -> Result<Self::Connection, Self::Error>;

    /// The address the listener is bound to.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;

    /// Stops accepting connections.
    fn close(&self);
}
