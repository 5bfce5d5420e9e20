//! QUIC transport with purpose-tagged stream multiplexing.
//!
//! [`dial`] and [`QuicListener`] set up mutually authenticated QUIC
//! connections and expose each one through its initial stream as a
//! byte-duplex ([`QuicConnection`]) that any stream-based RPC layer can run
//! over. [`MuxConnection`] layers further logical streams on the same
//! connection, each tagged with a one-byte [`Purpose`].
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod close_once;
mod config;
mod conn;
mod dialer;
mod error;
mod lifecycle;
mod listener;
mod mux;
mod purpose;
mod stream;

pub use config::QuicConfig;
pub use conn::{CLOSE_CODE_OK, CLOSE_CODE_SETUP_FAILED, QuicConnection};
pub use dialer::{QuicDialer, dial};
pub use error::{Error, Result};
pub use lifecycle::ConnectionState;
pub use listener::QuicListener;
pub use mux::{MuxConnection, MuxStream};
pub use purpose::{CONTROL_TAG, PAYLOAD_TAG, Purpose};

pub use ferry_transport::{Connector, Dialer, Listener};
