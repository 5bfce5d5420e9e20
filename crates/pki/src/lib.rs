//! Role-scoped certificate authority for controller/unit deployments.
//!
//! Generates a self-signed trust anchor, issues leaf certificates bound to a
//! controller or unit identity, and builds the asymmetric mutual-TLS
//! configurations used by the dialing (controller) and listening (unit)
//! sides of a QUIC transport.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod anchor;
mod config;
mod error;
mod identity;
mod tls;

pub use anchor::{LeafCertificate, TrustAnchor};
pub use config::PkiConfig;
pub use error::{Error, Result};
pub use identity::{ExtendedUsage, IDENTITY_URI_SCHEME, Identity, Role};
pub use tls::{ALPN_PROTOCOL, ClientTlsConfig, ServerTlsConfig, client_tls_config, server_tls_config};
