use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to generate a key pair.
    #[error("key generation failed: {0}")]
    KeyGen(#[source] rcgen::Error),

    /// Failed to build or sign a leaf certificate.
    #[error("certificate generation failed: {0}")]
    CertGen(#[source] rcgen::Error),

    /// Failed to encode the trust anchor certificate.
    #[error("certificate encoding failed: {0}")]
    CertEncode(#[source] rcgen::Error),

    /// The identity cannot be embedded into a certificate.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Neither server nor client authentication was requested.
    #[error("certificate must allow server or client authentication")]
    EmptyUsage,

    /// The expected server name is not a valid DNS name or IP address.
    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    /// Failed to assemble a TLS configuration.
    #[error(transparent)]
    Tls(#[from] rustls::Error),

    /// Failed to build the client certificate verifier.
    #[error(transparent)]
    ClientVerifier(#[from] rustls::server::VerifierBuilderError),

    /// Failed to parse a certificate.
    #[error("certificate parse error: {0}")]
    Parse(String),
}

impl From<x509_parser::nom::Err<x509_parser::error::X509Error>> for Error {
    fn from(err: x509_parser::nom::Err<x509_parser::error::X509Error>) -> Self {
        Self::Parse(err.to_string())
    }
}
