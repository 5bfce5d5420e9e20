//! Role-scoped identities embedded into issued certificates.

use crate::error::{Error, Result};

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use x509_parser::prelude::*;

/// URI scheme of the subject-alternative-name that carries an identity.
pub const IDENTITY_URI_SCHEME: &str = "ferry";

/// Hosts a unit certificate is valid for unless told otherwise.
const DEFAULT_UNIT_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// The role a peer plays in a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The central controller. Dials out to units.
    Controller,
    /// A remote unit. Accepts connections from the controller.
    Unit,
}

impl Role {
    /// The role tag as written into certificates.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Unit => "unit",
        }
    }

    /// Extended key usage conventionally issued for this role.
    #[must_use]
    pub const fn default_usage(self) -> ExtendedUsage {
        match self {
            Self::Controller => ExtendedUsage::CLIENT,
            Self::Unit => ExtendedUsage::SERVER,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "controller" => Ok(Self::Controller),
            "unit" => Ok(Self::Unit),
            other => Err(Error::InvalidIdentity(format!("unknown role '{other}'"))),
        }
    }
}

/// Extended key usage flags of a leaf certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtendedUsage {
    /// TLS server authentication.
    pub server_auth: bool,
    /// TLS client authentication.
    pub client_auth: bool,
}

impl ExtendedUsage {
    /// Server authentication only.
    pub const SERVER: Self = Self {
        server_auth: true,
        client_auth: false,
    };

    /// Client authentication only.
    pub const CLIENT: Self = Self {
        server_auth: false,
        client_auth: true,
    };
}

/// A role tag plus an instance name, and the hosts a server certificate
/// issued for it should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    role: Role,
    name: String,
    hosts: Vec<String>,
}

impl Identity {
    /// Creates an identity. Units get loopback hosts by default.
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        let hosts = match role {
            Role::Unit => DEFAULT_UNIT_HOSTS.iter().map(ToString::to_string).collect(),
            Role::Controller => Vec::new(),
        };

        Self {
            role,
            name: name.into(),
            hosts,
        }
    }

    /// Identity of a remote unit.
    pub fn unit(name: impl Into<String>) -> Self {
        Self::new(Role::Unit, name)
    }

    /// Identity of a controller.
    pub fn controller(name: impl Into<String>) -> Self {
        Self::new(Role::Controller, name)
    }

    /// Adds a DNS name or IP literal the certificate should be valid for.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        if !self.hosts.contains(&host) {
            self.hosts.push(host);
        }
        self
    }

    /// The role tag.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// The instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// DNS names and IP literals.
    #[must_use]
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// The `ferry://<role>/<name>` URI written as a subject-alternative-name.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{IDENTITY_URI_SCHEME}://{}/{}", self.role, self.name)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidIdentity("empty instance name".to_string()));
        }

        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(Error::InvalidIdentity(format!(
                "instance name '{}' contains characters outside [A-Za-z0-9._-]",
                self.name
            )));
        }

        if self.hosts.iter().any(String::is_empty) {
            return Err(Error::InvalidIdentity("empty host name".to_string()));
        }

        Ok(())
    }

    /// Recovers the identity embedded in a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate cannot be parsed or carries no
    /// identity URI.
    pub fn from_certificate_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)?;

        let san = cert
            .subject_alternative_name()
            .map_err(|e| Error::Parse(e.to_string()))?
            .ok_or_else(|| Error::Parse("missing subject alternative name".to_string()))?;

        let mut uri = None;
        let mut hosts = Vec::new();

        for name in &san.value.general_names {
            match name {
                GeneralName::URI(value) if is_identity_uri(value) => {
                    uri = Some(*value);
                }
                GeneralName::DNSName(value) => hosts.push((*value).to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_octets(bytes) {
                        hosts.push(ip.to_string());
                    }
                }
                _ => {}
            }
        }

        let uri = uri.ok_or_else(|| Error::Parse("missing identity URI".to_string()))?;
        let (role, name) = parse_identity_uri(uri)?;

        Ok(Self { role, name, hosts })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.role, self.name)
    }
}

fn is_identity_uri(uri: &str) -> bool {
    uri.strip_prefix(IDENTITY_URI_SCHEME)
        .is_some_and(|rest| rest.starts_with("://"))
}

fn parse_identity_uri(uri: &str) -> Result<(Role, String)> {
    let rest = uri
        .strip_prefix(IDENTITY_URI_SCHEME)
        .and_then(|rest| rest.strip_prefix("://"))
        .ok_or_else(|| Error::Parse(format!("not an identity URI: {uri}")))?;

    let (role, name) = rest
        .split_once('/')
        .ok_or_else(|| Error::Parse(format!("identity URI without name: {uri}")))?;

    Ok((role.parse()?, name.to_string()))
}

fn ip_from_octets(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes)
            .ok()
            .map(|octets| IpAddr::V4(Ipv4Addr::from(octets))),
        16 => <[u8; 16]>::try_from(bytes)
            .ok()
            .map(|octets| IpAddr::V6(Ipv6Addr::from(octets))),
        _ => None,
    }
}
