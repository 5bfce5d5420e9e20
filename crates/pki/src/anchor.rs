//! Trust anchor generation and leaf issuance.

use crate::config::PkiConfig;
use crate::error::{Error, Result};
use crate::identity::{ExtendedUsage, Identity};

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SanType,
};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use time::OffsetDateTime;
use tracing::debug;

/// Self-signed root that signs every leaf of a deployment.
pub struct TrustAnchor {
    cert: Certificate,
    key: KeyPair,
    config: PkiConfig,
}

impl TrustAnchor {
    /// Generates a new root with the default [`PkiConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyGen`] or [`Error::CertEncode`] on cryptographic
    /// failure.
    pub fn generate() -> Result<Self> {
        Self::generate_with(PkiConfig::default())
    }

    /// Generates a new root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyGen`] or [`Error::CertEncode`] on cryptographic
    /// failure.
    pub fn generate_with(config: PkiConfig) -> Result<Self> {
        let key = KeyPair::generate().map_err(Error::KeyGen)?;

        let mut params = CertificateParams::default();
        params.distinguished_name =
            distinguished_name(&config.organization, &config.ca_common_name, None);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        set_validity(&mut params, config.clock_skew, config.ca_validity);

        let cert = params.self_signed(&key).map_err(Error::CertEncode)?;

        debug!("generated trust anchor '{}'", config.ca_common_name);

        Ok(Self { cert, key, config })
    }

    /// Issues a leaf certificate for `identity`, signed by this anchor.
    ///
    /// The usage flags are taken as given; the role convention is not
    /// enforced here (see [`Self::issue_for_role`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is invalid, neither usage is
    /// requested, or key generation or signing fails.
    pub fn issue(
        &self,
        identity: &Identity,
        is_server: bool,
        is_client: bool,
    ) -> Result<LeafCertificate> {
        identity.validate()?;

        if !is_server && !is_client {
            return Err(Error::EmptyUsage);
        }

        let key = KeyPair::generate().map_err(Error::KeyGen)?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(
            &self.config.organization,
            identity.name(),
            Some(identity.role().as_str()),
        );
        params.subject_alt_names = subject_alt_names(identity)?;
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        if is_server {
            params
                .extended_key_usages
                .push(ExtendedKeyUsagePurpose::ServerAuth);
        }
        if is_client {
            params
                .extended_key_usages
                .push(ExtendedKeyUsagePurpose::ClientAuth);
        }
        params.use_authority_key_identifier_extension = true;
        set_validity(&mut params, self.config.clock_skew, self.config.leaf_validity);

        let cert = params
            .signed_by(&key, &self.cert, &self.key)
            .map_err(Error::CertGen)?;

        debug!(
            "issued certificate for {} (server: {}, client: {})",
            identity, is_server, is_client
        );

        Ok(LeafCertificate {
            identity: identity.clone(),
            usage: ExtendedUsage {
                server_auth: is_server,
                client_auth: is_client,
            },
            cert,
            key,
        })
    }

    /// Issues a leaf with the usage conventional for the identity's role:
    /// server-only for units, client-only for controllers.
    ///
    /// # Errors
    ///
    /// See [`Self::issue`].
    pub fn issue_for_role(&self, identity: &Identity) -> Result<LeafCertificate> {
        let usage = identity.role().default_usage();
        self.issue(identity, usage.server_auth, usage.client_auth)
    }

    /// DER encoding of the root certificate.
    #[must_use]
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        self.cert.der()
    }

    /// PEM encoding of the root certificate.
    #[must_use]
    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    /// PEM encoding of the root private key.
    #[must_use]
    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }

    /// The issuance parameters of this anchor.
    #[must_use]
    pub const fn config(&self) -> &PkiConfig {
        &self.config
    }
}

impl fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustAnchor")
            .field("common_name", &self.config.ca_common_name)
            .finish_non_exhaustive()
    }
}

/// A key pair plus a certificate signed by a [`TrustAnchor`].
pub struct LeafCertificate {
    identity: Identity,
    usage: ExtendedUsage,
    cert: Certificate,
    key: KeyPair,
}

impl LeafCertificate {
    /// The identity this certificate was issued for.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The extended key usage carried by the certificate.
    #[must_use]
    pub const fn usage(&self) -> ExtendedUsage {
        self.usage
    }

    /// DER encoding of the certificate.
    #[must_use]
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        self.cert.der()
    }

    /// PEM encoding of the certificate.
    #[must_use]
    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    /// PEM encoding of the private key.
    #[must_use]
    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }

    pub(crate) fn private_key_der(&self) -> PrivateKeyDer<'static> {
        PrivatePkcs8KeyDer::from(self.key.serialize_der()).into()
    }
}

impl fmt::Debug for LeafCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafCertificate")
            .field("identity", &self.identity)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

fn distinguished_name(organization: &str, common_name: &str, role: Option<&str>) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, organization);
    if let Some(role) = role {
        dn.push(DnType::OrganizationalUnitName, role);
    }
    dn.push(DnType::CommonName, common_name);
    dn
}

fn subject_alt_names(identity: &Identity) -> Result<Vec<SanType>> {
    let uri = identity.uri();
    let mut names = vec![SanType::URI(
        uri.as_str().try_into().map_err(Error::CertGen)?,
    )];

    for host in identity.hosts() {
        let san = match host.parse::<IpAddr>() {
            Ok(ip) => SanType::IpAddress(ip),
            Err(_) => SanType::DnsName(host.as_str().try_into().map_err(Error::CertGen)?),
        };
        names.push(san);
    }

    Ok(names)
}

fn set_validity(params: &mut CertificateParams, skew: Duration, validity: Duration) {
    let now = OffsetDateTime::now_utc();
    params.not_before = now - skew;
    params.not_after = now + validity;
}
