use std::time::Duration;

/// Issuance parameters shared by the trust anchor and the leaves it signs.
#[derive(Debug, Clone)]
pub struct PkiConfig {
    /// Organization written into every subject.
    pub organization: String,
    /// Common name of the self-signed root.
    pub ca_common_name: String,
    /// Validity window of the root certificate.
    pub ca_validity: Duration,
    /// Validity window of issued leaf certificates.
    pub leaf_validity: Duration,
    /// How far `not_before` is backdated to tolerate peer clock drift.
    pub clock_skew: Duration,
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            organization: "ferry".to_string(),
            ca_common_name: "ferry root".to_string(),
            ca_validity: Duration::from_secs(365 * 24 * 60 * 60), // 1 year
            leaf_validity: Duration::from_secs(90 * 24 * 60 * 60), // 90 days
            clock_skew: Duration::from_secs(5 * 60),
        }
    }
}
