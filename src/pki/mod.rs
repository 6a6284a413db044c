//! PKI operations for the hub client certificate
//!
//! The agent generates its own key pair and sends only a CSR to the hub.
//! The private key never leaves the agent: it is held in memory while the
//! request is pending and then written to the credential secret together
//! with the issued certificate.

use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair};
use thiserror::Error;
use x509_parser::prelude::*;
use zeroize::Zeroizing;

mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use validation::{check_certificate, is_certificate_valid, renewal_delay, CertificateValidity};

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// CSR encoding failed
    #[error("CSR generation failed: {0}")]
    CsrGenerationFailed(String),

    /// Certificate parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Parse PEM-encoded data and return the DER bytes of the first block
pub fn parse_pem(pem_data: &[u8]) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data)
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// Distinguished name requested for the client certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Common name, e.g. `system:open-cluster-management:cluster1:agent1`
    pub common_name: String,
    /// Organization names (become group memberships on the hub)
    pub organizations: Vec<String>,
}

impl Subject {
    /// Build the bootstrap identity subject for a cluster agent
    ///
    /// The common name has the form `<prefix>:<cluster-name>:<agent-name>`.
    pub fn for_agent(prefix: &str, cluster_name: &str, agent_name: &str) -> Self {
        Self {
            common_name: format!("{}:{}:{}", prefix, cluster_name, agent_name),
            organizations: Vec::new(),
        }
    }

    /// Add an organization to the subject
    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organizations.push(org.into());
        self
    }

    fn distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(self.common_name.clone()),
        );
        for org in &self.organizations {
            dn.push(DnType::OrganizationName, DnValue::Utf8String(org.clone()));
        }
        dn
    }
}

/// Information about a certificate's validity window and identity
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
    /// Subject common name
    pub common_name: String,
}

impl CertificateInfo {
    /// Parse certificate info from PEM-encoded certificate data
    ///
    /// Only the first certificate in a chain is inspected.
    pub fn from_pem(pem_data: &[u8]) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name,
        })
    }

    /// Total lifetime of the certificate in seconds
    pub fn lifetime_secs(&self) -> i64 {
        self.not_after - self.not_before
    }
}

/// Client certificate request (generates keypair and CSR locally)
pub struct ClientCertRequest {
    /// The generated private key PEM (zeroized on drop)
    key_pem: Zeroizing<String>,
    /// CSR in PEM format (sent to the hub)
    csr_pem: String,
}

impl ClientCertRequest {
    /// Generate a new key pair and a CSR for the given subject
    pub fn new(subject: &Subject) -> Result<Self> {
        let key_pair = KeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate client key: {}", e))
        })?;

        let key_pem = Zeroizing::new(key_pair.serialize_pem());

        let mut params = CertificateParams::default();
        params.distinguished_name = subject.distinguished_name();

        let csr = params.serialize_request(&key_pair).map_err(|e| {
            PkiError::CsrGenerationFailed(format!("failed to create CSR: {}", e))
        })?;

        let csr_pem = csr.pem().map_err(|e| {
            PkiError::CsrGenerationFailed(format!("failed to serialize CSR: {}", e))
        })?;

        Ok(Self { key_pem, csr_pem })
    }

    /// Get the CSR in PEM format (to send to the hub for signing)
    pub fn csr_pem(&self) -> &str {
        &self.csr_pem
    }

    /// Get the private key in PEM format
    pub fn private_key_pem(&self) -> &str {
        &self.key_pem
    }

    /// Consume the request, keeping only the private key
    pub fn into_private_key(self) -> Zeroizing<String> {
        self.key_pem
    }
}
