//! Signing request control
//!
//! Submission, approval polling and certificate retrieval against the hub's
//! signing authority. Implementations hold no state between calls: the
//! controller tracks the outstanding request itself.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

#[cfg(test)]
use mockall::automock;

use crate::pki::Subject;
use crate::Error;

mod kubernetes;

pub use self::kubernetes::{approval_from_status, KubeCsrControl, CLIENT_USAGES};

/// Well-known signer for hub API server client certificates
pub const KUBE_APISERVER_CLIENT_SIGNER: &str = "kubernetes.io/kube-apiserver-client";

/// Options for every signing request a controller submits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrOptions {
    /// Prefix for server-side name generation
    pub name_prefix: String,
    /// Labels attached to each request (also used to watch them)
    pub labels: BTreeMap<String, String>,
    /// Requested subject
    pub subject: Subject,
    /// Signer that should issue the certificate
    pub signer_name: String,
    /// Requested certificate lifetime; the signer may ignore it
    pub expiration_seconds: Option<i32>,
}

impl CsrOptions {
    /// Check the options are usable
    pub fn validate(&self) -> Result<(), Error> {
        if self.subject.common_name.is_empty() {
            return Err(Error::config("signing request subject needs a common name"));
        }
        if self.signer_name.is_empty() {
            return Err(Error::config("signer name must not be empty"));
        }
        if self.name_prefix.is_empty() {
            return Err(Error::config("signing request name prefix must not be empty"));
        }
        if matches!(self.expiration_seconds, Some(secs) if secs < 600) {
            return Err(Error::config(
                "requested certificate lifetime must be at least 600 seconds",
            ));
        }
        Ok(())
    }

    /// Label selector matching requests created with these options
    pub fn label_selector(&self) -> Option<String> {
        if self.labels.is_empty() {
            return None;
        }
        Some(
            self.labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

/// Approval state of a signing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    /// Neither approved nor denied yet
    Pending,
    /// Approved; the certificate may still be on its way
    Approved,
    /// Denied or failed; it will never be issued
    Denied,
}

/// Access to the hub's signing authority
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CsrControl: Send + Sync {
    /// Submit a new request for the PEM-encoded CSR, returning its name
    async fn create(&self, options: &CsrOptions, csr_pem: &[u8]) -> Result<String, Error>;

    /// Current approval state of a request
    ///
    /// Fails with [`Error::SigningRequestNotFound`] if the request is gone.
    async fn approval_status(&self, name: &str) -> Result<ApprovalStatus, Error>;

    /// The issued certificate, `None` while the signer has not produced it
    async fn issued_certificate(&self, name: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Names of requests whose state changed, for waking the scheduler
    fn subscribe(&self) -> BoxStream<'static, String>;
}
