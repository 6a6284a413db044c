//! Credential store adapter
//!
//! The credential bundle (private key, certificate, auxiliary identity data
//! and an optional kubeconfig) lives in a single namespaced object and is
//! always written as one unit. Writes are compare-and-swap against the
//! version token returned by the preceding read.

use std::collections::BTreeMap;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::Error;

mod kubernetes;

pub use self::kubernetes::{KubeSecretStore, SIGNING_REQUEST_ANNOTATION};

/// Field holding the PEM private key
pub const TLS_KEY_FIELD: &str = "tls.key";

/// Field holding the PEM client certificate
pub const TLS_CERT_FIELD: &str = "tls.crt";

/// Field holding the serialized hub connection descriptor
pub const KUBECONFIG_FIELD: &str = "kubeconfig";

/// Conventional auxiliary field carrying the managed cluster name
pub const CLUSTER_NAME_FIELD: &str = "cluster-name";

/// Conventional auxiliary field carrying the agent name
pub const AGENT_NAME_FIELD: &str = "agent-name";

/// The persisted bag of credential fields for one identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialBundle {
    /// Field name to raw bytes
    pub data: BTreeMap<String, Vec<u8>>,
    /// Name of the signing request that issued the stored certificate
    pub signing_request: Option<String>,
}

impl CredentialBundle {
    /// Get a field by name
    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.data.get(name).map(Vec::as_slice)
    }

    /// The stored certificate, if any (an empty value counts as absent)
    pub fn certificate(&self) -> Option<&[u8]> {
        self.field(TLS_CERT_FIELD).filter(|c| !c.is_empty())
    }

    /// The stored private key, if any (an empty value counts as absent)
    pub fn private_key(&self) -> Option<&[u8]> {
        self.field(TLS_KEY_FIELD).filter(|k| !k.is_empty())
    }

    /// Set a field, replacing any previous value
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.data.insert(name.into(), value.into());
    }

    /// Names of the expected fields whose stored value differs byte-for-byte
    ///
    /// Only field names are returned so sensitive values can never leak
    /// through the comparison result.
    pub fn mismatched_fields<'a>(&self, expected: &'a BTreeMap<String, Vec<u8>>) -> Vec<&'a str> {
        expected
            .iter()
            .filter(|(name, value)| self.data.get(name.as_str()) != Some(*value))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// A bundle together with the opaque version token it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedBundle {
    /// The stored fields
    pub bundle: CredentialBundle,
    /// Version token for compare-and-swap writes
    pub version: String,
}

/// Precondition for a compare-and-swap write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePrecondition {
    /// The bundle did not exist when read; create it
    MustNotExist,
    /// The bundle must still be at this version
    Version(String),
}

impl WritePrecondition {
    /// Precondition matching the result of a read
    pub fn from_read(read: Option<&VersionedBundle>) -> Self {
        match read {
            Some(stored) => Self::Version(stored.version.clone()),
            None => Self::MustNotExist,
        }
    }
}

/// Read/write access to credential bundles, keyed by namespace and name
///
/// `write` must fail with [`Error::StoreConflict`] when the precondition no
/// longer holds and with [`Error::StoreNotFound`] when a versioned target has
/// been deleted. It returns the new version token.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read the bundle, `None` if it does not exist
    async fn read(&self, namespace: &str, name: &str) -> Result<Option<VersionedBundle>, Error>;

    /// Atomically write the whole bundle
    async fn write(
        &self,
        namespace: &str,
        name: &str,
        bundle: &CredentialBundle,
        precondition: &WritePrecondition,
    ) -> Result<String, Error>;
}
