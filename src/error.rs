//! Error types for the client certificate controller
//!
//! Store and signing-request failures are propagated to the caller unchanged so
//! the scheduler can decide how to back off. Validation outcomes such as an
//! unparsable certificate or a subject mismatch are not errors; they are
//! reported through [`crate::pki::CertificateValidity`] and force a renewal.

use std::time::Duration;

use thiserror::Error;

use crate::pki::PkiError;

/// Main error type for client certificate operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The credential store could not be read or written
    #[error("credential store unavailable for {namespace}/{name}: {message}")]
    StoreUnavailable {
        /// Namespace of the credential secret
        namespace: String,
        /// Name of the credential secret
        name: String,
        /// Description of what failed
        message: String,
    },

    /// A compare-and-swap write lost against a concurrent update
    #[error("credential store conflict writing {namespace}/{name}")]
    StoreConflict {
        /// Namespace of the credential secret
        namespace: String,
        /// Name of the credential secret
        name: String,
    },

    /// The credential secret disappeared between read and write
    #[error("credential secret {namespace}/{name} not found")]
    StoreNotFound {
        /// Namespace of the credential secret
        namespace: String,
        /// Name of the credential secret
        name: String,
    },

    /// Submitting or querying a signing request failed
    #[error("signing request failed: {0}")]
    SigningRequestFailed(String),

    /// The signing request no longer exists on the hub
    #[error("signing request {0} not found")]
    SigningRequestNotFound(String),

    /// The signing authority denied the request
    #[error("signing request {0} was denied")]
    SigningRequestDenied(String),

    /// Key generation or certificate encoding failed
    #[error("pki error: {0}")]
    Pki(#[from] PkiError),

    /// A collaborator call did not finish within its deadline
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out
        operation: &'static str,
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// Invalid controller configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a store-unavailable error for the given secret
    pub fn store_unavailable(
        namespace: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::StoreUnavailable {
            namespace: namespace.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a store-conflict error for the given secret
    pub fn store_conflict(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::StoreConflict {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a store-not-found error for the given secret
    pub fn store_not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::StoreNotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a signing-request error with the given message
    pub fn signing_request(msg: impl Into<String>) -> Self {
        Self::SigningRequestFailed(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether retrying the reconcile later can succeed without operator action
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}
