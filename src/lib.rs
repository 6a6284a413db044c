//! clientcert - hub client certificate lifecycle for managed cluster agents
//!
//! An agent authenticates to the hub with an mTLS client certificate. This
//! crate provisions that certificate through the hub's signing request API,
//! stores it in a Kubernetes Secret together with its private key, and
//! rotates it before it expires or when the agent's identity data changes.
//!
//! # Architecture
//!
//! - The private key is generated locally and never leaves the agent
//! - Every reconcile pass derives state from the stored secret; only the
//!   outstanding request lives in memory
//! - Key and certificate are written together with a compare-and-swap
//!
//! # Modules
//!
//! - [`controller`] - Reconcile state machine
//! - [`store`] - Credential secret adapter
//! - [`csr`] - Signing request control
//! - [`pki`] - Key generation, CSR encoding, certificate validation
//! - [`events`] - Kubernetes Event recording
//! - [`kubeconfig`] - Hub connection descriptor
//! - [`runner`] - Serialized work loop with backoff
//! - [`config`] - Command-line configuration
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod csr;
pub mod error;
pub mod events;
pub mod kubeconfig;
pub mod pki;
pub mod runner;
pub mod store;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Controller name used when reporting events
pub const CONTROLLER_NAME: &str = "clientcert-controller";
