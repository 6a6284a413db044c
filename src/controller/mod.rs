//! Client certificate controller
//!
//! Reconciles the credential secret against the desired identity: a valid,
//! non-expiring certificate for the expected subject, stored together with
//! its private key and the agent's auxiliary identity data. Each pass is
//! observe-decide-act and safe to re-enter after a crash at any step.

mod clientcert;

pub use clientcert::{
    CertState, ClientCertController, ClientCertOptions, SyncOutcome, DEFAULT_CALL_TIMEOUT,
    PENDING_POLL_INTERVAL,
};
