//! Client certificate validation
//!
//! A stored certificate is only usable if it parses, names the expected
//! identity in its common name, and stays valid for at least the renewal
//! threshold. Everything here is pure so callers can pass their own clock.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::CertificateInfo;

/// Outcome of validating a stored client certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateValidity {
    /// Usable until the renewal window opens
    Valid,
    /// Data is not a PEM-encoded X.509 certificate
    Unparsable,
    /// Common name differs from the expected identity
    SubjectMismatch {
        /// Common name found in the certificate
        actual: String,
    },
    /// notBefore lies in the future
    NotYetValid,
    /// Past notAfter
    Expired,
    /// Still valid but inside the renewal threshold
    ExpiringSoon {
        /// Seconds until notAfter
        remaining_secs: i64,
    },
}

impl CertificateValidity {
    /// Whether the certificate can keep being used
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Short machine-readable reason, used in logs and event notes
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Unparsable => "CertificateUnparsable",
            Self::SubjectMismatch { .. } => "SubjectMismatch",
            Self::NotYetValid => "NotYetValid",
            Self::Expired => "Expired",
            Self::ExpiringSoon { .. } => "ExpiringSoon",
        }
    }
}

/// Validate a PEM certificate against the expected common name
///
/// A non-positive `renewal_threshold` means the certificate stays valid
/// until it actually expires.
pub fn check_certificate(
    cert_pem: &[u8],
    expected_common_name: &str,
    now: DateTime<Utc>,
    renewal_threshold: TimeDelta,
) -> CertificateValidity {
    let info = match CertificateInfo::from_pem(cert_pem) {
        Ok(info) => info,
        Err(_) => return CertificateValidity::Unparsable,
    };

    if info.common_name != expected_common_name {
        return CertificateValidity::SubjectMismatch {
            actual: info.common_name,
        };
    }

    let now = now.timestamp();
    if now < info.not_before {
        return CertificateValidity::NotYetValid;
    }
    if now >= info.not_after {
        return CertificateValidity::Expired;
    }

    let lead = renewal_threshold.max(TimeDelta::zero()).num_seconds();
    if now.saturating_add(lead) >= info.not_after {
        return CertificateValidity::ExpiringSoon {
            remaining_secs: info.not_after - now,
        };
    }

    CertificateValidity::Valid
}

/// Boolean form of [`check_certificate`]
pub fn is_certificate_valid(
    cert_pem: &[u8],
    expected_common_name: &str,
    now: DateTime<Utc>,
    renewal_threshold: TimeDelta,
) -> bool {
    check_certificate(cert_pem, expected_common_name, now, renewal_threshold).is_valid()
}

/// Time until the renewal window of a certificate opens
///
/// Returns `Duration::ZERO` when the window is already open.
pub fn renewal_delay(
    info: &CertificateInfo,
    now: DateTime<Utc>,
    renewal_threshold: TimeDelta,
) -> Duration {
    let lead = renewal_threshold.max(TimeDelta::zero()).num_seconds();
    let renew_at = info.not_after.saturating_sub(lead);
    let secs = renew_at.saturating_sub(now.timestamp());
    Duration::from_secs(secs.max(0) as u64)
}
