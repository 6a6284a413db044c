//! Certificate fixtures for unit tests

use chrono::{TimeDelta, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair};

/// A self-signed certificate and its key, valid from one hour ago until
/// `now + valid_for` (a negative `valid_for` yields an expired certificate)
pub(crate) struct TestCert {
    pub cert_pem: String,
    pub key_pem: String,
}

impl TestCert {
    pub fn new(common_name: &str, valid_for: TimeDelta) -> Self {
        let now = Utc::now().timestamp();
        Self::with_window(common_name, now - 3600, now + valid_for.num_seconds())
    }

    pub fn with_window(common_name: &str, not_before: i64, not_after: i64) -> Self {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        params.distinguished_name = dn;
        params.not_before = time::OffsetDateTime::from_unix_timestamp(not_before)
            .expect("notBefore should be representable");
        params.not_after = time::OffsetDateTime::from_unix_timestamp(not_after)
            .expect("notAfter should be representable");

        let key = KeyPair::generate().expect("key generation should succeed");
        let cert = params
            .self_signed(&key)
            .expect("self-signed cert creation should succeed");

        Self {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        }
    }
}
