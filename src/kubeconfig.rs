//! Hub connection descriptor
//!
//! The credential secret optionally carries a kubeconfig for reaching the
//! hub. It references the certificate and key by file path inside the
//! directory where the secret is mounted, so rotating the certificate does
//! not change the kubeconfig itself.

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::json;

use crate::store::{TLS_CERT_FIELD, TLS_KEY_FIELD};
use crate::Error;

const CONTEXT_NAME: &str = "default-context";
const CLUSTER_NAME: &str = "hub";
const USER_NAME: &str = "default-auth";

/// Where and how to reach the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Hub API server URL
    pub server: String,
    /// PEM CA bundle used to verify the hub; empty to use system roots
    pub ca_data: Vec<u8>,
    /// Directory where the credential secret is mounted
    pub mount_dir: PathBuf,
}

impl ConnectionDescriptor {
    /// Check the descriptor is usable
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.server.starts_with("https://") || self.server.starts_with("http://")) {
            return Err(Error::config(format!(
                "hub server '{}' must be an http(s) URL",
                self.server
            )));
        }
        Ok(())
    }

    /// Render the kubeconfig YAML
    pub fn render(&self) -> Result<Vec<u8>, Error> {
        let mut cluster = json!({ "server": self.server });
        if !self.ca_data.is_empty() {
            cluster["certificate-authority-data"] = json!(STANDARD.encode(&self.ca_data));
        }

        let kubeconfig = json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{ "name": CLUSTER_NAME, "cluster": cluster }],
            "users": [{
                "name": USER_NAME,
                "user": {
                    "client-certificate": self.mount_dir.join(TLS_CERT_FIELD),
                    "client-key": self.mount_dir.join(TLS_KEY_FIELD),
                },
            }],
            "contexts": [{
                "name": CONTEXT_NAME,
                "context": {
                    "cluster": CLUSTER_NAME,
                    "user": USER_NAME,
                    "namespace": "configuration",
                },
            }],
            "current-context": CONTEXT_NAME,
        });

        serde_yaml::to_string(&kubeconfig)
            .map(String::into_bytes)
            .map_err(|e| Error::config(format!("failed to serialize kubeconfig: {}", e)))
    }
}
