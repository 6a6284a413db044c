//! `certificates.k8s.io/v1` signing request control

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestSpec, CertificateSigningRequestStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use tracing::{debug, warn};

use super::{ApprovalStatus, CsrControl, CsrOptions};
use crate::Error;

/// Key usages requested for a client certificate
pub const CLIENT_USAGES: [&str; 3] = ["digital signature", "key encipherment", "client auth"];

/// Signing request control backed by the hub's CSR API
#[derive(Clone)]
pub struct KubeCsrControl {
    client: Client,
    watch_selector: Option<String>,
}

impl KubeCsrControl {
    /// Create a control using a client for the hub
    ///
    /// `watch_selector` narrows [`CsrControl::subscribe`] to this agent's
    /// requests.
    pub fn new(client: Client, watch_selector: Option<String>) -> Self {
        Self {
            client,
            watch_selector,
        }
    }

    fn api(&self) -> Api<CertificateSigningRequest> {
        Api::all(self.client.clone())
    }

    async fn get(&self, name: &str) -> Result<CertificateSigningRequest, Error> {
        match self.api().get(name).await {
            Ok(csr) => Ok(csr),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(Error::SigningRequestNotFound(name.to_string()))
            }
            Err(e) => Err(Error::signing_request(format!(
                "failed to get signing request {}: {}",
                name, e
            ))),
        }
    }
}

/// Build the request object submitted to the hub
pub(crate) fn build_request(options: &CsrOptions, csr_pem: &[u8]) -> CertificateSigningRequest {
    CertificateSigningRequest {
        metadata: ObjectMeta {
            generate_name: Some(options.name_prefix.clone()),
            labels: (!options.labels.is_empty()).then(|| options.labels.clone()),
            ..Default::default()
        },
        spec: CertificateSigningRequestSpec {
            request: ByteString(csr_pem.to_vec()),
            signer_name: options.signer_name.clone(),
            usages: Some(CLIENT_USAGES.iter().map(|u| u.to_string()).collect()),
            expiration_seconds: options.expiration_seconds,
            ..Default::default()
        },
        status: None,
    }
}

/// Derive the approval state from a request's status conditions
///
/// A `Denied` or `Failed` condition wins over `Approved`.
pub fn approval_from_status(status: Option<&CertificateSigningRequestStatus>) -> ApprovalStatus {
    let conditions = match status.and_then(|s| s.conditions.as_ref()) {
        Some(conditions) => conditions,
        None => return ApprovalStatus::Pending,
    };

    let mut approved = false;
    for condition in conditions {
        if condition.status == "False" {
            continue;
        }
        match condition.type_.as_str() {
            "Denied" | "Failed" => return ApprovalStatus::Denied,
            "Approved" => approved = true,
            _ => {}
        }
    }

    if approved {
        ApprovalStatus::Approved
    } else {
        ApprovalStatus::Pending
    }
}

#[async_trait]
impl CsrControl for KubeCsrControl {
    async fn create(&self, options: &CsrOptions, csr_pem: &[u8]) -> Result<String, Error> {
        let request = build_request(options, csr_pem);
        let created = self
            .api()
            .create(&PostParams::default(), &request)
            .await
            .map_err(|e| Error::signing_request(format!("failed to create signing request: {}", e)))?;

        let name = created
            .metadata
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::signing_request("created signing request has no name"))?;

        debug!(csr = %name, signer = %options.signer_name, "Signing request created");
        Ok(name)
    }

    async fn approval_status(&self, name: &str) -> Result<ApprovalStatus, Error> {
        let csr = self.get(name).await?;
        Ok(approval_from_status(csr.status.as_ref()))
    }

    async fn issued_certificate(&self, name: &str) -> Result<Option<Vec<u8>>, Error> {
        let csr = self.get(name).await?;
        Ok(csr
            .status
            .and_then(|s| s.certificate)
            .map(|c| c.0)
            .filter(|c| !c.is_empty()))
    }

    fn subscribe(&self) -> BoxStream<'static, String> {
        let mut config = watcher::Config::default();
        if let Some(selector) = &self.watch_selector {
            config = config.labels(selector);
        }

        request_changes(watcher(self.api(), config))
    }
}

/// Names of signing requests as they are created or updated, with watch
/// errors retried under kube's default backoff.
fn request_changes<S>(events: S) -> BoxStream<'static, String>
where
    S: Stream<Item = Result<watcher::Event<CertificateSigningRequest>, watcher::Error>>
        + Send
        + 'static,
{
    events
        .default_backoff()
        .applied_objects()
        .filter_map(|event| async move {
            match event {
                Ok(csr) => Some(csr.name_any()),
                Err(e) => {
                    warn!(error = %e, "Signing request watch error");
                    None
                }
            }
        })
        .boxed()
}
