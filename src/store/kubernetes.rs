//! Kubernetes Secret backed credential store
//!
//! Compare-and-swap uses the Secret's resourceVersion: a replace carrying a
//! stale resourceVersion fails with 409 Conflict. A create fails with 409
//! AlreadyExists when another writer got there first, which is the same
//! conflict from the controller's point of view.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::Client;
use tracing::{debug, warn};

use super::{CredentialBundle, SecretStore, VersionedBundle, WritePrecondition};
use crate::Error;

/// Annotation recording which signing request issued the stored certificate
pub const SIGNING_REQUEST_ANNOTATION: &str = "open-cluster-management.io/signing-request";

/// Credential store backed by `core/v1` Secrets
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Notifications whenever the named secret is created, changed or deleted
    pub fn changes(&self, namespace: &str, name: &str) -> BoxStream<'static, ()> {
        let config = watcher::Config::default().fields(&format!("metadata.name={}", name));
        secret_changes(watcher(self.api(namespace), config))
    }
}

/// Collapse secret watch events into change notifications.
///
/// Watch errors are retried with kube's default backoff so a persistent
/// failure (RBAC, unreachable API server) does not spin.
fn secret_changes<S>(events: S) -> BoxStream<'static, ()>
where
    S: Stream<Item = Result<watcher::Event<Secret>, watcher::Error>> + Send + 'static,
{
    events
        .default_backoff()
        .filter_map(|event| async move {
            match event {
                Ok(watcher::Event::Apply(_))
                | Ok(watcher::Event::Delete(_))
                | Ok(watcher::Event::InitDone) => Some(()),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "Credential secret watch error");
                    None
                }
            }
        })
        .boxed()
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn read(&self, namespace: &str, name: &str) -> Result<Option<VersionedBundle>, Error> {
        match self.api(namespace).get(name).await {
            Ok(secret) => bundle_from_secret(namespace, name, secret).map(Some),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::store_unavailable(namespace, name, e.to_string())),
        }
    }

    async fn write(
        &self,
        namespace: &str,
        name: &str,
        bundle: &CredentialBundle,
        precondition: &WritePrecondition,
    ) -> Result<String, Error> {
        let api = self.api(namespace);

        let result = match precondition {
            WritePrecondition::MustNotExist => {
                let secret = secret_from_bundle(namespace, name, bundle);
                api.create(&PostParams::default(), &secret).await
            }
            WritePrecondition::Version(rv) => {
                // Start from the live object so labels, annotations and owner
                // references set by others survive the replace.
                let current = match api.get(name).await {
                    Ok(secret) => secret,
                    Err(kube::Error::Api(ae)) if ae.code == 404 => {
                        return Err(Error::store_not_found(namespace, name))
                    }
                    Err(e) => return Err(Error::store_unavailable(namespace, name, e.to_string())),
                };
                let secret = apply_bundle(current, bundle, rv);
                api.replace(name, &PostParams::default(), &secret).await
            }
        };

        match result {
            Ok(written) => {
                let version = written.metadata.resource_version.unwrap_or_default();
                debug!(namespace, name, version = %version, "Credential secret written");
                Ok(version)
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                Err(Error::store_conflict(namespace, name))
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(Error::store_not_found(namespace, name))
            }
            Err(e) => Err(Error::store_unavailable(namespace, name, e.to_string())),
        }
    }
}

/// Convert a Secret into a versioned bundle
///
/// A Secret without a resourceVersion cannot take part in compare-and-swap
/// and is reported as a store failure.
pub(crate) fn bundle_from_secret(
    namespace: &str,
    name: &str,
    secret: Secret,
) -> Result<VersionedBundle, Error> {
    let version = secret.metadata.resource_version.clone().ok_or_else(|| {
        Error::store_unavailable(namespace, name, "secret is missing resourceVersion")
    })?;

    let signing_request = secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(SIGNING_REQUEST_ANNOTATION))
        .cloned();

    let data = secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.0))
        .collect();

    Ok(VersionedBundle {
        bundle: CredentialBundle {
            data,
            signing_request,
        },
        version,
    })
}

/// Build a new Secret holding the bundle
pub(crate) fn secret_from_bundle(namespace: &str, name: &str, bundle: &CredentialBundle) -> Secret {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };
    overlay(secret, bundle)
}

/// Overlay the bundle onto an existing Secret, pinning the expected version
///
/// The resourceVersion is the one the caller read, not the one just fetched,
/// so a concurrent update in between still surfaces as a 409.
pub(crate) fn apply_bundle(mut secret: Secret, bundle: &CredentialBundle, expected_version: &str) -> Secret {
    secret.metadata.resource_version = Some(expected_version.to_string());
    overlay(secret, bundle)
}

fn overlay(mut secret: Secret, bundle: &CredentialBundle) -> Secret {
    secret.data = Some(
        bundle
            .data
            .iter()
            .map(|(k, v)| (k.clone(), ByteString(v.clone())))
            .collect(),
    );

    match &bundle.signing_request {
        Some(csr) => {
            secret
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(SIGNING_REQUEST_ANNOTATION.to_string(), csr.clone());
        }
        None => {
            if let Some(annotations) = secret.metadata.annotations.as_mut() {
                annotations.remove(SIGNING_REQUEST_ANNOTATION);
            }
        }
    }

    secret
}
