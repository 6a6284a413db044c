//! Command-line and environment configuration
//!
//! Flags map onto the typed option structs; everything is validated before
//! the controller starts so a bad flag fails fast with [`Error::Config`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use clap::{Args, ValueEnum};

use crate::controller::ClientCertOptions;
use crate::csr::{CsrOptions, KUBE_APISERVER_CLIENT_SIGNER};
use crate::kubeconfig::ConnectionDescriptor;
use crate::pki::Subject;
use crate::runner::RunnerConfig;
use crate::store::{AGENT_NAME_FIELD, CLUSTER_NAME_FIELD};
use crate::Error;

/// Prefix of every agent identity issued by the hub
pub const DEFAULT_SUBJECT_PREFIX: &str = "system:open-cluster-management";

/// Label carried by every signing request of a managed cluster
pub const CLUSTER_NAME_LABEL: &str = "open-cluster-management.io/cluster-name";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Client certificate agent arguments
#[derive(Args, Debug, Clone)]
pub struct ClientCertArgs {
    /// Namespace of the credential secret
    #[arg(
        long,
        env = "CLIENTCERT_SECRET_NAMESPACE",
        default_value = "open-cluster-management-agent"
    )]
    pub secret_namespace: String,

    /// Name of the credential secret
    #[arg(long, env = "CLIENTCERT_SECRET_NAME", default_value = "hub-kubeconfig-secret")]
    pub secret_name: String,

    /// Name of the managed cluster this agent runs in
    #[arg(long, env = "CLUSTER_NAME")]
    pub cluster_name: String,

    /// Name of this agent
    #[arg(long, env = "AGENT_NAME")]
    pub agent_name: String,

    /// Prefix of the certificate common name
    #[arg(long, default_value = DEFAULT_SUBJECT_PREFIX)]
    pub subject_prefix: String,

    /// Organization to request in the certificate subject (repeatable)
    ///
    /// Defaults to the cluster group and the managed-clusters group.
    #[arg(long = "organization")]
    pub organizations: Vec<String>,

    /// Signer that issues the client certificate
    #[arg(long, default_value = KUBE_APISERVER_CLIENT_SIGNER)]
    pub signer_name: String,

    /// Prefix for generated signing request names (defaults to `<cluster>-`)
    #[arg(long)]
    pub csr_name_prefix: Option<String>,

    /// Extra label for signing requests, as key=value (repeatable)
    #[arg(long = "csr-label", value_parser = parse_key_value)]
    pub csr_labels: Vec<(String, String)>,

    /// Requested certificate lifetime in seconds; the signer may ignore it
    #[arg(long)]
    pub expiration_seconds: Option<i32>,

    /// Extra identity field stored with the certificate, as key=value (repeatable)
    #[arg(long = "additional-data", value_parser = parse_key_value)]
    pub additional_data: Vec<(String, String)>,

    /// Never log additional data values
    #[arg(long)]
    pub additional_data_sensitive: bool,

    /// Renew once the certificate expires within this many seconds
    #[arg(long, default_value_t = 600)]
    pub renewal_threshold_secs: i64,

    /// Hub API server URL written into the stored kubeconfig
    #[arg(long, env = "HUB_SERVER")]
    pub hub_server: Option<String>,

    /// PEM CA bundle of the hub API server
    #[arg(long, env = "HUB_CA_FILE")]
    pub hub_ca_file: Option<PathBuf>,

    /// Directory where the credential secret is mounted
    #[arg(long, default_value = "/spoke/hub-kubeconfig")]
    pub mount_dir: PathBuf,

    /// Kubeconfig for reaching the hub's signing request API
    ///
    /// Defaults to the in-cluster client.
    #[arg(long, env = "HUB_KUBECONFIG")]
    pub hub_kubeconfig: Option<PathBuf>,

    /// Longest time between two reconcile passes, in seconds
    #[arg(long, default_value_t = 300)]
    pub resync_interval_secs: u64,

    /// Deadline for each API call, in seconds
    #[arg(long, default_value_t = 30)]
    pub call_timeout_secs: u64,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Validated agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Credential options
    pub cert_options: ClientCertOptions,
    /// Signing request options
    pub csr_options: CsrOptions,
    /// Scheduling parameters
    pub runner: RunnerConfig,
    /// Deadline for each collaborator call
    pub call_timeout: Duration,
}

impl ClientCertArgs {
    /// Build the validated configuration
    ///
    /// `hub_ca` is the content of `hub_ca_file`, read by the caller.
    pub fn into_config(self, hub_ca: Option<Vec<u8>>) -> Result<AgentConfig, Error> {
        if self.cluster_name.is_empty() || self.agent_name.is_empty() {
            return Err(Error::config("cluster name and agent name must not be empty"));
        }
        if self.resync_interval_secs == 0 || self.call_timeout_secs == 0 {
            return Err(Error::config(
                "resync interval and call timeout must be positive",
            ));
        }

        let organizations = if self.organizations.is_empty() {
            vec![
                format!("{}:{}", self.subject_prefix, self.cluster_name),
                format!("{}:managed-clusters", self.subject_prefix),
            ]
        } else {
            self.organizations
        };
        let subject = organizations.into_iter().fold(
            Subject::for_agent(&self.subject_prefix, &self.cluster_name, &self.agent_name),
            Subject::with_organization,
        );

        let mut labels = BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), self.cluster_name.clone())]);
        labels.extend(self.csr_labels);

        let csr_options = CsrOptions {
            name_prefix: self
                .csr_name_prefix
                .unwrap_or_else(|| format!("{}-", self.cluster_name)),
            labels,
            subject,
            signer_name: self.signer_name,
            expiration_seconds: self.expiration_seconds,
        };

        let mut additional_data = BTreeMap::from([
            (
                CLUSTER_NAME_FIELD.to_string(),
                self.cluster_name.clone().into_bytes(),
            ),
            (
                AGENT_NAME_FIELD.to_string(),
                self.agent_name.clone().into_bytes(),
            ),
        ]);
        additional_data.extend(
            self.additional_data
                .into_iter()
                .map(|(k, v)| (k, v.into_bytes())),
        );

        let connection = self.hub_server.map(|server| ConnectionDescriptor {
            server,
            ca_data: hub_ca.unwrap_or_default(),
            mount_dir: self.mount_dir,
        });

        let renewal_threshold = TimeDelta::try_seconds(self.renewal_threshold_secs)
            .ok_or_else(|| {
                Error::config(format!(
                    "renewal threshold of {}s is out of range",
                    self.renewal_threshold_secs
                ))
            })?;

        let cert_options = ClientCertOptions {
            secret_namespace: self.secret_namespace,
            secret_name: self.secret_name,
            additional_data,
            additional_data_sensitive: self.additional_data_sensitive,
            renewal_threshold,
            connection,
        };

        cert_options.validate()?;
        csr_options.validate()?;

        Ok(AgentConfig {
            cert_options,
            csr_options,
            runner: RunnerConfig {
                resync_interval: Duration::from_secs(self.resync_interval_secs),
                ..Default::default()
            },
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        })
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}
