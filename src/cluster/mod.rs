//! Cluster configuration consumed by the topology builder
//!
//! The configuration is read-only to the builder. It is usually loaded from a
//! YAML cluster file, but every field is public so callers can assemble one
//! directly.

mod types;

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use types::{
    AmazonVpcSpec, AuthenticationSpec, CalicoSpec, CanalSpec, CiliumSpec, CniSpec,
    EtcdClusterSpec, ExternalNetworkingSpec, FlannelSpec, HeptioAuthenticationSpec,
    KopeioAuthenticationSpec, KopeioNetworkingSpec, KubeRouterSpec, KubenetSpec,
    NetworkingProvider, NetworkingSpec, RomanaSpec, WeaveSpec,
};

use crate::{Error, Result};

/// Default DNS domain for in-cluster service names
pub const DEFAULT_CLUSTER_DNS_DOMAIN: &str = "cluster.local";

fn default_cluster_dns_domain() -> String {
    DEFAULT_CLUSTER_DNS_DOMAIN.to_string()
}

/// Configuration of the cluster whose PKI is being planned
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfiguration {
    /// Cluster name (e.g., "example.k8s.local")
    pub name: String,

    /// DNS domain suffix for in-cluster services
    #[serde(default = "default_cluster_dns_domain", rename = "clusterDNSDomain")]
    pub cluster_dns_domain: String,

    /// Public DNS name of the API server
    pub master_public_name: String,

    /// Internal DNS name of the API server
    pub master_internal_name: String,

    /// Extra names or IPs to add to the API server certificate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_sans: Vec<String>,

    /// CIDR from which service cluster IPs are allocated (e.g., "100.64.0.0/13")
    #[serde(default, rename = "serviceClusterIPRange")]
    pub service_cluster_ip_range: String,

    /// etcd clusters backing the control plane
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub etcd_clusters: Vec<EtcdClusterSpec>,

    /// Networking provider selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<NetworkingSpec>,

    /// Webhook authentication provider selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationSpec>,

    /// Location of the secret store (e.g., "s3://bucket/cluster/secrets")
    pub secret_store: String,

    /// Location of the key store (e.g., "s3://bucket/cluster/pki")
    pub key_store: String,
}

impl ClusterConfiguration {
    /// Parse and validate a configuration from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_yaml(&contents)
    }

    /// Validate required fields and the networking block
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("name", &self.name),
            ("clusterDNSDomain", &self.cluster_dns_domain),
            ("masterPublicName", &self.master_public_name),
            ("masterInternalName", &self.master_internal_name),
            ("secretStore", &self.secret_store),
            ("keyStore", &self.key_store),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::validation(field, "must not be empty"));
            }
        }

        if let Some(index) = self.additional_sans.iter().position(|s| s.trim().is_empty()) {
            return Err(Error::validation(
                format!("additionalSans[{index}]"),
                "must not be empty",
            ));
        }

        if let Some(networking) = &self.networking {
            networking.validate()?;
        }

        Ok(())
    }

    /// Returns true if any etcd cluster serves TLS
    pub fn use_etcd_tls(&self) -> bool {
        self.etcd_clusters.iter().any(|c| c.enable_etcd_tls)
    }

    /// Get the selected networking provider, if any
    pub fn networking_provider(&self) -> Option<NetworkingProvider> {
        self.networking.as_ref().and_then(NetworkingSpec::provider)
    }

    /// Returns true if the heptio authenticator is configured
    pub fn uses_heptio_authenticator(&self) -> bool {
        self.authentication
            .as_ref()
            .is_some_and(|auth| auth.heptio.is_some())
    }
}
