//! Supporting types for the cluster configuration

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Networking providers a cluster can select
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NetworkingProvider {
    /// Kubenet (cloud routes)
    Kubenet,
    /// Externally managed networking
    External,
    /// Generic CNI, installed by the operator
    Cni,
    /// Kopeio VXLAN overlay
    Kopeio,
    /// Weave Net
    Weave,
    /// Flannel
    Flannel,
    /// Calico, which talks to etcd directly and needs a client certificate when etcd uses TLS
    Calico,
    /// Canal (Calico policy on Flannel)
    Canal,
    /// kube-router, which authenticates to the API server with its own client certificate
    KubeRouter,
    /// Romana
    Romana,
    /// AWS VPC CNI
    AmazonVpc,
    /// Cilium
    Cilium,
}

impl std::fmt::Display for NetworkingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kubenet => write!(f, "kubenet"),
            Self::External => write!(f, "external"),
            Self::Cni => write!(f, "cni"),
            Self::Kopeio => write!(f, "kopeio"),
            Self::Weave => write!(f, "weave"),
            Self::Flannel => write!(f, "flannel"),
            Self::Calico => write!(f, "calico"),
            Self::Canal => write!(f, "canal"),
            Self::KubeRouter => write!(f, "kuberouter"),
            Self::Romana => write!(f, "romana"),
            Self::AmazonVpc => write!(f, "amazonvpc"),
            Self::Cilium => write!(f, "cilium"),
        }
    }
}

/// Kubenet networking options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct KubenetSpec {}

/// Externally managed networking options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ExternalNetworkingSpec {}

/// Generic CNI options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct CniSpec {}

/// Kopeio networking options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct KopeioNetworkingSpec {}

/// Weave networking options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct WeaveSpec {}

/// Flannel networking options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct FlannelSpec {}

/// Calico networking options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct CalicoSpec {
    /// Only encapsulate traffic that crosses subnet boundaries
    pub cross_subnet: bool,
}

/// Canal networking options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct CanalSpec {}

/// kube-router networking options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct KubeRouterSpec {}

/// Romana networking options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RomanaSpec {}

/// AWS VPC CNI options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct AmazonVpcSpec {}

/// Cilium networking options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct CiliumSpec {}

/// Networking configuration
///
/// At most one provider may be specified. Uses `networking.calico: {}` format.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkingSpec {
    /// Kubenet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubenet: Option<KubenetSpec>,
    /// Externally managed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalNetworkingSpec>,
    /// Generic CNI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cni: Option<CniSpec>,
    /// Kopeio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kopeio: Option<KopeioNetworkingSpec>,
    /// Weave
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weave: Option<WeaveSpec>,
    /// Flannel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flannel: Option<FlannelSpec>,
    /// Calico
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calico: Option<CalicoSpec>,
    /// Canal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canal: Option<CanalSpec>,
    /// kube-router
    #[serde(default, rename = "kuberouter", skip_serializing_if = "Option::is_none")]
    pub kube_router: Option<KubeRouterSpec>,
    /// Romana
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub romana: Option<RomanaSpec>,
    /// AWS VPC CNI
    #[serde(default, rename = "amazonvpc", skip_serializing_if = "Option::is_none")]
    pub amazon_vpc: Option<AmazonVpcSpec>,
    /// Cilium
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cilium: Option<CiliumSpec>,
}

impl NetworkingSpec {
    /// Create a Calico networking block
    pub fn calico() -> Self {
        Self {
            calico: Some(CalicoSpec::default()),
            ..Default::default()
        }
    }

    /// Create a kube-router networking block
    pub fn kube_router() -> Self {
        Self {
            kube_router: Some(KubeRouterSpec::default()),
            ..Default::default()
        }
    }

    fn selected(&self) -> Vec<NetworkingProvider> {
        [
            (self.kubenet.is_some(), NetworkingProvider::Kubenet),
            (self.external.is_some(), NetworkingProvider::External),
            (self.cni.is_some(), NetworkingProvider::Cni),
            (self.kopeio.is_some(), NetworkingProvider::Kopeio),
            (self.weave.is_some(), NetworkingProvider::Weave),
            (self.flannel.is_some(), NetworkingProvider::Flannel),
            (self.calico.is_some(), NetworkingProvider::Calico),
            (self.canal.is_some(), NetworkingProvider::Canal),
            (self.kube_router.is_some(), NetworkingProvider::KubeRouter),
            (self.romana.is_some(), NetworkingProvider::Romana),
            (self.amazon_vpc.is_some(), NetworkingProvider::AmazonVpc),
            (self.cilium.is_some(), NetworkingProvider::Cilium),
        ]
        .into_iter()
        .filter_map(|(set, provider)| set.then_some(provider))
        .collect()
    }

    /// Get the selected provider, if any
    pub fn provider(&self) -> Option<NetworkingProvider> {
        self.selected().into_iter().next()
    }

    /// Validate that at most one provider is configured
    pub fn validate(&self) -> Result<(), crate::Error> {
        let selected = self.selected();
        if selected.len() > 1 {
            let names: Vec<String> = selected.iter().map(ToString::to_string).collect();
            return Err(crate::Error::validation(
                "networking",
                format!(
                    "at most one networking provider may be set, found: {}",
                    names.join(", ")
                ),
            ));
        }
        Ok(())
    }
}

/// Kopeio authenticator options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct KopeioAuthenticationSpec {}

/// Heptio AWS IAM authenticator options
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct HeptioAuthenticationSpec {}

/// Webhook authentication configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationSpec {
    /// Kopeio authenticator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kopeio: Option<KopeioAuthenticationSpec>,
    /// Heptio authenticator for AWS, which runs a local HTTPS listener on each master
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heptio: Option<HeptioAuthenticationSpec>,
}

impl AuthenticationSpec {
    /// Create an authentication block selecting the heptio authenticator
    pub fn heptio() -> Self {
        Self {
            heptio: Some(HeptioAuthenticationSpec::default()),
            ..Default::default()
        }
    }
}

/// An etcd cluster backing the control plane (e.g., "main", "events")
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EtcdClusterSpec {
    /// Cluster name
    pub name: String,

    /// Serve peer and client traffic over TLS
    #[serde(default, rename = "enableEtcdTLS")]
    pub enable_etcd_tls: bool,
}

impl EtcdClusterSpec {
    /// Create an etcd cluster spec
    pub fn new(name: impl Into<String>, enable_etcd_tls: bool) -> Self {
        Self {
            name: name.into(),
            enable_etcd_tls,
        }
    }
}
