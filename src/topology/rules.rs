//! The ordered rule table
//!
//! Order only affects readability of logs: consumers resolve dependencies by
//! signer reference, never by position.

use tracing::warn;

use super::context::RuleContext;
use crate::cluster::{ClusterConfiguration, NetworkingProvider};
use crate::pki::naming::{
    self, Identity, AGGREGATOR_CA_NAME, API_SERVICE_IP_OFFSET, CONTROL_PLANE_CLIENTS,
    DEFAULT_CA_NAME,
};
use crate::pki::{CertificateAuthority, KeypairRequest, MirrorRequest, SecretRequest, Task};
use crate::Result;

/// Keystore-mirror task name
pub const MIRROR_KEYSTORE: &str = "mirror-keystore";

/// Secret-store-mirror task name
pub const MIRROR_SECRETS: &str = "mirror-secrets";

/// A gated step of the topology build
pub struct TopologyRule {
    /// Stable rule name, used in logs
    pub name: &'static str,
    /// One-line summary
    pub description: &'static str,
    /// Whether the rule runs for this configuration
    pub applies: fn(&ClusterConfiguration) -> bool,
    /// Emit the rule's tasks
    pub apply: fn(&mut RuleContext<'_>) -> Result<()>,
}

impl std::fmt::Debug for TopologyRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

static RULES: [TopologyRule; 10] = [
    TopologyRule {
        name: "root-ca",
        description: "cluster CA",
        applies: always,
        apply: root_ca,
    },
    TopologyRule {
        name: "control-plane-clients",
        description: "client certificates for kubelet, scheduler, proxy, controller manager and admin tooling",
        applies: always,
        apply: control_plane_clients,
    },
    TopologyRule {
        name: "etcd",
        description: "etcd peer and client certificates",
        applies: ClusterConfiguration::use_etcd_tls,
        apply: etcd,
    },
    TopologyRule {
        name: "calico-etcd-client",
        description: "Calico's etcd client certificate",
        applies: calico_with_etcd_tls,
        apply: calico_etcd_client,
    },
    TopologyRule {
        name: "kube-router",
        description: "kube-router API client certificate",
        applies: uses_kube_router,
        apply: kube_router,
    },
    TopologyRule {
        name: "aggregator",
        description: "API aggregation CA and front-proxy client",
        applies: always,
        apply: aggregator,
    },
    TopologyRule {
        name: "master",
        description: "API server serving certificate",
        applies: always,
        apply: master,
    },
    TopologyRule {
        name: "external-authenticator",
        description: "heptio authenticator serving certificate",
        applies: ClusterConfiguration::uses_heptio_authenticator,
        apply: heptio_authenticator,
    },
    TopologyRule {
        name: "legacy-tokens",
        description: "deprecated bearer-token secrets",
        applies: always,
        apply: legacy_tokens,
    },
    TopologyRule {
        name: "mirrors",
        description: "secret-store and key-store mirrors",
        applies: always,
        apply: mirrors,
    },
];

/// The rule table, in evaluation order
pub fn rules() -> &'static [TopologyRule] {
    &RULES
}

fn always(_: &ClusterConfiguration) -> bool {
    true
}

fn calico_with_etcd_tls(config: &ClusterConfiguration) -> bool {
    config.use_etcd_tls() && config.networking_provider() == Some(NetworkingProvider::Calico)
}

fn uses_kube_router(config: &ClusterConfiguration) -> bool {
    config.networking_provider() == Some(NetworkingProvider::KubeRouter)
}

/// Keypair for `identity`, signed by the cluster CA
fn default_signed(identity: Identity) -> KeypairRequest {
    KeypairRequest::new(identity.keypair_name(), identity.subject(), identity.usage())
        .signed_by(DEFAULT_CA_NAME)
}

fn root_ca(ctx: &mut RuleContext<'_>) -> Result<()> {
    ctx.add_ca(CertificateAuthority::new(
        DEFAULT_CA_NAME,
        naming::default_ca_subject(),
    ))
}

fn control_plane_clients(ctx: &mut RuleContext<'_>) -> Result<()> {
    for identity in CONTROL_PLANE_CLIENTS {
        ctx.add_keypair(default_signed(identity))?;
    }
    Ok(())
}

fn etcd(ctx: &mut RuleContext<'_>) -> Result<()> {
    let names = naming::etcd_alternate_names(&ctx.config().name);
    ctx.add_keypair(default_signed(Identity::Etcd).with_alternate_names(names))?;
    ctx.add_keypair(default_signed(Identity::EtcdClient))
}

fn calico_etcd_client(ctx: &mut RuleContext<'_>) -> Result<()> {
    ctx.add_keypair(default_signed(Identity::CalicoClient))
}

fn kube_router(ctx: &mut RuleContext<'_>) -> Result<()> {
    ctx.add_keypair(default_signed(Identity::KubeRouter))
}

fn aggregator(ctx: &mut RuleContext<'_>) -> Result<()> {
    let ca = CertificateAuthority::new(AGGREGATOR_CA_NAME, naming::aggregator_ca_subject());
    let signer = ca.reference();
    ctx.add_ca(ca)?;

    let identity = Identity::ApiserverAggregator;
    ctx.add_keypair(
        KeypairRequest::new(identity.keypair_name(), identity.subject(), identity.usage())
            .signed_by(signer),
    )
}

fn master(ctx: &mut RuleContext<'_>) -> Result<()> {
    let service_ip = ctx
        .resolvers()
        .service_ips()
        .well_known_service_ip(API_SERVICE_IP_OFFSET)?;
    let names = naming::master_alternate_names(ctx.config(), service_ip);
    ctx.add_keypair(default_signed(Identity::Master).with_alternate_names(names))
}

fn heptio_authenticator(ctx: &mut RuleContext<'_>) -> Result<()> {
    ctx.add_keypair(
        default_signed(Identity::HeptioAuthenticator)
            .with_alternate_names(naming::loopback_names()),
    )
}

fn legacy_tokens(ctx: &mut RuleContext<'_>) -> Result<()> {
    let names = ctx.resolvers().legacy_tokens().token_names();
    if !names.is_empty() {
        warn!(count = names.len(), "creating deprecated legacy auth token secrets");
    }
    for name in names {
        ctx.add_secret(SecretRequest::new(name))?;
    }
    Ok(())
}

fn mirrors(ctx: &mut RuleContext<'_>) -> Result<()> {
    let storage = ctx.resolvers().storage();
    let secrets_path = storage.resolve(&ctx.config().secret_store)?;
    let keystore_path = storage.resolve(&ctx.config().key_store)?;

    ctx.add_mirror(Task::MirrorSecretStore(MirrorRequest::new(
        MIRROR_SECRETS,
        secrets_path,
    )))?;
    ctx.add_mirror(Task::MirrorKeyStore(MirrorRequest::new(
        MIRROR_KEYSTORE,
        keystore_path,
    )))
}
