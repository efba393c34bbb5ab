//! PKI topology builder
//!
//! Turns a [`ClusterConfiguration`] into the [`TaskSet`] an executor needs to
//! bootstrap a control plane: CAs, keypairs, legacy secrets and store mirrors.
//!
//! # Architecture
//!
//! The builder evaluates an ordered table of [`TopologyRule`]s. Each rule has
//! a gate over the configuration and an emitter that adds tasks through a
//! [`RuleContext`]. Once every rule has run, the set is verified as a whole,
//! so a successful build is always internally consistent.
//!
//! ```text
//! ClusterConfiguration ──► rules() ──► RuleContext ──► TaskSet::verify ──► TaskSet
//!                            │
//!                            └── Resolvers (service IP, storage paths, legacy tokens)
//! ```
//!
//! # Example
//!
//! ```
//! use pki_topology::cluster::ClusterConfiguration;
//! use pki_topology::resolve::Resolvers;
//! use pki_topology::topology::TopologyBuilder;
//!
//! let config = ClusterConfiguration::from_yaml(r#"
//! name: example.k8s.local
//! masterPublicName: api.example.k8s.local
//! masterInternalName: api.internal.example.k8s.local
//! serviceClusterIPRange: 100.64.0.0/13
//! secretStore: memfs://state/secrets
//! keyStore: memfs://state/pki
//! "#).unwrap();
//!
//! let tasks = TopologyBuilder::new(Resolvers::for_cluster(&config))
//!     .build(&config)
//!     .unwrap();
//! assert!(tasks.keypair("master").is_some());
//! ```

mod context;
mod rules;

use tracing::{debug, info};

pub use context::RuleContext;
pub use rules::{rules, TopologyRule, MIRROR_KEYSTORE, MIRROR_SECRETS};

use crate::cluster::ClusterConfiguration;
use crate::pki::{KeysetFormat, Lifecycle, TaskSet};
use crate::resolve::Resolvers;
use crate::Result;

/// Builds task sets from cluster configurations
#[derive(Debug)]
pub struct TopologyBuilder {
    resolvers: Resolvers,
    lifecycle: Lifecycle,
    format: KeysetFormat,
}

impl TopologyBuilder {
    /// Create a builder over the given collaborators
    pub fn new(resolvers: Resolvers) -> Self {
        Self {
            resolvers,
            lifecycle: Lifecycle::default(),
            format: KeysetFormat::default(),
        }
    }

    /// Lifecycle stamped on every task
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Keyset format stamped on every CA and keypair
    pub fn with_format(mut self, format: KeysetFormat) -> Self {
        self.format = format;
        self
    }

    /// Lifecycle this builder stamps
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Keyset format this builder stamps
    pub fn format(&self) -> KeysetFormat {
        self.format
    }

    /// Compute the task set for a cluster
    ///
    /// Any error aborts the build. No partial set is returned.
    pub fn build(&self, config: &ClusterConfiguration) -> Result<TaskSet> {
        config.validate()?;

        let mut ctx = RuleContext::new(config, &self.resolvers, self.lifecycle, self.format);
        for rule in rules() {
            if !(rule.applies)(config) {
                debug!(rule = rule.name, "rule skipped");
                continue;
            }
            let before = ctx.tasks().len();
            (rule.apply)(&mut ctx)?;
            debug!(
                rule = rule.name,
                added = ctx.tasks().len() - before,
                "rule applied"
            );
        }

        let tasks = ctx.into_tasks();
        tasks.verify()?;

        info!(
            cluster = %config.name,
            tasks = tasks.len(),
            lifecycle = %self.lifecycle,
            format = %self.format,
            "built PKI topology"
        );
        Ok(tasks)
    }
}

/// Build a cluster's task set with the default collaborators
pub fn build_topology(config: &ClusterConfiguration) -> Result<TaskSet> {
    TopologyBuilder::new(Resolvers::for_cluster(config)).build(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::net::IpAddr;

    use crate::cluster::{AuthenticationSpec, EtcdClusterSpec, NetworkingSpec};
    use crate::pki::naming::{AGGREGATOR_CA_NAME, DEFAULT_CA_NAME};
    use crate::pki::{Task, TaskKey, AGGREGATOR_ALLOWED_NAME};
    use crate::resolve::{
        MockServiceIpResolver, NoLegacyTokens, ServiceCidr, VfsContext, DEPRECATED_AUTH_TOKENS,
    };
    use crate::Error;

    /// root CA, eight control-plane clients, aggregator CA and client,
    /// master, nine legacy tokens, two mirrors
    const UNCONDITIONAL_TASKS: usize = 23;

    const ETCD_NAMES: [&str; 3] = ["etcd", "etcd-client", "calico-client"];

    fn base_config() -> ClusterConfiguration {
        ClusterConfiguration::from_yaml(
            r#"
name: example.k8s.local
masterPublicName: api.example.k8s.local
masterInternalName: api.internal.example.k8s.local
serviceClusterIPRange: 100.64.0.0/13
secretStore: s3://state/example.k8s.local/secrets
keyStore: s3://state/example.k8s.local/pki
"#,
        )
        .unwrap()
    }

    fn build(config: &ClusterConfiguration) -> Result<TaskSet> {
        build_topology(config)
    }

    fn with_etcd_tls(mut config: ClusterConfiguration) -> ClusterConfiguration {
        config.etcd_clusters = vec![
            EtcdClusterSpec::new("main", true),
            EtcdClusterSpec::new("events", true),
        ];
        config
    }

    fn fixed_ip_resolvers(ip: &'static str) -> Resolvers {
        let mut ips = MockServiceIpResolver::new();
        ips.expect_well_known_service_ip()
            .returning(move |_| Ok(ip.parse::<IpAddr>().unwrap()));
        Resolvers::new(ips, VfsContext::new(), crate::resolve::DeprecatedAuthTokens)
    }

    // ==========================================================================
    // Story Tests: Planning a Cluster
    // ==========================================================================

    /// Story: a plain cluster gets exactly the unconditional tasks
    ///
    /// With etcd TLS off and no overlay selected, no etcd or overlay-specific
    /// keypair may appear.
    #[test]
    fn story_minimal_cluster_gets_fixed_set() {
        let tasks = build(&base_config()).unwrap();

        assert_eq!(tasks.len(), UNCONDITIONAL_TASKS);
        for name in ETCD_NAMES.iter().chain(["kube-router", "heptio-authenticator-aws"].iter()) {
            assert!(tasks.keypair(name).is_none(), "unexpected keypair {name}");
        }
        assert_eq!(tasks.certificate_authorities().count(), 2);
        assert_eq!(tasks.secrets().count(), DEPRECATED_AUTH_TOKENS.len());
        assert_eq!(tasks.mirrors().count(), 2);
    }

    /// Story: etcd TLS with Calico adds the etcd pair and Calico's client
    #[test]
    fn story_etcd_tls_with_calico() {
        let mut config = with_etcd_tls(base_config());
        config.networking = Some(NetworkingSpec::calico());

        let tasks = build(&config).unwrap();
        assert_eq!(tasks.len(), UNCONDITIONAL_TASKS + 3);
        for name in ETCD_NAMES {
            let kp = tasks.keypair(name).unwrap();
            assert_eq!(kp.signer.as_ref().unwrap().name(), DEFAULT_CA_NAME);
        }
    }

    /// Story: Calico alone does not need an etcd client certificate
    #[test]
    fn story_calico_without_etcd_tls() {
        let mut config = base_config();
        config.networking = Some(NetworkingSpec::calico());

        let tasks = build(&config).unwrap();
        assert_eq!(tasks.len(), UNCONDITIONAL_TASKS);
        assert!(tasks.keypair("calico-client").is_none());
    }

    /// Story: etcd TLS with a non-Calico overlay omits the Calico client
    #[test]
    fn story_etcd_tls_with_kube_router() {
        let mut config = with_etcd_tls(base_config());
        config.networking = Some(NetworkingSpec::kube_router());

        let tasks = build(&config).unwrap();
        assert_eq!(tasks.len(), UNCONDITIONAL_TASKS + 3);
        assert!(tasks.keypair("etcd").is_some());
        assert!(tasks.keypair("etcd-client").is_some());
        assert!(tasks.keypair("kube-router").is_some());
        assert!(tasks.keypair("calico-client").is_none());
    }

    /// Story: the heptio authenticator needs its own serving certificate
    #[test]
    fn story_heptio_authenticator() {
        let mut config = base_config();
        config.authentication = Some(AuthenticationSpec::heptio());
        let tasks = build(&config).unwrap();
        assert!(tasks.keypair("heptio-authenticator-aws").is_some());

        config.authentication = Some(AuthenticationSpec {
            kopeio: Some(Default::default()),
            heptio: None,
        });
        let tasks = build(&config).unwrap();
        assert!(tasks.keypair("heptio-authenticator-aws").is_none());
    }

    /// Story: a failed service IP lookup aborts the whole build
    #[test]
    fn story_service_ip_failure_aborts_build() {
        let config = base_config();
        let mut ips = MockServiceIpResolver::new();
        ips.expect_well_known_service_ip()
            .times(1)
            .returning(|_| Err(Error::resolution("serviceClusterIPRange", "exhausted")));
        let builder = TopologyBuilder::new(Resolvers::new(
            ips,
            VfsContext::new(),
            NoLegacyTokens,
        ));

        let err = builder.build(&config).unwrap_err();
        match err {
            Error::Resolution { target, message } => {
                assert_eq!(target, "serviceClusterIPRange");
                assert_eq!(message, "exhausted");
            }
            other => panic!("Expected Resolution error, got {other:?}"),
        }
    }

    /// Story: an unparseable service range fails during the build
    #[test]
    fn story_bad_service_range_is_resolution_error() {
        let mut config = base_config();
        config.service_cluster_ip_range = "100.64.0.0/99".to_string();
        let err = build(&config).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, Error::Resolution { .. }));
    }

    /// Story: invalid configuration never reaches the rules
    #[test]
    fn story_invalid_config_rejected_before_rules() {
        let mut config = base_config();
        config.master_public_name = String::new();

        let mut ips = MockServiceIpResolver::new();
        ips.expect_well_known_service_ip().never();
        let builder =
            TopologyBuilder::new(Resolvers::new(ips, VfsContext::new(), NoLegacyTokens));

        let err = builder.build(&config).unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "masterPublicName"));
    }

    // ==========================================================================
    // Whole-set properties
    // ==========================================================================

    fn every_variant() -> Vec<ClusterConfiguration> {
        let base = base_config();
        let mut calico = with_etcd_tls(base_config());
        calico.networking = Some(NetworkingSpec::calico());
        let mut kube_router = base_config();
        kube_router.networking = Some(NetworkingSpec::kube_router());
        let mut heptio = with_etcd_tls(base_config());
        heptio.authentication = Some(AuthenticationSpec::heptio());
        heptio.additional_sans = vec!["api.example.com".to_string(), "10.0.0.5".to_string()];
        vec![base, calico, kube_router, heptio]
    }

    #[test]
    fn signers_always_resolve_to_a_ca() {
        for config in every_variant() {
            let tasks = build(&config).unwrap();
            assert_eq!(
                tasks
                    .certificate_authorities()
                    .filter(|ca| ca.name == DEFAULT_CA_NAME)
                    .count(),
                1
            );
            for kp in tasks.keypairs() {
                let signer = kp.signer.as_ref().unwrap();
                assert!(
                    tasks.certificate_authority(signer.name()).is_some(),
                    "{} has dangling signer {signer}",
                    kp.name
                );
            }
        }
    }

    #[test]
    fn keys_unique_within_namespace() {
        for config in every_variant() {
            let tasks = build(&config).unwrap();
            let keys: HashSet<TaskKey> = tasks.keys().cloned().collect();
            assert_eq!(keys.len(), tasks.len());
        }
    }

    #[test]
    fn legacy_token_names_coexist_with_keypairs() {
        let tasks = build(&base_config()).unwrap();
        assert!(tasks.keypair("kubelet").is_some());
        assert!(tasks.secret("kubelet").is_some());
        assert!(tasks.keypair("kube-proxy").is_some());
        assert!(tasks.secret("kube-proxy").is_some());
    }

    #[test]
    fn aggregator_client_uses_aggregator_ca() {
        let tasks = build(&base_config()).unwrap();
        let client = tasks.keypair("apiserver-aggregator").unwrap();
        assert_eq!(client.signer.as_ref().unwrap().name(), AGGREGATOR_CA_NAME);
        assert_eq!(client.subject.cn(), AGGREGATOR_ALLOWED_NAME);

        let signed: Vec<&str> = tasks
            .signed_by(AGGREGATOR_CA_NAME)
            .map(|kp| kp.name.as_str())
            .collect();
        assert_eq!(signed, vec!["apiserver-aggregator"]);
    }

    #[test]
    fn master_alternate_names_are_complete_and_ordered() {
        let mut config = base_config();
        config.cluster_dns_domain = "corp.internal".to_string();
        config.additional_sans = vec!["api.example.com".to_string(), "192.0.2.10".to_string()];
        let tasks = TopologyBuilder::new(fixed_ip_resolvers("10.3.0.1"))
            .build(&config)
            .unwrap();

        let names: Vec<String> = tasks
            .keypair("master")
            .unwrap()
            .alternate_names
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            names,
            vec![
                "kubernetes",
                "kubernetes.default",
                "kubernetes.default.svc",
                "kubernetes.default.svc.corp.internal",
                "api.example.k8s.local",
                "api.internal.example.k8s.local",
                "api.example.com",
                "192.0.2.10",
                "10.3.0.1",
                "127.0.0.1",
            ]
        );
    }

    #[test]
    fn default_service_ip_is_first_in_range() {
        let tasks = build(&base_config()).unwrap();
        assert!(tasks.keypair("master").unwrap().has_alternate_name("100.64.0.1"));
    }

    #[test]
    fn builds_are_deterministic() {
        for config in every_variant() {
            let first = build(&config).unwrap();
            let second = build(&config).unwrap();
            assert_eq!(first, second);
            assert_eq!(first.to_yaml().unwrap(), second.to_yaml().unwrap());
        }
    }

    #[test]
    fn stamps_reach_every_task() {
        let config = with_etcd_tls(base_config());
        let builder = TopologyBuilder::new(Resolvers::for_cluster(&config))
            .with_lifecycle(Lifecycle::ExistsAndValidates)
            .with_format(KeysetFormat::Legacy);
        assert_eq!(builder.lifecycle(), Lifecycle::ExistsAndValidates);
        assert_eq!(builder.format(), KeysetFormat::Legacy);

        let tasks = builder.build(&config).unwrap();
        for (key, task) in &tasks {
            assert_eq!(task.lifecycle(), Lifecycle::ExistsAndValidates, "{key}");
            match task {
                Task::CreateCa(ca) => assert_eq!(ca.format, KeysetFormat::Legacy),
                Task::CreateKeypair(kp) => assert_eq!(kp.format, KeysetFormat::Legacy),
                _ => {}
            }
        }
    }

    #[test]
    fn legacy_tokens_can_be_disabled() {
        let config = base_config();
        let resolvers = Resolvers::new(
            ServiceCidr::from_config(&config),
            VfsContext::new(),
            NoLegacyTokens,
        );
        let tasks = TopologyBuilder::new(resolvers).build(&config).unwrap();
        assert_eq!(tasks.secrets().count(), 0);
        assert_eq!(tasks.len(), UNCONDITIONAL_TASKS - DEPRECATED_AUTH_TOKENS.len());
    }

    #[test]
    fn mirrors_point_at_configured_stores() {
        let tasks = build(&base_config()).unwrap();
        assert_eq!(
            tasks.mirror(MIRROR_SECRETS).unwrap().path.to_string(),
            "s3://state/example.k8s.local/secrets"
        );
        assert_eq!(
            tasks.mirror(MIRROR_KEYSTORE).unwrap().path.to_string(),
            "s3://state/example.k8s.local/pki"
        );
        assert!(matches!(
            tasks.get(&TaskKey::mirror(MIRROR_KEYSTORE)),
            Some(Task::MirrorKeyStore(_))
        ));
    }
}
