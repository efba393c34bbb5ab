//! Subject and alternate-name conventions for control-plane identities
//!
//! Everything here is pure: the same configuration strings always produce the
//! same subjects and names, in the same order.

use std::collections::HashSet;
use std::net::IpAddr;

use super::task::{AlternateName, KeyUsage, Subject};
use crate::cluster::ClusterConfiguration;

/// Group granted to every node's kubelet
pub const NODES_GROUP: &str = "system:nodes";

/// Group bound to cluster-admin
pub const SYSTEM_PRIVILEGED_GROUP: &str = "system:masters";

/// RBAC user of the scheduler
pub const KUBE_SCHEDULER: &str = "system:kube-scheduler";

/// RBAC user of kube-proxy
pub const KUBE_PROXY: &str = "system:kube-proxy";

/// RBAC user of the controller manager
pub const KUBE_CONTROLLER_MANAGER: &str = "system:kube-controller-manager";

/// RBAC user of kube-router
pub const KUBE_ROUTER: &str = "system:kube-router";

/// Common name the API server accepts from the aggregation proxy
///
/// The API server's `--requestheader-allowed-names` must list exactly this
/// value, or aggregated APIs reject every proxied request.
pub const AGGREGATOR_ALLOWED_NAME: &str = "aggregator";

/// Keystore name of the cluster CA
pub const DEFAULT_CA_NAME: &str = "ca";

/// Keystore name of the API aggregation CA
pub const AGGREGATOR_CA_NAME: &str = "apiserver-aggregator-ca";

/// Name of the in-cluster API service
pub const API_SERVICE_NAME: &str = "kubernetes";

/// Loopback literal used for local listeners
pub const LOOPBACK_IP: &str = "127.0.0.1";

/// Offset into the service range of the API service's cluster IP
pub const API_SERVICE_IP_OFFSET: u32 = 1;

/// Subject of the cluster CA
pub fn default_ca_subject() -> Subject {
    Subject::common_name("kubernetes")
}

/// Subject of the aggregation CA
pub fn aggregator_ca_subject() -> Subject {
    Subject::common_name(AGGREGATOR_CA_NAME)
}

/// Leaf identities issued by the topology rules
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Node agent
    Kubelet,
    /// API server client for talking to kubelets
    KubeletApi,
    /// Scheduler
    KubeScheduler,
    /// kube-proxy
    KubeProxy,
    /// Controller manager
    KubeControllerManager,
    /// Administrative kubeconfig
    Kubecfg,
    /// API server client for the aggregation proxy
    ApiserverProxyClient,
    /// Internal tooling (e.g., protokube)
    Kops,
    /// etcd peer and server identity
    Etcd,
    /// External etcd clients
    EtcdClient,
    /// Calico's etcd client identity
    CalicoClient,
    /// kube-router's API client identity
    KubeRouter,
    /// Aggregation layer front proxy, signed by the aggregation CA
    ApiserverAggregator,
    /// API server serving identity
    Master,
    /// Heptio authenticator's local listener
    HeptioAuthenticator,
}

/// Client identities every cluster gets, in emission order
pub const CONTROL_PLANE_CLIENTS: [Identity; 8] = [
    Identity::Kubelet,
    Identity::KubeletApi,
    Identity::KubeScheduler,
    Identity::KubeProxy,
    Identity::KubeControllerManager,
    Identity::Kubecfg,
    Identity::ApiserverProxyClient,
    Identity::Kops,
];

impl Identity {
    /// Keystore name
    pub fn keypair_name(self) -> &'static str {
        match self {
            Self::Kubelet => "kubelet",
            Self::KubeletApi => "kubelet-api",
            Self::KubeScheduler => "kube-scheduler",
            Self::KubeProxy => "kube-proxy",
            Self::KubeControllerManager => "kube-controller-manager",
            Self::Kubecfg => "kubecfg",
            Self::ApiserverProxyClient => "apiserver-proxy-client",
            Self::Kops => "kops",
            Self::Etcd => "etcd",
            Self::EtcdClient => "etcd-client",
            Self::CalicoClient => "calico-client",
            Self::KubeRouter => "kube-router",
            Self::ApiserverAggregator => "apiserver-aggregator",
            Self::Master => "master",
            Self::HeptioAuthenticator => "heptio-authenticator-aws",
        }
    }

    /// Certificate subject
    pub fn subject(self) -> Subject {
        match self {
            Self::Kubelet => Subject::in_group(NODES_GROUP, "kubelet"),
            Self::KubeScheduler => Subject::common_name(KUBE_SCHEDULER),
            Self::KubeProxy => Subject::common_name(KUBE_PROXY),
            Self::KubeControllerManager => Subject::common_name(KUBE_CONTROLLER_MANAGER),
            Self::Kubecfg => Subject::in_group(SYSTEM_PRIVILEGED_GROUP, "kubecfg"),
            Self::Kops => Subject::in_group(SYSTEM_PRIVILEGED_GROUP, "kops"),
            Self::KubeRouter => Subject::common_name(KUBE_ROUTER),
            Self::ApiserverAggregator => Subject::common_name(AGGREGATOR_ALLOWED_NAME),
            Self::Master => Subject::common_name("kubernetes-master"),
            Self::KubeletApi
            | Self::ApiserverProxyClient
            | Self::Etcd
            | Self::EtcdClient
            | Self::CalicoClient
            | Self::HeptioAuthenticator => Subject::common_name(self.keypair_name()),
        }
    }

    /// Key usage
    pub fn usage(self) -> KeyUsage {
        match self {
            Self::Etcd => KeyUsage::ClientServer,
            Self::Master | Self::HeptioAuthenticator => KeyUsage::Server,
            _ => KeyUsage::Client,
        }
    }
}

/// Names the API service resolves to from inside the cluster
pub fn api_service_aliases(dns_domain: &str) -> Vec<AlternateName> {
    vec![
        AlternateName::from(API_SERVICE_NAME),
        AlternateName::from(format!("{API_SERVICE_NAME}.default")),
        AlternateName::from(format!("{API_SERVICE_NAME}.default.svc")),
        AlternateName::from(format!("{API_SERVICE_NAME}.default.svc.{dns_domain}")),
    ]
}

/// Wildcard covering every node's internal DNS name
pub fn internal_wildcard(cluster_name: &str) -> AlternateName {
    AlternateName::Dns(format!("*.internal.{cluster_name}"))
}

/// Names for a listener bound to the loopback interface
pub fn loopback_names() -> Vec<AlternateName> {
    vec![AlternateName::from("localhost"), AlternateName::from(LOOPBACK_IP)]
}

/// Alternate names of the etcd peer certificate
pub fn etcd_alternate_names(cluster_name: &str) -> Vec<AlternateName> {
    let mut names = vec![internal_wildcard(cluster_name)];
    names.extend(loopback_names());
    names
}

/// Alternate names of the API server certificate
///
/// Order: in-cluster aliases, public and internal master names, additional
/// SANs, the API service IP, then loopback. Repeats keep their first position.
pub fn master_alternate_names(
    config: &ClusterConfiguration,
    service_ip: IpAddr,
) -> Vec<AlternateName> {
    let mut names = api_service_aliases(&config.cluster_dns_domain);
    names.push(AlternateName::from(&config.master_public_name));
    names.push(AlternateName::from(&config.master_internal_name));
    names.extend(config.additional_sans.iter().map(AlternateName::from));
    names.push(AlternateName::Ip(service_ip));
    names.push(AlternateName::from(LOOPBACK_IP));
    dedup_preserving_order(names)
}

fn dedup_preserving_order(names: Vec<AlternateName>) -> Vec<AlternateName> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config() -> ClusterConfiguration {
        ClusterConfiguration {
            name: "example.k8s.local".to_string(),
            cluster_dns_domain: "cluster.local".to_string(),
            master_public_name: "api.example.k8s.local".to_string(),
            master_internal_name: "api.internal.example.k8s.local".to_string(),
            additional_sans: vec!["api.example.com".to_string(), "10.0.0.10".to_string()],
            service_cluster_ip_range: "100.64.0.0/13".to_string(),
            etcd_clusters: Vec::new(),
            networking: None,
            authentication: None,
            secret_store: "memfs://state/secrets".to_string(),
            key_store: "memfs://state/pki".to_string(),
        }
    }

    fn strings(names: &[AlternateName]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn control_plane_subjects_follow_rbac_conventions() {
        assert_eq!(Identity::Kubelet.subject().to_string(), "o=system:nodes,cn=kubelet");
        assert_eq!(Identity::KubeletApi.subject().to_string(), "cn=kubelet-api");
        assert_eq!(
            Identity::KubeScheduler.subject().to_string(),
            "cn=system:kube-scheduler"
        );
        assert_eq!(Identity::KubeProxy.subject().to_string(), "cn=system:kube-proxy");
        assert_eq!(
            Identity::KubeControllerManager.subject().to_string(),
            "cn=system:kube-controller-manager"
        );
        assert_eq!(
            Identity::Kubecfg.subject().to_string(),
            "o=system:masters,cn=kubecfg"
        );
        assert_eq!(
            Identity::ApiserverProxyClient.subject().to_string(),
            "cn=apiserver-proxy-client"
        );
        assert_eq!(Identity::Kops.subject().to_string(), "o=system:masters,cn=kops");
    }

    #[test]
    fn conditional_identity_subjects() {
        assert_eq!(Identity::Etcd.subject().to_string(), "cn=etcd");
        assert_eq!(Identity::EtcdClient.subject().to_string(), "cn=etcd-client");
        assert_eq!(Identity::CalicoClient.subject().to_string(), "cn=calico-client");
        assert_eq!(Identity::KubeRouter.subject().to_string(), "cn=system:kube-router");
        assert_eq!(Identity::Master.subject().to_string(), "cn=kubernetes-master");
        assert_eq!(
            Identity::HeptioAuthenticator.subject().to_string(),
            "cn=heptio-authenticator-aws"
        );
    }

    #[test]
    fn aggregator_subject_matches_allowed_name() {
        assert_eq!(
            Identity::ApiserverAggregator.subject().cn(),
            AGGREGATOR_ALLOWED_NAME
        );
        assert_eq!(
            Identity::ApiserverAggregator.subject().to_string(),
            "cn=aggregator"
        );
    }

    #[test]
    fn usages() {
        assert_eq!(Identity::Etcd.usage(), KeyUsage::ClientServer);
        assert_eq!(Identity::Master.usage(), KeyUsage::Server);
        assert_eq!(Identity::HeptioAuthenticator.usage(), KeyUsage::Server);
        for identity in CONTROL_PLANE_CLIENTS {
            assert_eq!(identity.usage(), KeyUsage::Client, "{identity:?}");
        }
    }

    #[test]
    fn keypair_names_are_distinct() {
        let mut all = CONTROL_PLANE_CLIENTS.to_vec();
        all.extend([
            Identity::Etcd,
            Identity::EtcdClient,
            Identity::CalicoClient,
            Identity::KubeRouter,
            Identity::ApiserverAggregator,
            Identity::Master,
            Identity::HeptioAuthenticator,
        ]);
        let names: HashSet<&str> = all.iter().map(|i| i.keypair_name()).collect();
        assert_eq!(names.len(), all.len());
        assert!(!names.contains(DEFAULT_CA_NAME));
        assert!(!names.contains(AGGREGATOR_CA_NAME));
    }

    #[test]
    fn api_service_aliases_use_dns_domain() {
        assert_eq!(
            strings(&api_service_aliases("corp.internal")),
            vec![
                "kubernetes",
                "kubernetes.default",
                "kubernetes.default.svc",
                "kubernetes.default.svc.corp.internal",
            ]
        );
    }

    #[test]
    fn etcd_names_cover_wildcard_and_loopback() {
        assert_eq!(
            strings(&etcd_alternate_names("example.k8s.local")),
            vec!["*.internal.example.k8s.local", "localhost", "127.0.0.1"]
        );
    }

    #[test]
    fn master_names_in_documented_order() {
        let ip = IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1));
        let names = master_alternate_names(&config(), ip);
        assert_eq!(
            strings(&names),
            vec![
                "kubernetes",
                "kubernetes.default",
                "kubernetes.default.svc",
                "kubernetes.default.svc.cluster.local",
                "api.example.k8s.local",
                "api.internal.example.k8s.local",
                "api.example.com",
                "10.0.0.10",
                "100.64.0.1",
                "127.0.0.1",
            ]
        );
        assert!(names[7].is_ip());
        assert!(names[8].is_ip());
    }

    #[test]
    fn master_names_collapse_repeats() {
        let mut config = config();
        config.master_internal_name = config.master_public_name.clone();
        config.additional_sans = vec!["kubernetes".to_string(), "127.0.0.1".to_string()];
        let names = master_alternate_names(&config, IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1)));
        let strings = strings(&names);

        assert_eq!(strings.len(), 7);
        assert_eq!(strings[4], "api.example.k8s.local");
        assert_eq!(strings[5], "127.0.0.1");
        assert_eq!(strings[6], "100.64.0.1");
        assert_eq!(strings.iter().filter(|s| *s == "kubernetes").count(), 1);
    }

    #[test]
    fn master_names_collapse_equal_addresses() {
        let mut config = config();
        config.additional_sans = vec!["FD00::0001".to_string(), "fd00::1".to_string()];
        let names = master_alternate_names(&config, IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1)));
        let strings = strings(&names);

        assert_eq!(strings.iter().filter(|s| *s == "fd00::1").count(), 1);
        assert!(!strings.iter().any(|s| s == "FD00::0001"));
        assert!(names.contains(&AlternateName::from("FD00::0001")));
    }
}
