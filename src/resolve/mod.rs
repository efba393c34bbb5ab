//! External lookups the topology builder depends on
//!
//! The builder never computes service IPs, storage paths or legacy token names
//! itself. Each comes from a trait so builds can be driven by fakes in tests
//! and by real configuration services in production.
//!
//! Default implementations:
//! - [`ServiceCidr`]: offsets into the cluster's service IP range
//! - [`VfsContext`]: parses `s3://`, `gs://`, `swift://`, `memfs://` and file locations
//! - [`DeprecatedAuthTokens`]: the fixed list of legacy bearer tokens

mod service_ip;
mod tokens;
mod vfs;

use std::net::IpAddr;

#[cfg(test)]
use mockall::automock;

use crate::cluster::ClusterConfiguration;
use crate::Result;

pub use service_ip::ServiceCidr;
pub use tokens::{DeprecatedAuthTokens, NoLegacyTokens, DEPRECATED_AUTH_TOKENS};
pub use vfs::{StoragePath, VfsContext};

/// Resolves well-known service cluster IPs
#[cfg_attr(test, automock)]
pub trait ServiceIpResolver: Send + Sync {
    /// Return the IP at `offset` within the service range
    fn well_known_service_ip(&self, offset: u32) -> Result<IpAddr>;
}

/// Resolves logical store locations to concrete storage paths
#[cfg_attr(test, automock)]
pub trait StoragePathResolver: Send + Sync {
    /// Resolve a location string such as `s3://bucket/cluster/secrets`
    fn resolve(&self, location: &str) -> Result<StoragePath>;
}

/// Supplies the names of deprecated bearer-token secrets
#[cfg_attr(test, automock)]
pub trait LegacyTokenSource: Send + Sync {
    /// Token names, in emission order
    fn token_names(&self) -> Vec<String>;
}

/// The collaborators a build consults
pub struct Resolvers {
    service_ips: Box<dyn ServiceIpResolver>,
    storage: Box<dyn StoragePathResolver>,
    legacy_tokens: Box<dyn LegacyTokenSource>,
}

impl Resolvers {
    /// Bundle explicit collaborators
    pub fn new(
        service_ips: impl ServiceIpResolver + 'static,
        storage: impl StoragePathResolver + 'static,
        legacy_tokens: impl LegacyTokenSource + 'static,
    ) -> Self {
        Self {
            service_ips: Box::new(service_ips),
            storage: Box::new(storage),
            legacy_tokens: Box::new(legacy_tokens),
        }
    }

    /// Default collaborators for a cluster configuration
    pub fn for_cluster(config: &ClusterConfiguration) -> Self {
        Self::new(
            ServiceCidr::from_config(config),
            VfsContext::new(),
            DeprecatedAuthTokens,
        )
    }

    /// Replace the legacy token source
    pub fn with_legacy_tokens(mut self, legacy_tokens: impl LegacyTokenSource + 'static) -> Self {
        self.legacy_tokens = Box::new(legacy_tokens);
        self
    }

    /// Service IP resolver
    pub fn service_ips(&self) -> &dyn ServiceIpResolver {
        self.service_ips.as_ref()
    }

    /// Storage path resolver
    pub fn storage(&self) -> &dyn StoragePathResolver {
        self.storage.as_ref()
    }

    /// Legacy token source
    pub fn legacy_tokens(&self) -> &dyn LegacyTokenSource {
        self.legacy_tokens.as_ref()
    }
}

impl std::fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolvers").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config() -> ClusterConfiguration {
        ClusterConfiguration::from_yaml(
            r#"
name: example.k8s.local
masterPublicName: api.example.k8s.local
masterInternalName: api.internal.example.k8s.local
serviceClusterIPRange: 100.64.0.0/13
secretStore: s3://state/example/secrets
keyStore: s3://state/example/pki
"#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_follow_cluster_config() {
        let resolvers = Resolvers::for_cluster(&config());
        assert_eq!(
            resolvers.service_ips().well_known_service_ip(1).unwrap(),
            IpAddr::V4(Ipv4Addr::new(100, 64, 0, 1))
        );
        assert_eq!(
            resolvers.storage().resolve("s3://state/example/pki").unwrap(),
            StoragePath::s3("state", "example/pki")
        );
        assert_eq!(
            resolvers.legacy_tokens().token_names().len(),
            DEPRECATED_AUTH_TOKENS.len()
        );
    }

    #[test]
    fn legacy_tokens_can_be_replaced() {
        let resolvers = Resolvers::for_cluster(&config()).with_legacy_tokens(NoLegacyTokens);
        assert!(resolvers.legacy_tokens().token_names().is_empty());
    }

    #[test]
    fn mocks_plug_into_resolvers() {
        let mut ips = MockServiceIpResolver::new();
        ips.expect_well_known_service_ip()
            .withf(|offset| *offset == 10)
            .returning(|_| Ok(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 10))));

        let mut storage = MockStoragePathResolver::new();
        storage
            .expect_resolve()
            .returning(|location| location.parse());

        let mut tokens = MockLegacyTokenSource::new();
        tokens
            .expect_token_names()
            .returning(|| vec!["admin".to_string()]);

        let resolvers = Resolvers::new(ips, storage, tokens);
        assert_eq!(
            resolvers.service_ips().well_known_service_ip(10).unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 10))
        );
        assert_eq!(
            resolvers.storage().resolve("/srv/pki").unwrap(),
            StoragePath::file("/srv/pki")
        );
        assert_eq!(resolvers.legacy_tokens().token_names(), vec!["admin"]);
    }
}
