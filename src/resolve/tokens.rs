//! Deprecated bearer-token secrets
//!
//! Static tokens predate client certificates for control-plane components.
//! They are still created so older kubeconfigs keep working.

use super::LegacyTokenSource;

/// Token names created for every cluster
pub const DEPRECATED_AUTH_TOKENS: [&str; 9] = [
    "admin",
    "kube",
    "kube-proxy",
    "kubelet",
    "system:scheduler",
    "system:controller_manager",
    "system:logging",
    "system:monitoring",
    "system:dns",
];

/// The fixed legacy token list
#[derive(Clone, Copy, Debug, Default)]
pub struct DeprecatedAuthTokens;

impl LegacyTokenSource for DeprecatedAuthTokens {
    fn token_names(&self) -> Vec<String> {
        DEPRECATED_AUTH_TOKENS.iter().map(|s| s.to_string()).collect()
    }
}

/// Emit no legacy tokens
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLegacyTokens;

impl LegacyTokenSource for NoLegacyTokens {
    fn token_names(&self) -> Vec<String> {
        Vec::new()
    }
}
