//! Well-known service IPs from the service cluster IP range

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

use super::ServiceIpResolver;
use crate::cluster::ClusterConfiguration;
use crate::{Error, Result};

const TARGET: &str = "serviceClusterIPRange";

/// Computes service IPs as offsets from the start of a CIDR
///
/// The range is parsed on each lookup so an invalid range surfaces as a
/// resolution error during the build rather than at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceCidr {
    range: String,
}

impl ServiceCidr {
    /// Create a resolver for the given CIDR (e.g., "100.64.0.0/13")
    pub fn new(range: impl Into<String>) -> Self {
        Self {
            range: range.into(),
        }
    }

    /// Create a resolver for a cluster's `serviceClusterIPRange`
    pub fn from_config(config: &ClusterConfiguration) -> Self {
        Self::new(config.service_cluster_ip_range.clone())
    }

    fn parse(&self) -> Result<IpNet> {
        let range = self.range.trim();
        if range.is_empty() {
            return Err(Error::resolution(TARGET, "service range is not set"));
        }
        range
            .parse::<IpNet>()
            .map_err(|e| Error::resolution(TARGET, format!("invalid CIDR {range:?}: {e}")))
    }
}

impl ServiceIpResolver for ServiceCidr {
    fn well_known_service_ip(&self, offset: u32) -> Result<IpAddr> {
        let net = self.parse()?;
        let out_of_range = || {
            Error::resolution(
                TARGET,
                format!("offset {offset} is outside service range {net}"),
            )
        };

        let ip = match net {
            IpNet::V4(v4) => {
                let base = u32::from(v4.network());
                let ip = Ipv4Addr::from(base.checked_add(offset).ok_or_else(out_of_range)?);
                if !v4.contains(&ip) {
                    return Err(out_of_range());
                }
                IpAddr::V4(ip)
            }
            IpNet::V6(v6) => {
                let base = u128::from(v6.network());
                let ip = Ipv6Addr::from(
                    base.checked_add(u128::from(offset))
                        .ok_or_else(out_of_range)?,
                );
                if !v6.contains(&ip) {
                    return Err(out_of_range());
                }
                IpAddr::V6(ip)
            }
        };

        Ok(ip)
    }
}
