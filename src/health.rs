//! Connectivity checks.
//!
//! A default route is the proxy for "this host is reachable again"; the
//! primary interface's address is reported alongside it.

use serde::Serialize;

use crate::system::command::CommandRunner;
use crate::system::network::{self, DefaultRoute};

/// Overall connectivity of the primary interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// Default route present and the interface has an address.
    #[default]
    Healthy,
    /// Default route present, but something looks off.
    Degraded(String),
    /// No default route.
    Down(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Connectivity {
    pub default_route: Option<DefaultRoute>,
    pub address: Option<String>,
}

impl Connectivity {
    pub fn status(&self, iface: &str) -> HealthStatus {
        let Some(route) = &self.default_route else {
            return HealthStatus::Down("no default route".to_string());
        };
        if self.address.is_none() {
            return HealthStatus::Degraded(format!("{} has no IPv4 address", iface));
        }
        match route.interface.as_deref() {
            Some(dev) if dev != iface => {
                HealthStatus::Degraded(format!("default route uses {} instead of {}", dev, iface))
            }
            _ => HealthStatus::Healthy,
        }
    }
}

/// Look up the default route and `iface`'s IPv4 address.
pub async fn check_connectivity<R: CommandRunner + ?Sized>(runner: &R, iface: &str) -> Connectivity {
    Connectivity {
        default_route: network::default_route(runner).await,
        address: network::ipv4_address(runner, iface).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::command::mock::MockRunner;

    #[tokio::test]
    async fn test_down_without_route() {
        let runner = MockRunner::new();
        let c = check_connectivity(&runner, "eth0").await;
        assert_eq!(c.status("eth0"), HealthStatus::Down("no default route".to_string()));
    }

    #[tokio::test]
    async fn test_healthy_and_degraded() {
        let runner = MockRunner::with(|s| {
            s.default_route = Some("default via 192.168.1.1 dev eth0 proto dhcp".to_string());
            s.addresses.insert("eth0".to_string(), "192.168.1.50/24".to_string());
        });

        let c = check_connectivity(&runner, "eth0").await;
        assert_eq!(c.address.as_deref(), Some("192.168.1.50/24"));
        assert_eq!(c.status("eth0"), HealthStatus::Healthy);

        let other = check_connectivity(&runner, "end0").await;
        assert!(matches!(other.status("end0"), HealthStatus::Degraded(_)));
    }
}
