//! Detected facts about the host's network stack.
//!
//! A [`SystemProfile`] is built once per run and passed by value to every
//! later step; nothing re-queries the host for these facts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Service managing interfaces at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkManager {
    #[serde(rename = "NetworkManager")]
    NetworkManager,
    Networking,
    Manual,
}

/// Installed DHCP client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DhcpClient {
    Dhclient,
    Dhcpcd,
    Udhcpc,
    None,
}

/// Subsystem persisting interface configuration across reboots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigMethod {
    Netplan,
    Interfaces,
    SystemdNetworkd,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemProfile {
    pub network_manager: NetworkManager,
    pub dhcp_client: DhcpClient,
    pub config_method: ConfigMethod,
    pub primary_interface: String,
}

impl NetworkManager {
    /// Systemd unit to restart, if any.
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            NetworkManager::NetworkManager => Some("NetworkManager"),
            NetworkManager::Networking => Some("networking"),
            NetworkManager::Manual => None,
        }
    }
}

impl DhcpClient {
    pub fn program(&self) -> Option<&'static str> {
        match self {
            DhcpClient::Dhclient => Some("dhclient"),
            DhcpClient::Dhcpcd => Some("dhcpcd"),
            DhcpClient::Udhcpc => Some("udhcpc"),
            DhcpClient::None => None,
        }
    }
}

impl fmt::Display for NetworkManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NetworkManager::NetworkManager => "NetworkManager",
            NetworkManager::Networking => "networking",
            NetworkManager::Manual => "manual",
        })
    }
}

impl fmt::Display for DhcpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program().unwrap_or("none"))
    }
}

impl fmt::Display for ConfigMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigMethod::Netplan => "netplan",
            ConfigMethod::Interfaces => "interfaces",
            ConfigMethod::SystemdNetworkd => "systemd-networkd",
            ConfigMethod::Unknown => "unknown",
        })
    }
}

impl fmt::Display for SystemProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "manager={} dhcp={} config={} interface={}",
            self.network_manager, self.dhcp_client, self.config_method, self.primary_interface
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_names_match_display() {
        let profile = SystemProfile {
            network_manager: NetworkManager::NetworkManager,
            dhcp_client: DhcpClient::None,
            config_method: ConfigMethod::SystemdNetworkd,
            primary_interface: "eth0".to_string(),
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["network_manager"], "NetworkManager");
        assert_eq!(json["dhcp_client"], "none");
        assert_eq!(json["config_method"], "systemd-networkd");
        assert_eq!(
            profile.to_string(),
            "manager=NetworkManager dhcp=none config=systemd-networkd interface=eth0"
        );

        for manager in [
            NetworkManager::NetworkManager,
            NetworkManager::Networking,
            NetworkManager::Manual,
        ] {
            assert_eq!(serde_json::to_value(manager).unwrap(), manager.to_string());
        }
        for method in [
            ConfigMethod::Netplan,
            ConfigMethod::Interfaces,
            ConfigMethod::SystemdNetworkd,
            ConfigMethod::Unknown,
        ] {
            assert_eq!(serde_json::to_value(method).unwrap(), method.to_string());
        }
    }
}
