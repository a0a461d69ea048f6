//! Read-only detection of the host's network stack.
//!
//! Each field is probed in a fixed order and the first positive check wins.
//! No failed check is an error: absence of every signal yields `Manual`,
//! `None`, `Unknown` and the configured fallback interface.

use crate::config::Settings;
use crate::profile::{ConfigMethod, DhcpClient, NetworkManager, SystemProfile};

use super::command::CommandRunner;
use super::network;
use super::services;

const NETPLAN_DIR: &str = "/etc/netplan";
const INTERFACES_FILE: &str = "/etc/network/interfaces";
const NETWORKD_DIR: &str = "/etc/systemd/network";
const SYS_CLASS_NET: &str = "/sys/class/net";

pub struct Detector<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    settings: &'a Settings,
}

impl<'a, R: CommandRunner + ?Sized> Detector<'a, R> {
    pub fn new(runner: &'a R, settings: &'a Settings) -> Self {
        Self { runner, settings }
    }

    pub async fn detect(&self) -> SystemProfile {
        let profile = SystemProfile {
            network_manager: self.network_manager().await,
            dhcp_client: self.dhcp_client(),
            config_method: self.config_method().await,
            primary_interface: self.primary_interface().await,
        };
        tracing::debug!(%profile, "detected");
        profile
    }

    async fn network_manager(&self) -> NetworkManager {
        if services::is_active(self.runner, "NetworkManager").await {
            NetworkManager::NetworkManager
        } else if services::is_active(self.runner, "networking").await {
            NetworkManager::Networking
        } else {
            NetworkManager::Manual
        }
    }

    fn dhcp_client(&self) -> DhcpClient {
        [DhcpClient::Dhclient, DhcpClient::Dhcpcd, DhcpClient::Udhcpc]
            .into_iter()
            .find(|client| {
                client
                    .program()
                    .is_some_and(|program| self.runner.has_program(program))
            })
            .unwrap_or(DhcpClient::None)
    }

    async fn config_method(&self) -> ConfigMethod {
        if self.settings.host_path(NETPLAN_DIR).is_dir() {
            ConfigMethod::Netplan
        } else if self.settings.host_path(INTERFACES_FILE).is_file() {
            ConfigMethod::Interfaces
        } else if self.settings.host_path(NETWORKD_DIR).is_dir()
            && (services::is_enabled(self.runner, "systemd-networkd").await
                || services::is_active(self.runner, "systemd-networkd").await)
        {
            ConfigMethod::SystemdNetworkd
        } else {
            ConfigMethod::Unknown
        }
    }

    /// Default-route interface, else first wired link, else the fallback name.
    async fn primary_interface(&self) -> String {
        if let Some(iface) = network::default_route(self.runner)
            .await
            .and_then(|route| route.interface)
        {
            return iface;
        }

        let names = network::link_names(self.runner).await;
        network::first_wired(&names, &self.settings.host_path(SYS_CLASS_NET))
            .unwrap_or_else(|| self.settings.fallback_interface.clone())
    }
}
