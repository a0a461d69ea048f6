//! Read-only view of AP leftovers and connectivity.

use std::fs;

use serde::Serialize;

use crate::config::Settings;
use crate::console::Console;
use crate::health::{check_connectivity, Connectivity, HealthStatus};
use crate::profile::SystemProfile;
use crate::system::network::Neighbor;
use crate::system::{network, services, sysctl, CommandRunner, Detector};

const HOSTAPD_UNIT: &str = "hostapd";
const HOSTAPD_CONF: &str = "/etc/hostapd/hostapd.conf";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WirelessState {
    pub name: String,
    pub present: bool,
    pub address: Option<String>,
    /// Broadcast SSID, while hostapd is active.
    pub ssid: Option<String>,
    /// Hosts in the neighbor table of the AP interface, while hostapd is active.
    pub clients: Vec<Neighbor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub profile: SystemProfile,
    pub ap_services: Vec<ServiceState>,
    /// Every AP service is active.
    pub ap_mode_enabled: bool,
    pub wireless: WirelessState,
    pub connectivity: Connectivity,
    pub health: HealthStatus,
    /// `None` when sysctl could not be read.
    pub ip_forwarding: Option<bool>,
}

impl StatusReport {
    pub async fn collect<R: CommandRunner + ?Sized>(runner: &R, settings: &Settings) -> Self {
        let profile = Detector::new(runner, settings).detect().await;

        let mut ap_services = Vec::with_capacity(settings.ap_services.len());
        for name in &settings.ap_services {
            ap_services.push(ServiceState {
                name: name.clone(),
                state: services::state(runner, name).await,
            });
        }
        let ap_mode_enabled =
            !ap_services.is_empty() && ap_services.iter().all(|s| s.state == "active");

        let hostapd_active = ap_services
            .iter()
            .any(|s| s.name == HOSTAPD_UNIT && s.state == "active");

        let wifi = settings.wifi_interface.as_str();
        let present = network::interface_exists(runner, wifi).await;
        let mut wireless = WirelessState {
            name: wifi.to_string(),
            present,
            address: None,
            ssid: None,
            clients: Vec::new(),
        };
        if present {
            wireless.address = network::ipv4_address(runner, wifi).await;
            if hostapd_active {
                wireless.clients = network::neighbors(runner, wifi).await;
            }
        }
        if hostapd_active {
            wireless.ssid = fs::read_to_string(settings.host_path(HOSTAPD_CONF))
                .ok()
                .and_then(|conf| parse_ssid(&conf));
        }

        let connectivity = check_connectivity(runner, &profile.primary_interface).await;
        let health = connectivity.status(&profile.primary_interface);
        let ip_forwarding = sysctl::get_forwarding(runner).await.ok();

        Self {
            profile,
            ap_services,
            ap_mode_enabled,
            wireless,
            connectivity,
            health,
            ip_forwarding,
        }
    }

    pub fn print(&self, console: &mut Console) {
        console.step("System");
        console.info(format!("Network manager:   {}", self.profile.network_manager));
        console.info(format!("DHCP client:       {}", self.profile.dhcp_client));
        console.info(format!("Config method:     {}", self.profile.config_method));
        console.info(format!("Primary interface: {}", self.profile.primary_interface));

        console.step("Access point");
        for service in &self.ap_services {
            console.info(format!("{}: {}", service.name, service.state));
        }
        if self.ap_mode_enabled {
            console.warning("AP mode appears enabled");
        } else {
            console.info("AP mode is not running");
        }
        match (self.wireless.present, &self.wireless.address) {
            (false, _) => console.info(format!("{}: not present", self.wireless.name)),
            (true, Some(address)) => {
                console.info(format!("{}: {}", self.wireless.name, address))
            }
            (true, None) => console.info(format!("{}: no IPv4 address", self.wireless.name)),
        }
        if let Some(ssid) = &self.wireless.ssid {
            console.info(format!("SSID: {}", ssid));
        }
        if self.ap_mode_enabled || !self.wireless.clients.is_empty() {
            console.info(format!("Connected clients: {}", self.wireless.clients.len()));
            for client in &self.wireless.clients {
                console.detail(format!("{}  {}  {}", client.address, client.mac, client.state));
            }
        }
        match self.ip_forwarding {
            Some(true) => console.warning("IP forwarding is enabled"),
            Some(false) => console.info("IP forwarding is disabled"),
            None => console.detail("IP forwarding state unknown"),
        }

        console.step("Connectivity");
        if let Some(route) = &self.connectivity.default_route {
            console.info(format!("Default route: {}", route.line));
        }
        if let Some(address) = &self.connectivity.address {
            console.info(format!("{} address: {}", self.profile.primary_interface, address));
        }
        match &self.health {
            HealthStatus::Healthy => console.success("Connected"),
            HealthStatus::Degraded(reason) => console.warning(format!("Degraded: {}", reason)),
            HealthStatus::Down(reason) => console.error(format!("Down: {}", reason)),
        }
    }
}

/// The `ssid=` value from a hostapd.conf.
pub fn parse_ssid(conf: &str) -> Option<String> {
    conf.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| line.strip_prefix("ssid="))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::LogLevel;
    use crate::system::command::mock::MockRunner;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir) -> Settings {
        Settings {
            root: dir.path().to_path_buf(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_parse_ssid() {
        let conf = "interface=wlan0\n# ssid=old\nssid=Rock5B-Cam\nignore_broadcast_ssid=0\n";
        assert_eq!(parse_ssid(conf).as_deref(), Some("Rock5B-Cam"));
        assert_eq!(parse_ssid("interface=wlan0\nignore_broadcast_ssid=0\n"), None);
    }

    #[tokio::test]
    async fn test_ap_host_status() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("etc/hostapd")).unwrap();
        fs::write(
            dir.path().join("etc/hostapd/hostapd.conf"),
            "interface=wlan0\nssid=Rock5B-Cam\nchannel=7\n",
        )
        .unwrap();
        let settings = settings_in(&dir);
        let runner = MockRunner::with(|s| {
            s.active.insert("hostapd".to_string());
            s.active.insert("dnsmasq".to_string());
            s.links = "1: lo: <LOOPBACK>\n2: eth0: <BROADCAST>\n3: wlan0: <BROADCAST>\n".to_string();
            s.addresses
                .insert("wlan0".to_string(), "192.168.4.1/24".to_string());
            s.neighbors.insert(
                "wlan0".to_string(),
                "192.168.4.23 lladdr aa:bb:cc:dd:ee:ff REACHABLE\n192.168.4.9 FAILED\n".to_string(),
            );
        });

        let report = StatusReport::collect(&runner, &settings).await;

        assert!(report.ap_mode_enabled);
        assert!(report.wireless.present);
        assert_eq!(report.wireless.address.as_deref(), Some("192.168.4.1/24"));
        assert_eq!(report.wireless.ssid.as_deref(), Some("Rock5B-Cam"));
        assert_eq!(report.wireless.clients.len(), 1);
        assert_eq!(report.wireless.clients[0].mac, "aa:bb:cc:dd:ee:ff");
        assert!(matches!(report.health, HealthStatus::Down(_)));

        let mut console = Console::silent();
        report.print(&mut console);
        assert!(console.contains(LogLevel::Warning, "AP mode appears enabled"));
        assert!(console.contains(LogLevel::Info, "SSID: Rock5B-Cam"));
        assert!(console.contains(LogLevel::Info, "Connected clients: 1"));
        assert!(console.contains(LogLevel::Detail, "192.168.4.23"));
        assert!(console.contains(LogLevel::Error, "no default route"));
    }

    #[tokio::test]
    async fn test_ssid_and_clients_hidden_without_hostapd() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("etc/hostapd")).unwrap();
        fs::write(dir.path().join("etc/hostapd/hostapd.conf"), "ssid=Rock5B-Cam\n").unwrap();
        let settings = settings_in(&dir);
        let runner = MockRunner::with(|s| {
            s.links = "1: lo: <LOOPBACK>\n2: wlan0: <BROADCAST>\n".to_string();
            s.neighbors.insert(
                "wlan0".to_string(),
                "192.168.1.1 lladdr 00:11:22:33:44:55 REACHABLE\n".to_string(),
            );
        });

        let report = StatusReport::collect(&runner, &settings).await;

        assert!(report.wireless.present);
        assert_eq!(report.wireless.ssid, None);
        assert!(report.wireless.clients.is_empty());
        assert!(!runner.called("ip -4 neigh show dev wlan0"));
    }

    #[tokio::test]
    async fn test_status_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        let runner = MockRunner::with(|s| {
            s.active.insert("hostapd".to_string());
            s.default_route = Some("default via 192.168.1.1 dev eth0".to_string());
            s.addresses
                .insert("eth0".to_string(), "192.168.1.50/24".to_string());
        });

        let report = StatusReport::collect(&runner, &settings).await;

        assert!(!report.ap_mode_enabled);
        assert!(!report.wireless.present);
        assert_eq!(report.health, HealthStatus::Healthy);
        assert!(runner.state().active.contains("hostapd"));
        for call in runner.calls() {
            assert!(
                !call.contains(" stop ") && !call.contains("flush") && !call.contains("-w "),
                "unexpected mutation: {}",
                call
            );
        }
        assert!(serde_json::to_string(&report).unwrap().contains("\"ap_mode_enabled\":false"));
    }
}
