//! Restorer settings.
//!
//! Loaded from a small JSON file. The lookup order is an explicit `--config`
//! path, then `/etc/netrestore/config.json`, then
//! `~/.config/netrestore/config.json`. Implicit lookups fall back to defaults
//! on any error; an explicit path that can't be read or parsed is an error.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RestoreError, Result};

const SYSTEM_CONFIG_PATH: &str = "/etc/netrestore/config.json";

/// Restorer settings.
///
/// Every field has a serde default so that a partial file (or one written
/// for an older version) still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wireless interface the AP setup used.
    pub wifi_interface: String,
    /// Interface name used when nothing better can be detected.
    pub fallback_interface: String,
    /// Prefix of the `.network` files the AP setup installed.
    pub unit_prefix: String,
    /// Access-point daemons to stop and disable.
    pub ap_services: Vec<String>,
    /// Systemd units installed by the bundle (without `.service`).
    pub bundle_units: Vec<String>,
    /// Packages offered for purging.
    pub packages: Vec<String>,
    /// User accounts offered for removal.
    pub accounts: Vec<String>,
    /// Filesystem root all configuration paths are resolved against.
    pub root: PathBuf,
    /// Fixed settle delays.
    pub timings: Timings,
}

/// Fixed delays (milliseconds) and the DHCP renewal bound (seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Pause between link down and link up.
    pub link_settle_ms: u64,
    /// Pause between releasing and requesting a DHCP lease.
    pub dhcp_pause_ms: u64,
    /// Pause after restarting a network service.
    pub service_settle_ms: u64,
    /// Pause before the first default-route check.
    pub verify_settle_ms: u64,
    /// Pause after each escalation action.
    pub escalation_settle_ms: u64,
    /// Upper bound on the forced DHCP renewal during escalation.
    pub renewal_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wifi_interface: "wlan0".to_string(),
            fallback_interface: "eth0".to_string(),
            unit_prefix: "rock5b".to_string(),
            ap_services: vec!["hostapd".to_string(), "dnsmasq".to_string()],
            bundle_units: [
                "ap-manager",
                "camera-streamer",
                "network-monitor",
                "web-dashboard",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            packages: vec!["hostapd".to_string(), "dnsmasq".to_string()],
            accounts: Vec::new(),
            root: PathBuf::from("/"),
            timings: Timings::default(),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            link_settle_ms: 2_000,
            dhcp_pause_ms: 2_000,
            service_settle_ms: 3_000,
            verify_settle_ms: 5_000,
            escalation_settle_ms: 3_000,
            renewal_timeout_secs: 30,
        }
    }
}

impl Timings {
    /// All delays zero; the renewal bound stays positive.
    #[cfg(test)]
    pub fn instant() -> Self {
        Self {
            link_settle_ms: 0,
            dhcp_pause_ms: 0,
            service_settle_ms: 0,
            verify_settle_ms: 0,
            escalation_settle_ms: 0,
            renewal_timeout_secs: 1,
        }
    }

    pub fn link_settle(&self) -> Duration {
        Duration::from_millis(self.link_settle_ms)
    }

    pub fn dhcp_pause(&self) -> Duration {
        Duration::from_millis(self.dhcp_pause_ms)
    }

    pub fn service_settle(&self) -> Duration {
        Duration::from_millis(self.service_settle_ms)
    }

    pub fn verify_settle(&self) -> Duration {
        Duration::from_millis(self.verify_settle_ms)
    }

    pub fn escalation_settle(&self) -> Duration {
        Duration::from_millis(self.escalation_settle_ms)
    }

    pub fn renewal_timeout(&self) -> Duration {
        Duration::from_secs(self.renewal_timeout_secs)
    }
}

impl Settings {
    /// Per-user config file path: `~/.config/netrestore/config.json`.
    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("netrestore").join("config.json"))
    }

    /// Load settings from an explicit file, or from the implicit locations.
    pub fn load_from(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::read(path),
            None => Ok(Self::load()),
        }
    }

    /// Load from the implicit locations, falling back to defaults on any error.
    pub fn load() -> Self {
        let candidates = std::iter::once(PathBuf::from(SYSTEM_CONFIG_PATH)).chain(Self::user_path());

        for path in candidates {
            if !path.is_file() {
                continue;
            }
            match Self::read(&path) {
                Ok(settings) => return settings,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring config file"),
            }
        }

        Self::default()
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| RestoreError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve an absolute host path (e.g. `/etc/netplan`) under `root`.
    pub fn host_path(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }
}
