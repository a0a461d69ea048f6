//! Minimal DHCP-only configuration for each persistence method.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::backup::write_with_backup;

/// Netplan file created when the directory holds none.
pub const NETPLAN_DEFAULT_FILE: &str = "01-netcfg.yaml";
/// systemd-networkd unit written for the primary interface.
pub const NETWORKD_FILE: &str = "20-ethernet.network";

/// Files touched while applying a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateChanges {
    pub written: Vec<PathBuf>,
    pub backups: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl TemplateChanges {
    fn record_write(&mut self, path: PathBuf, backup: Option<PathBuf>) {
        self.written.push(path);
        self.backups.extend(backup);
    }
}

pub fn netplan_yaml(iface: &str, renderer: &str) -> String {
    format!(
        "network:\n  version: 2\n  renderer: {renderer}\n  ethernets:\n    {iface}:\n      dhcp4: true\n"
    )
}

pub fn interfaces_file(iface: &str) -> String {
    format!(
        "# interfaces(5) file used by ifup(8) and ifdown(8)\n\
         auto lo\n\
         iface lo inet loopback\n\
         \n\
         auto {iface}\n\
         iface {iface} inet dhcp\n"
    )
}

pub fn networkd_unit(iface: &str) -> String {
    format!("[Match]\nName={iface}\n\n[Network]\nDHCP=ipv4\n")
}

/// Existing `*.yaml` / `*.yml` files in `dir`, sorted.
pub fn netplan_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml")
        })
        .collect();
    files.sort();
    files
}

/// Overwrite every netplan file (backing each up), or create one if there are none.
pub fn write_netplan(dir: &Path, iface: &str, renderer: &str) -> Result<TemplateChanges> {
    let contents = netplan_yaml(iface, renderer);
    let mut targets = netplan_files(dir);
    if targets.is_empty() {
        targets.push(dir.join(NETPLAN_DEFAULT_FILE));
    }

    let mut changes = TemplateChanges::default();
    for path in targets {
        let backup = write_with_backup(&path, &contents)?;
        // netplan warns about group- or world-readable files.
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        changes.record_write(path, backup);
    }
    Ok(changes)
}

pub fn write_interfaces(path: &Path, iface: &str) -> Result<TemplateChanges> {
    let mut changes = TemplateChanges::default();
    let backup = write_with_backup(path, &interfaces_file(iface))?;
    changes.record_write(path.to_path_buf(), backup);
    Ok(changes)
}

/// Remove `<prefix>-*.network` files, then write [`NETWORKD_FILE`].
pub fn write_networkd(dir: &Path, prefix: &str, iface: &str) -> Result<TemplateChanges> {
    let mut changes = TemplateChanges::default();
    let stale = format!("{}-", prefix);

    if let Ok(entries) = fs::read_dir(dir) {
        let mut matches: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name().and_then(|n| n.to_str()).is_some_and(|n| {
                    n.starts_with(&stale) && n.ends_with(".network")
                })
            })
            .collect();
        matches.sort();
        for path in matches {
            fs::remove_file(&path)?;
            changes.removed.push(path);
        }
    }

    let path = dir.join(NETWORKD_FILE);
    let backup = write_with_backup(&path, &networkd_unit(iface))?;
    changes.record_write(path, backup);
    Ok(changes)
}
