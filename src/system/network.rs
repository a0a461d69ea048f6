//! Link, address and route inspection via iproute2.

use std::path::Path;

use serde::Serialize;

use super::command::CommandRunner;

/// Name prefixes of virtual links that are never the primary interface.
const VIRTUAL_PREFIXES: &[&str] = &[
    "docker", "veth", "br-", "virbr", "vnet", "tun", "tap", "wg", "dummy", "zt", "tailscale",
];

/// The route used when nothing more specific matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultRoute {
    /// The raw `ip route` line.
    pub line: String,
    pub gateway: Option<String>,
    pub interface: Option<String>,
}

/// Parse `ip route show default` output. The first `default` line wins.
pub fn parse_default_route(output: &str) -> Option<DefaultRoute> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("default"))?;

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let after = |key: &str| {
        tokens
            .iter()
            .position(|t| *t == key)
            .and_then(|i| tokens.get(i + 1))
            .map(|t| t.to_string())
    };

    Some(DefaultRoute {
        line: line.to_string(),
        gateway: after("via"),
        interface: after("dev"),
    })
}

/// Parse link names from `ip -o link show`.
///
/// Lines look like `2: eth0: <BROADCAST,MULTICAST,UP> mtu 1500 ...` or
/// `5: veth1a2b@if4: <...>`; the `@peer` suffix is dropped.
pub fn parse_link_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, ':');
            let _index = fields.next()?;
            let name = fields.next()?.trim();
            let name = name.split('@').next().unwrap_or(name);
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect()
}

/// A host in the neighbor (ARP) table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Neighbor {
    pub address: String,
    pub mac: String,
    /// Kernel NUD state (`REACHABLE`, `STALE`, ...).
    pub state: String,
}

/// Parse `ip -4 neigh show dev <iface>` output.
///
/// Lines look like `192.168.4.23 lladdr aa:bb:cc:dd:ee:ff REACHABLE`;
/// entries without a link-layer address (`INCOMPLETE`, `FAILED`) are skipped.
pub fn parse_neighbors(output: &str) -> Vec<Neighbor> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let address = tokens.first()?;
            let lladdr = tokens.iter().position(|t| *t == "lladdr")?;
            let mac = tokens.get(lladdr + 1)?;
            let state = tokens.last().filter(|t| *t != mac).unwrap_or(&"");
            Some(Neighbor {
                address: address.to_string(),
                mac: mac.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Parse the first IPv4 CIDR from `ip -4 -o addr show dev <iface>`.
pub fn parse_ipv4_address(output: &str) -> Option<String> {
    let tokens: Vec<&str> = output.split_whitespace().collect();
    tokens
        .iter()
        .position(|t| *t == "inet")
        .and_then(|i| tokens.get(i + 1))
        .map(|t| t.to_string())
}

pub fn is_loopback(name: &str) -> bool {
    name == "lo"
}

pub fn is_virtual(name: &str) -> bool {
    VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Wireless by name (`wl*`) or by the presence of `<sys_class_net>/<name>/wireless`.
pub fn is_wireless(name: &str, sys_class_net: &Path) -> bool {
    name.starts_with("wl") || sys_class_net.join(name).join("wireless").exists()
}

/// First link that is neither loopback, virtual, nor wireless.
pub fn first_wired(names: &[String], sys_class_net: &Path) -> Option<String> {
    names
        .iter()
        .find(|n| !is_loopback(n) && !is_virtual(n) && !is_wireless(n, sys_class_net))
        .cloned()
}

pub async fn default_route<R: CommandRunner + ?Sized>(runner: &R) -> Option<DefaultRoute> {
    let output = runner.run("ip", &["route", "show", "default"]).await.ok()?;
    if !output.success {
        return None;
    }
    parse_default_route(&output.stdout)
}

pub async fn link_names<R: CommandRunner + ?Sized>(runner: &R) -> Vec<String> {
    match runner.run("ip", &["-o", "link", "show"]).await {
        Ok(output) if output.success => parse_link_names(&output.stdout),
        _ => Vec::new(),
    }
}

pub async fn interface_exists<R: CommandRunner + ?Sized>(runner: &R, iface: &str) -> bool {
    runner.succeeds("ip", &["link", "show", "dev", iface]).await
}

pub async fn ipv4_address<R: CommandRunner + ?Sized>(runner: &R, iface: &str) -> Option<String> {
    let output = runner
        .run("ip", &["-4", "-o", "addr", "show", "dev", iface])
        .await
        .ok()?;
    parse_ipv4_address(&output.stdout)
}

pub async fn neighbors<R: CommandRunner + ?Sized>(runner: &R, iface: &str) -> Vec<Neighbor> {
    match runner.run("ip", &["-4", "neigh", "show", "dev", iface]).await {
        Ok(output) if output.success => parse_neighbors(&output.stdout),
        _ => Vec::new(),
    }
}
