//! DHCP client lease handling for dhclient, dhcpcd and udhcpc.

use crate::profile::DhcpClient;

use super::command::{CommandRunner, Invocation};

/// Release (or kill) the current lease, then request a new one.
///
/// Returns `None` for [`DhcpClient::None`]; the caller relies on the network
/// service restart to trigger DHCP instead.
pub fn lease_commands(client: DhcpClient, iface: &str) -> Option<(Invocation, Invocation)> {
    match client {
        DhcpClient::Dhclient => Some((
            Invocation::new("dhclient", &["-r", iface]),
            Invocation::new("dhclient", &[iface]),
        )),
        DhcpClient::Dhcpcd => Some((
            Invocation::new("dhcpcd", &["-k", iface]),
            Invocation::new("dhcpcd", &[iface]),
        )),
        DhcpClient::Udhcpc => Some((
            Invocation::new("pkill", &["udhcpc"]),
            Invocation::new("udhcpc", &["-i", iface, "-b"]),
        )),
        DhcpClient::None => None,
    }
}

/// Whether releasing needs a client daemon to be running.
///
/// `dhcpcd -k` and `pkill udhcpc` exit non-zero when there is no daemon to
/// talk to; `dhclient -r` releases from its lease file either way.
pub fn release_needs_daemon(client: DhcpClient) -> bool {
    matches!(client, DhcpClient::Dhcpcd | DhcpClient::Udhcpc)
}

/// Whether a process of `client` is running (`pgrep -x`).
pub async fn daemon_running<R: CommandRunner + ?Sized>(runner: &R, client: DhcpClient) -> bool {
    match client.program() {
        Some(program) => runner.succeeds("pgrep", &["-x", program]).await,
        None => false,
    }
}

/// A one-shot renewal that exits on its own; the caller still bounds it with a timeout.
pub fn renewal_command(client: DhcpClient, iface: &str) -> Option<Invocation> {
    match client {
        DhcpClient::Dhclient => Some(Invocation::new("dhclient", &["-1", iface])),
        DhcpClient::Dhcpcd => Some(Invocation::new("dhcpcd", &["-1", "-w", iface])),
        DhcpClient::Udhcpc => Some(Invocation::new("udhcpc", &["-i", iface, "-n", "-q"])),
        DhcpClient::None => None,
    }
}

/// Commands an operator can type when automatic recovery did not converge.
pub fn manual_recovery(client: DhcpClient, iface: &str) -> Vec<String> {
    let mut lines = vec![
        format!("sudo ip link set {} down", iface),
        format!("sudo ip link set {} up", iface),
    ];

    lines.push(match client {
        DhcpClient::Dhclient => format!("sudo dhclient -v {}", iface),
        DhcpClient::Dhcpcd => format!("sudo dhcpcd -n {}", iface),
        DhcpClient::Udhcpc => format!("sudo udhcpc -i {}", iface),
        DhcpClient::None => "sudo systemctl restart systemd-networkd".to_string(),
    });

    lines.extend([
        "ip route show default".to_string(),
        format!("ip addr show {}", iface),
        "ping -c 3 8.8.8.8".to_string(),
        "sudo reboot".to_string(),
    ]);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::command::mock::MockRunner;

    #[test]
    fn test_lease_commands_per_client() {
        let (release, request) = lease_commands(DhcpClient::Dhclient, "eth0").unwrap();
        assert_eq!(release.line(), "dhclient -r eth0");
        assert_eq!(request.line(), "dhclient eth0");

        let (release, request) = lease_commands(DhcpClient::Dhcpcd, "end0").unwrap();
        assert_eq!(release.line(), "dhcpcd -k end0");
        assert_eq!(request.line(), "dhcpcd end0");

        let (release, request) = lease_commands(DhcpClient::Udhcpc, "eth1").unwrap();
        assert_eq!(release.line(), "pkill udhcpc");
        assert_eq!(request.line(), "udhcpc -i eth1 -b");

        assert!(lease_commands(DhcpClient::None, "eth0").is_none());
    }

    #[tokio::test]
    async fn test_daemon_running_uses_exact_name() {
        let runner = MockRunner::with(|s| {
            s.running.insert("dhcpcd".to_string());
        });
        assert!(daemon_running(&runner, DhcpClient::Dhcpcd).await);
        assert!(!daemon_running(&runner, DhcpClient::Udhcpc).await);
        assert!(!daemon_running(&runner, DhcpClient::None).await);
        assert!(runner.called("pgrep -x dhcpcd"));
    }

    #[test]
    fn test_only_daemon_clients_need_a_running_process() {
        assert!(release_needs_daemon(DhcpClient::Udhcpc));
        assert!(release_needs_daemon(DhcpClient::Dhcpcd));
        assert!(!release_needs_daemon(DhcpClient::Dhclient));
    }

    #[test]
    fn test_renewal_is_one_shot() {
        assert_eq!(
            renewal_command(DhcpClient::Dhclient, "eth0").unwrap().line(),
            "dhclient -1 eth0"
        );
        assert!(renewal_command(DhcpClient::None, "eth0").is_none());
    }

    #[test]
    fn test_manual_recovery_is_tailored() {
        let lines = manual_recovery(DhcpClient::Udhcpc, "end0");
        assert!(lines.contains(&"sudo udhcpc -i end0".to_string()));
        assert!(lines.contains(&"sudo ip link set end0 up".to_string()));

        let lines = manual_recovery(DhcpClient::None, "eth0");
        assert!(lines.contains(&"sudo systemctl restart systemd-networkd".to_string()));
        assert!(!lines.iter().any(|l| l.contains("dhclient")));
    }
}
