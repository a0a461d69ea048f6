//! The restoration pipeline.
//!
//! Detect, tear down AP mode, reset the firewall and interfaces, re-acquire
//! DHCP, restart the network service and apply the persistent template,
//! then verify the default route (escalating once). Each step is run in a
//! fixed order; a step's failure is recorded and the next step runs anyway.

use std::fs;
use std::time::Duration;

use serde::Serialize;

use crate::config::Settings;
use crate::console::Console;
use crate::error::Result;
use crate::health::{check_connectivity, Connectivity};
use crate::profile::{ConfigMethod, NetworkManager, SystemProfile};
use crate::system::command::{display, CommandOutput, CommandRunner, Invocation};
use crate::system::{backup, dhcp, firewall, network, services, sysctl, templates, Detector};

const SYSCTL_CONF: &str = "/etc/sysctl.conf";
const IPTABLES_RULES: &str = "/etc/iptables/rules.v4";
const DNSMASQ_CONF: &str = "/etc/dnsmasq.conf";
const DNSMASQ_AP_BACKUP: &str = "/etc/dnsmasq.conf.backup";
const SYSTEMD_SYSTEM_DIR: &str = "/etc/systemd/system";
const NETPLAN_DIR: &str = "/etc/netplan";
const INTERFACES_FILE: &str = "/etc/network/interfaces";
const NETWORKD_DIR: &str = "/etc/systemd/network";

/// Restarted in this order when the first escalation didn't bring a route back.
const ESCALATION_UNITS: &[&str] = &["systemd-networkd", "NetworkManager", "networking"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    TeardownAp,
    RemoveBundleServices,
    ResetFirewall,
    ResetInterfaces,
    ReacquireDhcp,
    RestartServiceAndTemplate,
    Verify,
    PurgePackages,
    RemoveAccounts,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Step::TeardownAp => "Stop AP services",
            Step::RemoveBundleServices => "Remove bundle services",
            Step::ResetFirewall => "Reset firewall and NAT",
            Step::ResetInterfaces => "Reset interfaces",
            Step::ReacquireDhcp => "Re-acquire DHCP lease",
            Step::RestartServiceAndTemplate => "Restart network service and apply configuration",
            Step::Verify => "Verify connectivity",
            Step::PurgePackages => "Purge packages",
            Step::RemoveAccounts => "Remove user accounts",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Done,
    /// Some commands in the step failed; the rest ran.
    Partial { failed: usize, attempted: usize },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestorationOutcome {
    pub default_route_restored: bool,
    /// The matched `ip route` line.
    pub default_route: Option<String>,
    pub ip_address: Option<String>,
    /// Whether the one escalation pass ran.
    pub escalated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestorationReport {
    pub profile: SystemProfile,
    pub steps: Vec<StepRecord>,
    pub outcome: RestorationOutcome,
    /// Manual-recovery commands; empty when recovery converged.
    pub guidance: Vec<String>,
}

impl RestorationReport {
    #[cfg(test)]
    pub fn outcome_of(&self, step: Step) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.outcome)
    }
}

/// Counts attempted and failed commands within one step.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    attempted: usize,
    failed: usize,
}

impl Tally {
    pub(crate) fn note(&mut self, ok: bool) {
        self.attempted += 1;
        if !ok {
            self.failed += 1;
        }
    }

    pub(crate) fn outcome(&self) -> StepOutcome {
        if self.failed == 0 {
            StepOutcome::Done
        } else {
            StepOutcome::Partial {
                failed: self.failed,
                attempted: self.attempted,
            }
        }
    }

    /// `Skipped` when nothing was attempted.
    pub(crate) fn outcome_or_skip(&self, reason: &str) -> StepOutcome {
        if self.attempted == 0 {
            StepOutcome::Skipped {
                reason: reason.to_string(),
            }
        } else {
            self.outcome()
        }
    }
}

/// Run one command; report a failure on the console and carry on.
pub async fn attempt<R: CommandRunner + ?Sized>(
    runner: &R,
    console: &mut Console,
    program: &str,
    args: &[&str],
) -> bool {
    attempt_unless(runner, console, program, args, |_| false).await != Some(false)
}

/// Like [`attempt`], but a failure that `absent` recognises means the target
/// does not exist: nothing to do, nothing reported. Returns `None` then.
pub async fn attempt_unless<R, F>(
    runner: &R,
    console: &mut Console,
    program: &str,
    args: &[&str],
    absent: F,
) -> Option<bool>
where
    R: CommandRunner + ?Sized,
    F: Fn(&CommandOutput) -> bool,
{
    let command = display(program, args);
    let result = match runner.run(program, args).await {
        Ok(output) if !output.success && absent(&output) => {
            tracing::debug!(%command, "target absent; nothing to do");
            return None;
        }
        Ok(output) => output.into_result(&command),
        Err(e) => Err(e),
    };
    match result {
        Ok(_) => {
            tracing::debug!(%command, "ok");
            Some(true)
        }
        Err(e) => {
            tracing::warn!(%command, error = %e, "ignored failure");
            console.warning(format!("{} failed ({}); continuing", command, e));
            Some(false)
        }
    }
}

pub struct Restorer<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    settings: &'a Settings,
    console: &'a mut Console,
    steps: Vec<StepRecord>,
}

impl<'a, R: CommandRunner + ?Sized> Restorer<'a, R> {
    pub fn new(runner: &'a R, settings: &'a Settings, console: &'a mut Console) -> Self {
        Self {
            runner,
            settings,
            console,
            steps: Vec::new(),
        }
    }

    pub async fn run(mut self) -> RestorationReport {
        self.console.step("Detecting network configuration");
        let profile = Detector::new(self.runner, self.settings).detect().await;
        self.console
            .info(format!("Network manager:   {}", profile.network_manager));
        self.console
            .info(format!("DHCP client:       {}", profile.dhcp_client));
        self.console
            .info(format!("Config method:     {}", profile.config_method));
        self.console
            .info(format!("Primary interface: {}", profile.primary_interface));

        let result = self.teardown_ap().await;
        self.record(Step::TeardownAp, result);

        let result = self.remove_bundle_services().await;
        self.record(Step::RemoveBundleServices, result);

        let result = self.reset_firewall().await;
        self.record(Step::ResetFirewall, result);

        let result = self.reset_interfaces(&profile).await;
        self.record(Step::ResetInterfaces, result);

        let result = self.reacquire_dhcp(&profile).await;
        self.record(Step::ReacquireDhcp, result);

        let result = self.restart_and_apply_template(&profile).await;
        self.record(Step::RestartServiceAndTemplate, result);

        let (outcome, guidance) = self.verify(&profile).await;
        let verdict = if outcome.default_route_restored {
            StepOutcome::Done
        } else {
            StepOutcome::Failed {
                error: "no default route".to_string(),
            }
        };
        self.record(Step::Verify, Ok(verdict));

        RestorationReport {
            profile,
            steps: self.steps,
            outcome,
            guidance,
        }
    }

    fn record(&mut self, step: Step, result: Result<StepOutcome>) {
        let outcome = result.unwrap_or_else(|e| {
            self.console.error(format!("{}: {}", step.label(), e));
            StepOutcome::Failed {
                error: e.to_string(),
            }
        });
        tracing::debug!(?step, ?outcome, "step finished");
        self.steps.push(StepRecord { step, outcome });
    }

    async fn attempt(&mut self, program: &str, args: &[&str]) -> bool {
        attempt(self.runner, self.console, program, args).await
    }

    async fn attempt_invocation(&mut self, invocation: &Invocation) -> bool {
        self.attempt(invocation.program, &invocation.arg_refs()).await
    }

    async fn settle(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn teardown_ap(&mut self) -> Result<StepOutcome> {
        self.console.step(Step::TeardownAp.label());
        let runner = self.runner;
        let settings = self.settings;
        let mut tally = Tally::default();

        for service in &settings.ap_services {
            let active = services::is_active(runner, service).await;
            if active {
                self.console.info(format!("Stopping {}", service));
                tally.note(self.attempt("systemctl", &["stop", service]).await);
            }
            if active || services::is_enabled(runner, service).await {
                tally.note(self.attempt("systemctl", &["disable", service]).await);
            }
            if !active {
                self.console.info(format!("{} is not running", service));
            }
        }

        // dnsmasq.conf saved by the AP setup goes back in place.
        let saved = settings.host_path(DNSMASQ_AP_BACKUP);
        if saved.is_file() {
            let conf = settings.host_path(DNSMASQ_CONF);
            let restored = backup::backup(&conf).and_then(|_| Ok(fs::copy(&saved, &conf)?));
            tally.note(restored.is_ok());
            match restored {
                Ok(_) => self
                    .console
                    .info(format!("Restored {} from {}", conf.display(), saved.display())),
                Err(e) => self
                    .console
                    .warning(format!("Could not restore {}: {}", conf.display(), e)),
            }
        }

        Ok(tally.outcome_or_skip("no AP services present"))
    }

    async fn remove_bundle_services(&mut self) -> Result<StepOutcome> {
        self.console.step(Step::RemoveBundleServices.label());
        let runner = self.runner;
        let settings = self.settings;
        let mut tally = Tally::default();
        let mut removed_any = false;

        for unit in &settings.bundle_units {
            let name = format!("{}.service", unit);
            if services::is_active(runner, &name).await {
                tally.note(self.attempt("systemctl", &["stop", &name]).await);
            }
            if services::is_enabled(runner, &name).await {
                tally.note(self.attempt("systemctl", &["disable", &name]).await);
            }

            let path = settings.host_path(&format!("{}/{}", SYSTEMD_SYSTEM_DIR, name));
            if path.is_file() {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        self.console.info(format!("Removed {}", path.display()));
                        removed_any = true;
                        tally.note(true);
                    }
                    Err(e) => {
                        self.console
                            .warning(format!("Could not remove {}: {}", path.display(), e));
                        tally.note(false);
                    }
                }
            }
        }

        if removed_any {
            tally.note(self.attempt("systemctl", &["daemon-reload"]).await);
        }

        Ok(tally.outcome_or_skip("no bundle services installed"))
    }

    async fn reset_firewall(&mut self) -> Result<StepOutcome> {
        self.console.step(Step::ResetFirewall.label());
        let runner = self.runner;
        let settings = self.settings;
        let mut tally = Tally::default();

        // Forwarding goes off before the rules are flushed.
        self.console.info("Disabling IP forwarding");
        let disabled = match sysctl::disable_forwarding(runner).await {
            Ok(()) => true,
            Err(e) => {
                self.console
                    .warning(format!("Could not disable IP forwarding ({}); continuing", e));
                false
            }
        };
        tally.note(disabled);

        match sysctl::scrub_persistent_forwarding(&settings.host_path(SYSCTL_CONF)) {
            Ok(Some(saved)) => {
                self.console.info(format!(
                    "Removed persistent forwarding from {} (backup {})",
                    SYSCTL_CONF,
                    saved.display()
                ));
                tally.note(true);
            }
            Ok(None) => {}
            Err(e) => {
                self.console
                    .warning(format!("Could not update {}: {}", SYSCTL_CONF, e));
                tally.note(false);
            }
        }

        self.console.info("Flushing firewall chains and NAT rules");
        for invocation in firewall::reset_plan() {
            let outcome = attempt_unless(
                self.runner,
                self.console,
                invocation.program,
                &invocation.arg_refs(),
                firewall::table_missing,
            )
            .await;
            if let Some(ok) = outcome {
                tally.note(ok);
            }
        }

        let leftover = firewall::custom_chains(runner).await;
        if leftover > 0 {
            self.console
                .warning(format!("{} custom chain(s) still present", leftover));
            tally.note(false);
        }

        match firewall::save(runner, &settings.host_path(IPTABLES_RULES)).await {
            Ok(saved) => {
                if let Some(saved) = saved {
                    self.console.info(format!(
                        "Saved empty ruleset to {} (backup {})",
                        IPTABLES_RULES,
                        saved.display()
                    ));
                }
            }
            Err(e) => {
                self.console
                    .warning(format!("Could not save {}: {}", IPTABLES_RULES, e));
                tally.note(false);
            }
        }

        Ok(tally.outcome())
    }

    async fn reset_link(&mut self, iface: &str, tally: &mut Tally) {
        self.console.info(format!("Resetting {}", iface));
        tally.note(self.attempt("ip", &["addr", "flush", "dev", iface]).await);
        tally.note(self.attempt("ip", &["link", "set", iface, "down"]).await);
        self.settle(self.settings.timings.link_settle()).await;
        tally.note(self.attempt("ip", &["link", "set", iface, "up"]).await);
    }

    async fn reset_interfaces(&mut self, profile: &SystemProfile) -> Result<StepOutcome> {
        self.console.step(Step::ResetInterfaces.label());
        let settings = self.settings;
        let mut tally = Tally::default();

        self.reset_link(&profile.primary_interface, &mut tally).await;

        let wifi = settings.wifi_interface.as_str();
        if wifi != profile.primary_interface && network::interface_exists(self.runner, wifi).await {
            self.reset_link(wifi, &mut tally).await;
        } else {
            tracing::debug!(%wifi, "no separate wireless interface to reset");
        }

        Ok(tally.outcome())
    }

    async fn reacquire_dhcp(&mut self, profile: &SystemProfile) -> Result<StepOutcome> {
        self.console.step(Step::ReacquireDhcp.label());
        let Some((release, request)) =
            dhcp::lease_commands(profile.dhcp_client, &profile.primary_interface)
        else {
            self.console
                .info("No DHCP client found; relying on the network service restart");
            return Ok(StepOutcome::Skipped {
                reason: "no DHCP client installed".to_string(),
            });
        };

        let mut tally = Tally::default();
        let client = profile.dhcp_client;
        if dhcp::release_needs_daemon(client) && !dhcp::daemon_running(self.runner, client).await {
            self.console
                .info(format!("No running {}; nothing to release", client));
        } else {
            tally.note(self.attempt_invocation(&release).await);
            self.settle(self.settings.timings.dhcp_pause()).await;
        }
        self.console.info(format!(
            "Requesting a lease on {} via {}",
            profile.primary_interface, profile.dhcp_client
        ));
        tally.note(self.attempt_invocation(&request).await);
        Ok(tally.outcome())
    }

    async fn restart_and_apply_template(&mut self, profile: &SystemProfile) -> Result<StepOutcome> {
        self.console.step(Step::RestartServiceAndTemplate.label());
        let settings = self.settings;
        let iface = profile.primary_interface.as_str();
        let mut tally = Tally::default();

        match profile.network_manager.unit() {
            Some(unit) => {
                self.console.info(format!("Restarting {}", unit));
                tally.note(self.attempt("systemctl", &["restart", unit]).await);
                self.settle(settings.timings.service_settle()).await;
            }
            None => self.console.info("No network service to restart"),
        }

        match profile.config_method {
            ConfigMethod::Netplan => {
                let renderer = match profile.network_manager {
                    NetworkManager::NetworkManager => "NetworkManager",
                    _ => "networkd",
                };
                let written =
                    templates::write_netplan(&settings.host_path(NETPLAN_DIR), iface, renderer);
                tally.note(self.report_template("netplan", written));
                tally.note(self.attempt("netplan", &["apply"]).await);
            }
            ConfigMethod::Interfaces => {
                let written =
                    templates::write_interfaces(&settings.host_path(INTERFACES_FILE), iface);
                tally.note(self.report_template("interfaces", written));
                tally.note(self.attempt("systemctl", &["restart", "networking"]).await);
            }
            ConfigMethod::SystemdNetworkd => {
                let written = templates::write_networkd(
                    &settings.host_path(NETWORKD_DIR),
                    &settings.unit_prefix,
                    iface,
                );
                tally.note(self.report_template("systemd-networkd", written));
                tally.note(self.attempt("systemctl", &["restart", "systemd-networkd"]).await);
                tally.note(self.attempt("systemctl", &["restart", "systemd-resolved"]).await);
            }
            ConfigMethod::Unknown => {
                self.console
                    .info("No persistent configuration method detected; skipping template");
            }
        }

        Ok(tally.outcome())
    }

    fn report_template(
        &mut self,
        method: &str,
        written: Result<templates::TemplateChanges>,
    ) -> bool {
        match written {
            Ok(changes) => {
                for path in &changes.removed {
                    self.console.info(format!("Removed {}", path.display()));
                }
                for path in &changes.backups {
                    self.console.info(format!("Backed up to {}", path.display()));
                }
                for path in &changes.written {
                    self.console
                        .info(format!("Wrote {} DHCP config {}", method, path.display()));
                }
                true
            }
            Err(e) => {
                self.console
                    .warning(format!("Could not write {} config: {}", method, e));
                false
            }
        }
    }

    /// Check for a default route, escalating once if it is missing.
    async fn verify(&mut self, profile: &SystemProfile) -> (RestorationOutcome, Vec<String>) {
        self.console.step(Step::Verify.label());
        let runner = self.runner;
        let settings = self.settings;
        let timings = &settings.timings;
        let iface = profile.primary_interface.as_str();

        self.settle(timings.verify_settle()).await;
        let mut connectivity = check_connectivity(runner, iface).await;
        let mut escalated = false;
        let mut guidance = Vec::new();

        if connectivity.default_route.is_none() {
            escalated = true;
            self.console
                .warning("No default route yet; toggling the interface and renewing DHCP");
            self.toggle_link(iface).await;
            self.settle(timings.escalation_settle()).await;
            self.renew_lease(profile, timings.renewal_timeout()).await;
            connectivity = check_connectivity(runner, iface).await;

            if connectivity.default_route.is_none() {
                self.console
                    .warning("Still no default route; restarting network services");
                for &unit in ESCALATION_UNITS {
                    self.attempt("systemctl", &["restart", unit]).await;
                }
                self.settle(timings.escalation_settle()).await;
                connectivity = check_connectivity(runner, iface).await;

                guidance = dhcp::manual_recovery(profile.dhcp_client, iface);
                self.console.warning(
                    "Automatic recovery may not have converged. To recover manually, run:",
                );
                for line in &guidance {
                    self.console.detail(line.clone());
                }
            }
        }

        let outcome = self.report_connectivity(iface, &connectivity, escalated);
        (outcome, guidance)
    }

    /// Legacy `ifconfig` toggle, or iproute2 where ifconfig is not installed.
    async fn toggle_link(&mut self, iface: &str) {
        if self.runner.has_program("ifconfig") {
            self.attempt("ifconfig", &[iface, "down"]).await;
            self.settle(self.settings.timings.link_settle()).await;
            self.attempt("ifconfig", &[iface, "up"]).await;
        } else {
            self.attempt("ip", &["link", "set", iface, "down"]).await;
            self.settle(self.settings.timings.link_settle()).await;
            self.attempt("ip", &["link", "set", iface, "up"]).await;
        }
    }

    async fn renew_lease(&mut self, profile: &SystemProfile, limit: Duration) {
        let Some(renewal) = dhcp::renewal_command(profile.dhcp_client, &profile.primary_interface)
        else {
            return;
        };
        let command = renewal.line();
        self.console
            .info(format!("Renewing lease ({}s limit): {}", limit.as_secs(), command));
        match self
            .runner
            .run_with_timeout(renewal.program, &renewal.arg_refs(), limit)
            .await
            .and_then(|output| output.into_result(&command))
        {
            Ok(_) => tracing::debug!(%command, "renewal finished"),
            Err(e) => self
                .console
                .warning(format!("{} abandoned ({}); continuing", command, e)),
        }
    }

    fn report_connectivity(
        &mut self,
        iface: &str,
        connectivity: &Connectivity,
        escalated: bool,
    ) -> RestorationOutcome {
        match &connectivity.default_route {
            Some(route) => {
                self.console
                    .success(format!("Default route restored: {}", route.line));
                match &connectivity.address {
                    Some(address) => self.console.info(format!("{} address: {}", iface, address)),
                    None => self
                        .console
                        .warning(format!("{} has no IPv4 address yet", iface)),
                }
            }
            None => self
                .console
                .warning("No default route found; network may be unreachable"),
        }

        RestorationOutcome {
            default_route_restored: connectivity.default_route.is_some(),
            default_route: connectivity.default_route.as_ref().map(|r| r.line.clone()),
            ip_address: connectivity.address.clone(),
            escalated,
        }
    }
}
