//! systemd unit queries via `systemctl`.
//!
//! State changes (stop, disable, restart) go through the pipeline's
//! best-effort runner so failures are reported and skipped.

use super::command::CommandRunner;

pub async fn is_active<R: CommandRunner + ?Sized>(runner: &R, unit: &str) -> bool {
    runner.succeeds("systemctl", &["is-active", "--quiet", unit]).await
}

pub async fn is_enabled<R: CommandRunner + ?Sized>(runner: &R, unit: &str) -> bool {
    runner.succeeds("systemctl", &["is-enabled", "--quiet", unit]).await
}

/// `systemctl is-active` state word (`active`, `inactive`, `failed`, ...).
pub async fn state<R: CommandRunner + ?Sized>(runner: &R, unit: &str) -> String {
    match runner.run("systemctl", &["is-active", unit]).await {
        Ok(output) if !output.stdout.trim().is_empty() => output.stdout.trim().to_string(),
        Ok(output) if output.success => "active".to_string(),
        Ok(_) => "inactive".to_string(),
        Err(_) => "unknown".to_string(),
    }
}
