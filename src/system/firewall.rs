//! iptables teardown.

use std::path::{Path, PathBuf};

use crate::error::Result;

use super::backup::write_with_backup;
use super::command::{CommandOutput, CommandRunner, Invocation};

/// Tables flushed on reset. `security` only exists on kernels built with it.
pub const TABLES: &[&str] = &["filter", "nat", "mangle", "raw", "security"];
const BUILTIN_FILTER_CHAINS: &[&str] = &["INPUT", "FORWARD", "OUTPUT"];

/// Flush every table, delete custom chains, reset filter policies to ACCEPT.
///
/// Safe to run against an empty ruleset.
pub fn reset_plan() -> Vec<Invocation> {
    let mut plan = Vec::new();
    for &table in TABLES {
        plan.push(Invocation::new("iptables", &["-t", table, "-F"]));
        plan.push(Invocation::new("iptables", &["-t", table, "-X"]));
    }
    for &chain in BUILTIN_FILTER_CHAINS {
        plan.push(Invocation::new("iptables", &["-P", chain, "ACCEPT"]));
    }
    plan
}

/// Whether an iptables failure means the table isn't provided by this kernel.
pub fn table_missing(output: &CommandOutput) -> bool {
    output.stderr.contains("Table does not exist")
}

/// Count `-N` (custom chain) lines in `iptables -S` output.
pub fn count_custom_chains(output: &str) -> usize {
    output.lines().filter(|l| l.starts_with("-N ")).count()
}

/// Custom chains still present across all tables.
pub async fn custom_chains<R: CommandRunner + ?Sized>(runner: &R) -> usize {
    let mut total = 0;
    for &table in TABLES {
        if let Ok(output) = runner.run("iptables", &["-t", table, "-S"]).await {
            if output.success {
                total += count_custom_chains(&output.stdout);
            }
        }
    }
    total
}

/// Persist the current ruleset to `rules_file` when its directory exists.
///
/// Returns the backup of the previous file, if there was one.
pub async fn save<R: CommandRunner + ?Sized>(
    runner: &R,
    rules_file: &Path,
) -> Result<Option<PathBuf>> {
    if !rules_file.parent().is_some_and(Path::is_dir) {
        return Ok(None);
    }
    let output = runner.run_checked("iptables-save", &[]).await?;
    write_with_backup(rules_file, &output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::command::mock::MockRunner;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_reset_plan_flushes_before_deleting_chains() {
        let lines: Vec<String> = reset_plan().iter().map(Invocation::line).collect();
        let flush = lines.iter().position(|l| l == "iptables -t nat -F").unwrap();
        let delete = lines.iter().position(|l| l == "iptables -t nat -X").unwrap();
        assert!(flush < delete);
        assert!(lines.contains(&"iptables -P FORWARD ACCEPT".to_string()));
        assert_eq!(lines.len(), TABLES.len() * 2 + 3);
    }

    #[test]
    fn test_table_missing_matches_iptables_message() {
        let absent = CommandOutput::failure(
            3,
            "iptables v1.8.9 (legacy): can't initialize iptables table `security': Table does not exist (do you need to insmod?)",
        );
        assert!(table_missing(&absent));
        assert!(!table_missing(&CommandOutput::failure(4, "iptables: Permission denied")));
        assert!(reset_plan().iter().any(|i| i.line() == "iptables -t security -F"));
    }

    #[test]
    fn test_count_custom_chains() {
        let output = "-P INPUT ACCEPT\n-P FORWARD ACCEPT\n-N AP_FWD\n-N DOCKER\n-A FORWARD -j AP_FWD\n";
        assert_eq!(count_custom_chains(output), 2);
        assert_eq!(count_custom_chains(""), 0);
    }

    #[tokio::test]
    async fn test_custom_chains_across_tables() {
        let runner = MockRunner::with(|s| {
            s.table("filter").chains.push("AP_FWD".to_string());
            s.table("nat").chains.push("AP_NAT".to_string());
        });
        assert_eq!(custom_chains(&runner).await, 2);
    }

    #[tokio::test]
    async fn test_save_skips_without_directory() {
        let dir = TempDir::new().unwrap();
        let runner = MockRunner::new();
        let rules = dir.path().join("etc/iptables/rules.v4");

        assert_eq!(save(&runner, &rules).await.unwrap(), None);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_save_backs_up_previous_rules() {
        let dir = TempDir::new().unwrap();
        let rules = dir.path().join("rules.v4");
        fs::write(&rules, "*nat\n-A POSTROUTING -o eth0 -j MASQUERADE\nCOMMIT\n").unwrap();
        let runner = MockRunner::new();

        let backup = save(&runner, &rules).await.unwrap().unwrap();
        assert!(fs::read_to_string(backup).unwrap().contains("MASQUERADE"));
        assert!(!fs::read_to_string(&rules).unwrap().contains("MASQUERADE"));
    }
}
