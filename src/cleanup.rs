//! Optional removal of AP packages and service accounts.
//!
//! Both run only after the operator agreed to them, and after the network
//! itself has been restored.

use crate::config::Settings;
use crate::console::Console;
use crate::prompt::Decisions;
use crate::restore::{attempt, Step, StepOutcome, StepRecord, Tally};
use crate::system::CommandRunner;

pub async fn purge_packages<R: CommandRunner + ?Sized>(
    runner: &R,
    console: &mut Console,
    packages: &[String],
    approved: bool,
) -> StepOutcome {
    if packages.is_empty() {
        return StepOutcome::Skipped {
            reason: "no packages configured".to_string(),
        };
    }
    if !approved {
        return StepOutcome::Skipped {
            reason: "declined".to_string(),
        };
    }

    console.step(Step::PurgePackages.label());
    console.info(format!("Purging {}", packages.join(", ")));

    let mut args = vec!["remove", "--purge", "-y"];
    args.extend(packages.iter().map(String::as_str));

    let mut tally = Tally::default();
    tally.note(attempt(runner, console, "apt-get", &args).await);
    tally.note(attempt(runner, console, "apt-get", &["autoremove", "-y"]).await);
    tally.outcome()
}

pub async fn remove_accounts<R: CommandRunner + ?Sized>(
    runner: &R,
    console: &mut Console,
    accounts: &[String],
    approved: bool,
) -> StepOutcome {
    if accounts.is_empty() {
        return StepOutcome::Skipped {
            reason: "no accounts configured".to_string(),
        };
    }
    if !approved {
        return StepOutcome::Skipped {
            reason: "declined".to_string(),
        };
    }

    console.step(Step::RemoveAccounts.label());
    let mut tally = Tally::default();
    for account in accounts {
        console.info(format!("Removing account {}", account));
        tally.note(attempt(runner, console, "userdel", &["-r", account]).await);
    }
    tally.outcome()
}

/// Run whichever cleanup steps were approved.
pub async fn run<R: CommandRunner + ?Sized>(
    runner: &R,
    settings: &Settings,
    decisions: &Decisions,
    console: &mut Console,
) -> Vec<StepRecord> {
    let packages =
        purge_packages(runner, console, &settings.packages, decisions.remove_packages).await;
    let accounts =
        remove_accounts(runner, console, &settings.accounts, decisions.remove_accounts).await;

    vec![
        StepRecord {
            step: Step::PurgePackages,
            outcome: packages,
        },
        StepRecord {
            step: Step::RemoveAccounts,
            outcome: accounts,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::command::mock::MockRunner;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_purge_runs_remove_then_autoremove() {
        let runner = MockRunner::new();
        let mut console = Console::silent();

        let outcome =
            purge_packages(&runner, &mut console, &names(&["hostapd", "dnsmasq"]), true).await;

        assert_eq!(outcome, StepOutcome::Done);
        assert_eq!(
            runner.calls(),
            vec![
                "apt-get remove --purge -y hostapd dnsmasq".to_string(),
                "apt-get autoremove -y".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_declined_cleanup_runs_nothing() {
        let runner = MockRunner::new();
        let mut console = Console::silent();
        let settings = Settings {
            accounts: names(&["camera"]),
            ..Settings::default()
        };

        let records = run(&runner, &settings, &Decisions::default(), &mut console).await;

        assert!(runner.calls().is_empty());
        assert!(records
            .iter()
            .all(|r| matches!(r.outcome, StepOutcome::Skipped { .. })));
    }

    #[tokio::test]
    async fn test_account_removal_continues_after_failure() {
        let runner = MockRunner::with(|s| s.failing.push("userdel -r ghost".to_string()));
        let mut console = Console::silent();

        let outcome =
            remove_accounts(&runner, &mut console, &names(&["ghost", "camera"]), true).await;

        assert_eq!(
            outcome,
            StepOutcome::Partial {
                failed: 1,
                attempted: 2
            }
        );
        assert!(runner.called("userdel -r camera"));
    }

    #[tokio::test]
    async fn test_empty_account_list_is_skipped() {
        let runner = MockRunner::new();
        let mut console = Console::silent();
        let outcome = remove_accounts(&runner, &mut console, &[], true).await;
        assert_eq!(
            outcome,
            StepOutcome::Skipped {
                reason: "no accounts configured".to_string()
            }
        );
    }
}
