//! Top-level restore flow: confirmation gate, pipeline, cleanup, summary.

use crate::cleanup;
use crate::config::Settings;
use crate::console::Console;
use crate::prompt::Decisions;
use crate::restore::{RestorationReport, Restorer, StepOutcome};
use crate::system::CommandRunner;

/// Run the restoration if `decisions.proceed`; otherwise change nothing.
pub async fn restore<R: CommandRunner + ?Sized>(
    runner: &R,
    settings: &Settings,
    decisions: Decisions,
    console: &mut Console,
) -> Option<RestorationReport> {
    if !decisions.proceed {
        console.info("Cancelled; no changes made");
        return None;
    }

    tracing::info!(root = %settings.root.display(), "starting restoration");
    let mut report = Restorer::new(runner, settings, console).run().await;
    let cleanup = cleanup::run(runner, settings, &decisions, console).await;
    report.steps.extend(cleanup);

    summarize(&report, console);
    Some(report)
}

fn summarize(report: &RestorationReport, console: &mut Console) {
    console.step("Summary");
    for record in &report.steps {
        let label = record.step.label();
        match &record.outcome {
            StepOutcome::Done => console.success(label),
            StepOutcome::Partial { failed, attempted } => console.warning(format!(
                "{}: {} of {} commands failed",
                label, failed, attempted
            )),
            StepOutcome::Skipped { reason } => {
                console.detail(format!("{}: skipped ({})", label, reason))
            }
            StepOutcome::Failed { error } => console.error(format!("{}: {}", label, error)),
        }
    }

    if report.outcome.default_route_restored {
        console.success("Network restored");
    } else {
        console.warning("Restoration finished without a default route; see the commands above");
    }
}
