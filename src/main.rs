//! netrestore - restore wired DHCP networking after AP mode
//!
//! Stops access-point services, clears NAT and forwarding, resets the
//! interfaces and rewrites the host's persistent network configuration back
//! to a DHCP client, then verifies that a default route came back.

mod app;
mod cleanup;
mod cli;
mod config;
mod console;
mod error;
mod health;
mod logging;
mod profile;
mod prompt;
mod restore;
mod status;
mod system;

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Stylize;

use cli::{Cli, Command};
use config::Settings;
use console::{colors, symbols, Console};
use logging::init_logging;
use prompt::Decisions;
use status::StatusReport;
use system::{Detector, SystemRunner};

/// Exit status after SIGINT/SIGTERM.
const INTERRUPTED: i32 = 130;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity());

    let mut settings = Settings::load_from(cli.config.as_deref())
        .context("Failed to load settings")?;
    if let Some(root) = &cli.root {
        settings.root = root.clone();
    }
    tracing::debug!(?settings, "loaded settings");

    let runner = SystemRunner;

    match cli.action() {
        Command::Detect(args) => {
            let profile = Detector::new(&runner, &settings).detect().await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else {
                println!("{}", profile);
            }
        }
        Command::Status(args) => {
            let report = StatusReport::collect(&runner, &settings).await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print(&mut Console::new());
            }
        }
        Command::Restore => {
            if !is_root() {
                eprintln!("Error: This program must be run as root (sudo).");
                eprintln!("Usage: sudo netrestore");
                std::process::exit(1);
            }

            let decisions = if cli.yes {
                Decisions::all()
            } else {
                prompt::gather(&mut io::stdin().lock(), &mut io::stdout(), &settings)
            };

            let mut console = Console::new();
            tokio::select! {
                _ = app::restore(&runner, &settings, decisions, &mut console) => {}
                name = interrupted() => {
                    eprintln!(
                        "{} {}",
                        symbols::ERROR.with(colors::ERROR),
                        format!("Interrupted by {}; remaining steps were not run", name)
                            .with(colors::ERROR)
                    );
                    std::process::exit(INTERRUPTED);
                }
            }
        }
    }

    Ok(())
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Resolves with the signal name on SIGINT or SIGTERM.
///
/// A signal that cannot be watched is logged and never resolves.
async fn interrupted() -> &'static str {
    use std::future::pending;
    use tokio::signal::unix::{signal, SignalKind};

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot watch SIGINT");
            pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot watch SIGTERM");
                pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    }
}
