//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::logging::Verbosity;

/// netrestore - put a board back on its wired network after AP mode
///
/// Tears down access-point services and NAT, then drives the primary wired
/// interface back to a DHCP client configuration for whichever network stack
/// the host uses.
#[derive(Debug, Parser)]
#[command(name = "netrestore")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a settings file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress diagnostics except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Answer yes to every confirmation prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Resolve configuration files under this directory instead of /
    #[arg(long, global = true, hide = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Tear down AP mode and restore DHCP networking (default)
    Restore,
    /// Show AP services, interfaces and the default route
    Status(OutputArgs),
    /// Print the detected network stack
    Detect(OutputArgs),
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }

    /// The subcommand, with `restore` when none was given.
    pub fn action(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Restore)
    }
}
