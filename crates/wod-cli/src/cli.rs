//! Command line
//!
//! Exactly one positional argument: `update` or `destroy`. Anything else,
//! including `--help` and `--version`, is a usage error.

use clap::{Parser, ValueEnum};

/// Bring an ephemeral WireGuard exit up, or tear it down
#[derive(Parser, Debug)]
#[command(
    name = "wireguard-on-demand",
    about,
    long_about = None,
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Cli {
    /// What to do with the deployment
    #[arg(value_enum)]
    pub intent: Intent,
}

/// Requested lifecycle transition
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Create or update the tunnel host and print the client config
    Update,
    /// Remove every resource of the deployment
    Destroy,
}

/// Arguments did not name a valid intent
#[derive(Debug, thiserror::Error)]
#[error("unexpected arguments: {args:?}")]
pub struct UsageError {
    pub args: Vec<String>,
}

/// Parse the full argument vector (program name first)
pub fn parse(args: &[String]) -> Result<Intent, UsageError> {
    let usage = || UsageError {
        args: args.iter().skip(1).cloned().collect(),
    };

    // clap strips `--`, so the count is checked on the raw vector
    if args.len() != 2 {
        return Err(usage());
    }
    Cli::try_parse_from(args)
        .map(|cli| cli.intent)
        .map_err(|_| usage())
}
