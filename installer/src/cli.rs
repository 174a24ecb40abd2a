//! CLI argument definitions for the chronicle installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use camino::Utf8PathBuf;
use clap::Parser;

/// Install the chronicle daemon package.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "chronicle-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Install the chronicle daemon package.\n\n",
    "Fetches the signed package for this host's region and architecture from ",
    "the chronicle control plane, verifies it against the pinned signing key, ",
    "repairs a stale package-database lock if one is found, and installs it ",
    "with yum. Reinstalling the same version is a no-op; an older pinned ",
    "version is installed as a downgrade.\n\n",
    "Failures are logged to stdout and syslog. By default the process still ",
    "exits 0 so that instance bootstrap is never blocked; pass ",
    "--error-exit-code to change that.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install the pinned version:\n",
    "    $ chronicle-installer\n\n",
    "  Install the newest build and report failures:\n",
    "    $ chronicle-installer --latest --error-exit-code 1\n\n",
    "  Use a settings file:\n",
    "    $ chronicle-installer --config /etc/chronicle-installer.toml",
))]
pub struct Cli {
    /// Install the latest build instead of the pinned version.
    #[arg(long)]
    pub latest: bool,

    /// Exit code to return on error.
    #[arg(
        long,
        value_name = "CODE",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    pub error_exit_code: i32,

    /// TOML file overriding paths, retry policy, and the pinned version.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Log debug detail to stdout.
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
