//! Clap derive structures for `netpilotd`.

use std::path::PathBuf;

use clap::Parser;

/// netpilotd -- network connectivity manager daemon
#[derive(Debug, Parser)]
#[command(
    name = "netpilotd",
    version,
    about = "Network connectivity manager daemon",
    long_about = "Network connectivity manager daemon.\n\n\
        Loads the profile stack, ranks services, elects the default service,\n\
        and auto-connects until SIGINT or SIGTERM."
)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}
