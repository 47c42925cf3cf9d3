//! Daemon error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use netpilot_config::ConfigError;
use netpilot_core::ManagerError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 3;
    pub const STARTUP: i32 = 4;
}

#[derive(Debug, Error, Diagnostic)]
pub enum DaemonError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Could not load configuration from {path}")]
    #[diagnostic(
        code(netpilot::config_load),
        help("Check the TOML syntax in {path}, or remove the file to run with defaults.")
    )]
    ConfigLoad {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("Invalid configuration")]
    #[diagnostic(
        code(netpilot::config_invalid),
        help(
            "Technology lists are comma-separated names, e.g. \"vpn,ethernet,wifi\".\n\
             Run: netpilotd --print-config to see the effective configuration"
        )
    )]
    ConfigInvalid {
        #[source]
        source: ConfigError,
    },

    // ── Start-up ─────────────────────────────────────────────────────

    #[error("Connectivity manager failed to start")]
    #[diagnostic(
        code(netpilot::startup),
        help("Check that the profile directory is writable: {global_dir}")
    )]
    Startup {
        global_dir: String,
        #[source]
        source: ManagerError,
    },

    #[error("Failed to build the async runtime")]
    #[diagnostic(code(netpilot::runtime))]
    Runtime(#[source] std::io::Error),
}

impl DaemonError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } => exit_code::CONFIG,
            Self::Startup { .. } => exit_code::STARTUP,
            Self::Runtime(_) => exit_code::GENERAL,
        }
    }
}
