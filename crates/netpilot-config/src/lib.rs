//! Configuration for the netpilot daemon.
//!
//! A TOML file layered under `NETPILOT_`-prefixed environment variables,
//! translated into [`netpilot_core::ManagerConfig`] plus the storage and
//! logging settings the daemon needs to wire everything up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use netpilot_core::{
    DEFAULT_PROFILE_NAME, DEFAULT_TECHNOLOGY_ORDER, DEFAULT_TERMINATION_TIMEOUT, ManagerConfig,
    ProfileIdentifier, Technology,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: &str, reason: impl ToString) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[manager]`: ranking and connection policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ManagerSection {
    /// Comma-separated, most preferred first.
    #[serde(default = "default_technology_order")]
    pub technology_order: String,

    /// Comma-separated technologies that may never be enabled.
    #[serde(default)]
    pub prohibited_technologies: String,

    /// Comma-separated technologies skipped by auto-connect.
    #[serde(default)]
    pub no_auto_connect_technologies: String,

    /// Upper bound for termination and suspend actions.
    #[serde(default = "default_termination_timeout_ms")]
    pub termination_timeout_ms: u64,

    #[serde(default = "default_profile")]
    pub default_profile: String,

    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            technology_order: default_technology_order(),
            prohibited_technologies: String::new(),
            no_auto_connect_technologies: String::new(),
            termination_timeout_ms: default_termination_timeout_ms(),
            default_profile: default_profile(),
            auto_connect: true,
        }
    }
}

fn default_technology_order() -> String {
    DEFAULT_TECHNOLOGY_ORDER.into()
}
fn default_termination_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_TERMINATION_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}
fn default_profile() -> String {
    DEFAULT_PROFILE_NAME.into()
}
fn default_true() -> bool {
    true
}

/// `[storage]`: where profiles live on disk.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageSection {
    /// Directory holding global profiles.
    #[serde(default = "default_global_dir")]
    pub global_dir: PathBuf,

    /// Directory holding one subdirectory per user.
    #[serde(default = "default_user_dir")]
    pub user_dir: PathBuf,

    /// File recording which user profiles are loaded.
    #[serde(default = "default_user_profile_list")]
    pub user_profile_list: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            global_dir: default_global_dir(),
            user_dir: default_user_dir(),
            user_profile_list: default_user_profile_list(),
        }
    }
}

fn data_root() -> PathBuf {
    ProjectDirs::from("org", "netpilot", "netpilot").map_or_else(
        || PathBuf::from("/var/lib/netpilot"),
        |dirs| dirs.data_local_dir().to_path_buf(),
    )
}
fn default_global_dir() -> PathBuf {
    data_root().join("profiles")
}
fn default_user_dir() -> PathBuf {
    data_root().join("users")
}
fn default_user_profile_list() -> PathBuf {
    data_root().join("loaded_profiles")
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingSection {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "warn".into()
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Validate the `[manager]` section and build the core configuration.
    pub fn to_manager_config(&self) -> Result<ManagerConfig, ConfigError> {
        let section = &self.manager;
        let technology_order = Technology::parse_list(&section.technology_order)
            .map_err(|e| ConfigError::validation("manager.technology_order", e))?;
        let prohibited_technologies = Technology::parse_list(&section.prohibited_technologies)
            .map_err(|e| ConfigError::validation("manager.prohibited_technologies", e))?;
        let no_auto_connect_technologies =
            Technology::parse_list(&section.no_auto_connect_technologies)
                .map_err(|e| ConfigError::validation("manager.no_auto_connect_technologies", e))?;

        if section.termination_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "manager.termination_timeout_ms",
                "must be greater than zero",
            ));
        }

        let profile = ProfileIdentifier::parse(&section.default_profile)
            .map_err(|e| ConfigError::validation("manager.default_profile", e))?;
        if profile.is_user() {
            return Err(ConfigError::validation(
                "manager.default_profile",
                "must name a global profile",
            ));
        }

        Ok(ManagerConfig {
            technology_order,
            prohibited_technologies,
            no_auto_connect_technologies,
            termination_timeout: Duration::from_millis(section.termination_timeout_ms),
            default_profile: section.default_profile.clone(),
            auto_connect: section.auto_connect,
        })
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "netpilot", "netpilot").map_or_else(
        || PathBuf::from("/etc/netpilot/config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the Config from the canonical path and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` and the environment. A missing file
/// yields the defaults.
///
/// Nested keys use a double underscore, e.g.
/// `NETPILOT_MANAGER__AUTO_CONNECT=false`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NETPILOT_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, cfg.to_toml()?)?;
    Ok(())
}
