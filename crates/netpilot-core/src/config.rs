// ── Runtime manager configuration ──
//
// Built by the daemon (or tests) and handed to `Manager::new`. The core
// never reads configuration files itself.

use std::time::Duration;

use crate::model::Technology;

/// How long suspend and termination actions may run before they are
/// treated as completed with a timeout.
pub const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_millis(19_500);

/// Name of the global profile that always sits at the bottom of the stack.
pub const DEFAULT_PROFILE_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Technology preference, most preferred first.
    pub technology_order: Vec<Technology>,
    /// Technologies that may never be enabled.
    pub prohibited_technologies: Vec<Technology>,
    /// Technologies skipped by the automatic connect pass.
    pub no_auto_connect_technologies: Vec<Technology>,
    pub termination_timeout: Duration,
    pub default_profile: String,
    /// Master switch for automatic connections.
    pub auto_connect: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            technology_order: Technology::default_order(),
            prohibited_technologies: Vec::new(),
            no_auto_connect_technologies: Vec::new(),
            termination_timeout: DEFAULT_TERMINATION_TIMEOUT,
            default_profile: DEFAULT_PROFILE_NAME.to_owned(),
            auto_connect: true,
        }
    }
}
