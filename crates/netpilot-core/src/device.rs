// ── Device capability contract ──
//
// Devices are discovered by a lower layer and handed to the Manager, which
// only registers them, feeds them profile configuration, and fans power
// and enable requests out to them.

use std::fmt;

use crate::error::ResultCallback;
use crate::model::Technology;
use crate::store::Store;

/// A managed network interface bound to one technology.
pub trait Device {
    fn link_name(&self) -> &str;

    fn technology(&self) -> Technology;

    fn enabled(&self) -> bool;

    /// Enabled state the user asked to keep across restarts.
    fn enabled_persistent(&self) -> bool {
        self.enabled()
    }

    fn is_connected(&self) -> bool {
        false
    }

    /// Enable or disable without persisting and without reporting back.
    fn set_enabled(&self, enable: bool);

    /// Enable or disable, reporting the outcome through `done` exactly once.
    fn set_enabled_checked(&self, enable: bool, persist: bool, done: ResultCallback);

    fn on_before_suspend(&self, done: ResultCallback) {
        done(Ok(()));
    }

    fn on_dark_resume(&self, done: ResultCallback) {
        done(Ok(()));
    }

    fn on_after_resume(&self) {}

    fn storage_identifier(&self) -> String {
        format!("device_{}", self.link_name())
    }

    fn load(&self, store: &dyn Store) -> bool;

    fn save(&self, store: &mut dyn Store) -> bool;
}

impl fmt::Debug for dyn Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("link", &self.link_name())
            .field("technology", &self.technology())
            .field("enabled", &self.enabled())
            .finish()
    }
}
