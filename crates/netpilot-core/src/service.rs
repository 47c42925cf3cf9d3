// ── Service capability contract ──
//
// Services are implemented by technology providers. The Manager only ranks,
// adopts, and drives them through this surface, so every method takes
// `&self` and implementations keep their own state in cells.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::warn;

use crate::error::ManagerError;
use crate::model::{ConnectState, Technology};
use crate::profile::Profile;
use crate::store::Store;

/// A connectable network configuration.
pub trait Service {
    /// Identity, immutable for the lifetime of the service.
    fn unique_name(&self) -> &str;

    /// Monotonic registration order; the last ranking tie-break.
    fn serial_number(&self) -> u64;

    fn technology(&self) -> Technology;

    fn state(&self) -> ConnectState;

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    fn is_connecting(&self) -> bool {
        self.state().is_connecting()
    }

    fn is_failed(&self) -> bool {
        self.state().is_failed()
    }

    fn is_online(&self) -> bool {
        self.state().is_online()
    }

    fn is_portalled(&self) -> bool {
        self.state().is_portalled()
    }

    fn is_active(&self) -> bool {
        self.state().is_active()
    }

    fn connectable(&self) -> bool;

    fn auto_connect(&self) -> bool;

    fn has_ever_connected(&self) -> bool;

    fn priority(&self) -> i32;

    fn priority_within_technology(&self) -> i32 {
        0
    }

    /// Packed `(crypto << 2) | (key_rotation << 1) | endpoint_auth`.
    fn security_level(&self) -> u16 {
        0
    }

    /// Unique name of the service whose connection this one rides on.
    fn depends_on(&self) -> Option<String> {
        None
    }

    fn is_visible(&self) -> bool {
        true
    }

    fn explicitly_disconnected(&self) -> bool {
        false
    }

    fn clear_explicitly_disconnected(&self) {}

    fn guid(&self) -> Option<String> {
        None
    }

    fn profile(&self) -> Option<Rc<Profile>>;

    fn set_profile(&self, profile: Option<Rc<Profile>>);

    /// Group name under which this service persists itself.
    fn storage_identifier(&self) -> String;

    fn is_loadable_from(&self, store: &dyn Store) -> bool {
        store.contains_group(&self.storage_identifier())
    }

    /// Apply stored configuration. Returns `false` if nothing usable was found.
    fn load(&self, store: &dyn Store) -> bool;

    fn save(&self, store: &mut dyn Store) -> bool;

    /// Drop persisted configuration after losing its profile.
    ///
    /// Returns `true` when the service can leave the registry entirely.
    fn unload(&self) -> bool;

    fn configure(&self, _args: &ServiceArgs) -> Result<(), ManagerError> {
        Ok(())
    }

    fn connect(&self, reason: &str) -> Result<(), ManagerError>;

    fn disconnect(&self, reason: &str);

    /// Connect if this service's own auto-connect policy allows it.
    fn try_auto_connect(&self) {
        if self.connectable() && !self.is_active() && !self.explicitly_disconnected() {
            if let Err(e) = self.connect("auto-connect") {
                warn!(service = self.unique_name(), error = %e, "auto-connect failed");
            }
        }
    }

    fn enable_and_retain_auto_connect(&self) {}

    fn on_after_resume(&self) {}
}

impl fmt::Debug for dyn Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.unique_name())
            .field("technology", &self.technology())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Configuration arguments ──────────────────────────────────────────

/// Property bag passed to `get_service` / `configure_service`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceArgs {
    properties: BTreeMap<String, Value>,
}

impl ServiceArgs {
    pub const TYPE: &'static str = "Type";
    pub const GUID: &'static str = "GUID";
    pub const PROFILE: &'static str = "Profile";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties.iter()
    }

    /// The `Type` property as a technology.
    pub fn technology(&self) -> Result<Technology, ManagerError> {
        let name = self
            .get_str(Self::TYPE)
            .ok_or_else(|| ManagerError::invalid_arguments("must specify service type"))?;
        name.parse::<Technology>()
            .ok()
            .filter(|t| *t != Technology::Unknown)
            .ok_or_else(|| {
                ManagerError::not_supported(format!("service type '{name}' is not supported"))
            })
    }
}
