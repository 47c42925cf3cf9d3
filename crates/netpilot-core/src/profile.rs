// ── Profiles ──
//
// One layer of service and device configuration. Persisted profiles sit on
// the Manager's stack; the ephemeral profile is the never-persisted
// fallback home for services no stacked profile accepts.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::device::Device;
use crate::error::ManagerError;
use crate::model::ProfileIdentifier;
use crate::service::Service;
use crate::store::{MemoryStore, Store};

/// Identifier used for the ephemeral profile in logs.
pub const EPHEMERAL_PROFILE_NAME: &str = "(ephemeral)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    /// System-wide profile, may also persist device configuration.
    Global,
    /// Per-user profile, pushed on login.
    User,
    /// Never persisted; accepts every service.
    Ephemeral,
}

pub struct Profile {
    identifier: ProfileIdentifier,
    kind: ProfileKind,
    store: RefCell<Box<dyn Store>>,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("identifier", &self.friendly_name())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn same_profile(service: &dyn Service, profile: &Rc<Profile>) -> bool {
    service
        .profile()
        .is_some_and(|current| Rc::ptr_eq(&current, profile))
}

impl Profile {
    /// A stacked profile backed by `store`.
    pub fn new(identifier: ProfileIdentifier, store: Box<dyn Store>) -> Rc<Self> {
        let kind = if identifier.is_user() {
            ProfileKind::User
        } else {
            ProfileKind::Global
        };
        Rc::new(Self {
            identifier,
            kind,
            store: RefCell::new(store),
        })
    }

    pub fn ephemeral() -> Rc<Self> {
        Rc::new(Self {
            identifier: ProfileIdentifier::global(EPHEMERAL_PROFILE_NAME),
            kind: ProfileKind::Ephemeral,
            store: RefCell::new(Box::new(MemoryStore::new())),
        })
    }

    pub fn identifier(&self) -> &ProfileIdentifier {
        &self.identifier
    }

    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    pub fn is_ephemeral(&self) -> bool {
        self.kind == ProfileKind::Ephemeral
    }

    pub fn is_user(&self) -> bool {
        self.kind == ProfileKind::User
    }

    /// `name` or `~user/name`.
    pub fn friendly_name(&self) -> String {
        if self.is_ephemeral() {
            EPHEMERAL_PROFILE_NAME.to_owned()
        } else {
            self.identifier.to_string()
        }
    }

    /// Whether the store holds an entry this service can load.
    pub fn contains_service(&self, service: &dyn Service) -> bool {
        !self.is_ephemeral() && service.is_loadable_from(self.store.borrow().as_ref())
    }

    /// Load the stored entry into `service` and adopt it.
    ///
    /// Returns `false` (without touching the service) when the profile has
    /// no entry for it.
    pub fn configure_service(self: &Rc<Self>, service: &Rc<dyn Service>) -> bool {
        if !self.contains_service(service.as_ref()) {
            return false;
        }
        service.set_profile(Some(Rc::clone(self)));
        let loaded = service.load(self.store.borrow().as_ref());
        debug!(
            profile = %self.friendly_name(),
            service = service.unique_name(),
            loaded,
            "configured service from profile"
        );
        loaded
    }

    /// Load stored configuration into `service` without re-homing it.
    pub fn load_service(&self, service: &dyn Service) -> bool {
        self.contains_service(service) && service.load(self.store.borrow().as_ref())
    }

    /// Re-home `service` here and persist it. `false` if already homed here
    /// or if it could not be saved.
    pub fn adopt_service(self: &Rc<Self>, service: &Rc<dyn Service>) -> bool {
        if same_profile(service.as_ref(), self) {
            return false;
        }
        service.set_profile(Some(Rc::clone(self)));
        if self.is_ephemeral() {
            return true;
        }
        let mut store = self.store.borrow_mut();
        let saved = service.save(store.as_mut());
        match store.flush() {
            Ok(()) => saved,
            Err(e) => {
                warn!(profile = %self.friendly_name(), error = %e, "flush after adopt failed");
                false
            }
        }
    }

    /// Release `service` if it is homed here and delete its stored entry.
    pub fn abandon_service(self: &Rc<Self>, service: &Rc<dyn Service>) -> bool {
        if same_profile(service.as_ref(), self) {
            service.set_profile(None);
        }
        if self.is_ephemeral() {
            return true;
        }
        let mut store = self.store.borrow_mut();
        store.delete_group(&service.storage_identifier());
        match store.flush() {
            Ok(()) => true,
            Err(e) => {
                warn!(profile = %self.friendly_name(), error = %e, "flush after abandon failed");
                false
            }
        }
    }

    /// Persist the current state of `service`.
    pub fn update_service(&self, service: &dyn Service) -> bool {
        if self.is_ephemeral() {
            return false;
        }
        let mut store = self.store.borrow_mut();
        service.save(store.as_mut()) && store.flush().is_ok()
    }

    /// Offer stored device configuration. Several profiles may contribute.
    pub fn configure_device(&self, device: &dyn Device) -> bool {
        device.load(self.store.borrow().as_ref())
    }

    /// Persist device configuration. Only global profiles keep device state.
    pub fn update_device(&self, device: &dyn Device) -> bool {
        if self.kind != ProfileKind::Global {
            return false;
        }
        let mut store = self.store.borrow_mut();
        device.save(store.as_mut()) && store.flush().is_ok()
    }

    /// Names of the stored entries (one per service or device).
    pub fn entries(&self) -> Vec<String> {
        self.store.borrow().groups()
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.store.borrow().contains_group(name)
    }

    /// Remove a stored entry. NotFound if there is none.
    pub fn delete_entry(&self, name: &str) -> Result<(), ManagerError> {
        let mut store = self.store.borrow_mut();
        if !store.delete_group(name) {
            return Err(ManagerError::not_found(format!(
                "entry '{name}' not found in profile {}",
                self.friendly_name()
            )));
        }
        store.flush()?;
        Ok(())
    }

    /// Flush pending changes to the backing store.
    pub fn save(&self) -> Result<(), ManagerError> {
        if self.is_ephemeral() {
            return Ok(());
        }
        self.store.borrow_mut().flush()?;
        Ok(())
    }

    /// Read-only access to the backing store.
    pub fn with_store<R>(&self, f: impl FnOnce(&dyn Store) -> R) -> R {
        f(self.store.borrow().as_ref())
    }
}
