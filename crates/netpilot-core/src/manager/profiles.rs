// ── Profile stack ──
//
// Push, pop, create, and remove profiles, and decide which profile each
// service belongs to. The stack is bottom-first: the last element is the
// active profile and wins every adoption tie.

use std::rc::Rc;

use tracing::{debug, error, info, warn};

use super::{Manager, ManagerEvent};
use crate::error::ManagerError;
use crate::model::ProfileIdentifier;
use crate::profile::Profile;
use crate::service::Service;
use crate::store::{MemoryStore, Store, StoreError};

fn open_error(identifier: &ProfileIdentifier, error: StoreError) -> ManagerError {
    match error {
        StoreError::UnknownProfile { .. } => {
            ManagerError::not_found(format!("profile {identifier} does not exist"))
        }
        other => ManagerError::Internal(format!("could not open profile {identifier}: {other}")),
    }
}

impl Manager {
    // ── Queries ──────────────────────────────────────────────────

    pub(super) fn profiles_snapshot(&self) -> Vec<Rc<Profile>> {
        self.inner.profiles.borrow().clone()
    }

    /// Friendly names of the stacked profiles, bottom first.
    pub fn profiles(&self) -> Vec<String> {
        self.inner
            .profiles
            .borrow()
            .iter()
            .map(|p| p.friendly_name())
            .collect()
    }

    /// The top of the stack.
    pub fn active_profile(&self) -> Option<Rc<Profile>> {
        self.inner.profiles.borrow().last().cloned()
    }

    pub fn ephemeral_profile(&self) -> Rc<Profile> {
        Rc::clone(&self.inner.ephemeral_profile)
    }

    /// Find a stacked profile by friendly name (`name` or `~user/name`).
    pub fn lookup_profile(&self, name: &str) -> Option<Rc<Profile>> {
        self.inner
            .profiles
            .borrow()
            .iter()
            .find(|p| p.friendly_name() == name)
            .cloned()
    }

    fn has_profile(&self, identifier: &ProfileIdentifier) -> bool {
        self.inner
            .profiles
            .borrow()
            .iter()
            .any(|p| p.identifier() == identifier)
    }

    /// Whether `service` has no persisted home.
    pub fn is_service_ephemeral(&self, service: &dyn Service) -> bool {
        service.profile().is_none_or(|p| p.is_ephemeral())
    }

    /// Whether `a` sits below `b` on the stack. Profiles that are not
    /// stacked count as lowest.
    pub fn is_profile_before(&self, a: &Rc<Profile>, b: &Rc<Profile>) -> bool {
        let profiles = self.inner.profiles.borrow();
        let position = |target: &Rc<Profile>| profiles.iter().position(|p| Rc::ptr_eq(p, target));
        match (position(a), position(b)) {
            (Some(a), Some(b)) => a < b,
            (None, Some(_)) => true,
            _ => false,
        }
    }

    // ── Start-up ─────────────────────────────────────────────────

    /// Make sure the default profile has usable storage, then rebuild the
    /// stack from it and the persisted user-profile list.
    pub(super) fn initialize_profiles(&self) -> Result<(), ManagerError> {
        if !self.inner.profiles.borrow().is_empty() {
            debug!("profile stack already initialized");
            return Ok(());
        }
        let default_id = ProfileIdentifier::parse(&self.inner.default_profile)?;
        let storage = &self.inner.storage;

        let mut store = if storage.exists(&default_id) {
            match storage.open(&default_id) {
                Ok(store) => store,
                Err(e) => {
                    warn!(profile = %default_id, error = %e, "default profile unreadable, recreating");
                    if let Err(e) = storage.remove(&default_id) {
                        debug!(error = %e, "could not remove unreadable default profile");
                    }
                    storage.create(&default_id)?
                }
            }
        } else {
            info!(profile = %default_id, "creating default profile");
            storage.create(&default_id)?
        };
        store.flush()?;

        // Must be read before the first push rewrites the list.
        let user_profiles = storage.load_user_profile_list().unwrap_or_else(|e| {
            warn!(error = %e, "could not read user profile list");
            Vec::new()
        });

        self.push_profile_internal(default_id)?;
        for identifier in user_profiles {
            if let Err(e) = self.push_profile_internal(identifier.clone()) {
                error!(profile = %identifier, error = %e, "failed to restore user profile");
            }
        }
        Ok(())
    }

    // ── Stack operations ─────────────────────────────────────────

    /// Create storage for a profile that is not on the stack. Returns its
    /// friendly name.
    pub fn create_profile(&self, name: &str) -> Result<String, ManagerError> {
        let identifier = ProfileIdentifier::parse(name)?;
        if self.has_profile(&identifier) {
            return Err(ManagerError::already_exists(format!(
                "profile {name} is already on the stack"
            )));
        }
        let mut store = self
            .inner
            .storage
            .create(&identifier)
            .map_err(|e| match e {
                StoreError::ProfileExists { .. } => {
                    ManagerError::already_exists(format!("profile {name} already exists"))
                }
                other => ManagerError::from(other),
            })?;
        store.flush().map_err(|e| {
            ManagerError::Internal(format!("profile {name} could not be saved: {e}"))
        })?;
        info!(profile = %identifier, "created profile");
        Ok(identifier.to_string())
    }

    /// Delete the storage of a profile that is not on the stack.
    pub fn remove_profile(&self, name: &str) -> Result<(), ManagerError> {
        let identifier = ProfileIdentifier::parse(name)?;
        if self.has_profile(&identifier) {
            return Err(ManagerError::invalid_arguments(format!(
                "cannot remove profile {name} since it is on the stack"
            )));
        }
        self.inner
            .storage
            .remove(&identifier)
            .map_err(|e| open_error(&identifier, e))?;
        info!(profile = %identifier, "removed profile");
        Ok(())
    }

    pub fn push_profile(&self, name: &str) -> Result<String, ManagerError> {
        let identifier = ProfileIdentifier::parse(name)?;
        self.push_profile_internal(identifier)
    }

    /// Push a user profile, recording the session's user hash with it.
    pub fn insert_user_profile(&self, name: &str, user_hash: &str) -> Result<String, ManagerError> {
        let mut identifier = ProfileIdentifier::parse(name)?;
        if !identifier.is_user() {
            return Err(ManagerError::invalid_arguments(format!(
                "invalid user profile name {name}"
            )));
        }
        user_hash.clone_into(&mut identifier.user_hash);
        self.push_profile_internal(identifier)
    }

    fn push_profile_internal(&self, identifier: ProfileIdentifier) -> Result<String, ManagerError> {
        if self.has_profile(&identifier) {
            return Err(ManagerError::already_exists(format!(
                "profile {identifier} is already on the stack"
            )));
        }

        let store: Box<dyn Store> = if identifier.is_user() {
            self.inner
                .storage
                .open(&identifier)
                .map_err(|e| open_error(&identifier, e))?
        } else {
            let covers_user = self
                .inner
                .profiles
                .borrow()
                .last()
                .is_some_and(|top| top.is_user());
            if covers_user {
                return Err(ManagerError::invalid_arguments(format!(
                    "cannot push global profile {identifier} on top of a user profile"
                )));
            }
            match self.inner.storage.open(&identifier) {
                Ok(store) => store,
                Err(e) => {
                    // Stay useful even when the disk is unreadable or full.
                    error!(profile = %identifier, error = %e, "failed to open global profile, using a stub store");
                    Box::new(MemoryStore::new())
                }
            }
        };

        let profile = Profile::new(identifier, store);
        self.inner.profiles.borrow_mut().push(Rc::clone(&profile));
        info!(profile = %profile.friendly_name(), "pushed profile");

        for service in self.services() {
            service.clear_explicitly_disconnected();
            if profile.configure_service(&service) {
                info!(service = service.unique_name(), profile = %profile.friendly_name(), "re-configured service");
            }
        }
        for device in self.devices() {
            profile.configure_device(device.as_ref());
        }
        for provider in self.providers_snapshot() {
            provider.create_services_from_profile(&profile);
        }

        self.sort_services();
        self.on_profiles_changed();
        Ok(profile.friendly_name())
    }

    /// Pop the active profile, which must be `name`.
    pub fn pop_profile(&self, name: &str) -> Result<(), ManagerError> {
        let Some(active) = self.active_profile() else {
            return Err(ManagerError::not_found("profile stack is empty"));
        };
        let identifier = ProfileIdentifier::parse(name)?;
        if active.identifier() != &identifier {
            return Err(ManagerError::not_supported(format!(
                "{name} is not the active profile"
            )));
        }
        self.pop_profile_internal();
        Ok(())
    }

    /// Pop whatever profile is on top.
    pub fn pop_any_profile(&self) -> Result<(), ManagerError> {
        if self.inner.profiles.borrow().is_empty() {
            return Err(ManagerError::not_found("profile stack is empty"));
        }
        self.pop_profile_internal();
        Ok(())
    }

    /// Pop user profiles until a global profile is on top.
    pub fn pop_all_user_profiles(&self) {
        while self.active_profile().is_some_and(|p| p.is_user()) {
            self.pop_profile_internal();
        }
    }

    fn pop_profile_internal(&self) {
        let Some(popped) = self.inner.profiles.borrow_mut().pop() else {
            return;
        };
        info!(profile = %popped.friendly_name(), "popped profile");

        for service in self.services() {
            service.clear_explicitly_disconnected();
            if self.is_service_ephemeral(service.as_ref()) {
                continue;
            }
            let homed_here = service.profile().is_some_and(|p| Rc::ptr_eq(&p, &popped));
            if !homed_here || self.match_profile_with_service(&service) {
                continue;
            }
            if !self.unload_service(&service) {
                warn!(service = service.unique_name(), "service could not unload, leaving it orphaned");
            }
        }

        self.sort_services();
        self.on_profiles_changed();
    }

    /// Offer `service` to the stack top-down. Returns `false` (and homes
    /// it in the ephemeral profile) when no stacked profile accepts it.
    pub(super) fn match_profile_with_service(&self, service: &Rc<dyn Service>) -> bool {
        let stack = self.profiles_snapshot();
        if stack.iter().rev().any(|p| p.configure_service(service)) {
            return true;
        }
        self.inner.ephemeral_profile.adopt_service(service);
        false
    }

    fn on_profiles_changed(&self) {
        let user_profiles: Vec<ProfileIdentifier> = self
            .inner
            .profiles
            .borrow()
            .iter()
            .filter(|p| p.is_user())
            .map(|p| p.identifier().clone())
            .collect();
        if let Err(e) = self.inner.storage.save_user_profile_list(&user_profiles) {
            warn!(error = %e, "failed to save user profile list");
        }
        self.emit(ManagerEvent::ProfilesChanged {
            profiles: self.profiles(),
        });
    }

    // ── Profile entries ──────────────────────────────────────────

    /// Re-home every service of `profile` stored under `entry`, after the
    /// entry has been deleted. Returns whether any service moved.
    pub fn handle_profile_entry_deletion(&self, profile: &Rc<Profile>, entry: &str) -> bool {
        let mut moved = false;
        for service in self.services() {
            let homed_here = service.profile().is_some_and(|p| Rc::ptr_eq(&p, profile));
            if !homed_here || service.storage_identifier() != entry {
                continue;
            }
            profile.abandon_service(&service);
            if !self.match_profile_with_service(&service) {
                self.unload_service(&service);
            }
            moved = true;
        }
        if moved {
            self.sort_services();
        }
        moved
    }

    /// Delete `entry` from the stacked profile `profile_name`, re-homing any
    /// service that was using it.
    pub fn delete_profile_entry(&self, profile_name: &str, entry: &str) -> Result<(), ManagerError> {
        let profile = self.lookup_profile(profile_name).ok_or_else(|| {
            ManagerError::not_found(format!("profile {profile_name} is not on the stack"))
        })?;
        if !profile.has_entry(entry) {
            return Err(ManagerError::not_found(format!(
                "entry {entry} not found in profile {profile_name}"
            )));
        }
        if !self.handle_profile_entry_deletion(&profile, entry) {
            profile.delete_entry(entry)?;
        }
        profile.save()
    }
}
