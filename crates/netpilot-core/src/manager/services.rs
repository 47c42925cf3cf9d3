// ── Service registry ──
//
// Registration, provider-backed configuration, the coalesced sort, default
// service election, and both auto-connect passes.

use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::{debug, error, info, trace, warn};

use super::{Manager, ManagerEvent};
use crate::error::ManagerError;
use crate::model::{ConnectState, Technology};
use crate::profile::Profile;
use crate::ranking::{RankingContext, RankingMode};
use crate::service::{Service, ServiceArgs};

fn names(services: &[Rc<dyn Service>]) -> Vec<String> {
    services.iter().map(|s| s.unique_name().to_owned()).collect()
}

fn same_service(a: Option<&Rc<dyn Service>>, b: Option<&Rc<dyn Service>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl Manager {
    // ── Queries ──────────────────────────────────────────────────

    /// Registered services in ranked order, as of the last settled sort.
    pub fn services(&self) -> Vec<Rc<dyn Service>> {
        self.inner.services.borrow().clone()
    }

    /// Unique names of the visible services, best first.
    pub fn available_services(&self) -> Vec<String> {
        self.inner
            .services
            .borrow()
            .iter()
            .filter(|s| s.is_visible())
            .map(|s| s.unique_name().to_owned())
            .collect()
    }

    /// Unique names of every registered service, best first.
    pub fn complete_services(&self) -> Vec<String> {
        names(&self.inner.services.borrow())
    }

    pub fn has_service(&self, service: &Rc<dyn Service>) -> bool {
        self.inner
            .services
            .borrow()
            .iter()
            .any(|s| Rc::ptr_eq(s, service))
    }

    pub fn find_service(&self, name: &str) -> Option<Rc<dyn Service>> {
        self.inner
            .services
            .borrow()
            .iter()
            .find(|s| s.unique_name() == name)
            .cloned()
    }

    pub fn service_with_guid(&self, guid: &str) -> Option<Rc<dyn Service>> {
        self.inner
            .services
            .borrow()
            .iter()
            .find(|s| s.guid().as_deref() == Some(guid))
            .cloned()
    }

    /// The best service holding a connection, as of the last settled sort.
    pub fn default_service(&self) -> Option<Rc<dyn Service>> {
        self.inner.default_service.borrow().clone()
    }

    /// State of the default service; `Idle` without one.
    pub fn connection_state(&self) -> ConnectState {
        self.inner.connection_state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .services
            .borrow()
            .first()
            .is_some_and(|s| s.is_connected())
    }

    pub fn is_online(&self) -> bool {
        self.inner
            .services
            .borrow()
            .first()
            .is_some_and(|s| s.is_online())
    }

    // ── Registration ─────────────────────────────────────────────

    /// Add `service` to the registry and home it in the best profile.
    ///
    /// # Panics
    ///
    /// Registering a second service with the same unique name is a caller
    /// bug and panics.
    pub fn register_service(&self, service: Rc<dyn Service>) {
        let duplicate = self.find_service(service.unique_name()).is_some();
        assert!(
            !duplicate,
            "service {} registered twice",
            service.unique_name()
        );
        debug!(service = service.unique_name(), "registering service");
        self.match_profile_with_service(&service);
        self.inner.services.borrow_mut().push(service);
        self.sort_services();
    }

    pub fn deregister_service(&self, service: &Rc<dyn Service>) {
        let removed = {
            let mut services = self.inner.services.borrow_mut();
            let before = services.len();
            services.retain(|s| !Rc::ptr_eq(s, service));
            services.len() != before
        };
        if !removed {
            debug!(service = service.unique_name(), "deregistering unknown service");
            return;
        }
        service.unload();
        service.set_profile(None);
        debug!(service = service.unique_name(), "deregistered service");
        self.sort_services();
    }

    /// Drop `service` from the registry if it can unload. Returns whether
    /// it left.
    pub(super) fn unload_service(&self, service: &Rc<dyn Service>) -> bool {
        if !service.unload() {
            return false;
        }
        service.set_profile(None);
        self.inner
            .services
            .borrow_mut()
            .retain(|s| !Rc::ptr_eq(s, service));
        true
    }

    /// Note a state change of `service`. A connected service keeps
    /// auto-connect enabled and is persisted.
    pub fn update_service(&self, service: &Rc<dyn Service>) {
        info!(
            service = service.unique_name(),
            state = %service.state(),
            "service updated"
        );
        if service.is_connected() {
            service.enable_and_retain_auto_connect();
            self.save_service_to_profile(service);
        }
        self.sort_services();
    }

    /// Forget the stored configuration of `service`, re-homing it in a
    /// lower profile if one still has an entry for it.
    pub fn remove_service(&self, service: &Rc<dyn Service>) -> Result<(), ManagerError> {
        if !self.has_service(service) {
            return Err(ManagerError::not_found(format!(
                "service {} is not registered",
                service.unique_name()
            )));
        }
        info!(service = service.unique_name(), "removing service");
        if let Some(profile) = service.profile().filter(|p| !p.is_ephemeral()) {
            profile.abandon_service(service);
            if self.match_profile_with_service(service) {
                self.update_service(service);
                return Ok(());
            }
        }
        if !self.unload_service(service) {
            self.update_service(service);
        }
        self.sort_services();
        Ok(())
    }

    // ── Profile membership ───────────────────────────────────────

    /// Persist `service`; an ephemeral service moves to the active profile.
    pub fn save_service_to_profile(&self, service: &Rc<dyn Service>) {
        match service.profile().filter(|p| !p.is_ephemeral()) {
            Some(profile) => {
                profile.update_service(service.as_ref());
            }
            None => match self.active_profile() {
                Some(active) => {
                    self.move_service_to_profile(service, &active);
                }
                None => error!(
                    service = service.unique_name(),
                    "cannot assign profile to service: no profiles exist"
                ),
            },
        }
    }

    /// Adopt `service` into `destination`, then drop it from its old profile.
    pub fn move_service_to_profile(
        &self,
        service: &Rc<dyn Service>,
        destination: &Rc<Profile>,
    ) -> bool {
        let from = service.profile();
        debug!(
            service = service.unique_name(),
            from = from.as_ref().map_or_else(String::new, |p| p.friendly_name()),
            to = %destination.friendly_name(),
            "moving service"
        );
        destination.adopt_service(service) && from.is_none_or(|from| from.abandon_service(service))
    }

    /// Move `service` into the stacked profile named `profile_name`.
    pub fn set_profile_for_service(
        &self,
        service: &Rc<dyn Service>,
        profile_name: &str,
    ) -> Result<(), ManagerError> {
        let profile = self.lookup_profile(profile_name).ok_or_else(|| {
            ManagerError::invalid_arguments(format!(
                "unknown profile {profile_name} requested for service"
            ))
        })?;
        if service.profile().is_none() {
            // Never registered; now is a good time.
            self.register_service(Rc::clone(service));
        }
        if service.profile().is_some_and(|p| Rc::ptr_eq(&p, &profile)) {
            return Err(ManagerError::invalid_arguments(format!(
                "service is already in profile {profile_name}"
            )));
        }
        if !self.move_service_to_profile(service, &profile) {
            return Err(ManagerError::Internal(
                "unable to move service to profile".into(),
            ));
        }
        Ok(())
    }

    // ── Provider-backed configuration ────────────────────────────

    /// Find or create the service described by `args`, then apply `args`.
    pub fn get_service(&self, args: &ServiceArgs) -> Result<Rc<dyn Service>, ManagerError> {
        if args.get_str(ServiceArgs::TYPE) == Some(Technology::Vpn.name()) {
            // VPN services only come into being through configuration.
            return self.configure_service(args);
        }
        let service = self.get_service_inner(args)?;
        service.configure(args)?;
        Ok(service)
    }

    fn get_service_inner(&self, args: &ServiceArgs) -> Result<Rc<dyn Service>, ManagerError> {
        if let Some(service) = args
            .get_str(ServiceArgs::GUID)
            .and_then(|guid| self.service_with_guid(guid))
        {
            return Ok(service);
        }
        let technology = args.technology()?;
        let provider = self.provider_for(technology).ok_or_else(|| {
            ManagerError::not_supported(format!("no provider for {technology} services"))
        })?;
        provider.get_service(args)
    }

    /// Configure a service and persist the configuration to the active
    /// profile, or to the stacked profile named by the `Profile` argument.
    pub fn configure_service(&self, args: &ServiceArgs) -> Result<Rc<dyn Service>, ManagerError> {
        let profile_specified = args.get_str(ServiceArgs::PROFILE);
        let profile = match profile_specified {
            Some(name) => self.lookup_profile(name).ok_or_else(|| {
                ManagerError::invalid_arguments(format!("invalid profile name {name}"))
            })?,
            None => self
                .active_profile()
                .ok_or_else(|| ManagerError::not_found("profile stack is empty"))?,
        };

        let service = self.get_service_inner(args)?;

        let in_profile = service.profile().is_some_and(|p| Rc::ptr_eq(&p, &profile));
        if in_profile {
            debug!(service = service.unique_name(), "service already in target profile");
        } else if !profile.load_service(service.as_ref()) {
            debug!(service = service.unique_name(), "no stored configuration for service");
        }

        service.configure(args)?;
        if !profile.update_service(service.as_ref()) {
            return Err(ManagerError::Internal(
                "unable to save service to profile".into(),
            ));
        }

        if self.has_service(&service) {
            let moves = self.is_service_ephemeral(service.as_ref())
                || (profile_specified.is_some()
                    && !service.profile().is_some_and(|p| Rc::ptr_eq(&p, &profile)));
            if moves && !self.move_service_to_profile(&service, &profile) {
                return Err(ManagerError::Internal(
                    "unable to move service to profile".into(),
                ));
            }
        }
        Ok(service)
    }

    /// Write configuration for `args` into `profile_name`.
    ///
    /// Returns the configured service, or `None` when the configuration was
    /// written through a temporary service because the live one belongs to
    /// a profile higher on the stack.
    pub fn configure_service_for_profile(
        &self,
        profile_name: &str,
        args: &ServiceArgs,
    ) -> Result<Option<Rc<dyn Service>>, ManagerError> {
        let technology = args.technology()?;
        let provider = self.provider_for(technology).ok_or_else(|| {
            ManagerError::not_supported(format!("no provider for {technology} services"))
        })?;
        let profile = self
            .lookup_profile(profile_name)
            .ok_or_else(|| ManagerError::not_found("profile specified was not found"))?;
        if args
            .get_str(ServiceArgs::PROFILE)
            .is_some_and(|named| named != profile_name)
        {
            return Err(ManagerError::invalid_arguments(
                "profile argument does not match that in the configuration arguments",
            ));
        }

        let by_guid = args
            .get_str(ServiceArgs::GUID)
            .and_then(|guid| self.service_with_guid(guid));
        if by_guid.as_ref().is_some_and(|s| s.technology() != technology) {
            return Err(ManagerError::not_supported(format!(
                "this GUID matches a non-{technology} service"
            )));
        }
        let service = by_guid.or_else(|| provider.find_similar_service(args).ok());

        let Some(service) = service else {
            let configure_args = args.clone().with(ServiceArgs::PROFILE, profile_name);
            return self.configure_service(&configure_args).map(Some);
        };

        let reassign = match service.profile() {
            Some(current) if Rc::ptr_eq(&current, &profile) => true,
            Some(current) => current.is_ephemeral() || self.is_profile_before(&current, &profile),
            None => true,
        };
        if reassign {
            Self::setup_service_in_profile(&service, &profile, args)?;
            return Ok(Some(service));
        }

        // The live service belongs to a higher profile; write the lower
        // profile's entry through a throwaway service.
        let temporary = provider.create_temporary_service(args)?;
        profile.configure_service(&temporary);
        Self::setup_service_in_profile(&temporary, &profile, args)?;
        Ok(None)
    }

    fn setup_service_in_profile(
        service: &Rc<dyn Service>,
        profile: &Rc<Profile>,
        args: &ServiceArgs,
    ) -> Result<(), ManagerError> {
        service.set_profile(Some(Rc::clone(profile)));
        service.configure(args)?;
        profile.update_service(service.as_ref());
        Ok(())
    }

    // ── Sorting ──────────────────────────────────────────────────

    /// Schedule a re-sort for the next dispatcher turn. Calls made before
    /// that turn runs share the one pending sort.
    pub fn sort_services(&self) {
        let pending = self
            .inner
            .sort_task
            .borrow()
            .as_ref()
            .is_some_and(|task| task.is_pending());
        if pending {
            return;
        }
        let task = self.post_self_task(Self::sort_services_task);
        *self.inner.sort_task.borrow_mut() = Some(task);
    }

    fn sort_services_task(&self) {
        self.inner.sort_task.borrow_mut().take();

        let mut services = self.services();
        {
            let order = self.inner.technology_order.borrow();
            let profiles = self.inner.profiles.borrow();
            let ranking = RankingContext::new(RankingMode::Connectivity, &order, &profiles);
            ranking.sort(&mut services);
        }
        let sorted = names(&services);
        trace!(services = ?sorted, "sorted services");
        self.inner.services.borrow_mut().clone_from(&services);

        let new_default = services.first().filter(|s| s.is_connected()).cloned();
        let changed = !same_service(
            self.inner.default_service.borrow().as_ref(),
            new_default.as_ref(),
        );
        if changed {
            self.inner.default_service.borrow_mut().clone_from(&new_default);
            self.notify_default_service_changed(new_default.as_ref());
        }

        self.emit(ManagerEvent::ServicesSorted { services: sorted });
        self.refresh_connection_state(new_default.as_ref());
        self.auto_connect();
    }

    fn notify_default_service_changed(&self, service: Option<&Rc<dyn Service>>) {
        let name = service.map(|s| s.unique_name().to_owned());
        info!(service = name.as_deref().unwrap_or("none"), "default service changed");

        let callbacks: Vec<_> = self
            .inner
            .default_service_callbacks
            .borrow()
            .values()
            .cloned()
            .collect();
        for callback in callbacks {
            callback(service);
        }
        self.inner.default_service_tx.send_replace(name.clone());
        self.emit(ManagerEvent::DefaultServiceChanged { service: name });
    }

    fn refresh_connection_state(&self, default: Option<&Rc<dyn Service>>) {
        let state = default.map_or(ConnectState::Idle, |s| s.state());
        if self.inner.connection_state.replace(state) != state {
            info!(%state, "connection state changed");
            self.emit(ManagerEvent::ConnectionStateChanged { state });
        }
    }

    // ── Auto-connect ─────────────────────────────────────────────

    pub fn set_suppress_auto_connect(&self, suppress: bool) {
        self.inner.suppress_auto_connect.set(suppress);
    }

    fn suspend_blocks_auto_connect(&self) -> bool {
        self.inner.suspending.get() && !self.inner.in_dark_resume.get()
    }

    fn auto_connect_suppressed(&self) -> Option<&'static str> {
        if self.inner.suppress_auto_connect.get() {
            Some("suppressed")
        } else if !self.inner.running.get() {
            Some("not running")
        } else if !self.inner.auto_connect_enabled {
            Some("disabled by configuration")
        } else if self.suspend_blocks_auto_connect() {
            Some("suspending")
        } else {
            None
        }
    }

    /// Let every auto-connect service try to connect, best first.
    pub fn auto_connect(&self) {
        if let Some(reason) = self.auto_connect_suppressed() {
            debug!(reason, "auto-connect skipped");
            return;
        }
        let services = self.services();
        if services.is_empty() {
            return;
        }
        let excluded = self.inner.no_auto_connect_technologies.borrow().clone();
        for service in services {
            if service.auto_connect() && !excluded.contains(&service.technology()) {
                service.try_auto_connect();
            }
        }
    }

    /// Schedule one pass that connects the best connectable service of
    /// every technology, ignoring current connection state.
    pub fn connect_to_best_services(&self) {
        self.post_self_task(Self::connect_to_best_services_task);
    }

    fn connect_to_best_services_task(&self) {
        let mut candidates = self.services();
        {
            let order = self.inner.technology_order.borrow();
            let profiles = self.inner.profiles.borrow();
            let ranking = RankingContext::new(RankingMode::CleanSlate, &order, &profiles);
            ranking.sort(&mut candidates);
        }

        let mut chosen = BTreeSet::new();
        for service in candidates {
            if !service.connectable() {
                // Nothing after this one is connectable either.
                break;
            }
            if !service.auto_connect() || !service.is_visible() {
                continue;
            }
            let technology = service.technology();
            if !technology.is_primary_connectivity() && !self.is_connected() {
                continue;
            }
            if chosen.contains(&technology) || service.explicitly_disconnected() {
                continue;
            }
            chosen.insert(technology);
            if !service.is_connected() && !service.is_connecting() {
                if let Err(e) = service.connect("connect to best services") {
                    warn!(service = service.unique_name(), error = %e, "connect failed");
                }
            }
        }
        if !self.is_connected() {
            info!("not connected after connecting to best services");
        }
    }
}
