// ── Test fakes ──
//
// Hand-written Service, Device, and Provider doubles. Every knob is a cell
// so tests can flip state on a shared `Rc` while the Manager holds it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::json;

use crate::device::Device;
use crate::error::{ManagerError, ResultCallback};
use crate::manager::WeakManager;
use crate::model::{ConnectState, Technology};
use crate::profile::Profile;
use crate::provider::Provider;
use crate::service::{Service, ServiceArgs};
use crate::store::Store;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

// ── FakeService ──────────────────────────────────────────────────

pub struct FakeService {
    name: String,
    serial: u64,
    technology: Technology,
    state: Cell<ConnectState>,
    connectable: Cell<bool>,
    auto_connect: Cell<bool>,
    has_ever_connected: Cell<bool>,
    priority: Cell<i32>,
    priority_within_technology: Cell<i32>,
    security_level: Cell<u16>,
    depends_on: RefCell<Option<String>>,
    visible: Cell<bool>,
    explicitly_disconnected: Cell<bool>,
    guid: RefCell<Option<String>>,
    profile: RefCell<Option<Rc<Profile>>>,
    unload_result: Cell<bool>,
    connect_error: RefCell<Option<ManagerError>>,

    pub connect_calls: Cell<usize>,
    pub disconnect_calls: Cell<usize>,
    pub loads: Cell<usize>,
    pub unloads: Cell<usize>,
    pub resumed: Cell<usize>,
    pub auto_connect_retained: Cell<usize>,
    pub configured_with: RefCell<Vec<ServiceArgs>>,
}

impl FakeService {
    /// Idle, connectable, auto-connecting, priority 0.
    pub fn new(name: &str, technology: Technology) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_owned(),
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            technology,
            state: Cell::new(ConnectState::Idle),
            connectable: Cell::new(true),
            auto_connect: Cell::new(true),
            has_ever_connected: Cell::new(false),
            priority: Cell::new(0),
            priority_within_technology: Cell::new(0),
            security_level: Cell::new(0),
            depends_on: RefCell::new(None),
            visible: Cell::new(true),
            explicitly_disconnected: Cell::new(false),
            guid: RefCell::new(None),
            profile: RefCell::new(None),
            unload_result: Cell::new(true),
            connect_error: RefCell::new(None),
            connect_calls: Cell::new(0),
            disconnect_calls: Cell::new(0),
            loads: Cell::new(0),
            unloads: Cell::new(0),
            resumed: Cell::new(0),
            auto_connect_retained: Cell::new(0),
            configured_with: RefCell::new(Vec::new()),
        })
    }

    pub fn into_dyn(self: Rc<Self>) -> Rc<dyn Service> {
        self
    }

    pub fn as_dyn(self: &Rc<Self>) -> Rc<dyn Service> {
        Rc::clone(self) as Rc<dyn Service>
    }

    pub fn set_state(&self, state: ConnectState) {
        self.state.set(state);
    }

    pub fn set_connectable(&self, connectable: bool) {
        self.connectable.set(connectable);
    }

    pub fn set_auto_connect(&self, auto_connect: bool) {
        self.auto_connect.set(auto_connect);
    }

    pub fn set_has_ever_connected(&self, value: bool) {
        self.has_ever_connected.set(value);
    }

    pub fn set_priority(&self, priority: i32) {
        self.priority.set(priority);
    }

    pub fn set_priority_within_technology(&self, priority: i32) {
        self.priority_within_technology.set(priority);
    }

    pub fn set_security_level(&self, level: u16) {
        self.security_level.set(level);
    }

    pub fn set_depends_on(&self, name: Option<&str>) {
        *self.depends_on.borrow_mut() = name.map(str::to_owned);
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }

    pub fn set_explicitly_disconnected(&self, value: bool) {
        self.explicitly_disconnected.set(value);
    }

    pub fn set_guid(&self, guid: &str) {
        *self.guid.borrow_mut() = Some(guid.to_owned());
    }

    pub fn set_unload_result(&self, result: bool) {
        self.unload_result.set(result);
    }

    /// Make every later `connect` fail with `error`.
    pub fn fail_connect_with(&self, error: ManagerError) {
        *self.connect_error.borrow_mut() = Some(error);
    }

    /// Friendly name of the profile this service is homed in.
    pub fn profile_name(&self) -> Option<String> {
        self.profile.borrow().as_ref().map(|p| p.friendly_name())
    }
}

impl Service for FakeService {
    fn unique_name(&self) -> &str {
        &self.name
    }

    fn serial_number(&self) -> u64 {
        self.serial
    }

    fn technology(&self) -> Technology {
        self.technology
    }

    fn state(&self) -> ConnectState {
        self.state.get()
    }

    fn connectable(&self) -> bool {
        self.connectable.get()
    }

    fn auto_connect(&self) -> bool {
        self.auto_connect.get()
    }

    fn has_ever_connected(&self) -> bool {
        self.has_ever_connected.get()
    }

    fn priority(&self) -> i32 {
        self.priority.get()
    }

    fn priority_within_technology(&self) -> i32 {
        self.priority_within_technology.get()
    }

    fn security_level(&self) -> u16 {
        self.security_level.get()
    }

    fn depends_on(&self) -> Option<String> {
        self.depends_on.borrow().clone()
    }

    fn is_visible(&self) -> bool {
        self.visible.get()
    }

    fn explicitly_disconnected(&self) -> bool {
        self.explicitly_disconnected.get()
    }

    fn clear_explicitly_disconnected(&self) {
        self.explicitly_disconnected.set(false);
    }

    fn guid(&self) -> Option<String> {
        self.guid.borrow().clone()
    }

    fn profile(&self) -> Option<Rc<Profile>> {
        self.profile.borrow().clone()
    }

    fn set_profile(&self, profile: Option<Rc<Profile>>) {
        *self.profile.borrow_mut() = profile;
    }

    fn storage_identifier(&self) -> String {
        self.name.clone()
    }

    fn load(&self, store: &dyn Store) -> bool {
        if !store.contains_group(&self.name) {
            return false;
        }
        self.loads.set(self.loads.get() + 1);
        if let Some(auto_connect) = store.load_bool(&self.name, "AutoConnect") {
            self.auto_connect.set(auto_connect);
        }
        if let Some(priority) = store
            .load_i64(&self.name, "Priority")
            .and_then(|p| i32::try_from(p).ok())
        {
            self.priority.set(priority);
        }
        true
    }

    fn save(&self, store: &mut dyn Store) -> bool {
        store.save(&self.name, "Name", json!(self.name));
        store.save(&self.name, "AutoConnect", json!(self.auto_connect.get()));
        store.save(&self.name, "Priority", json!(self.priority.get()));
        true
    }

    fn unload(&self) -> bool {
        self.unloads.set(self.unloads.get() + 1);
        self.unload_result.get()
    }

    fn configure(&self, args: &ServiceArgs) -> Result<(), ManagerError> {
        if let Some(priority) = args
            .get("Priority")
            .and_then(serde_json::Value::as_i64)
            .and_then(|p| i32::try_from(p).ok())
        {
            self.priority.set(priority);
        }
        self.configured_with.borrow_mut().push(args.clone());
        Ok(())
    }

    fn connect(&self, _reason: &str) -> Result<(), ManagerError> {
        self.connect_calls.set(self.connect_calls.get() + 1);
        if let Some(error) = self.connect_error.borrow().clone() {
            return Err(error);
        }
        self.state.set(ConnectState::Associating);
        Ok(())
    }

    fn disconnect(&self, _reason: &str) {
        self.disconnect_calls.set(self.disconnect_calls.get() + 1);
        self.state.set(ConnectState::Idle);
    }

    fn enable_and_retain_auto_connect(&self) {
        self.auto_connect.set(true);
        self.auto_connect_retained
            .set(self.auto_connect_retained.get() + 1);
    }

    fn on_after_resume(&self) {
        self.resumed.set(self.resumed.get() + 1);
    }
}

// ── FakeDevice ───────────────────────────────────────────────────

pub struct FakeDevice {
    link: String,
    technology: Technology,
    enabled: Cell<bool>,
    enabled_persistent: Cell<bool>,
    enable_error: RefCell<Option<ManagerError>>,
    /// Hold completion callbacks instead of invoking them inline.
    hold_callbacks: Cell<bool>,
    held: RefCell<Vec<ResultCallback>>,

    pub enable_requests: RefCell<Vec<bool>>,
    pub set_enabled_calls: RefCell<Vec<bool>>,
    pub suspend_calls: Cell<usize>,
    pub dark_resume_calls: Cell<usize>,
    pub resumed: Cell<usize>,
    pub loads: Cell<usize>,
    pub saves: Cell<usize>,
}

impl FakeDevice {
    pub fn new(link: &str, technology: Technology) -> Rc<Self> {
        Rc::new(Self {
            link: link.to_owned(),
            technology,
            enabled: Cell::new(false),
            enabled_persistent: Cell::new(false),
            enable_error: RefCell::new(None),
            hold_callbacks: Cell::new(false),
            held: RefCell::new(Vec::new()),
            enable_requests: RefCell::new(Vec::new()),
            set_enabled_calls: RefCell::new(Vec::new()),
            suspend_calls: Cell::new(0),
            dark_resume_calls: Cell::new(0),
            resumed: Cell::new(0),
            loads: Cell::new(0),
            saves: Cell::new(0),
        })
    }

    pub fn into_dyn(self: Rc<Self>) -> Rc<dyn Device> {
        self
    }

    pub fn as_dyn(self: &Rc<Self>) -> Rc<dyn Device> {
        Rc::clone(self) as Rc<dyn Device>
    }

    pub fn set_enabled_persistent(&self, value: bool) {
        self.enabled_persistent.set(value);
    }

    pub fn fail_enable_with(&self, error: ManagerError) {
        *self.enable_error.borrow_mut() = Some(error);
    }

    pub fn hold_callbacks(&self) {
        self.hold_callbacks.set(true);
    }

    /// Complete every held callback with `result`.
    pub fn release(&self, result: &Result<(), ManagerError>) {
        let held: Vec<ResultCallback> = self.held.borrow_mut().drain(..).collect();
        for callback in held {
            callback(result.clone());
        }
    }

    fn finish(&self, result: Result<(), ManagerError>, done: ResultCallback) {
        if self.hold_callbacks.get() {
            self.held.borrow_mut().push(done);
        } else {
            done(result);
        }
    }
}

impl Device for FakeDevice {
    fn link_name(&self) -> &str {
        &self.link
    }

    fn technology(&self) -> Technology {
        self.technology
    }

    fn enabled(&self) -> bool {
        self.enabled.get()
    }

    fn enabled_persistent(&self) -> bool {
        self.enabled_persistent.get()
    }

    fn set_enabled(&self, enable: bool) {
        self.set_enabled_calls.borrow_mut().push(enable);
        self.enabled.set(enable);
    }

    fn set_enabled_checked(&self, enable: bool, persist: bool, done: ResultCallback) {
        self.enable_requests.borrow_mut().push(enable);
        let error = self.enable_error.borrow().clone();
        let result = match error {
            Some(error) => Err(error),
            None => {
                self.enabled.set(enable);
                if persist {
                    self.enabled_persistent.set(enable);
                }
                Ok(())
            }
        };
        self.finish(result, done);
    }

    fn on_before_suspend(&self, done: ResultCallback) {
        self.suspend_calls.set(self.suspend_calls.get() + 1);
        self.finish(Ok(()), done);
    }

    fn on_dark_resume(&self, done: ResultCallback) {
        self.dark_resume_calls.set(self.dark_resume_calls.get() + 1);
        self.finish(Ok(()), done);
    }

    fn on_after_resume(&self) {
        self.resumed.set(self.resumed.get() + 1);
    }

    fn load(&self, store: &dyn Store) -> bool {
        let group = self.storage_identifier();
        if !store.contains_group(&group) {
            return false;
        }
        self.loads.set(self.loads.get() + 1);
        if let Some(enabled) = store.load_bool(&group, "Enabled") {
            self.enabled_persistent.set(enabled);
        }
        true
    }

    fn save(&self, store: &mut dyn Store) -> bool {
        self.saves.set(self.saves.get() + 1);
        store.save(
            &self.storage_identifier(),
            "Enabled",
            json!(self.enabled_persistent.get()),
        );
        true
    }
}

// ── FakeProvider ─────────────────────────────────────────────────

/// Provider that materializes a `FakeService` per stored entry and per
/// `Name` argument, registering each with the Manager.
pub struct FakeProvider {
    technology: Technology,
    manager: RefCell<Option<WeakManager>>,
    pub services: RefCell<Vec<Rc<FakeService>>>,
    pub profiles_seen: RefCell<Vec<String>>,
    pub temporary: RefCell<Vec<Rc<FakeService>>>,
    pub starts: Cell<usize>,
    pub stops: Cell<usize>,
}

impl FakeProvider {
    pub fn new(technology: Technology) -> Rc<Self> {
        Rc::new(Self {
            technology,
            manager: RefCell::new(None),
            services: RefCell::new(Vec::new()),
            profiles_seen: RefCell::new(Vec::new()),
            temporary: RefCell::new(Vec::new()),
            starts: Cell::new(0),
            stops: Cell::new(0),
        })
    }

    pub fn attach(&self, manager: WeakManager) {
        *self.manager.borrow_mut() = Some(manager);
    }

    pub fn service(&self, name: &str) -> Option<Rc<FakeService>> {
        self.services
            .borrow()
            .iter()
            .find(|s| s.unique_name() == name)
            .cloned()
    }

    fn register(&self, service: &Rc<FakeService>) {
        self.services.borrow_mut().push(Rc::clone(service));
        let manager = self.manager.borrow().as_ref().and_then(WeakManager::upgrade);
        if let Some(manager) = manager {
            manager.register_service(service.as_dyn());
        }
    }

    fn name_arg(args: &ServiceArgs) -> Result<String, ManagerError> {
        args.get_str("Name")
            .map(str::to_owned)
            .ok_or_else(|| ManagerError::invalid_arguments("missing Name"))
    }
}

impl Provider for FakeProvider {
    fn technology(&self) -> Technology {
        self.technology
    }

    fn create_services_from_profile(&self, profile: &Rc<Profile>) {
        self.profiles_seen.borrow_mut().push(profile.friendly_name());
        for entry in profile.entries() {
            if entry.starts_with("device_") || self.service(&entry).is_some() {
                continue;
            }
            let service = FakeService::new(&entry, self.technology);
            self.register(&service);
        }
    }

    fn get_service(&self, args: &ServiceArgs) -> Result<Rc<dyn Service>, ManagerError> {
        let name = Self::name_arg(args)?;
        if let Some(existing) = self.service(&name) {
            return Ok(existing.into_dyn());
        }
        let service = FakeService::new(&name, self.technology);
        self.register(&service);
        Ok(service.into_dyn())
    }

    fn find_similar_service(&self, args: &ServiceArgs) -> Result<Rc<dyn Service>, ManagerError> {
        let name = Self::name_arg(args)?;
        self.service(&name)
            .map(FakeService::into_dyn)
            .ok_or_else(|| ManagerError::not_found(format!("no service named {name}")))
    }

    fn create_temporary_service(
        &self,
        args: &ServiceArgs,
    ) -> Result<Rc<dyn Service>, ManagerError> {
        let name = Self::name_arg(args)?;
        let service = FakeService::new(&name, self.technology);
        self.temporary.borrow_mut().push(Rc::clone(&service));
        Ok(service.into_dyn())
    }

    fn start(&self) {
        self.starts.set(self.starts.get() + 1);
    }

    fn stop(&self) {
        self.stops.set(self.stops.get() + 1);
    }
}
