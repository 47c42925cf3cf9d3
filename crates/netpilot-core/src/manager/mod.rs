// ── Manager ──
//
// Top-level composer. Owns the profile stack, the sorted service registry,
// the device list, and the technology → provider map. Every mutation runs
// on the event dispatcher's thread; registry re-sorts are deferred to the
// next dispatcher turn and coalesced.
//
// The `impl Manager` blocks are split by concern:
//   profiles.rs    profile stack and service adoption
//   services.rs    registry, ranking, default service, auto-connect
//   devices.rs     device registry and technology queries
//   technology.rs  per-technology enable and technology lists
//   power.rs       termination actions and suspend handling

mod devices;
mod power;
mod profiles;
mod services;
mod technology;


use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::device::Device;
use crate::dispatcher::{EventDispatcher, TaskHandle};
use crate::error::ManagerError;
use crate::hook_table::HookTable;
use crate::model::{ConnectState, Technology};
use crate::profile::Profile;
use crate::provider::Provider;
use crate::service::Service;
use crate::store::ProfileStorage;

const EVENT_CHANNEL_SIZE: usize = 256;

/// Observer for default-service changes. Receives `None` when no service
/// holds a connection.
pub type DefaultServiceCallback = Rc<dyn Fn(Option<&Rc<dyn Service>>)>;

// ── ManagerEvent ─────────────────────────────────────────────────

/// Change notifications published on the Manager's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// The profile stack changed; friendly names, bottom first.
    ProfilesChanged { profiles: Vec<String> },
    /// A deferred sort ran; unique names, best first.
    ServicesSorted { services: Vec<String> },
    DefaultServiceChanged { service: Option<String> },
    ConnectionStateChanged { state: ConnectState },
    /// The device list changed; link names.
    DevicesChanged { devices: Vec<String> },
}

// ── Manager ──────────────────────────────────────────────────────

/// Connectivity orchestrator.
///
/// Cheaply cloneable via `Rc<ManagerInner>`; every clone drives the same
/// state. Deliberately `!Send`: the Manager lives on one event-loop thread.
#[derive(Clone)]
pub struct Manager {
    inner: Rc<ManagerInner>,
}

/// Non-owning handle, for collaborators and posted tasks.
#[derive(Clone)]
pub struct WeakManager {
    inner: Weak<ManagerInner>,
}

impl WeakManager {
    pub fn upgrade(&self) -> Option<Manager> {
        self.inner.upgrade().map(|inner| Manager { inner })
    }
}

struct ManagerInner {
    dispatcher: EventDispatcher,
    storage: Rc<dyn ProfileStorage>,
    default_profile: String,
    termination_timeout: Duration,
    auto_connect_enabled: bool,

    profiles: RefCell<Vec<Rc<Profile>>>,
    ephemeral_profile: Rc<Profile>,
    services: RefCell<Vec<Rc<dyn Service>>>,
    devices: RefCell<Vec<Rc<dyn Device>>>,
    providers: RefCell<BTreeMap<Technology, Rc<dyn Provider>>>,

    technology_order: RefCell<Vec<Technology>>,
    prohibited_technologies: RefCell<Vec<Technology>>,
    no_auto_connect_technologies: RefCell<Vec<Technology>>,

    running: Cell<bool>,
    suspending: Cell<bool>,
    in_dark_resume: Cell<bool>,
    suppress_auto_connect: Cell<bool>,

    /// Pending coalesced sort, if one is queued.
    sort_task: RefCell<Option<TaskHandle>>,
    default_service: RefCell<Option<Rc<dyn Service>>>,
    default_service_tx: watch::Sender<Option<String>>,
    default_service_callbacks: RefCell<BTreeMap<u32, DefaultServiceCallback>>,
    next_callback_tag: Cell<u32>,
    connection_state: Cell<ConnectState>,
    event_tx: broadcast::Sender<ManagerEvent>,

    termination_actions: HookTable,
}

impl Manager {
    /// Create a stopped Manager. Call [`start()`](Self::start) to load
    /// profiles and begin auto-connecting.
    pub fn new(
        config: ManagerConfig,
        dispatcher: EventDispatcher,
        storage: Rc<dyn ProfileStorage>,
    ) -> Self {
        let (default_service_tx, _) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let termination_actions = HookTable::new(dispatcher.clone());

        Self {
            inner: Rc::new(ManagerInner {
                dispatcher,
                storage,
                default_profile: config.default_profile,
                termination_timeout: config.termination_timeout,
                auto_connect_enabled: config.auto_connect,
                profiles: RefCell::new(Vec::new()),
                ephemeral_profile: Profile::ephemeral(),
                services: RefCell::new(Vec::new()),
                devices: RefCell::new(Vec::new()),
                providers: RefCell::new(BTreeMap::new()),
                technology_order: RefCell::new(config.technology_order),
                prohibited_technologies: RefCell::new(config.prohibited_technologies),
                no_auto_connect_technologies: RefCell::new(config.no_auto_connect_technologies),
                running: Cell::new(false),
                suspending: Cell::new(false),
                in_dark_resume: Cell::new(false),
                suppress_auto_connect: Cell::new(false),
                sort_task: RefCell::new(None),
                default_service: RefCell::new(None),
                default_service_tx,
                default_service_callbacks: RefCell::new(BTreeMap::new()),
                next_callback_tag: Cell::new(0),
                connection_state: Cell::new(ConnectState::Idle),
                event_tx,
                termination_actions,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakManager {
        WeakManager {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Register the provider for its technology, replacing any previous one.
    pub fn register_provider(&self, provider: Rc<dyn Provider>) {
        let technology = provider.technology();
        if self
            .inner
            .providers
            .borrow_mut()
            .insert(technology, provider)
            .is_some()
        {
            warn!(%technology, "replaced existing provider");
        }
    }

    fn provider_for(&self, technology: Technology) -> Option<Rc<dyn Provider>> {
        self.inner.providers.borrow().get(&technology).cloned()
    }

    fn providers_snapshot(&self) -> Vec<Rc<dyn Provider>> {
        self.inner.providers.borrow().values().cloned().collect()
    }

    /// Post `task` to run against this Manager on the next turn, if the
    /// Manager is still alive by then.
    fn post_self_task(&self, task: impl FnOnce(&Manager) + 'static) -> TaskHandle {
        let weak = self.downgrade();
        self.inner.dispatcher.post_task(move || {
            if let Some(manager) = weak.upgrade() {
                task(&manager);
            }
        })
    }

    // ── Observation ──────────────────────────────────────────────

    /// Subscribe to Manager change events.
    pub fn events(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.event_tx.subscribe()
    }

    fn emit(&self, event: ManagerEvent) {
        // No receivers is fine.
        let _ = self.inner.event_tx.send(event);
    }

    /// Watch the unique name of the default service.
    pub fn subscribe_default_service(&self) -> watch::Receiver<Option<String>> {
        self.inner.default_service_tx.subscribe()
    }

    /// Register `callback` for default-service changes. Returns a tag for
    /// [`deregister_default_service_callback`](Self::deregister_default_service_callback).
    pub fn register_default_service_callback(&self, callback: DefaultServiceCallback) -> u32 {
        let tag = self.inner.next_callback_tag.get() + 1;
        self.inner.next_callback_tag.set(tag);
        self.inner
            .default_service_callbacks
            .borrow_mut()
            .insert(tag, callback);
        tag
    }

    pub fn deregister_default_service_callback(&self, tag: u32) {
        self.inner.default_service_callbacks.borrow_mut().remove(&tag);
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Load the profile stack, mark the Manager running, and start every
    /// provider.
    pub fn start(&self) -> Result<(), ManagerError> {
        info!("manager starting");
        self.initialize_profiles()?;
        self.inner.running.set(true);
        for provider in self.providers_snapshot() {
            provider.start();
        }
        self.sort_services();
        Ok(())
    }

    /// Persist state, tear down connections, and stop every provider.
    pub fn stop(&self) {
        info!("manager stopping");
        self.inner.running.set(false);

        let devices = self.devices();
        for device in &devices {
            self.update_device(device);
        }
        for profile in self.profiles_snapshot() {
            if let Err(e) = profile.save() {
                warn!(profile = %profile.friendly_name(), error = %e, "failed to save profile");
            }
        }
        for service in self.services() {
            service.disconnect("manager stopping");
        }
        for device in &devices {
            device.set_enabled(false);
        }
        for provider in self.providers_snapshot() {
            provider.stop();
        }
        if let Some(task) = self.inner.sort_task.borrow_mut().take() {
            task.cancel();
        }
        debug!("manager stopped");
    }
}
