// ── Device registry ──

use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::{debug, info};

use super::{Manager, ManagerEvent};
use crate::device::Device;
use crate::model::Technology;

impl Manager {
    pub fn devices(&self) -> Vec<Rc<dyn Device>> {
        self.inner.devices.borrow().clone()
    }

    fn emit_devices_changed(&self) {
        let devices = self
            .inner
            .devices
            .borrow()
            .iter()
            .map(|d| d.link_name().to_owned())
            .collect();
        self.emit(ManagerEvent::DevicesChanged { devices });
    }

    /// Start managing `device`. Registering the same device twice is a
    /// no-op.
    pub fn register_device(&self, device: Rc<dyn Device>) {
        let known = self
            .inner
            .devices
            .borrow()
            .iter()
            .any(|d| Rc::ptr_eq(d, &device));
        if known {
            return;
        }
        info!(link = device.link_name(), technology = %device.technology(), "device registered");
        self.inner.devices.borrow_mut().push(Rc::clone(&device));

        for profile in self.profiles_snapshot() {
            profile.configure_device(device.as_ref());
        }
        if self.is_technology_prohibited(device.technology()) {
            device.set_enabled_checked(false, false, Box::new(|_| {}));
        }
        // A new device needs to be persisted.
        self.update_device(&device);

        if self.inner.running.get() && device.enabled_persistent() {
            device.set_enabled(true);
        }
        self.emit_devices_changed();
    }

    pub fn deregister_device(&self, device: &Rc<dyn Device>) {
        let known = self
            .inner
            .devices
            .borrow()
            .iter()
            .any(|d| Rc::ptr_eq(d, device));
        if !known {
            debug!(link = device.link_name(), "deregistering unknown device");
            return;
        }
        self.update_device(device);
        device.set_enabled(false);
        self.inner
            .devices
            .borrow_mut()
            .retain(|d| !Rc::ptr_eq(d, device));
        debug!(link = device.link_name(), "deregistered device");
        self.emit_devices_changed();
    }

    /// Deregister the device bound to `link_name`, if any. Returns whether
    /// one was found.
    pub fn deregister_device_by_link_name(&self, link_name: &str) -> bool {
        let device = self
            .inner
            .devices
            .borrow()
            .iter()
            .find(|d| d.link_name() == link_name)
            .cloned();
        device.is_some_and(|device| {
            self.deregister_device(&device);
            true
        })
    }

    /// Persist `device` to the topmost profile that keeps device state.
    pub fn update_device(&self, device: &Rc<dyn Device>) {
        info!(
            link = device.link_name(),
            enabled = device.enabled_persistent(),
            "device updated"
        );
        let profiles = self.profiles_snapshot();
        if !profiles.iter().rev().any(|p| p.update_device(device.as_ref())) {
            debug!(link = device.link_name(), "no profile accepted device");
        }
    }

    pub fn enabled_device_with_technology(&self, technology: Technology) -> Option<Rc<dyn Device>> {
        self.inner
            .devices
            .borrow()
            .iter()
            .find(|d| d.technology() == technology && d.enabled())
            .cloned()
    }

    pub fn enabled_device_by_link_name(&self, link_name: &str) -> Option<Rc<dyn Device>> {
        self.inner
            .devices
            .borrow()
            .iter()
            .find(|d| d.link_name() == link_name && d.enabled())
            .cloned()
    }

    // ── Technology queries ───────────────────────────────────────

    /// Technologies with at least one device.
    pub fn available_technologies(&self) -> BTreeSet<Technology> {
        self.collect_technologies(|_| true)
    }

    /// Technologies with at least one enabled device.
    pub fn enabled_technologies(&self) -> BTreeSet<Technology> {
        self.collect_technologies(|d| d.enabled())
    }

    /// Technologies with at least one connected device.
    pub fn connected_technologies(&self) -> BTreeSet<Technology> {
        self.collect_technologies(|d| d.is_connected())
    }

    fn collect_technologies(&self, keep: impl Fn(&dyn Device) -> bool) -> BTreeSet<Technology> {
        self.inner
            .devices
            .borrow()
            .iter()
            .filter(|d| keep(d.as_ref()))
            .map(|d| d.technology())
            .collect()
    }

    /// Technology of the default service.
    pub fn default_technology(&self) -> Option<Technology> {
        self.inner
            .services
            .borrow()
            .first()
            .filter(|s| s.is_connected())
            .map(|s| s.technology())
    }
}
