// ── Termination and suspend ──
//
// Shutdown and suspend both fan work out to independent parties and wait,
// bounded by the termination timeout, for all of them to finish.

use tracing::{debug, info};

use super::Manager;
use crate::device::Device;
use crate::error::ResultCallback;
use crate::result_aggregator::ResultAggregator;

impl Manager {
    // ── Termination actions ──────────────────────────────────────

    /// Register `start` to run at shutdown. The action must later call
    /// [`termination_action_complete`](Self::termination_action_complete)
    /// with the same name.
    pub fn add_termination_action(&self, name: &str, start: impl Fn() + 'static) {
        self.inner.termination_actions.add(name, start);
    }

    pub fn termination_action_complete(&self, name: &str) {
        self.inner.termination_actions.action_complete(name);
    }

    pub fn remove_termination_action(&self, name: &str) {
        self.inner.termination_actions.remove(name);
    }

    /// Start every termination action; `done` fires once all complete or
    /// the termination timeout elapses.
    pub fn run_termination_actions(&self, done: ResultCallback) {
        info!(
            actions = self.inner.termination_actions.len(),
            "running termination actions"
        );
        self.inner
            .termination_actions
            .run(self.inner.termination_timeout, done);
    }

    /// Like [`run_termination_actions`](Self::run_termination_actions), but
    /// returns `false` without calling `done` when nothing is registered.
    pub fn run_termination_actions_and_notify(&self, done: ResultCallback) -> bool {
        if self.inner.termination_actions.is_empty() {
            return false;
        }
        self.run_termination_actions(done);
        true
    }

    // ── Power management ─────────────────────────────────────────

    pub fn is_suspending(&self) -> bool {
        self.inner.suspending.get()
    }

    pub fn in_dark_resume(&self) -> bool {
        self.inner.in_dark_resume.get()
    }

    /// The system is about to suspend. `done` fires once every device has
    /// prepared, or with `OperationTimeout` after the termination timeout.
    pub fn on_suspend_imminent(&self, done: ResultCallback) {
        info!("suspend imminent");
        self.inner.suspending.set(true);
        self.inner.in_dark_resume.set(false);
        self.fan_out_to_devices(done, |device, report| device.on_before_suspend(report));
    }

    /// The system woke briefly and will suspend again.
    pub fn on_dark_suspend_imminent(&self, done: ResultCallback) {
        info!("dark suspend imminent");
        self.inner.suspending.set(true);
        self.inner.in_dark_resume.set(true);
        self.fan_out_to_devices(done, |device, report| device.on_dark_resume(report));
    }

    /// The system fully resumed.
    pub fn on_suspend_done(&self) {
        info!("suspend done");
        self.inner.suspending.set(false);
        self.inner.in_dark_resume.set(false);
        // May have been left set during dark resume.
        self.set_suppress_auto_connect(false);
        for service in self.services() {
            service.on_after_resume();
        }
        self.sort_services();
        for device in self.devices() {
            device.on_after_resume();
        }
    }

    fn fan_out_to_devices(
        &self,
        done: ResultCallback,
        action: impl Fn(&dyn Device, ResultCallback),
    ) {
        let devices = self.devices();
        if devices.is_empty() {
            debug!("no devices, power actions complete");
            done(Ok(()));
            return;
        }
        let done: ResultCallback = Box::new(move |result| {
            match &result {
                Ok(()) => info!("power actions complete"),
                Err(e) => info!(error = %e, "power actions finished with error"),
            }
            done(result);
        });
        let aggregator = ResultAggregator::with_timeout(
            done,
            &self.inner.dispatcher,
            self.inner.termination_timeout,
        );
        for device in devices {
            action(device.as_ref(), aggregator.reporter());
        }
    }
}
