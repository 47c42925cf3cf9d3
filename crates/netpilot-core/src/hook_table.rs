// ── HookTable ──
//
// Named-action barrier. `run` starts every registered action and invokes
// `done` once all of them have called `action_complete`, or with
// `OperationTimeout` once the timeout elapses, whichever happens first.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dispatcher::{EventDispatcher, TaskHandle};
use crate::error::{ManagerError, ResultCallback};

/// Start closure of a hook action.
pub type HookStart = Rc<dyn Fn()>;

struct HookAction {
    start: HookStart,
    started: bool,
    completed: bool,
}

struct HookTableInner {
    dispatcher: EventDispatcher,
    actions: RefCell<BTreeMap<String, HookAction>>,
    done: RefCell<Option<ResultCallback>>,
    timeout: RefCell<Option<TaskHandle>>,
}

/// Cheaply cloneable handle to a set of named actions.
#[derive(Clone)]
pub struct HookTable {
    inner: Rc<HookTableInner>,
}

impl HookTable {
    pub fn new(dispatcher: EventDispatcher) -> Self {
        Self {
            inner: Rc::new(HookTableInner {
                dispatcher,
                actions: RefCell::new(BTreeMap::new()),
                done: RefCell::new(None),
                timeout: RefCell::new(None),
            }),
        }
    }

    /// Register `start` under `name`, replacing any action of that name.
    pub fn add(&self, name: impl Into<String>, start: impl Fn() + 'static) {
        let name = name.into();
        let previous = self.inner.actions.borrow_mut().insert(
            name.clone(),
            HookAction {
                start: Rc::new(start),
                started: false,
                completed: false,
            },
        );
        if previous.is_some() {
            debug!(action = %name, "replaced hook action");
        }
    }

    /// Unregister `name`. Does not by itself complete a running table.
    pub fn remove(&self, name: &str) {
        self.inner.actions.borrow_mut().remove(name);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.actions.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.actions.borrow().len()
    }

    /// Start every action and wait up to `timeout` for all to complete.
    ///
    /// An empty table completes synchronously with success.
    pub fn run(&self, timeout: Duration, done: ResultCallback) {
        if self.is_empty() {
            done(Ok(()));
            return;
        }

        if let Some(stale) = self.inner.timeout.borrow_mut().take() {
            stale.cancel();
        }
        *self.inner.done.borrow_mut() = Some(done);

        let weak: Weak<HookTableInner> = Rc::downgrade(&self.inner);
        let handle = self.inner.dispatcher.post_delayed_task(
            move || {
                if let Some(inner) = weak.upgrade() {
                    HookTable { inner }.actions_timed_out();
                }
            },
            timeout,
        );
        *self.inner.timeout.borrow_mut() = Some(handle);

        // Everything is marked started before anything runs, so an action
        // completing inline cannot make the table look finished early.
        let starts: Vec<HookStart> = self
            .inner
            .actions
            .borrow_mut()
            .values_mut()
            .map(|action| {
                action.started = true;
                action.completed = false;
                Rc::clone(&action.start)
            })
            .collect();
        debug!(actions = starts.len(), timeout_ms = timeout.as_millis(), "running hook actions");
        for start in starts {
            start();
        }
    }

    /// Mark `name` completed; fires `done(Ok)` once every started action has
    /// completed.
    pub fn action_complete(&self, name: &str) {
        if let Some(action) = self.inner.actions.borrow_mut().get_mut(name) {
            if action.started && !action.completed {
                action.completed = true;
            }
        }
        if !self.all_actions_complete() {
            return;
        }
        let done = self.inner.done.borrow_mut().take();
        if let Some(done) = done {
            if let Some(timeout) = self.inner.timeout.borrow_mut().take() {
                timeout.cancel();
            }
            info!("all hook actions completed");
            done(Ok(()));
        }
    }

    fn all_actions_complete(&self) -> bool {
        self.inner
            .actions
            .borrow()
            .values()
            .all(|action| !action.started || action.completed)
    }

    fn actions_timed_out(&self) {
        self.inner.timeout.borrow_mut().take();
        let done = self.inner.done.borrow_mut().take();
        if let Some(done) = done {
            let pending: Vec<String> = self
                .inner
                .actions
                .borrow()
                .iter()
                .filter(|(_, action)| action.started && !action.completed)
                .map(|(name, _)| name.clone())
                .collect();
            warn!(?pending, "hook actions timed out");
            done(Err(ManagerError::OperationTimeout));
        }
    }
}
