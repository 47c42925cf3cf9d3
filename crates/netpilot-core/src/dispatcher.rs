// ── Event dispatcher ──
//
// Single-threaded task queue with delayed tasks. Every Manager mutation,
// deferred sort, and timeout runs as a task on this queue, so ordering is
// FIFO per deadline and no locks are needed anywhere in the core.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

type Task = Box<dyn FnOnce()>;
type TaskKey = (Instant, u64);

struct DispatcherInner {
    queue: RefCell<BTreeMap<TaskKey, Task>>,
    next_seq: Cell<u64>,
    wake: Notify,
}

/// Cheaply cloneable handle to the event loop.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Rc<DispatcherInner>,
}

/// Revocation handle for a posted task.
///
/// Dropping the handle does not cancel the task.
#[derive(Clone)]
pub struct TaskHandle {
    dispatcher: Weak<DispatcherInner>,
    key: TaskKey,
}

impl TaskHandle {
    /// Revoke the task. Returns `true` if it was still queued.
    pub fn cancel(&self) -> bool {
        self.dispatcher
            .upgrade()
            .is_some_and(|inner| inner.queue.borrow_mut().remove(&self.key).is_some())
    }

    /// Whether the task is still waiting to run.
    pub fn is_pending(&self) -> bool {
        self.dispatcher
            .upgrade()
            .is_some_and(|inner| inner.queue.borrow().contains_key(&self.key))
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("seq", &self.key.1)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DispatcherInner {
                queue: RefCell::new(BTreeMap::new()),
                next_seq: Cell::new(0),
                wake: Notify::new(),
            }),
        }
    }

    /// Queue `task` for the next turn.
    pub fn post_task(&self, task: impl FnOnce() + 'static) -> TaskHandle {
        self.post_at(Instant::now(), Box::new(task))
    }

    /// Queue `task` to run once `delay` has elapsed.
    pub fn post_delayed_task(&self, task: impl FnOnce() + 'static, delay: Duration) -> TaskHandle {
        self.post_at(Instant::now() + delay, Box::new(task))
    }

    fn post_at(&self, deadline: Instant, task: Task) -> TaskHandle {
        let seq = self.inner.next_seq.get();
        self.inner.next_seq.set(seq + 1);
        let key = (deadline, seq);
        self.inner.queue.borrow_mut().insert(key, task);
        self.inner.wake.notify_one();
        TaskHandle {
            dispatcher: Rc::downgrade(&self.inner),
            key,
        }
    }

    /// Number of queued tasks, due or not.
    pub fn pending_tasks(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Deadline of the earliest queued task.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.queue.borrow().keys().next().map(|(deadline, _)| *deadline)
    }

    /// Run one turn: every task that is due when the turn starts.
    ///
    /// Tasks posted while the turn is running wait for the next turn. A task
    /// revoked by an earlier task of the same turn does not run.
    pub fn run_pending(&self) -> usize {
        let now = Instant::now();
        let seq_limit = self.inner.next_seq.get();
        let due: Vec<TaskKey> = self
            .inner
            .queue
            .borrow()
            .range(..=(now, u64::MAX))
            .map(|(key, _)| *key)
            .filter(|(_, seq)| *seq < seq_limit)
            .collect();

        let mut ran = 0;
        for key in due {
            let task = self.inner.queue.borrow_mut().remove(&key);
            if let Some(task) = task {
                task();
                ran += 1;
            }
        }
        if ran > 0 {
            trace!(tasks = ran, "dispatcher turn complete");
        }
        ran
    }

    /// Run turns until nothing is due at the current instant.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_pending();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    /// Drive the loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            self.run_pending();
            let deadline = self.next_deadline();
            let sleep = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.inner.wake.notified() => {}
                () = sleep => {}
            }
        }
    }
}
