// ── ResultAggregator ──
//
// Fan-in completion tracker. Each concurrent branch holds a clone and
// reports exactly one terminal result; when the last clone is dropped the
// terminal callback receives the first error seen (or success). An
// optional timeout fires the callback early with `OperationTimeout`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::dispatcher::{EventDispatcher, TaskHandle};
use crate::error::{ManagerError, ResultCallback};

/// State shared between the aggregator and its timeout task.
struct Terminal {
    callback: RefCell<Option<ResultCallback>>,
    timed_out: Cell<bool>,
}

impl Terminal {
    fn fire(&self, result: Result<(), ManagerError>) {
        let callback = self.callback.borrow_mut().take();
        if let Some(callback) = callback {
            callback(result);
        }
    }
}

struct AggregatorInner {
    terminal: Rc<Terminal>,
    first_error: RefCell<Option<ManagerError>>,
    got_result: Cell<bool>,
    timeout: Option<TaskHandle>,
}

/// Reference-counted fan-in of N asynchronous branches.
///
/// # Hazard
///
/// If every clone is dropped without a single [`report_result`] and no
/// timeout was armed, the terminal callback is never invoked. Arm a timeout
/// with [`with_timeout`] or guarantee at least one report.
///
/// With a timeout armed and no report, the timeout still fires after the
/// last clone is gone.
///
/// [`report_result`]: Self::report_result
/// [`with_timeout`]: Self::with_timeout
#[derive(Clone)]
pub struct ResultAggregator {
    inner: Rc<AggregatorInner>,
}

impl ResultAggregator {
    pub fn new(callback: ResultCallback) -> Self {
        Self::build(callback, None)
    }

    /// Like [`new`](Self::new), but fires `OperationTimeout` if the branches
    /// have not converged within `timeout`.
    pub fn with_timeout(
        callback: ResultCallback,
        dispatcher: &EventDispatcher,
        timeout: Duration,
    ) -> Self {
        Self::build(callback, Some((dispatcher, timeout)))
    }

    fn build(callback: ResultCallback, timeout: Option<(&EventDispatcher, Duration)>) -> Self {
        let terminal = Rc::new(Terminal {
            callback: RefCell::new(Some(callback)),
            timed_out: Cell::new(false),
        });
        let timeout = timeout.map(|(dispatcher, delay)| {
            let terminal = Rc::clone(&terminal);
            dispatcher.post_delayed_task(
                move || {
                    warn!(timeout_ms = delay.as_millis(), "result aggregation timed out");
                    terminal.timed_out.set(true);
                    terminal.fire(Err(ManagerError::OperationTimeout));
                },
                delay,
            )
        });
        Self {
            inner: Rc::new(AggregatorInner {
                terminal,
                first_error: RefCell::new(None),
                got_result: Cell::new(false),
                timeout,
            }),
        }
    }

    /// Record one branch's terminal result.
    ///
    /// Only the first error is retained; later errors are logged and
    /// dropped. Results arriving after the timeout are ignored.
    pub fn report_result(&self, result: Result<(), ManagerError>) {
        debug_assert!(
            result.as_ref().err().is_none_or(ManagerError::is_terminal),
            "branches must report a terminal result"
        );
        if self.inner.terminal.timed_out.get() {
            debug!(?result, "ignoring result reported after timeout");
            return;
        }
        self.inner.got_result.set(true);
        if let Err(error) = result {
            let mut first = self.inner.first_error.borrow_mut();
            if first.is_none() {
                *first = Some(error);
            } else {
                debug!(%error, "dropping subsequent branch error");
            }
        }
    }

    /// A reporting closure that keeps this aggregator alive until called.
    pub fn reporter(&self) -> ResultCallback {
        let aggregator = self.clone();
        Box::new(move |result| aggregator.report_result(result))
    }

    pub fn timed_out(&self) -> bool {
        self.inner.terminal.timed_out.get()
    }
}

impl Drop for AggregatorInner {
    fn drop(&mut self) {
        if !self.got_result.get() || self.terminal.timed_out.get() {
            return;
        }
        if let Some(timeout) = &self.timeout {
            timeout.cancel();
        }
        let result = match self.first_error.borrow_mut().take() {
            Some(error) => Err(error),
            None => Ok(()),
        };
        self.terminal.fire(result);
    }
}
