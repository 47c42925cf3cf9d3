// ── Technology state ──
//
// Per-technology enable requests fan out to every matching device and
// converge through a ResultAggregator.

use tracing::{debug, info, warn};

use super::Manager;
use crate::error::{ManagerError, ResultCallback};
use crate::model::Technology;
use crate::result_aggregator::ResultAggregator;

impl Manager {
    /// Enable or disable every device of technology `name`.
    ///
    /// Validation failures are returned synchronously and `done` is not
    /// called. Otherwise `done` receives the first device failure, or
    /// success once every device has reported. Every matching device gets
    /// the request even when an earlier one fails.
    pub fn set_enabled_state_for_technology(
        &self,
        name: &str,
        enable: bool,
        persist: bool,
        done: ResultCallback,
    ) -> Result<(), ManagerError> {
        let technology = name
            .parse::<Technology>()
            .ok()
            .filter(|t| *t != Technology::Unknown)
            .ok_or_else(|| ManagerError::invalid_arguments(format!("unknown technology {name}")))?;
        if enable && self.is_technology_prohibited(technology) {
            return Err(ManagerError::permission_denied(format!(
                "the {technology} technology is prohibited"
            )));
        }

        let devices: Vec<_> = self
            .devices()
            .into_iter()
            .filter(|d| d.technology() == technology)
            .collect();
        info!(%technology, enable, persist, devices = devices.len(), "setting technology enabled state");
        if devices.is_empty() {
            done(Ok(()));
            return Ok(());
        }

        let aggregator = ResultAggregator::new(done);
        for device in devices {
            device.set_enabled_checked(enable, persist, aggregator.reporter());
        }
        Ok(())
    }

    pub fn is_technology_prohibited(&self, technology: Technology) -> bool {
        self.inner
            .prohibited_technologies
            .borrow()
            .contains(&technology)
    }

    pub fn prohibited_technologies(&self) -> Vec<Technology> {
        self.inner.prohibited_technologies.borrow().clone()
    }

    /// Replace the prohibited list (comma-separated names) and disable every
    /// device of a newly prohibited technology, without persisting.
    pub fn set_prohibited_technologies(&self, list: &str) -> Result<(), ManagerError> {
        let prohibited = Technology::parse_list(list)?;
        for technology in &prohibited {
            let technology = *technology;
            let done: ResultCallback = Box::new(move |result| match result {
                Ok(()) => debug!(%technology, "prohibited technology disabled"),
                Err(e) => warn!(%technology, error = %e, "failed to disable prohibited technology"),
            });
            self.set_enabled_state_for_technology(technology.name(), false, false, done)?;
        }
        *self.inner.prohibited_technologies.borrow_mut() = prohibited;
        Ok(())
    }

    pub fn technology_order(&self) -> Vec<Technology> {
        self.inner.technology_order.borrow().clone()
    }

    /// Replace the preference order (comma-separated names, most preferred
    /// first) and re-rank.
    pub fn set_technology_order(&self, order: &str) -> Result<(), ManagerError> {
        let order = Technology::parse_list(order)?;
        info!(order = %Technology::join_list(&order), "technology order changed");
        *self.inner.technology_order.borrow_mut() = order;
        if self.inner.running.get() {
            self.sort_services();
        }
        Ok(())
    }

    pub fn no_auto_connect_technologies(&self) -> Vec<Technology> {
        self.inner.no_auto_connect_technologies.borrow().clone()
    }

    pub fn set_no_auto_connect_technologies(&self, list: &str) -> Result<(), ManagerError> {
        *self.inner.no_auto_connect_technologies.borrow_mut() = Technology::parse_list(list)?;
        Ok(())
    }
}
