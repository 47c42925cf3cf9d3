//! Core orchestration engine for netpilot.
//!
//! Owns the profile stack, the ranked service registry, and the device list,
//! and coordinates suspend, termination, and technology-enable requests
//! across every device through two fan-in primitives:
//!
//! - **[`HookTable`]**: named-action barrier with a timeout
//! - **[`ResultAggregator`]**: reference-counted fan-in of N branches
//!
//! Everything runs on one [`EventDispatcher`] thread. Registry re-sorts are
//! deferred to the next dispatcher turn and coalesced, so observers see a
//! debounced, stable order.
//!
//! Services, devices, providers, and stores are collaborators implemented
//! outside this crate; the core talks to them only through the traits in
//! [`service`], [`device`], [`provider`], and [`store`].

pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod hook_table;
pub mod manager;
pub mod model;
pub mod profile;
pub mod provider;
pub mod ranking;
pub mod result_aggregator;
pub mod service;
pub mod store;

#[cfg(test)]
mod test_util;

// ── Primary re-exports ──────────────────────────────────────────

pub use config::{DEFAULT_PROFILE_NAME, DEFAULT_TERMINATION_TIMEOUT, ManagerConfig};
pub use device::Device;
pub use dispatcher::{EventDispatcher, TaskHandle};
pub use error::{ErrorKind, ManagerError, ResultCallback};
pub use hook_table::HookTable;
pub use manager::{DefaultServiceCallback, Manager, ManagerEvent, WeakManager};
pub use model::{ConnectState, DEFAULT_TECHNOLOGY_ORDER, ProfileIdentifier, Technology};
pub use profile::{Profile, ProfileKind};
pub use provider::Provider;
pub use ranking::{RankingMode, SortReason};
pub use result_aggregator::ResultAggregator;
pub use service::{Service, ServiceArgs};
pub use store::{
    FileProfileStorage, JsonFileStore, MemoryProfileStorage, MemoryStore, ProfileStorage, Store,
    StoreError,
};
