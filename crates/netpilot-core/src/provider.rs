// ── Provider contract ──
//
// One provider per technology materializes services from profile entries
// and from configuration requests.

use std::rc::Rc;

use crate::error::ManagerError;
use crate::model::Technology;
use crate::profile::Profile;
use crate::service::{Service, ServiceArgs};

pub trait Provider {
    fn technology(&self) -> Technology;

    /// Create and register services for the entries stored in `profile`.
    fn create_services_from_profile(&self, profile: &Rc<Profile>);

    /// Find or create the service described by `args`.
    fn get_service(&self, args: &ServiceArgs) -> Result<Rc<dyn Service>, ManagerError>;

    /// A registered service matching `args`, without creating one.
    fn find_similar_service(&self, args: &ServiceArgs) -> Result<Rc<dyn Service>, ManagerError>;

    /// An unregistered service used only to write configuration to a profile.
    fn create_temporary_service(&self, args: &ServiceArgs)
    -> Result<Rc<dyn Service>, ManagerError>;

    fn start(&self);

    fn stop(&self);
}
