// ── Domain model ──
//
// Plain value types shared by the Manager, profiles, and collaborators.

pub mod connect_state;
pub mod identifier;
pub mod technology;

pub use connect_state::ConnectState;
pub use identifier::ProfileIdentifier;
pub use technology::{DEFAULT_TECHNOLOGY_ORDER, Technology};
