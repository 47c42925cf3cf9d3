// ── Service connection state machine ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Connection progress of a service.
///
/// Progresses `Idle → Associating → Configuring → Connected → {Portal, Online}`;
/// any non-terminal state can fall back to `Idle` or `Failure`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectState {
    #[default]
    Unknown,
    Idle,
    Associating,
    Configuring,
    Connected,
    Portal,
    Online,
    Failure,
}

impl ConnectState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Portal | Self::Online)
    }

    pub fn is_connecting(self) -> bool {
        matches!(self, Self::Associating | Self::Configuring)
    }

    pub fn is_failed(self) -> bool {
        self == Self::Failure
    }

    pub fn is_online(self) -> bool {
        self == Self::Online
    }

    pub fn is_portalled(self) -> bool {
        self == Self::Portal
    }

    /// Connected or on the way there.
    pub fn is_active(self) -> bool {
        self.is_connected() || self.is_connecting()
    }
}
