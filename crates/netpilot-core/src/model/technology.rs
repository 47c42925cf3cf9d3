// ── Technology identifiers ──

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::ManagerError;

/// Built-in preference order used when no other order is configured.
pub const DEFAULT_TECHNOLOGY_ORDER: &str = "vpn,ethernet,wifi,wimax,cellular";

/// A category of connectivity, each backed by its own provider.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    Ethernet,
    EthernetEap,
    Wifi,
    WiMax,
    Cellular,
    Vpn,
    Tunnel,
    Ppp,
    PPPoE,
    Loopback,
    Unknown,
}

impl Technology {
    /// Technologies that provide a host's primary uplink.
    pub fn is_primary_connectivity(self) -> bool {
        matches!(
            self,
            Self::Ethernet | Self::Wifi | Self::WiMax | Self::Cellular
        )
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Parse a comma-separated list such as `"vpn,ethernet,wifi"`.
    ///
    /// Whitespace around names is ignored and an empty string yields an
    /// empty list. Unknown names and duplicates are rejected.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, ManagerError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for raw in list.split(',') {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            let technology: Self = name.parse().map_err(|_| {
                ManagerError::invalid_arguments(format!("unknown technology '{name}'"))
            })?;
            if technology == Self::Unknown {
                return Err(ManagerError::invalid_arguments(format!(
                    "unknown technology '{name}'"
                )));
            }
            if !seen.insert(technology) {
                return Err(ManagerError::invalid_arguments(format!(
                    "technology '{name}' listed more than once"
                )));
            }
            out.push(technology);
        }
        Ok(out)
    }

    /// Inverse of [`parse_list`](Self::parse_list).
    pub fn join_list(list: &[Self]) -> String {
        list.iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn default_order() -> Vec<Self> {
        vec![
            Self::Vpn,
            Self::Ethernet,
            Self::Wifi,
            Self::WiMax,
            Self::Cellular,
        ]
    }
}
