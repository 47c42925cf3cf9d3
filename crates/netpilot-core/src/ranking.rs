// ── Service ranking ──
//
// The registry order is a lexicographic comparison over fifteen criteria,
// first difference wins:
//
//   1. auto-connect          6. connecting        11. priority within technology
//   2. connectable           7. not failed        12. security level
//   3. has ever connected    8. online            13. profile stack position
//   4. connected             9. not portalled     14. technology preference
//   5. dependency           10. priority          15. serial number (lower wins)
//
// A connected service counts as auto-connectable, so a manual connection
// is never ranked below idle candidates. Criterion 5 is pairwise: a
// connected service riding on another connected service ranks directly
// ahead of it. Every other criterion is captured once per sort as a
// `RankKey`, so the order is total and stable even if a service changes
// mid-sort.

use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use std::rc::Rc;

use strum::{Display, IntoStaticStr};

use crate::model::Technology;
use crate::profile::Profile;
use crate::service::Service;

/// Which criteria take part in a ranking pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMode {
    /// Every criterion; the order of the live registry.
    Connectivity,
    /// Ignores auto-connect and current connection state, so connectable
    /// services always precede non-connectable ones.
    CleanSlate,
}

/// The criterion that decided between two services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SortReason {
    AutoConnect,
    Connectable,
    HasEverConnected,
    IsConnected,
    Dependency,
    IsConnecting,
    IsFailed,
    IsOnline,
    IsPortalled,
    Priority,
    PriorityWithinTechnology,
    Security,
    ProfileOrder,
    TechnologyOrder,
    SerialNumber,
}

/// Snapshot of one service's per-service criteria. Greater ranks first.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankKey {
    auto_connect: bool,
    connectable: bool,
    has_ever_connected: bool,
    connected: bool,
    connecting: bool,
    not_failed: bool,
    online: bool,
    not_portalled: bool,
    priority: i32,
    priority_within_technology: i32,
    security: u16,
    profile_rank: usize,
    technology_rank: usize,
    serial: Reverse<u64>,
}

impl RankKey {
    /// Criteria 1-4, which outrank any dependency between two services.
    fn head(&self) -> (bool, bool, bool, bool) {
        (
            self.auto_connect,
            self.connectable,
            self.has_ever_connected,
            self.connected,
        )
    }

    fn head_reason(&self, other: &Self) -> Option<SortReason> {
        [
            (self.auto_connect != other.auto_connect, SortReason::AutoConnect),
            (self.connectable != other.connectable, SortReason::Connectable),
            (
                self.has_ever_connected != other.has_ever_connected,
                SortReason::HasEverConnected,
            ),
            (self.connected != other.connected, SortReason::IsConnected),
        ]
        .into_iter()
        .find_map(|(differs, reason)| differs.then_some(reason))
    }

    fn tail_reason(&self, other: &Self) -> SortReason {
        [
            (self.connecting != other.connecting, SortReason::IsConnecting),
            (self.not_failed != other.not_failed, SortReason::IsFailed),
            (self.online != other.online, SortReason::IsOnline),
            (self.not_portalled != other.not_portalled, SortReason::IsPortalled),
            (self.priority != other.priority, SortReason::Priority),
            (
                self.priority_within_technology != other.priority_within_technology,
                SortReason::PriorityWithinTechnology,
            ),
            (self.security != other.security, SortReason::Security),
            (self.profile_rank != other.profile_rank, SortReason::ProfileOrder),
            (
                self.technology_rank != other.technology_rank,
                SortReason::TechnologyOrder,
            ),
        ]
        .into_iter()
        .find_map(|(differs, reason)| differs.then_some(reason))
        .unwrap_or(SortReason::SerialNumber)
    }
}

/// Sort position of a service. A dependent service borrows the key of the
/// service it rides on (its anchor) and sits just ahead of it.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    anchor: RankKey,
    depth: usize,
    own: RankKey,
}

/// Everything besides the services themselves that ranking depends on.
pub struct RankingContext<'a> {
    pub mode: RankingMode,
    pub technology_order: &'a [Technology],
    /// Profile stack, bottom first.
    pub profiles: &'a [Rc<Profile>],
}

impl<'a> RankingContext<'a> {
    pub fn new(
        mode: RankingMode,
        technology_order: &'a [Technology],
        profiles: &'a [Rc<Profile>],
    ) -> Self {
        Self {
            mode,
            technology_order,
            profiles,
        }
    }

    fn profile_rank(&self, service: &dyn Service) -> usize {
        let Some(profile) = service.profile() else {
            return 0;
        };
        if profile.is_ephemeral() {
            return 0;
        }
        self.profiles
            .iter()
            .position(|p| Rc::ptr_eq(p, &profile))
            .map_or(0, |index| index + 1)
    }

    fn technology_rank(&self, technology: Technology) -> usize {
        self.technology_order
            .iter()
            .position(|t| *t == technology)
            .map_or(0, |index| self.technology_order.len() - index)
    }

    pub fn key(&self, service: &dyn Service) -> RankKey {
        let live = self.mode == RankingMode::Connectivity;
        let connected = service.is_connected();
        RankKey {
            auto_connect: live && (service.auto_connect() || connected),
            connectable: service.connectable(),
            has_ever_connected: service.has_ever_connected(),
            connected: live && connected,
            connecting: live && service.is_connecting(),
            not_failed: !live || !service.is_failed(),
            online: live && service.is_online(),
            not_portalled: !live || !service.is_portalled(),
            priority: service.priority(),
            priority_within_technology: service.priority_within_technology(),
            security: service.security_level(),
            profile_rank: self.profile_rank(service),
            technology_rank: self.technology_rank(service.technology()),
            serial: Reverse(service.serial_number()),
        }
    }

    /// Whether `a` holds a connection that runs over `b`'s connection.
    pub fn is_dependent_on(a: &dyn Service, b: &dyn Service) -> bool {
        a.is_connected()
            && b.is_connected()
            && a.depends_on().as_deref() == Some(b.unique_name())
    }

    /// `Less` when `a` ranks ahead of `b`, with the deciding criterion.
    pub fn compare(&self, a: &dyn Service, b: &dyn Service) -> (Ordering, SortReason) {
        let (left, right) = (self.key(a), self.key(b));
        if let Some(reason) = left.head_reason(&right) {
            return (right.cmp(&left), reason);
        }
        if Self::is_dependent_on(a, b) {
            return (Ordering::Less, SortReason::Dependency);
        }
        if Self::is_dependent_on(b, a) {
            return (Ordering::Greater, SortReason::Dependency);
        }
        (right.cmp(&left), left.tail_reason(&right))
    }

    fn sort_key(
        &self,
        service: &dyn Service,
        ranked: &HashMap<String, (Rc<dyn Service>, RankKey)>,
    ) -> SortKey {
        let own = self.key(service);
        let mut anchor = own;
        let mut depth = 0;
        let mut current: &dyn Service = service;
        // Bounded by the registry size so a dependency cycle terminates.
        while depth < ranked.len() {
            let Some((lower, lower_key)) = current
                .depends_on()
                .and_then(|name| ranked.get(&name))
            else {
                break;
            };
            let dependent = lower_key.head() == anchor.head()
                && Self::is_dependent_on(current, lower.as_ref());
            if !dependent {
                break;
            }
            anchor = *lower_key;
            depth += 1;
            current = lower.as_ref();
        }
        SortKey { anchor, depth, own }
    }

    /// Sort best-first.
    pub fn sort(&self, services: &mut [Rc<dyn Service>]) {
        let ranked: HashMap<String, (Rc<dyn Service>, RankKey)> = services
            .iter()
            .map(|s| {
                (
                    s.unique_name().to_owned(),
                    (Rc::clone(s), self.key(s.as_ref())),
                )
            })
            .collect();
        let mut keyed: Vec<(SortKey, Rc<dyn Service>)> = services
            .iter()
            .map(|s| (self.sort_key(s.as_ref(), &ranked), Rc::clone(s)))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| b.cmp(a));
        for (slot, (_, service)) in services.iter_mut().zip(keyed) {
            *slot = service;
        }
    }
}
