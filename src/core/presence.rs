//! Presence registry: tracks connected participants and their
//! online/offline state.
//!
//! Participants are created on first registration and retained (marked
//! offline) on disconnect so history entries always resolve to a display
//! name. Registration is idempotent: re-registering an id overwrites the
//! display name and role set (last write wins) but never touches the
//! online flag — that changes only via explicit `set_online` calls.
//!
//! The map is sharded by id hash so writes for unrelated participants
//! proceed in parallel; only same-shard writes serialize.

use crate::core::config::REGISTRY_SHARDS;
use crate::core::event::{CoreEvent, EventBus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

// ── Participant model ────────────────────────────────────────────────────────

/// What a participant is allowed to do, chosen on the role-selection screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleSet {
    Sender,
    Receiver,
    Both,
}

impl RoleSet {
    pub fn can_send(&self) -> bool {
        matches!(self, RoleSet::Sender | RoleSet::Both)
    }

    pub fn can_receive(&self) -> bool {
        matches!(self, RoleSet::Receiver | RoleSet::Both)
    }
}

/// One registered participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Opaque user id.
    pub id: String,
    /// Name the participant last advertised.
    pub display_name: String,
    /// Role capability set.
    pub roles: RoleSet,
    /// Current connectivity. Changed only via `set_online`.
    pub online: bool,
    /// Unix timestamp (seconds) of the last registration or presence change.
    pub last_seen: u64,
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Sharded, concurrently-read, serialized-write participant map.
#[derive(Debug)]
pub struct PresenceRegistry {
    shards: Vec<RwLock<HashMap<String, Participant>>>,
    bus: EventBus,
}

impl PresenceRegistry {
    pub fn new(bus: EventBus) -> Self {
        let shards = (0..REGISTRY_SHARDS).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards, bus }
    }

    fn shard(&self, id: &str) -> &RwLock<HashMap<String, Participant>> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Register a participant, or refresh an existing registration.
    ///
    /// Idempotent: the display name and role set take the incoming values,
    /// the online flag is left untouched. New participants start offline
    /// until an explicit `set_online(id, true)`.
    pub fn register(&self, id: &str, display_name: &str, roles: RoleSet) {
        let mut shard = self.shard(id).write();
        let now = now_unix();
        shard
            .entry(id.to_string())
            .and_modify(|p| {
                p.display_name = display_name.to_string();
                p.roles = roles;
                p.last_seen = now;
            })
            .or_insert_with(|| {
                debug!(participant = %id, "participant registered");
                Participant {
                    id: id.to_string(),
                    display_name: display_name.to_string(),
                    roles,
                    online: false,
                    last_seen: now,
                }
            });
    }

    /// Flip a participant's online flag.
    ///
    /// Emits a presence-changed event only on an actual transition; setting
    /// the current value again is a silent no-op. Returns `false` if the id
    /// is unknown.
    pub fn set_online(&self, id: &str, online: bool) -> bool {
        let event = {
            let mut shard = self.shard(id).write();
            let Some(p) = shard.get_mut(id) else {
                return false;
            };
            p.last_seen = now_unix();
            if p.online == online {
                None
            } else {
                p.online = online;
                Some(CoreEvent::PresenceChanged {
                    participant_id: p.id.clone(),
                    display_name: p.display_name.clone(),
                    online,
                })
            }
        };
        if let Some(event) = event {
            debug!(participant = %id, online, "presence changed");
            self.bus.publish(event);
        }
        true
    }

    /// Look up a participant by id.
    pub fn lookup(&self, id: &str) -> Option<Participant> {
        self.shard(id).read().get(id).cloned()
    }

    /// Whether the participant exists and is currently online.
    pub fn is_online(&self, id: &str) -> bool {
        self.shard(id).read().get(id).is_some_and(|p| p.online)
    }

    /// Snapshot of all currently online participants, for the user list.
    pub fn list_online(&self) -> Vec<Participant> {
        self.shards
            .iter()
            .flat_map(|s| {
                s.read()
                    .values()
                    .filter(|p| p.online)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Count of currently online participants.
    pub fn online_count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().values().filter(|p| p.online).count())
            .sum()
    }
}

/// Get current Unix timestamp in seconds.
fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (PresenceRegistry, EventBus) {
        let bus = EventBus::new();
        (PresenceRegistry::new(bus.clone()), bus)
    }

    #[test]
    fn register_is_idempotent_and_last_write_wins() {
        let (reg, _bus) = registry();
        reg.register("alice", "Alice", RoleSet::Sender);
        reg.register("alice", "Alice L.", RoleSet::Both);

        let p = reg.lookup("alice").unwrap();
        assert_eq!(p.display_name, "Alice L.");
        assert_eq!(p.roles, RoleSet::Both);
        // Registration never infers the online flag.
        assert!(!p.online);
    }

    #[test]
    fn set_online_emits_only_on_transition() {
        let (reg, bus) = registry();
        let mut rx = bus.subscribe();
        reg.register("bob", "Bob", RoleSet::Receiver);

        assert!(reg.set_online("bob", true));
        assert!(reg.set_online("bob", true)); // no-op, no second event
        assert!(reg.set_online("bob", false));

        let first = rx.try_recv().unwrap();
        assert!(matches!(first, CoreEvent::PresenceChanged { online: true, .. }));
        let second = rx.try_recv().unwrap();
        assert!(matches!(second, CoreEvent::PresenceChanged { online: false, .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn set_online_unknown_participant_is_rejected() {
        let (reg, _bus) = registry();
        assert!(!reg.set_online("ghost", true));
        assert!(reg.lookup("ghost").is_none());
    }

    #[test]
    fn list_online_snapshots_only_online_participants() {
        let (reg, _bus) = registry();
        for (id, online) in [("a", true), ("b", false), ("c", true)] {
            reg.register(id, id, RoleSet::Both);
            reg.set_online(id, online);
        }

        let mut ids: Vec<String> = reg.list_online().into_iter().map(|p| p.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(reg.online_count(), 2);
        assert!(reg.is_online("a"));
        assert!(!reg.is_online("b"));
    }

    #[test]
    fn role_capabilities() {
        assert!(RoleSet::Sender.can_send());
        assert!(!RoleSet::Sender.can_receive());
        assert!(RoleSet::Receiver.can_receive());
        assert!(!RoleSet::Receiver.can_send());
        assert!(RoleSet::Both.can_send() && RoleSet::Both.can_receive());
    }
}
