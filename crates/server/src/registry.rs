//! Authoritative room membership registry.
//!
//! This is the single shared mutable structure in the server: the mapping
//! from room id to the set of peers currently present in it. It knows
//! nothing about connections or transport; the coordinator in [`crate::handlers`]
//! drives it and turns its results into acks and broadcasts.
//!
//! All operations serialize behind one `RwLock`, which is the conservative
//! end of the allowed designs: contention is low and every operation is
//! O(room size) at worst, so a single lock keeps the join/leave/snapshot
//! atomicity contract trivially true.

use huddle_api::{PeerRecord, RoomId};
use std::collections::HashMap;
use tokio::sync::RwLock;

type Room = HashMap<String, PeerRecord>;

/// Mapping of `room id -> { uid -> PeerRecord }`.
///
/// Invariant: a room key exists iff its member map is non-empty. Rooms are
/// created lazily on first join and pruned the moment their last member
/// leaves, so an id observed here always names a live room.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the record for `record.uid` in `room`, creating the
    /// room if absent. A repeat join with the same uid is an upsert, not an
    /// error.
    ///
    /// Returns the full membership taken *after* the insert, as a copy, so
    /// the joiner's ack reflects its own membership without racing it.
    pub async fn join(&self, room: &RoomId, record: PeerRecord) -> Vec<PeerRecord> {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.clone()).or_default();
        members.insert(record.uid.clone(), record);
        members.values().cloned().collect()
    }

    /// Remove `uid` from `room`, deleting the room entirely when it empties.
    ///
    /// Returns whether a record was actually removed. Leaving a room one is
    /// not in (or a room that does not exist) is a no-op, and the caller
    /// only needs the boolean to decide logging; it never surfaces as an
    /// error.
    pub async fn leave(&self, room: &RoomId, uid: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(uid).is_some();
        if members.is_empty() {
            rooms.remove(room);
        }
        removed
    }

    /// Point-in-time copy of a room's membership. Empty when the room does
    /// not exist. Never mutates.
    pub async fn snapshot(&self, room: &RoomId) -> Vec<PeerRecord> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(raw: &str) -> RoomId {
        RoomId::normalize(raw).unwrap()
    }

    fn record(uid: &str, name: &str, media: &str) -> PeerRecord {
        PeerRecord {
            uid: uid.to_string(),
            display_name: name.to_string(),
            media_session_id: media.to_string(),
        }
    }

    /// The post-insert snapshot contains the joiner exactly once.
    #[tokio::test]
    async fn join_snapshot_contains_joiner() {
        let registry = RoomRegistry::new();

        let peers = registry.join(&room("X1"), record("u1", "Ana", "m1")).await;
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].uid, "u1");
        assert_eq!(peers[0].display_name, "Ana");
        assert_eq!(peers[0].media_session_id, "m1");
    }

    /// Rejoining with the same uid replaces the record without growing the
    /// room.
    #[tokio::test]
    async fn repeat_join_is_an_upsert() {
        let registry = RoomRegistry::new();
        let x1 = room("X1");

        registry.join(&x1, record("u1", "Ana", "m1")).await;
        let peers = registry.join(&x1, record("u1", "Ana B", "m2")).await;

        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].display_name, "Ana B");
        assert_eq!(peers[0].media_session_id, "m2");
    }

    /// Normalized ids that differ only in case/whitespace hit the same room.
    #[tokio::test]
    async fn normalized_ids_share_a_room() {
        let registry = RoomRegistry::new();

        registry.join(&room("  abc "), record("u1", "Ana", "m1")).await;
        let peers = registry.join(&room("ABC"), record("u2", "Bea", "m2")).await;

        assert_eq!(peers.len(), 2);
        assert_eq!(registry.room_count().await, 1);
    }

    /// The room key disappears the instant its last member leaves.
    #[tokio::test]
    async fn last_leave_prunes_the_room() {
        let registry = RoomRegistry::new();
        let x1 = room("X1");

        registry.join(&x1, record("u1", "Ana", "m1")).await;
        registry.join(&x1, record("u2", "Bea", "m2")).await;

        assert!(registry.leave(&x1, "u1").await);
        assert_eq!(registry.room_count().await, 1);

        assert!(registry.leave(&x1, "u2").await);
        assert_eq!(registry.room_count().await, 0);
        assert!(registry.snapshot(&x1).await.is_empty());

        // A fresh join recreates the room from scratch.
        let peers = registry.join(&x1, record("u3", "Cy", "m3")).await;
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].uid, "u3");
    }

    /// Leaving a room one is not in is a no-op, not an error.
    #[tokio::test]
    async fn leave_of_non_member_is_a_noop() {
        let registry = RoomRegistry::new();
        let x1 = room("X1");

        assert!(!registry.leave(&x1, "ghost").await);

        registry.join(&x1, record("u1", "Ana", "m1")).await;
        assert!(!registry.leave(&x1, "ghost").await);
        assert_eq!(registry.snapshot(&x1).await.len(), 1);
    }

    #[tokio::test]
    async fn snapshot_of_unknown_room_is_empty() {
        let registry = RoomRegistry::new();
        assert!(registry.snapshot(&room("NOWHERE")).await.is_empty());
    }
}
