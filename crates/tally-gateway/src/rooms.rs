use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use tally_types::events::{GatewayEvent, RoomId};

/// Tracks which live connections are subscribed to which rooms.
///
/// Entirely ephemeral: entries exist only while their connection is open,
/// and everything a connection joined is dropped on disconnect. The maps
/// are never exposed; all access goes through join/leave/publish.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// room -> connections currently subscribed to it
    rooms: RwLock<HashMap<RoomId, HashSet<Uuid>>>,

    /// connection -> (outbound event channel, rooms it joined)
    connections: RwLock<HashMap<Uuid, ConnectionEntry>>,
}

struct ConnectionEntry {
    tx: mpsc::UnboundedSender<GatewayEvent>,
    joined: HashSet<RoomId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                rooms: RwLock::new(HashMap::new()),
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a new live connection. Returns its id and the receiving end
    /// of its outbound event channel.
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(
            conn_id,
            ConnectionEntry {
                tx,
                joined: HashSet::new(),
            },
        );
        (conn_id, rx)
    }

    /// Subscribe a connection to a room. Idempotent; joining a room twice
    /// is the same as joining it once. Unknown connections are ignored.
    ///
    /// Lock order is rooms then connections, everywhere, so concurrent
    /// join/leave/publish/disconnect cannot deadlock each other.
    pub async fn join(&self, conn_id: Uuid, room: RoomId) {
        let mut rooms = self.inner.rooms.write().await;
        let mut connections = self.inner.connections.write().await;

        let Some(entry) = connections.get_mut(&conn_id) else {
            return;
        };
        entry.joined.insert(room);
        rooms.entry(room).or_default().insert(conn_id);
    }

    /// Unsubscribe a connection from a room. Idempotent; a no-op when the
    /// connection was never in the room.
    pub async fn leave(&self, conn_id: Uuid, room: RoomId) {
        let mut rooms = self.inner.rooms.write().await;
        let mut connections = self.inner.connections.write().await;

        if let Some(entry) = connections.get_mut(&conn_id) {
            entry.joined.remove(&room);
        }
        if let Some(members) = rooms.get_mut(&room) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(&room);
            }
        }
    }

    /// Drop a connection, removing it from every room it joined.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        let mut connections = self.inner.connections.write().await;

        let Some(entry) = connections.remove(&conn_id) else {
            return;
        };
        for room in entry.joined {
            if let Some(members) = rooms.get_mut(&room) {
                members.remove(&conn_id);
                if members.is_empty() {
                    rooms.remove(&room);
                }
            }
        }
    }

    /// Push an event to every connection currently in the room. Best-effort
    /// and unacknowledged: a room with no subscribers is a silent no-op, and
    /// a send to a closing connection is dropped. Returns how many
    /// connections the event was handed to.
    pub async fn publish(&self, room: RoomId, event: GatewayEvent) -> usize {
        let rooms = self.inner.rooms.read().await;
        let Some(members) = rooms.get(&room) else {
            debug!("publish to empty room {}", room);
            return 0;
        };

        let connections = self.inner.connections.read().await;
        let mut delivered = 0;
        for conn_id in members {
            if let Some(entry) = connections.get(conn_id) {
                if entry.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Number of connections currently in a room.
    pub async fn room_size(&self, room: RoomId) -> usize {
        self.inner
            .rooms
            .read()
            .await
            .get(&room)
            .map_or(0, HashSet::len)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::models::{ChatMessage, PersonalMessage};

    fn test_event() -> GatewayEvent {
        GatewayEvent::ReceiveMessage {
            message: ChatMessage::Personal(PersonalMessage {
                id: 1,
                sender_id: 1,
                receiver_id: 2,
                body: "hi".into(),
                is_seen: false,
                created_at: chrono::DateTime::default(),
            }),
        }
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let registry = RoomRegistry::new();
        let (conn, mut rx) = registry.register().await;

        registry.join(conn, RoomId::User(1)).await;
        registry.join(conn, RoomId::User(1)).await;
        assert_eq!(registry.room_size(RoomId::User(1)).await, 1);

        assert_eq!(registry.publish(RoomId::User(1), test_event()).await, 1);
        assert!(rx.try_recv().is_ok());
        // One join, one delivery; the double join did not duplicate it
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_is_idempotent_and_tolerates_absence() {
        let registry = RoomRegistry::new();
        let (conn, _rx) = registry.register().await;

        // Leaving a room never joined is a no-op
        registry.leave(conn, RoomId::Group(3)).await;

        registry.join(conn, RoomId::Group(3)).await;
        registry.leave(conn, RoomId::Group(3)).await;
        registry.leave(conn, RoomId::Group(3)).await;
        assert_eq!(registry.room_size(RoomId::Group(3)).await, 0);
    }

    #[tokio::test]
    async fn disconnect_removes_from_all_rooms() {
        let registry = RoomRegistry::new();
        let (conn, _rx) = registry.register().await;
        registry.join(conn, RoomId::User(1)).await;
        registry.join(conn, RoomId::Group(2)).await;

        registry.disconnect(conn).await;

        assert_eq!(registry.room_size(RoomId::User(1)).await, 0);
        assert_eq!(registry.room_size(RoomId::Group(2)).await, 0);
        assert_eq!(registry.publish(RoomId::User(1), test_event()).await, 0);
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber_once() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = registry.register().await;
        let (b, mut rx_b) = registry.register().await;
        let (_c, mut rx_c) = registry.register().await;

        registry.join(a, RoomId::Group(7)).await;
        registry.join(b, RoomId::Group(7)).await;

        assert_eq!(registry.publish(RoomId::Group(7), test_event()).await, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_to_empty_room_is_silent() {
        let registry = RoomRegistry::new();
        assert_eq!(registry.publish(RoomId::User(99), test_event()).await, 0);
    }
}
