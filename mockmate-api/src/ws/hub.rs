/// Room registry for real-time fan-out
///
/// A room is a named `tokio::sync::broadcast` channel. Rooms are created on
/// first subscription and removed once their last receiver is gone. Delivery
/// is at-most-once: events emitted to a room with no subscribers are dropped,
/// and a subscriber that falls more than the channel capacity behind skips
/// the events it missed.
///
/// Room names:
///
/// - `user_<id>`: everything addressed to a user (credits, payments)
/// - `session_<id>`: interview chat for one session
/// - `alerts_<id>`: a user's notifications
///
/// # Example
///
/// ```
/// use mockmate_api::ws::hub::{user_room, RoomHub};
/// use mockmate_api::ws::events::ServerEvent;
/// use uuid::Uuid;
///
/// # async fn example() {
/// let hub = RoomHub::new();
/// let user_id = Uuid::new_v4();
/// let mut rx = hub.subscribe(&user_room(user_id));
/// hub.emit(&user_room(user_id), ServerEvent::CreditsUpdated { balance: 5 });
/// let event = rx.recv().await.unwrap();
/// assert_eq!(event.name(), "credits_updated");
/// # }
/// ```

use super::events::ServerEvent;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Per-room buffer before slow receivers start lagging
pub const ROOM_CAPACITY: usize = 64;

pub type RoomReceiver = broadcast::Receiver<Arc<ServerEvent>>;

pub fn user_room(user_id: Uuid) -> String {
    format!("user_{}", user_id)
}

pub fn session_room(session_id: Uuid) -> String {
    format!("session_{}", session_id)
}

pub fn alerts_room(user_id: Uuid) -> String {
    format!("alerts_{}", user_id)
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct HubStats {
    pub connections: usize,
    pub rooms: usize,
    pub events_emitted: u64,
    pub events_dropped: u64,
}

pub struct RoomHub {
    rooms: DashMap<String, broadcast::Sender<Arc<ServerEvent>>>,
    connections: AtomicUsize,
    emitted: AtomicU64,
    dropped: AtomicU64,
    capacity: usize,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomHub {
    pub fn new() -> Self {
        Self::with_capacity(ROOM_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            connections: AtomicUsize::new(0),
            emitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Joins a room, creating it if needed
    pub fn subscribe(&self, room: &str) -> RoomReceiver {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drops the room if nobody is listening any more
    ///
    /// Call after the receiver for `room` has been dropped.
    pub fn release(&self, room: &str) {
        if self.rooms.remove_if(room, |_, tx| tx.receiver_count() == 0).is_some() {
            tracing::trace!(room = %room, "Room closed");
        }
    }

    /// Sends to every current subscriber of `room`; returns how many received it
    pub fn emit(&self, room: &str, event: ServerEvent) -> usize {
        let Some(tx) = self.rooms.get(room).map(|r| r.value().clone()) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return 0;
        };

        match tx.send(Arc::new(event)) {
            Ok(n) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
                n
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.release(room);
                0
            }
        }
    }

    pub fn emit_to_user(&self, user_id: Uuid, event: ServerEvent) -> usize {
        self.emit(&user_room(user_id), event)
    }

    pub fn emit_to_session(&self, session_id: Uuid, event: ServerEvent) -> usize {
        self.emit(&session_room(session_id), event)
    }

    pub fn emit_alert(&self, user_id: Uuid, event: ServerEvent) -> usize {
        self.emit(&alerts_room(user_id), event)
    }

    pub fn subscriber_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|tx| tx.receiver_count()).unwrap_or(0)
    }

    /// Counts a socket as connected until the guard is dropped
    pub fn connect(self: &Arc<Self>) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard { hub: Arc::clone(self) }
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.load(Ordering::Relaxed),
            rooms: self.rooms.len(),
            events_emitted: self.emitted.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct ConnectionGuard {
    hub: Arc<RoomHub>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.hub.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let hub = RoomHub::new();
        let room = session_room(Uuid::new_v4());
        let mut a = hub.subscribe(&room);
        let mut b = hub.subscribe(&room);

        assert_eq!(hub.emit(&room, ServerEvent::CreditsUpdated { balance: 2 }), 2);

        assert_eq!(a.recv().await.unwrap().name(), "credits_updated");
        assert_eq!(b.recv().await.unwrap().name(), "credits_updated");
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let hub = RoomHub::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut alice_rx = hub.subscribe(&user_room(alice));
        let mut bob_rx = hub.subscribe(&user_room(bob));

        hub.emit_to_user(alice, ServerEvent::CreditsUpdated { balance: 9 });

        assert!(alice_rx.recv().await.is_ok());
        assert!(matches!(bob_rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let hub = RoomHub::new();
        assert_eq!(hub.emit("user_nobody", ServerEvent::pong()), 0);
        let stats = hub.stats();
        assert_eq!(stats.rooms, 0);
        assert_eq!(stats.events_dropped, 1);
    }

    #[test]
    fn test_room_dropped_after_last_subscriber_leaves() {
        let hub = RoomHub::new();
        let room = alerts_room(Uuid::new_v4());
        let first = hub.subscribe(&room);
        let second = hub.subscribe(&room);
        assert_eq!(hub.subscriber_count(&room), 2);

        drop(first);
        hub.release(&room);
        assert_eq!(hub.stats().rooms, 1);

        drop(second);
        hub.release(&room);
        assert_eq!(hub.stats().rooms, 0);
    }

    #[test]
    fn test_connection_guard_counts() {
        let hub = Arc::new(RoomHub::new());
        let a = hub.connect();
        let b = hub.connect();
        assert_eq!(hub.stats().connections, 2);
        drop(a);
        assert_eq!(hub.stats().connections, 1);
        drop(b);
        assert_eq!(hub.stats().connections, 0);
    }

    #[tokio::test]
    async fn test_slow_receiver_lags_instead_of_blocking() {
        let hub = RoomHub::with_capacity(2);
        let room = user_room(Uuid::new_v4());
        let mut rx = hub.subscribe(&room);

        for balance in 0..5 {
            hub.emit(&room, ServerEvent::CreditsUpdated { balance });
        }

        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(3))));
        assert!(rx.recv().await.is_ok());
    }
}
