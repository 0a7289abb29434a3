//! WebSocket client connection state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use ensemble_core::ids::ClientId;

/// Represents a connected WebSocket client.
///
/// Outbound messages go through a bounded channel drained by the client's
/// write task. `try_send` keeps publishers non-blocking; drops are counted
/// so the room registry can detach persistently slow clients.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ClientId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// Run rooms this client has joined.
    rooms: Mutex<HashSet<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Count of messages dropped due to a full or closed channel.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ClientId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            rooms: Mutex::new(HashSet::new()),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Record membership in a run room.
    pub fn join_room(&self, run_id: &str) {
        let _ = self.rooms.lock().insert(run_id.to_owned());
    }

    /// Drop membership in a run room.
    pub fn leave_room(&self, run_id: &str) {
        let _ = self.rooms.lock().remove(run_id);
    }

    /// Snapshot of joined rooms.
    pub fn rooms(&self) -> Vec<String> {
        self.rooms.lock().iter().cloned().collect()
    }

    /// Whether the client is currently in the given room.
    pub fn in_room(&self, run_id: &str) -> bool {
        self.rooms.lock().contains(run_id)
    }

    /// Send a text message to the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize a value and send it to the client.
    pub fn send_json<T: serde::Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new(ClientId::from("conn_1"), tx);
        (conn, rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.id.as_str(), "conn_1");
        assert!(conn.rooms().is_empty());
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection();
        let sent = conn.send(Arc::new("hello".into()));
        assert!(sent);
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_returns_false() {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new(ClientId::from("conn_2"), tx);
        drop(rx);
        let sent = conn.send(Arc::new("hello".into()));
        assert!(!sent);
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_returns_false() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(ClientId::from("conn_3"), tx);
        assert!(conn.send(Arc::new("msg1".into())));
        // Channel is now full
        assert!(!conn.send(Arc::new("msg2".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn room_membership() {
        let (conn, _rx) = make_connection();
        conn.join_room("run-1");
        conn.join_room("run-2");
        assert!(conn.in_room("run-1"));
        assert!(conn.in_room("run-2"));
        assert_eq!(conn.rooms().len(), 2);

        conn.leave_room("run-1");
        assert!(!conn.in_room("run-1"));
        assert!(conn.in_room("run-2"));
    }

    #[test]
    fn join_room_idempotent() {
        let (conn, _rx) = make_connection();
        conn.join_room("run-1");
        conn.join_room("run-1");
        assert_eq!(conn.rooms().len(), 1);
    }

    #[tokio::test]
    async fn send_json_serializes() {
        let (conn, mut rx) = make_connection();
        let value = serde_json::json!({"key": "value"});
        assert!(conn.send_json(&value));
        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["key"], "value");
    }

    #[tokio::test]
    async fn send_multiple_messages_in_order() {
        let (conn, mut rx) = make_connection();
        for i in 0..5 {
            assert!(conn.send(Arc::new(format!("msg_{i}"))));
        }
        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(&*msg, &format!("msg_{i}"));
        }
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection();
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        let age2 = conn.age();
        assert!(age2 > age1);
    }
}
