//! Per-run subscriber rooms — the event broadcaster.
//!
//! One room per run identifier, any number of subscribers per room.
//! Publishing serializes the event once and fans the shared string out to
//! every member with a non-blocking `try_send`: a slow or disconnected
//! subscriber never blocks the publisher or other members. Members whose
//! lifetime drop count crosses the threshold are detached from the room.
//!
//! Joining a run whose terminal record already exists triggers a
//! catch-up replay of the `run_complete` event to that subscriber only,
//! so a client arriving after completion still sees the outcome.
//!
//! Publishing to a run with no room is a no-op, not an error. Per-run
//! publish order is delivery order (each run has a single publisher);
//! nothing is guaranteed across different runs' rooms.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use ensemble_core::events::{EventPublisher, RunEvent};
use ensemble_runtime::store::RunStore;

use crate::connection::ClientConnection;

/// Maximum total lifetime message drops before a slow client is detached.
const MAX_TOTAL_DROPS: u64 = 100;

type Room = HashMap<String, Arc<ClientConnection>>;

/// Room membership table plus the run store consulted for replays.
pub struct RoomRegistry {
    store: Arc<RunStore>,
    rooms: RwLock<HashMap<String, Room>>,
}

impl RoomRegistry {
    /// Create a registry that replays terminal results from `store`.
    pub fn new(store: Arc<RunStore>) -> Self {
        Self {
            store,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a subscriber to a run's room.
    ///
    /// If the run already has a terminal record, it is replayed to this
    /// subscriber immediately (and only to it).
    pub fn subscribe(&self, run_id: &str, conn: &Arc<ClientConnection>) {
        {
            let mut rooms = self.rooms.write();
            let room = rooms.entry(run_id.to_owned()).or_default();
            let _ = room.insert(conn.id.to_string(), Arc::clone(conn));
        }
        conn.join_room(run_id);
        debug!(run_id, conn_id = %conn.id, "subscribed to run room");

        if let Some(record) = self.store.get(run_id) {
            debug!(run_id, conn_id = %conn.id, "replaying terminal result to late joiner");
            let _ = conn.send_json(&RunEvent::run_complete(&record));
        }
    }

    /// Remove a subscriber from a run's room.
    pub fn unsubscribe(&self, run_id: &str, conn: &ClientConnection) {
        let mut rooms = self.rooms.write();
        if let Some(room) = rooms.get_mut(run_id) {
            let _ = room.remove(conn.id.as_str());
            if room.is_empty() {
                let _ = rooms.remove(run_id);
            }
        }
        conn.leave_room(run_id);
    }

    /// Remove a disconnected client from every room it joined.
    pub fn remove_connection(&self, conn: &ClientConnection) {
        for run_id in conn.rooms() {
            self.unsubscribe(&run_id, conn);
        }
    }

    /// Deliver an event to every current member of the run's room.
    pub fn publish_to_room(&self, run_id: &str, event: &RunEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(kind = %event.kind, error = %e, "failed to serialize event");
                return;
            }
        };

        let mut to_detach = Vec::new();
        {
            let rooms = self.rooms.read();
            let Some(room) = rooms.get(run_id) else {
                // No subscribers yet; publishing is fire-and-forget.
                return;
            };
            for conn in room.values() {
                if !conn.send(Arc::clone(&json)) {
                    let drops = conn.drop_count();
                    if drops >= MAX_TOTAL_DROPS {
                        warn!(conn_id = %conn.id, run_id, drops, "detaching slow client");
                        to_detach.push(Arc::clone(conn));
                    } else {
                        warn!(
                            conn_id = %conn.id,
                            run_id,
                            total_drops = drops,
                            "failed to send event to client (queue full)"
                        );
                    }
                }
            }
            debug!(kind = %event.kind, run_id, recipients = room.len(), "broadcast event");
        }

        for conn in &to_detach {
            self.unsubscribe(run_id, conn);
        }
    }

    /// Number of subscribers currently in a run's room.
    #[must_use]
    pub fn room_size(&self, run_id: &str) -> usize {
        self.rooms.read().get(run_id).map_or(0, Room::len)
    }

    /// Number of rooms with at least one subscriber.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}

impl EventPublisher for RoomRegistry {
    fn publish(&self, event: RunEvent) {
        self.publish_to_room(&event.run_id, &event);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
