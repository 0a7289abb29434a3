//! WebSocket upgrade and room commands.
//!
//! Clients send JSON commands over the socket:
//!
//! ```json
//! {"action": "join", "run_id": "..."}
//! {"action": "leave", "run_id": "..."}
//! ```
//!
//! Run ids are format-validated before touching the room table. Each
//! command is acknowledged (`joined` / `left` / `error`); joining a run
//! that already finished additionally replays its terminal event (the
//! room registry's catch-up semantics).
//!
//! Each connection gets a bounded outbound queue drained by a dedicated
//! write task, so broadcast publishing never blocks on a client's socket.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use ensemble_core::ids::{ClientId, RunId};

use crate::connection::ClientConnection;
use crate::http::AppState;

/// One parsed room command.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum RoomCommand {
    /// Subscribe to a run's event stream.
    Join {
        /// Target run.
        run_id: String,
    },
    /// Unsubscribe from a run's event stream.
    Leave {
        /// Target run.
        run_id: String,
    },
}

/// Command acknowledgement sent back on the same socket.
#[derive(Debug, Serialize)]
struct Ack {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
    message: String,
}

impl Ack {
    fn joined(run_id: &str) -> Self {
        Self {
            kind: "joined",
            run_id: Some(run_id.to_owned()),
            message: format!("Joined room {run_id}. Waiting for events..."),
        }
    }

    fn left(run_id: &str) -> Self {
        Self {
            kind: "left",
            run_id: Some(run_id.to_owned()),
            message: format!("Left room {run_id}."),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            kind: "error",
            run_id: None,
            message: message.into(),
        }
    }
}

/// `GET /ws` — upgrade to a WebSocket session.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| client_loop(socket, state))
}

/// Per-client session: spawn the write task, process commands until the
/// socket closes, then clean up room memberships.
async fn client_loop(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(state.config.client_queue_depth);
    let conn = Arc::new(ClientConnection::new(ClientId::new(), tx));
    let _ = state.connections.fetch_add(1, Ordering::Relaxed);
    debug!(conn_id = %conn.id, "client connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_sink
                .send(Message::Text(message.as_str().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(Ok(message)) = ws_stream.next().await {
        match message {
            Message::Text(text) => handle_command(&state, &conn, text.as_str()),
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are ignored.
            _ => {}
        }
    }

    state.rooms.remove_connection(&conn);
    let _ = state.connections.fetch_sub(1, Ordering::Relaxed);
    writer.abort();
    debug!(conn_id = %conn.id, "client disconnected");
}

/// Parse and apply one room command, acknowledging on the same socket.
fn handle_command(state: &AppState, conn: &Arc<ClientConnection>, text: &str) {
    let command: RoomCommand = match serde_json::from_str(text) {
        Ok(c) => c,
        Err(_) => {
            warn!(conn_id = %conn.id, "invalid room command");
            let _ = conn.send_json(&Ack::error(
                r#"Invalid command. Send {"action": "join", "run_id": "..."}."#,
            ));
            return;
        }
    };

    match command {
        RoomCommand::Join { run_id } => match RunId::parse(&run_id) {
            Ok(run_id) => {
                let _ = conn.send_json(&Ack::joined(run_id.as_str()));
                // Subscribing after the ack keeps any replay after it.
                state.rooms.subscribe(run_id.as_str(), conn);
            }
            Err(_) => {
                let _ = conn.send_json(&Ack::error("Invalid run_id format provided."));
            }
        },
        RoomCommand::Leave { run_id } => match RunId::parse(&run_id) {
            Ok(run_id) => {
                state.rooms.unsubscribe(run_id.as_str(), conn);
                let _ = conn.send_json(&Ack::left(run_id.as_str()));
            }
            Err(_) => {
                let _ = conn.send_json(&Ack::error("Invalid run_id format provided."));
            }
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use ensemble_runtime::orchestrator::Orchestrator;
    use ensemble_runtime::store::RunStore;

    use crate::config::ServerConfig;
    use crate::rooms::RoomRegistry;

    struct NullPlanner;

    #[async_trait::async_trait]
    impl ensemble_llm::hierarchy::Planner for NullPlanner {
        async fn generate_hierarchy(
            &self,
            _task: &str,
        ) -> Result<Vec<serde_json::Value>, ensemble_llm::errors::PlannerError> {
            Ok(vec![serde_json::json!({"agent_name": "A", "description": "d"})])
        }
    }

    struct NullEngine;

    #[async_trait::async_trait]
    impl ensemble_runtime::engine::ExecutionEngine for NullEngine {
        async fn execute(
            &self,
            _plan: &ensemble_runtime::engine::CrewPlan,
            _sink: Arc<dyn ensemble_runtime::engine::EventSink>,
        ) -> Result<ensemble_runtime::engine::EngineOutcome, ensemble_runtime::engine::EngineFailure>
        {
            Ok(ensemble_runtime::engine::EngineOutcome {
                output: ensemble_runtime::engine::EngineOutput::Raw("ok".into()),
                usage: None,
            })
        }
    }

    fn make_state() -> AppState {
        let store = Arc::new(RunStore::new());
        let rooms = Arc::new(RoomRegistry::new(store.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            rooms.clone(),
            Arc::new(NullPlanner),
            Arc::new(NullEngine),
            Arc::new(ensemble_tokens::pricing::FixedRate(1.0)),
        ));
        AppState {
            orchestrator,
            rooms,
            store,
            connections: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
            config: ServerConfig::default(),
        }
    }

    fn make_conn() -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        (Arc::new(ClientConnection::new(ClientId::new(), tx)), rx)
    }

    fn recv_json(rx: &mut mpsc::Receiver<Arc<String>>) -> serde_json::Value {
        let msg = rx.try_recv().expect("expected a message");
        serde_json::from_str(&msg).unwrap()
    }

    #[tokio::test]
    async fn join_valid_run_id_acks_and_subscribes() {
        let state = make_state();
        let (conn, mut rx) = make_conn();
        let run_id = RunId::new();

        handle_command(
            &state,
            &conn,
            &format!(r#"{{"action": "join", "run_id": "{run_id}"}}"#),
        );

        let ack = recv_json(&mut rx);
        assert_eq!(ack["type"], "joined");
        assert_eq!(ack["run_id"], run_id.as_str());
        assert_eq!(state.rooms.room_size(run_id.as_str()), 1);
    }

    #[tokio::test]
    async fn join_invalid_run_id_rejected() {
        let state = make_state();
        let (conn, mut rx) = make_conn();

        handle_command(&state, &conn, r#"{"action": "join", "run_id": "../etc"}"#);

        let ack = recv_json(&mut rx);
        assert_eq!(ack["type"], "error");
        assert_eq!(state.rooms.room_count(), 0);
    }

    #[tokio::test]
    async fn leave_after_join_removes_membership() {
        let state = make_state();
        let (conn, mut rx) = make_conn();
        let run_id = RunId::new();

        handle_command(
            &state,
            &conn,
            &format!(r#"{{"action": "join", "run_id": "{run_id}"}}"#),
        );
        handle_command(
            &state,
            &conn,
            &format!(r#"{{"action": "leave", "run_id": "{run_id}"}}"#),
        );

        let joined = recv_json(&mut rx);
        assert_eq!(joined["type"], "joined");
        let left = recv_json(&mut rx);
        assert_eq!(left["type"], "left");
        assert_eq!(state.rooms.room_count(), 0);
    }

    #[tokio::test]
    async fn malformed_json_gets_error_ack() {
        let state = make_state();
        let (conn, mut rx) = make_conn();

        handle_command(&state, &conn, "not even json");

        let ack = recv_json(&mut rx);
        assert_eq!(ack["type"], "error");
    }

    #[tokio::test]
    async fn unknown_action_gets_error_ack() {
        let state = make_state();
        let (conn, mut rx) = make_conn();

        handle_command(&state, &conn, r#"{"action": "subscribe", "run_id": "x"}"#);

        let ack = recv_json(&mut rx);
        assert_eq!(ack["type"], "error");
    }

    #[tokio::test]
    async fn join_finished_run_replays_after_ack() {
        let state = make_state();
        let run_id = RunId::new();
        let mut record = ensemble_core::records::RunRecord::new(run_id.as_str(), "task");
        record.final_output = Some("done".into());
        state.store.insert(record).unwrap();

        let (conn, mut rx) = make_conn();
        handle_command(
            &state,
            &conn,
            &format!(r#"{{"action": "join", "run_id": "{run_id}"}}"#),
        );

        let ack = recv_json(&mut rx);
        assert_eq!(ack["type"], "joined");
        let replay = recv_json(&mut rx);
        assert_eq!(replay["type"], "run_complete");
        assert_eq!(replay["data"]["status"], "success");
    }
}
