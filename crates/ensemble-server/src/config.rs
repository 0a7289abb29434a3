//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the ensemble server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Per-client outbound queue depth; events beyond it are dropped
    /// for that client rather than blocking the publisher.
    pub client_queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            client_queue_depth: 64,
        }
    }
}
