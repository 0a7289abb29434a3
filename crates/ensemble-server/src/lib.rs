//! # ensemble-server
//!
//! The outward-facing surface of ensemble:
//!
//! - [`http`] — submit / list / get run endpoints and the router
//! - [`ws`] — the WebSocket upgrade and join/leave room commands
//! - [`rooms`] — per-run subscriber rooms with late-joiner replay (the
//!   event broadcaster)
//! - [`connection`] — per-client send queue with slow-client accounting
//! - [`health`], [`shutdown`], [`config`], [`server`] — ambient server
//!   plumbing

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod health;
pub mod http;
pub mod rooms;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use config::ServerConfig;
pub use connection::ClientConnection;
pub use http::AppState;
pub use rooms::RoomRegistry;
pub use server::EnsembleServer;
pub use shutdown::ShutdownCoordinator;
