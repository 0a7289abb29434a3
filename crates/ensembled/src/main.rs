//! # ensembled
//!
//! The ensemble server daemon — wires the planner, execution engine,
//! run store, event rooms, and orchestrator together and starts the
//! HTTP/WebSocket server.

#![deny(unsafe_code)]

mod engine;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ensemble_llm::chat::ChatClient;
use ensemble_llm::hierarchy::HierarchyClient;
use ensemble_runtime::orchestrator::Orchestrator;
use ensemble_runtime::store::RunStore;
use ensemble_server::config::ServerConfig;
use ensemble_server::rooms::RoomRegistry;
use ensemble_server::server::EnsembleServer;
use ensemble_server::shutdown::ShutdownCoordinator;
use ensemble_tokens::pricing::UniformBand;

use crate::engine::SequentialChatEngine;

/// Ensemble server daemon.
#[derive(Parser, Debug)]
#[command(name = "ensembled", about = "Multi-agent run orchestration server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Model used by the execution engine.
    #[arg(long, default_value = "gpt-4o")]
    model: String,

    /// Model used for hierarchy generation.
    #[arg(long, default_value = "gpt-3.5-turbo")]
    hierarchy_model: String,

    /// Override the API base URL (proxies, self-hosted endpoints).
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    // Missing the core credential prevents startup entirely; a degraded
    // server that fails every run helps nobody.
    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    if api_key.trim().is_empty() {
        bail!("OPENAI_API_KEY is not set; cannot start server");
    }

    let mut chat = ChatClient::new(api_key).context("building API client")?;
    if let Some(base_url) = &cli.base_url {
        chat = chat.with_base_url(base_url);
    }

    let planner = Arc::new(
        HierarchyClient::new(chat.clone()).with_model(cli.hierarchy_model.clone()),
    );
    let engine = Arc::new(SequentialChatEngine::new(chat, cli.model.clone()));

    let store = Arc::new(RunStore::new());
    let rooms = Arc::new(RoomRegistry::new(store.clone()));
    // Placeholder pricing; swap in a PriceTable for real rates.
    let pricing = Arc::new(UniformBand::default());
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        rooms.clone(),
        planner,
        engine,
        pricing,
    ));

    let config = ServerConfig {
        host: cli.host.clone(),
        port: cli.port,
        ..ServerConfig::default()
    };
    let server = EnsembleServer::new(config, orchestrator, rooms, store);

    info!(
        host = %cli.host,
        port = cli.port,
        model = %cli.model,
        hierarchy_model = %cli.hierarchy_model,
        "starting ensembled"
    );

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let signal_handler = shutdown.clone();
    drop(tokio::spawn(async move {
        signal_handler.shutdown_on_ctrl_c().await;
    }));

    server
        .serve(shutdown.token())
        .await
        .context("server error")?;
    Ok(())
}
