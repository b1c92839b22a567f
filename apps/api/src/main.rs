mod config;
mod documents;
mod errors;
mod evaluation;
mod llm_client;
mod mailbox;
mod models;
mod pipeline;
mod ranking;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::documents::DocumentStore;
use crate::evaluation::LlmEvaluator;
use crate::llm_client::LlmClient;
use crate::mailbox::client::GmailClient;
use crate::pipeline::Pipeline;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ranker API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize evaluator
    let llm = LlmClient::new(config.llm_config())?;
    info!("LLM client initialized (model: {})", llm.model());
    let evaluator = Arc::new(LlmEvaluator::new(Arc::new(llm)));

    // Initialize document store
    let store = DocumentStore::new(&config.uploads_dir);
    info!("Document store at {}", store.root().display());

    let mut pipeline = Pipeline::new(store, evaluator, config.pipeline_settings());

    // Mailbox sourcing is optional
    match config.gmail_config() {
        Some(gmail_config) => {
            pipeline = pipeline.with_mailbox(Arc::new(GmailClient::new(gmail_config)?));
            info!("Mailbox client initialized");
        }
        None => warn!("GMAIL_ACCESS_TOKEN not set; mailbox runs are disabled"),
    }

    let state = AppState::new(Arc::new(pipeline));

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
