//! Review server - HTTP front-end for the pull-request review pipeline.

mod routes;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use clap::Parser;
use reviewer::io::config::{DEFAULT_CONFIG_PATH, load_config};
use reviewer::io::worker::CodexWorker;
use reviewer::pipeline::ReviewPipeline;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "reviewer-server")]
#[command(about = "HTTP API for automated pull-request reviews")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "5000")]
    port: u16,

    /// Reviewer config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("reviewer_server=info".parse()?)
                .add_directive("reviewer=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = load_config(&args.config)?;
    info!(config = %args.config.display(), "starting reviewer-server");
    let worker = CodexWorker::new(
        config.worker.clone(),
        config.pipeline.prompt_budget_bytes,
        config.pipeline.stage_timeout(),
    );
    let state = AppState::new(ReviewPipeline::new(Arc::new(worker), config)?);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::api_router())
        .route("/events", get(sse::events_handler))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
