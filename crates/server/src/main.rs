//! Switchboard Server
//!
//! Mediates customer-support conversations between an automated agent, the
//! customer widget, and human operator consoles. Operators get real-time
//! events over WebSocket; the widget learns everything by polling.

mod assembler;
mod auth;
mod error;
mod hub;
mod lifecycle;
mod logging;
mod migrations;
mod responder;
mod routes;
mod state;
mod store;
mod websocket;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::responder::Responder;
use crate::state::AppState;
use crate::store::Store;

#[derive(Debug, Parser)]
#[command(name = "switchboard", about = "Handoff mediation server")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "SWITCHBOARD_BIND", default_value = "127.0.0.1:4100")]
    bind: SocketAddr,

    /// Database path (defaults to ~/.switchboard/switchboard.db)
    #[arg(long, env = "SWITCHBOARD_DB")]
    db: Option<PathBuf>,

    /// Upstream automated-agent endpoint; without it a canned reply is used
    #[arg(long, env = "SWITCHBOARD_AGENT_URL")]
    agent_url: Option<String>,

    /// Upper bound on the recent-turns window accepted at escalation
    #[arg(long, env = "SWITCHBOARD_MAX_CONTEXT_TURNS", default_value_t = 20)]
    max_context_turns: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _logging = logging::init_logging()?;

    info!(
        component = "server",
        event = "server.starting",
        bind = %args.bind,
        "Starting Switchboard server"
    );

    let db_path = args.db.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| "/tmp".into())
            .join(".switchboard")
            .join("switchboard.db")
    });
    let store = Store::open(db_path).await?;

    let responder = Responder::from_endpoint(args.agent_url);
    let state = AppState::new(store, responder, args.max_context_turns);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    info!(
        component = "server",
        event = "server.listening",
        bind = %args.bind,
        "Listening"
    );

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
