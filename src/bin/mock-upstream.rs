//! Switchable upstream for local failover testing.
//!
//! Serves `GET /score` with its name while on and a 500 while off.
//! `/admin/on`, `/admin/off` and `/admin/status` flip and report the switch.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use clap::Parser;

#[derive(Parser)]
#[command(name = "mock-upstream")]
#[command(about = "Mock upstream service with an on/off switch", long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 3001)]
    port: u16,

    /// Name returned in the response body
    #[arg(short, long, default_value = "Buro X")]
    name: String,

    /// Start switched off
    #[arg(long)]
    off: bool,
}

#[derive(Clone)]
struct MockState {
    name: Arc<str>,
    on: Arc<AtomicBool>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let state = MockState {
        name: args.name.clone().into(),
        on: Arc::new(AtomicBool::new(!args.off)),
    };

    let app = Router::new()
        .route("/score", get(score))
        .route("/admin/on", get(switch_on))
        .route("/admin/off", get(switch_off))
        .route("/admin/status", get(status))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, name = %args.name, "Mock upstream listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn score(State(state): State<MockState>) -> impl IntoResponse {
    if state.on.load(Ordering::SeqCst) {
        (StatusCode::OK, state.name.to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{} ERROR (off)", state.name))
    }
}

async fn switch_on(State(state): State<MockState>) -> impl IntoResponse {
    state.on.store(true, Ordering::SeqCst);
    tracing::info!(name = %state.name, "Switched on");
    format!("{} on", state.name)
}

async fn switch_off(State(state): State<MockState>) -> impl IntoResponse {
    state.on.store(false, Ordering::SeqCst);
    tracing::info!(name = %state.name, "Switched off");
    format!("{} off", state.name)
}

async fn status(State(state): State<MockState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "is_on": state.on.load(Ordering::SeqCst) }))
}
