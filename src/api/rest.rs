//! REST surface consumed by the presentation shell.
//!
//! Inbound: credential-changed events and on-demand discovery.
//! Outbound: node set, node summaries, log history and a live log stream.

use std::convert::Infallible;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::domain::automation::{AutomationEngine, EngineError};
use crate::domain::fleet_api::FleetApi;
use crate::domain::node::{NodeSet, NodeSummary};
use crate::logging::{LogItem, LogLine, Logger};

/// Shared application state for all API handlers.
pub struct AppState<A: FleetApi> {
    pub engine: Arc<AutomationEngine<A>>,
    pub logger: Arc<Logger>,
    pub scan_ips: Arc<Vec<IpAddr>>,
    pub internet: Arc<AtomicBool>,
    pub started: Instant,
}

impl<A: FleetApi> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            logger: self.logger.clone(),
            scan_ips: self.scan_ips.clone(),
            internet: self.internet.clone(),
            started: self.started,
        }
    }
}

/// "credential changed" event body from the login view.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStateBody {
    pub logged_in: bool,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub version: String,
    pub uptime_secs: u64,
    pub nodes: usize,
    pub internet: bool,
    pub file_logging: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub node: Option<String>,
}

pub fn router<A: FleetApi>(state: AppState<A>) -> Router {
    Router::new()
        .route("/health", get(health::<A>))
        .route("/api/v1/nodes", get(nodes::<A>))
        .route("/api/v1/nodes/{id}", get(node::<A>))
        .route("/api/v1/nodes/{id}/auth", post(auth_changed::<A>))
        .route("/api/v1/discover", post(discover::<A>))
        .route("/api/v1/logs", get(logs::<A>))
        .route("/api/v1/logs/stream", get(log_stream::<A>))
        .with_state(state)
}

async fn health<A: FleetApi>(State(state): State<AppState<A>>) -> Json<Health> {
    let set = state.engine.node_set().await;
    Json(Health {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
        nodes: set.nodes.len(),
        internet: state.internet.load(Ordering::Relaxed),
        file_logging: state.logger.file_logging_enabled(),
    })
}

async fn nodes<A: FleetApi>(State(state): State<AppState<A>>) -> Json<NodeSet> {
    Json(state.engine.node_set().await)
}

async fn node<A: FleetApi>(
    State(state): State<AppState<A>>,
    Path(id): Path<String>,
) -> Result<Json<NodeSummary>, (StatusCode, String)> {
    state
        .engine
        .node_summary(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

async fn auth_changed<A: FleetApi>(
    State(state): State<AppState<A>>,
    Path(id): Path<String>,
    Json(body): Json<AuthStateBody>,
) -> Result<Json<NodeSummary>, (StatusCode, String)> {
    state.logger.record_debug(
        &format!("MAIN-{id}"),
        &["Auth state received:".into(), LogItem::data(&body)],
    );

    match state.engine.handle_auth(&id, body.logged_in, body.token).await {
        Ok(_) => state
            .engine
            .node_summary(&id)
            .await
            .map(Json)
            .ok_or_else(|| not_found(&id)),
        Err(EngineError::UnknownNode(id)) => Err(not_found(&id)),
    }
}

/// Re-scan the configured IPs and return the merged node set.
async fn discover<A: FleetApi>(State(state): State<AppState<A>>) -> Json<NodeSet> {
    Json(state.engine.discover(&state.scan_ips).await)
}

/// In-memory history, optionally limited to lines about one node.
async fn logs<A: FleetApi>(
    State(state): State<AppState<A>>,
    Query(query): Query<LogQuery>,
) -> Json<Vec<LogLine>> {
    let history = state.logger.history();
    let lines = match query.node {
        Some(node) => history
            .into_iter()
            .filter(|l| l.prefix.contains(&node))
            .collect(),
        None => history,
    };
    Json(lines)
}

async fn log_stream<A: FleetApi>(
    State(state): State<AppState<A>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Lagged receivers skip what they missed.
    let stream = BroadcastStream::new(state.logger.subscribe())
        .filter_map(|line| line.ok().map(|l| Ok(Event::default().event("log").data(l.line))));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn not_found(id: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("unknown node '{id}'"))
}
