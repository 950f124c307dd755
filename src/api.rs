use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::services::ServeDir;
use tracing::info;

use crate::models::{CheckResult, MonitorState};
use crate::storage::{StatusEntry, StatusLog};

pub struct ApiContext {
    pub state: Arc<Mutex<MonitorState>>,
    pub history: StatusLog,
}

pub async fn get_stats(State(ctx): State<Arc<ApiContext>>) -> Json<Vec<CheckResult>> {
    let state = ctx.state.lock().await;
    Json(state.last_results.values().cloned().collect())
}

#[derive(Deserialize)]
pub struct HistoryParams {
    limit: Option<usize>,
}

pub async fn get_history(
    State(ctx): State<Arc<ApiContext>>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<StatusEntry>> {
    Json(ctx.history.tail(params.limit.unwrap_or(100)))
}

pub fn create_router(ctx: Arc<ApiContext>) -> Router {
    Router::new()
        .route("/api/stats", get(get_stats))
        .route("/api/history", get(get_history))
        .fallback_service(ServeDir::new("public"))
        .with_state(ctx)
}

pub async fn start_server(port: u16, ctx: Arc<ApiContext>) {
    let app = create_router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Dashboard: http://localhost:{}", addr.port());
    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind API port");
    axum::serve(listener, app).await.unwrap();
}
