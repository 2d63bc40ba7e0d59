use crate::daemon::DiaryDaemon;
use crate::types::NodePhase;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn create_router(daemon: Arc<DiaryDaemon>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/log", get(get_log))
        .route("/read", get(read_diary))
        .route("/write", post(write_value))
        .route("/alive", get(check_alive))
        .with_state(daemon)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub addr: String,
    pub node_id: String,
    pub phase: NodePhase,
    pub round: u64,
    pub message_id: u64,
    pub neighbours: Vec<String>,
}

async fn get_status(State(daemon): State<Arc<DiaryDaemon>>) -> impl IntoResponse {
    let node = daemon.node();
    Json(StatusResponse {
        addr: node.addr().to_string(),
        node_id: node.node_id().to_string(),
        phase: node.phase(),
        round: node.current_round(),
        message_id: node.proposer().message_id(),
        neighbours: node.neighbours(),
    })
}

async fn get_log(State(daemon): State<Arc<DiaryDaemon>>) -> impl IntoResponse {
    Json(daemon.log())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadResponse {
    pub value: String,
}

async fn read_diary(State(daemon): State<Arc<DiaryDaemon>>) -> impl IntoResponse {
    Json(ReadResponse {
        value: daemon.read(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WriteRequest {
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub committed: bool,
}

async fn write_value(
    State(daemon): State<Arc<DiaryDaemon>>,
    Json(req): Json<WriteRequest>,
) -> impl IntoResponse {
    match daemon.write(&req.value).await {
        Ok(committed) => (StatusCode::OK, Json(WriteResponse { committed })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn check_alive(State(daemon): State<Arc<DiaryDaemon>>) -> impl IntoResponse {
    match daemon.is_alive().await {
        Ok(alive) => (StatusCode::OK, Json(serde_json::json!({ "alive": alive }))).into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
