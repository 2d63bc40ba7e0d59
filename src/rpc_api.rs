use crate::error::PaxosError;
use crate::paxos::{AddrRequest, NotifyRequest, PaxosRpc, Placeholder};
use crate::types::Message;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;

pub fn create_paxos_router(rpc: PaxosRpc) -> Router {
    Router::new()
        .route("/paxos/prepare", post(handle_prepare))
        .route("/paxos/accept", post(handle_accept))
        .route("/paxos/connect", post(handle_connect))
        .route("/paxos/notify_accepted", post(handle_notify_accepted))
        .route("/paxos/learner_log", post(handle_learner_log))
        .route("/paxos/clean_neighbours", post(handle_clean_neighbours))
        .route("/paxos/alive", post(handle_alive))
        .with_state(rpc)
}

fn reply<T: Serialize>(result: Result<T, PaxosError>) -> Response {
    match result {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn handle_prepare(State(rpc): State<PaxosRpc>, Json(msg): Json<Message>) -> Response {
    reply(rpc.process_prepare_request(&msg))
}

async fn handle_accept(State(rpc): State<PaxosRpc>, Json(msg): Json<Message>) -> Response {
    reply(rpc.process_accept_request(&msg))
}

async fn handle_connect(State(rpc): State<PaxosRpc>, Json(req): Json<AddrRequest>) -> Response {
    reply(rpc.connect_remote_neighbour(&req.addr).await)
}

async fn handle_notify_accepted(
    State(rpc): State<PaxosRpc>,
    Json(req): Json<NotifyRequest>,
) -> impl IntoResponse {
    Json(rpc.notify_about_accepted(&req.addr, &req.message))
}

async fn handle_learner_log(
    State(rpc): State<PaxosRpc>,
    Json(_): Json<Placeholder>,
) -> impl IntoResponse {
    Json(rpc.read_from_learner())
}

async fn handle_clean_neighbours(
    State(rpc): State<PaxosRpc>,
    Json(req): Json<AddrRequest>,
) -> impl IntoResponse {
    Json(rpc.clean_your_neighbours(&req.addr).await)
}

async fn handle_alive(State(rpc): State<PaxosRpc>) -> impl IntoResponse {
    Json(rpc.are_you_alive())
}
