use crate::error::{PaxosError, PaxosResult};
use crate::paxos::AddrRequest;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub addr: String,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

struct MemberEntry {
    member: Member,
    seen: Instant,
}

/// Membership table handed to joining nodes. Members that stop heartbeating
/// are evicted by [`Registry::evict_expired`].
#[derive(Clone)]
pub struct Registry {
    members: Arc<Mutex<HashMap<String, MemberEntry>>>,
    heartbeat_timeout: Duration,
}

impl Registry {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            members: Arc::new(Mutex::new(HashMap::new())),
            heartbeat_timeout,
        }
    }

    /// Enrolls `addr` and returns every other current member.
    pub fn register(&self, addr: &str) -> PaxosResult<Vec<String>> {
        let mut members = self.members.lock();
        if members.contains_key(addr) {
            return Err(PaxosError::AddressAlreadyRegistered(addr.to_string()));
        }
        let now = Utc::now();
        members.insert(
            addr.to_string(),
            MemberEntry {
                member: Member {
                    addr: addr.to_string(),
                    registered_at: now,
                    last_heartbeat: now,
                },
                seen: Instant::now(),
            },
        );
        info!(addr = %addr, "registered member");

        let mut peers: Vec<String> = members
            .keys()
            .filter(|a| a.as_str() != addr)
            .cloned()
            .collect();
        peers.sort();
        Ok(peers)
    }

    pub fn heartbeat(&self, addr: &str) -> PaxosResult<()> {
        let mut members = self.members.lock();
        let entry = members
            .get_mut(addr)
            .ok_or_else(|| PaxosError::UnknownKey(addr.to_string()))?;
        entry.member.last_heartbeat = Utc::now();
        entry.seen = Instant::now();
        Ok(())
    }

    pub fn check_alive(&self, addr: &str) -> bool {
        self.members.lock().contains_key(addr)
    }

    pub fn members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self
            .members
            .lock()
            .values()
            .map(|e| e.member.clone())
            .collect();
        members.sort_by(|a, b| a.addr.cmp(&b.addr));
        members
    }

    pub fn evict_expired(&self) -> Vec<String> {
        let timeout = self.heartbeat_timeout;
        let mut evicted = Vec::new();
        self.members.lock().retain(|addr, entry| {
            let alive = entry.seen.elapsed() <= timeout;
            if !alive {
                evicted.push(addr.clone());
            }
            alive
        });
        for addr in &evicted {
            info!(addr = %addr, "member timed out");
        }
        evicted
    }

    pub fn spawn_monitor(&self) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(registry.heartbeat_timeout / 2);
            loop {
                interval.tick().await;
                let evicted = registry.evict_expired();
                debug!(evicted = evicted.len(), "membership sweep");
            }
        })
    }
}

pub fn create_rendezvous_router(registry: Registry) -> Router {
    Router::new()
        .route("/register", post(handle_register))
        .route("/heartbeat", post(handle_heartbeat))
        .route("/check_alive", post(handle_check_alive))
        .route("/members", get(handle_members))
        .with_state(registry)
}

fn error_response(status: StatusCode, e: PaxosError) -> Response {
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

async fn handle_register(
    State(registry): State<Registry>,
    Json(req): Json<AddrRequest>,
) -> Response {
    match registry.register(&req.addr) {
        Ok(peers) => (StatusCode::OK, Json(peers)).into_response(),
        Err(e) => error_response(StatusCode::CONFLICT, e),
    }
}

async fn handle_heartbeat(
    State(registry): State<Registry>,
    Json(req): Json<AddrRequest>,
) -> Response {
    match registry.heartbeat(&req.addr) {
        Ok(()) => (StatusCode::OK, Json(true)).into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e),
    }
}

async fn handle_check_alive(
    State(registry): State<Registry>,
    Json(req): Json<AddrRequest>,
) -> impl IntoResponse {
    Json(registry.check_alive(&req.addr))
}

async fn handle_members(State(registry): State<Registry>) -> impl IntoResponse {
    Json(registry.members())
}

#[derive(Clone)]
pub struct RendezvousClient {
    base_url: String,
    client: reqwest::Client,
}

impl RendezvousClient {
    pub fn new(addr: &str) -> Self {
        Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
        }
    }

    async fn call<Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        addr: &str,
    ) -> PaxosResult<(StatusCode, Option<Resp>, String)> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .json(&AddrRequest {
                addr: addr.to_string(),
            })
            .send()
            .await
            .map_err(|e| PaxosError::rpc(&self.base_url, e))?;
        let status = response.status();
        if status.is_success() {
            let body = response
                .json()
                .await
                .map_err(|e| PaxosError::rpc(&self.base_url, e))?;
            Ok((status, Some(body), String::new()))
        } else {
            let text = response.text().await.unwrap_or_default();
            Ok((status, None, text))
        }
    }

    pub async fn register(&self, addr: &str) -> PaxosResult<Vec<String>> {
        match self.call::<Vec<String>>("register", addr).await? {
            (_, Some(peers), _) => Ok(peers),
            (status, None, _) if status == StatusCode::CONFLICT => {
                Err(PaxosError::AddressAlreadyRegistered(addr.to_string()))
            }
            (status, None, text) => Err(PaxosError::rpc(
                &self.base_url,
                format!("register failed ({}): {}", status, text),
            )),
        }
    }

    pub async fn heartbeat(&self, addr: &str) -> PaxosResult<()> {
        match self.call::<bool>("heartbeat", addr).await? {
            (_, Some(_), _) => Ok(()),
            (status, None, _) if status == StatusCode::NOT_FOUND => {
                Err(PaxosError::UnknownKey(addr.to_string()))
            }
            (status, None, text) => Err(PaxosError::rpc(
                &self.base_url,
                format!("heartbeat failed ({}): {}", status, text),
            )),
        }
    }

    pub async fn check_alive(&self, addr: &str) -> PaxosResult<bool> {
        match self.call::<bool>("check_alive", addr).await? {
            (_, Some(alive), _) => Ok(alive),
            (status, None, text) => Err(PaxosError::rpc(
                &self.base_url,
                format!("check_alive failed ({}): {}", status, text),
            )),
        }
    }
}
