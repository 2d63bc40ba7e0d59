use crate::error::{PaxosError, PaxosResult};
use crate::types::{Message, PrepareReply};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One live connection to a peer; one method per peer RPC.
#[async_trait]
pub trait PeerLink: Send + Sync {
    fn addr(&self) -> &str;
    async fn process_prepare(&self, msg: &Message) -> PaxosResult<PrepareReply>;
    async fn process_accept(&self, msg: &Message) -> PaxosResult<Option<Message>>;
    async fn connect_remote_neighbour(&self, addr: &str) -> PaxosResult<bool>;
    async fn notify_about_accepted(&self, sender: &str, msg: &Message) -> PaxosResult<bool>;
    async fn read_from_learner(&self) -> PaxosResult<Vec<Message>>;
    async fn clean_your_neighbours(&self, peer: &str) -> PaxosResult<bool>;
    async fn are_you_alive(&self) -> PaxosResult<bool>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn dial(&self, addr: &str) -> PaxosResult<Arc<dyn PeerLink>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddrRequest {
    pub addr: String,
}

/// Body of `notify_accepted`: the acceptor's address and what it accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyRequest {
    pub addr: String,
    pub message: Message,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Placeholder {}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> PaxosResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaxosError::rpc("<client>", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn dial(&self, addr: &str) -> PaxosResult<Arc<dyn PeerLink>> {
        let peer = HttpPeer::new(addr.to_string(), self.client.clone());
        match peer.are_you_alive().await {
            Ok(true) => Ok(Arc::new(peer)),
            Ok(false) | Err(_) => Err(PaxosError::NeighbourConnection(addr.to_string())),
        }
    }
}

pub struct HttpPeer {
    target_addr: String,
    client: reqwest::Client,
}

impl HttpPeer {
    pub fn new(target_addr: String, client: reqwest::Client) -> Self {
        Self {
            target_addr,
            client,
        }
    }

    async fn send_rpc<Req, Resp>(&self, path: &str, req: &Req) -> PaxosResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: serde::de::DeserializeOwned,
    {
        let url = format!("http://{}/paxos/{}", self.target_addr, path);

        let response = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => format!("HTTP error: {}", status),
            };
            return Err(PaxosError::Remote {
                addr: self.target_addr.clone(),
                reason,
            });
        }

        response.json().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, e: reqwest::Error) -> PaxosError {
        if e.is_timeout() {
            PaxosError::Timeout(self.target_addr.clone())
        } else {
            PaxosError::rpc(&self.target_addr, e)
        }
    }
}

#[async_trait]
impl PeerLink for HttpPeer {
    fn addr(&self) -> &str {
        &self.target_addr
    }

    async fn process_prepare(&self, msg: &Message) -> PaxosResult<PrepareReply> {
        self.send_rpc("prepare", msg).await
    }

    async fn process_accept(&self, msg: &Message) -> PaxosResult<Option<Message>> {
        self.send_rpc("accept", msg).await
    }

    async fn connect_remote_neighbour(&self, addr: &str) -> PaxosResult<bool> {
        let req = AddrRequest {
            addr: addr.to_string(),
        };
        self.send_rpc("connect", &req).await
    }

    async fn notify_about_accepted(&self, sender: &str, msg: &Message) -> PaxosResult<bool> {
        let req = NotifyRequest {
            addr: sender.to_string(),
            message: msg.clone(),
        };
        self.send_rpc("notify_accepted", &req).await
    }

    async fn read_from_learner(&self) -> PaxosResult<Vec<Message>> {
        self.send_rpc("learner_log", &Placeholder::default()).await
    }

    async fn clean_your_neighbours(&self, peer: &str) -> PaxosResult<bool> {
        let req = AddrRequest {
            addr: peer.to_string(),
        };
        self.send_rpc("clean_neighbours", &req).await
    }

    async fn are_you_alive(&self) -> PaxosResult<bool> {
        self.send_rpc("alive", &Placeholder::default()).await
    }
}
