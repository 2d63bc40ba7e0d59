use crate::config::PaxosSettings;
use crate::error::{PaxosError, PaxosResult};
use crate::paxos::network::{Connector, PeerLink};
use crate::paxos::node::PaxosNode;
use crate::paxos::rpc::PaxosRpc;
use crate::paxos::storage::{AcceptorStorage, AcceptorStore};
use crate::types::{Message, NodeId, PrepareReply};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

struct LocalEndpoint {
    rpc: PaxosRpc,
    down: bool,
    delay: Option<Duration>,
}

/// An in-process cluster: nodes addressed by name, calls routed straight to
/// their [`PaxosRpc`]. Nodes can be killed, revived and slowed down.
#[derive(Default)]
pub struct LocalNetwork {
    endpoints: RwLock<HashMap<String, LocalEndpoint>>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(LocalConnector {
            network: Arc::downgrade(self),
        })
    }

    /// Builds a node on this network. Replaces any node already registered
    /// at `addr`.
    pub fn spawn_node(
        self: &Arc<Self>,
        addr: &str,
        store: AcceptorStore,
        settings: PaxosSettings,
    ) -> PaxosResult<Arc<PaxosNode>> {
        let node_id = store.node_identity()?;
        self.spawn_node_with_storage(addr, node_id, Arc::new(store), settings)
    }

    pub fn spawn_node_with_storage(
        self: &Arc<Self>,
        addr: &str,
        node_id: NodeId,
        storage: Arc<dyn AcceptorStorage>,
        settings: PaxosSettings,
    ) -> PaxosResult<Arc<PaxosNode>> {
        let node = Arc::new(PaxosNode::new(
            addr.to_string(),
            node_id,
            storage,
            self.connector(),
            settings,
        )?);
        self.register(node.clone());
        Ok(node)
    }

    pub fn register(&self, node: Arc<PaxosNode>) {
        let addr = node.addr().to_string();
        self.endpoints.write().insert(
            addr,
            LocalEndpoint {
                rpc: PaxosRpc::new(node),
                down: false,
                delay: None,
            },
        );
    }

    pub fn kill(&self, addr: &str) {
        if let Some(endpoint) = self.endpoints.write().get_mut(addr) {
            endpoint.down = true;
        }
    }

    pub fn revive(&self, addr: &str) {
        if let Some(endpoint) = self.endpoints.write().get_mut(addr) {
            endpoint.down = false;
        }
    }

    pub fn set_delay(&self, addr: &str, delay: Option<Duration>) {
        if let Some(endpoint) = self.endpoints.write().get_mut(addr) {
            endpoint.delay = delay;
        }
    }

    fn route(&self, addr: &str) -> PaxosResult<(PaxosRpc, Option<Duration>)> {
        match self.endpoints.read().get(addr) {
            Some(endpoint) if !endpoint.down => Ok((endpoint.rpc.clone(), endpoint.delay)),
            _ => Err(PaxosError::rpc(addr, "endpoint unreachable")),
        }
    }
}

struct LocalConnector {
    network: Weak<LocalNetwork>,
}

#[async_trait]
impl Connector for LocalConnector {
    async fn dial(&self, addr: &str) -> PaxosResult<Arc<dyn PeerLink>> {
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| PaxosError::NeighbourConnection(addr.to_string()))?;
        network
            .route(addr)
            .map_err(|_| PaxosError::NeighbourConnection(addr.to_string()))?;
        Ok(Arc::new(LocalLink {
            network: self.network.clone(),
            target_addr: addr.to_string(),
        }))
    }
}

struct LocalLink {
    network: Weak<LocalNetwork>,
    target_addr: String,
}

impl LocalLink {
    async fn endpoint(&self) -> PaxosResult<PaxosRpc> {
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| PaxosError::rpc(&self.target_addr, "network dropped"))?;
        let (rpc, delay) = network.route(&self.target_addr)?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(rpc)
    }
}

#[async_trait]
impl PeerLink for LocalLink {
    fn addr(&self) -> &str {
        &self.target_addr
    }

    async fn process_prepare(&self, msg: &Message) -> PaxosResult<PrepareReply> {
        self.endpoint().await?.process_prepare_request(msg)
    }

    async fn process_accept(&self, msg: &Message) -> PaxosResult<Option<Message>> {
        self.endpoint().await?.process_accept_request(msg)
    }

    async fn connect_remote_neighbour(&self, addr: &str) -> PaxosResult<bool> {
        self.endpoint().await?.connect_remote_neighbour(addr).await
    }

    async fn notify_about_accepted(&self, sender: &str, msg: &Message) -> PaxosResult<bool> {
        Ok(self.endpoint().await?.notify_about_accepted(sender, msg))
    }

    async fn read_from_learner(&self) -> PaxosResult<Vec<Message>> {
        Ok(self.endpoint().await?.read_from_learner())
    }

    async fn clean_your_neighbours(&self, peer: &str) -> PaxosResult<bool> {
        Ok(self.endpoint().await?.clean_your_neighbours(peer).await)
    }

    async fn are_you_alive(&self) -> PaxosResult<bool> {
        Ok(self.endpoint().await?.are_you_alive())
    }
}
