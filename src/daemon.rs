use crate::config::NodeConfig;
use crate::error::PaxosError;
use crate::paxos::{AcceptorStore, HttpConnector, PaxosNode, PaxosRpc};
use crate::rendezvous::RendezvousClient;
use crate::types::Message;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct DiaryDaemon {
    node: Arc<PaxosNode>,
    rendezvous: Option<RendezvousClient>,
    config: NodeConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DiaryDaemon {
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let store_path = config.store_path();
        std::fs::create_dir_all(&store_path)
            .with_context(|| format!("creating data dir {:?}", store_path))?;
        let store = AcceptorStore::open(&store_path)?;

        let node_id = match &config.node_id {
            Some(id) => id.clone(),
            None => store.node_identity()?,
        };
        let addr = config.advertise_addr();

        info!("Initializing DiaryDaemon node_id={} addr={}", node_id, addr);

        let connector = Arc::new(HttpConnector::new(config.paxos.rpc_timeout())?);
        let node = Arc::new(PaxosNode::new(
            addr,
            node_id,
            Arc::new(store),
            connector,
            config.paxos.clone(),
        )?);

        let rendezvous = config
            .rendezvous_addr
            .as_deref()
            .map(RendezvousClient::new);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            node,
            rendezvous,
            config,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Registers with the rendezvous service, connects to every peer it
    /// returns and adopts the longest peer log. The peer RPC server must
    /// already be serving, since peers dial back during the handshake.
    pub async fn join(&self) -> Result<()> {
        let Some(rendezvous) = &self.rendezvous else {
            info!("No rendezvous configured, running as a single node");
            return Ok(());
        };

        let peers = rendezvous
            .register(self.node.addr())
            .await
            .context("registering with rendezvous")?;
        info!("Registered with rendezvous, {} peers", peers.len());

        self.connect_peers(&peers).await
    }

    async fn connect_peers(&self, peers: &[String]) -> Result<()> {
        if peers.is_empty() {
            return Ok(());
        }
        for e in self.node.become_neighbours(peers).await {
            warn!("Join continues without neighbour: {}", e);
        }
        let round = self.node.set_initial_log().await?;
        info!(
            "Joined with {} neighbours at round {}",
            self.node.neighbour_count(),
            round
        );
        Ok(())
    }

    pub async fn run(&self) -> Result<()> {
        info!("Starting DiaryDaemon...");

        let heartbeat_handle = self.spawn_heartbeat_loop();

        info!("DiaryDaemon running on {}", self.node.addr());

        tokio::select! {
            _ = heartbeat_handle => {
                warn!("Heartbeat loop exited");
                self.wait_for_shutdown().await;
            }
            _ = self.wait_for_shutdown() => {
                info!("Shutdown signal received");
            }
        }

        self.node.unmount();
        Ok(())
    }

    fn spawn_heartbeat_loop(&self) -> tokio::task::JoinHandle<()> {
        let Some(rendezvous) = self.rendezvous.clone() else {
            return tokio::spawn(async {});
        };
        let node = self.node.clone();
        let interval = self.config.heartbeat_interval();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match rendezvous.heartbeat(node.addr()).await {
                            Ok(()) => debug!("Heartbeat sent"),
                            Err(PaxosError::UnknownKey(_)) => {
                                warn!("Evicted by rendezvous, registering again");
                                match rendezvous.register(node.addr()).await {
                                    Ok(peers) => rejoin(&node, &peers).await,
                                    Err(e) => warn!("Re-registration failed: {}", e),
                                }
                            }
                            Err(e) => warn!("Failed to send heartbeat: {}", e),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }
        })
    }

    async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn write(&self, value: &str) -> Result<bool> {
        Ok(self.node.write(value).await?)
    }

    pub fn read(&self) -> String {
        self.node.read()
    }

    pub fn log(&self) -> Vec<Message> {
        self.node.log()
    }

    /// Asks the rendezvous service whether this node is still a member.
    pub async fn is_alive(&self) -> Result<bool> {
        match &self.rendezvous {
            Some(rendezvous) => Ok(rendezvous.check_alive(self.node.addr()).await?),
            None => Ok(true),
        }
    }

    pub fn node(&self) -> &Arc<PaxosNode> {
        &self.node
    }

    pub fn rpc(&self) -> PaxosRpc {
        PaxosRpc::new(self.node.clone())
    }
}

/// Reconnects after an eviction and pulls whatever was decided meanwhile.
async fn rejoin(node: &PaxosNode, peers: &[String]) {
    for e in node.become_neighbours(peers).await {
        warn!("Reconnect skipped neighbour: {}", e);
    }
    if node.catch_up().await {
        info!("Caught up to round {} after re-registering", node.current_round());
    }
}
