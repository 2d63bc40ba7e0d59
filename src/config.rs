use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_id: Option<String>,

    pub bind_addr: String,
    pub bind_port: u16,
    pub advertise_addr: Option<String>,

    pub data_dir: PathBuf,

    pub rendezvous_addr: Option<String>,
    pub heartbeat_interval_ms: u64,

    pub paxos: PaxosSettings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// A failed flush fails the vote.
    #[default]
    Strict,
    /// A failed flush is logged and the in-memory decision stands.
    BestEffort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaxosSettings {
    pub rpc_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub max_bounces: u32,
    pub max_jitter_ms: u64,
    pub durability: Durability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendezvousConfig {
    pub bind_addr: String,
    pub bind_port: u16,
    pub heartbeat_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            bind_addr: "127.0.0.1".to_string(),
            bind_port: 7000,
            advertise_addr: None,
            data_dir: PathBuf::from("/var/lib/paxlog"),
            rendezvous_addr: Some("127.0.0.1:12345".to_string()),
            heartbeat_interval_ms: 500,
            paxos: PaxosSettings::default(),
        }
    }
}

impl Default for PaxosSettings {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 5000,
            retry_backoff_ms: 100,
            max_bounces: 5,
            max_jitter_ms: 500,
            durability: Durability::Strict,
        }
    }
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            bind_port: 12345,
            heartbeat_timeout_ms: 2000,
        }
    }
}

impl PaxosSettings {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_bounces(&self) -> u32 {
        self.max_bounces.max(1)
    }
}

impl RendezvousConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.bind_port)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

impl NodeConfig {
    pub fn load(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &PathBuf) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.bind_port)
    }

    /// Address peers and the rendezvous service use to reach this node.
    pub fn advertise_addr(&self) -> String {
        self.advertise_addr
            .clone()
            .unwrap_or_else(|| self.listen_addr())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("paxos")
    }
}
