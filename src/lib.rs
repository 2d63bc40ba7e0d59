pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod paxos;
pub mod rendezvous;
pub mod rpc_api;
pub mod types;

pub use api::create_router;
pub use config::{Durability, NodeConfig, PaxosSettings, RendezvousConfig};
pub use daemon::DiaryDaemon;
pub use error::{PaxosError, PaxosResult};
pub use paxos::{LocalNetwork, PaxosNode, PaxosRpc};
pub use rendezvous::{create_rendezvous_router, Registry, RendezvousClient};
pub use rpc_api::create_paxos_router;
pub use types::*;
