use crate::types::MessageKind;
use thiserror::Error;

pub type PaxosResult<T> = Result<T, PaxosError>;

#[derive(Debug, Error)]
pub enum PaxosError {
    #[error("invalid message type {0:?}: dissemination only handles Prepare and Accept")]
    InvalidMessageType(MessageKind),

    #[error("unable to open RPC connection with neighbour {0}")]
    NeighbourConnection(String),

    #[error("RPC to {addr} failed: {reason}")]
    Rpc { addr: String, reason: String },

    #[error("RPC to {0} timed out")]
    Timeout(String),

    #[error("{addr} refused the request: {reason}")]
    Remote { addr: String, reason: String },

    #[error("message {0} failed hash verification")]
    HashMismatch(u64),

    #[error("round {0} has already been written")]
    RoundAlreadyWritten(u64),

    #[error("log index {0} is out of range")]
    InvalidLogIndex(u64),

    #[error("address already registered [{0}]")]
    AddressAlreadyRegistered(String),

    #[error("unknown key [{0}]")]
    UnknownKey(String),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

impl PaxosError {
    pub fn rpc(addr: &str, reason: impl ToString) -> Self {
        PaxosError::Rpc {
            addr: addr.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Connectivity failures mark a neighbour failed. A peer that answers
    /// with an error stays in the table.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            PaxosError::NeighbourConnection(_) | PaxosError::Rpc { .. } | PaxosError::Timeout(_)
        )
    }
}
