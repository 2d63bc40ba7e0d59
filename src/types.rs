use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub type NodeId = String;
pub type RoundNum = u64;
pub type ProposalId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Prepare,
    Accept,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Prepare => write!(f, "PREPARE"),
            MessageKind::Accept => write!(f, "ACCEPT"),
        }
    }
}

/// A protocol message. Built once through [`Message::new`] and never mutated;
/// retries build a fresh message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    id: ProposalId,
    kind: MessageKind,
    value: String,
    proposer_id: NodeId,
    round_num: RoundNum,
    hash: String,
    bounces: u32,
}

impl Message {
    pub fn new(
        id: ProposalId,
        kind: MessageKind,
        value: impl Into<String>,
        proposer_id: impl Into<NodeId>,
        round_num: RoundNum,
        bounces: u32,
    ) -> Self {
        let value = value.into();
        let proposer_id = proposer_id.into();
        let hash = Self::fingerprint(id, kind, &value, &proposer_id, round_num);
        Self {
            id,
            kind,
            value,
            proposer_id,
            round_num,
            hash,
            bounces,
        }
    }

    fn fingerprint(
        id: ProposalId,
        kind: MessageKind,
        value: &str,
        proposer_id: &str,
        round_num: RoundNum,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(id.to_be_bytes());
        hasher.update([kind as u8]);
        hasher.update(round_num.to_be_bytes());
        hasher.update((proposer_id.len() as u64).to_be_bytes());
        hasher.update(proposer_id.as_bytes());
        hasher.update(value.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn id(&self) -> ProposalId {
        self.id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn proposer_id(&self) -> &str {
        &self.proposer_id
    }

    pub fn round_num(&self) -> RoundNum {
        self.round_num
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn bounces(&self) -> u32 {
        self.bounces
    }

    /// Messages are equal iff their hashes match.
    pub fn equals(&self, other: &Message) -> bool {
        self.hash == other.hash
    }

    /// Recomputes the fingerprint; false for a message whose hash was
    /// tampered with or produced by an incompatible peer.
    pub fn verify_hash(&self) -> bool {
        self.hash
            == Self::fingerprint(
                self.id,
                self.kind,
                &self.value,
                &self.proposer_id,
                self.round_num,
            )
    }

    /// Total order used by acceptors: round first, then proposal id, then
    /// proposer id as the tie-break.
    pub fn ballot(&self) -> (RoundNum, ProposalId, &str) {
        (self.round_num, self.id, self.proposer_id.as_str())
    }

    /// Identity used to dedup learned values.
    pub fn proposal_key(&self) -> (ProposalId, NodeId) {
        (self.id, self.proposer_id.clone())
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for Message {}

/// Phase 1 reply: the acceptor's promise plus whatever it already accepted
/// for the same round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareReply {
    pub promised: Message,
    pub accepted: Option<Message>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum NodePhase {
    #[default]
    Idle,
    Preparing,
    Proposing,
    Learning,
    Error,
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodePhase::Idle => "idle",
            NodePhase::Preparing => "preparing",
            NodePhase::Proposing => "proposing",
            NodePhase::Learning => "learning",
            NodePhase::Error => "error",
        };
        f.write_str(s)
    }
}
