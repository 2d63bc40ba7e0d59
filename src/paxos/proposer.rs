use crate::types::{Message, MessageKind, NodeId, ProposalId, RoundNum};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Counter {
    message_id: ProposalId,
    // id of the latest prepare, which the next accept must reuse
    current_prepare: ProposalId,
}

pub struct Proposer {
    proposer_id: NodeId,
    counter: Mutex<Counter>,
}

impl Proposer {
    pub fn new(proposer_id: NodeId) -> Self {
        Self {
            proposer_id,
            counter: Mutex::new(Counter::default()),
        }
    }

    pub fn proposer_id(&self) -> &str {
        &self.proposer_id
    }

    pub fn message_id(&self) -> ProposalId {
        self.counter.lock().message_id
    }

    /// Starts a new proposal; `bounces` is the caller's remaining retry
    /// budget.
    pub fn create_prepare(&self, round_num: RoundNum, bounces: u32) -> Message {
        let mut counter = self.counter.lock();
        counter.message_id += 1;
        counter.current_prepare = counter.message_id;
        Message::new(
            counter.message_id,
            MessageKind::Prepare,
            "",
            self.proposer_id.clone(),
            round_num,
            bounces,
        )
    }

    /// Built at the id of the latest prepare so it matches the promises
    /// collected for it, even if the floor was raised in between.
    pub fn create_accept(&self, value: &str, round_num: RoundNum, bounces: u32) -> Message {
        let id = self.counter.lock().current_prepare;
        Message::new(
            id,
            MessageKind::Accept,
            value,
            self.proposer_id.clone(),
            round_num,
            bounces,
        )
    }

    pub fn update_message_id(&self, id: ProposalId) {
        let mut counter = self.counter.lock();
        if id > counter.message_id {
            counter.message_id = id;
        }
    }
}
