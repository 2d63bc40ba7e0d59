use crate::error::{PaxosError, PaxosResult};
use crate::paxos::node::PaxosNode;
use crate::types::{Message, PrepareReply};
use std::sync::Arc;
use tracing::{debug, warn};

/// Inbound side of the peer protocol. Every transport routes remote calls
/// through here.
#[derive(Clone)]
pub struct PaxosRpc {
    node: Arc<PaxosNode>,
}

impl PaxosRpc {
    pub fn new(node: Arc<PaxosNode>) -> Self {
        Self { node }
    }

    pub fn node(&self) -> &Arc<PaxosNode> {
        &self.node
    }

    fn check_hash(msg: &Message) -> PaxosResult<()> {
        if msg.verify_hash() {
            Ok(())
        } else {
            Err(PaxosError::HashMismatch(msg.id()))
        }
    }

    pub fn process_prepare_request(&self, msg: &Message) -> PaxosResult<PrepareReply> {
        Self::check_hash(msg)?;
        self.node.proposer().update_message_id(msg.id());
        let promised = self.node.acceptor().process_prepare(msg)?;
        let accepted = if promised.equals(msg) {
            self.node.acceptor().accepted_for_round(msg.round_num())
        } else {
            None
        };
        Ok(PrepareReply { promised, accepted })
    }

    /// Adopting an accept fans the notification out to every learner.
    pub fn process_accept_request(&self, msg: &Message) -> PaxosResult<Option<Message>> {
        Self::check_hash(msg)?;
        let acceptor = self.node.acceptor();
        let already_accepted = acceptor
            .snapshot()
            .last_accepted
            .is_some_and(|m| m.equals(msg));
        let accepted = acceptor.process_accept(msg)?;
        if !already_accepted && accepted.as_ref().is_some_and(|m| m.equals(msg)) {
            debug!(node = %self.node.addr(), id = msg.id(), round = msg.round_num(), "saying accepted");
            self.node.say_accepted(msg);
        }
        Ok(accepted)
    }

    pub async fn connect_remote_neighbour(&self, addr: &str) -> PaxosResult<bool> {
        self.node.accept_neighbour_connection(addr).await
    }

    /// False when the notification is dropped because its hash is wrong.
    pub fn notify_about_accepted(&self, sender: &str, msg: &Message) -> bool {
        if !msg.verify_hash() {
            warn!(node = %self.node.addr(), sender = %sender, id = msg.id(), "dropping corrupt accepted notification");
            return false;
        }
        self.node.count_for_accepted(msg, sender);
        true
    }

    pub fn read_from_learner(&self) -> Vec<Message> {
        self.node.log()
    }

    pub async fn clean_your_neighbours(&self, peer: &str) -> bool {
        self.node.clean_neighbours_on_request(peer).await
    }

    pub fn are_you_alive(&self) -> bool {
        true
    }
}
