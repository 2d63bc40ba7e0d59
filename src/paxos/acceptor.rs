use crate::config::Durability;
use crate::error::{PaxosError, PaxosResult};
use crate::paxos::storage::AcceptorStorage;
use std::sync::Arc;
use crate::types::{Message, MessageKind, NodeId, RoundNum};
use parking_lot::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct AcceptorState {
    pub last_promised: Option<Message>,
    pub last_accepted: Option<Message>,
}

pub struct Acceptor {
    node_id: NodeId,
    store: Arc<dyn AcceptorStorage>,
    durability: Durability,
    state: Mutex<AcceptorState>,
}

impl Acceptor {
    pub fn new(
        node_id: NodeId,
        store: Arc<dyn AcceptorStorage>,
        durability: Durability,
    ) -> Self {
        Self {
            node_id,
            store,
            durability,
            state: Mutex::new(AcceptorState::default()),
        }
    }

    pub fn restore_from_backup(&self) -> PaxosResult<()> {
        let promised = self.store.load_promised(&self.node_id)?;
        let accepted = self.store.load_accepted(&self.node_id)?;
        debug!(
            node_id = %self.node_id,
            promised = ?promised.as_ref().map(|m| m.ballot()),
            accepted = ?accepted.as_ref().map(|m| m.ballot()),
            "restored acceptor state"
        );
        let mut state = self.state.lock();
        state.last_promised = promised;
        state.last_accepted = accepted;
        Ok(())
    }

    pub fn snapshot(&self) -> AcceptorState {
        self.state.lock().clone()
    }

    /// Echoes the promise held after the call; the caller compares its hash
    /// with the request to learn whether the promise was granted.
    pub fn process_prepare(&self, msg: &Message) -> PaxosResult<Message> {
        if msg.kind() != MessageKind::Prepare {
            return Err(PaxosError::InvalidMessageType(msg.kind()));
        }

        let mut state = self.state.lock();
        let adopt = match &state.last_promised {
            None => true,
            Some(promised) if promised.equals(msg) => return Ok(promised.clone()),
            Some(promised) => msg.ballot() > promised.ballot(),
        };

        if !adopt {
            debug!(
                request = ?msg.ballot(),
                promised = ?state.last_promised.as_ref().map(|m| m.ballot()),
                "rejected prepare"
            );
            return Ok(state.last_promised.clone().unwrap_or_else(|| msg.clone()));
        }

        self.persist(self.store.save_promised(&self.node_id, msg))?;
        state.last_promised = Some(msg.clone());
        Ok(msg.clone())
    }

    /// Honors an accept that matches or supersedes the last promise and
    /// echoes the accepted record held after the call.
    pub fn process_accept(&self, msg: &Message) -> PaxosResult<Option<Message>> {
        if msg.kind() != MessageKind::Accept {
            return Err(PaxosError::InvalidMessageType(msg.kind()));
        }

        let mut state = self.state.lock();
        if state
            .last_accepted
            .as_ref()
            .is_some_and(|accepted| accepted.equals(msg))
        {
            return Ok(state.last_accepted.clone());
        }

        let supersedes = match &state.last_promised {
            None => true,
            Some(promised) => {
                if msg.ballot() < promised.ballot() {
                    debug!(
                        request = ?msg.ballot(),
                        promised = ?promised.ballot(),
                        "rejected accept"
                    );
                    return Ok(state.last_accepted.clone());
                }
                msg.ballot() > promised.ballot()
            }
        };

        self.persist(self.store.save_accepted(&self.node_id, msg))?;
        if supersedes {
            self.persist(self.store.save_promised(&self.node_id, msg))?;
            state.last_promised = Some(msg.clone());
        }
        state.last_accepted = Some(msg.clone());
        Ok(state.last_accepted.clone())
    }

    pub fn accepted_for_round(&self, round: RoundNum) -> Option<Message> {
        self.state
            .lock()
            .last_accepted
            .as_ref()
            .filter(|m| m.round_num() == round)
            .cloned()
    }

    fn persist(&self, result: PaxosResult<()>) -> PaxosResult<()> {
        match (result, self.durability) {
            (Ok(()), _) => Ok(()),
            (Err(e), Durability::BestEffort) => {
                warn!(node_id = %self.node_id, error = %e, "failed to persist acceptor state");
                Ok(())
            }
            (Err(e), Durability::Strict) => Err(e),
        }
    }
}
