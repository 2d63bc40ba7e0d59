use crate::error::{PaxosError, PaxosResult};
use crate::types::{Message, NodeId, ProposalId, RoundNum};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct AcceptCount {
    message: Message,
    senders: HashSet<String>,
}

#[derive(Debug, Default)]
struct LearnerState {
    log: Vec<Message>,
    accept_counts: HashMap<(ProposalId, NodeId), AcceptCount>,
    // decided values for rounds ahead of the local log
    pending: BTreeMap<RoundNum, Message>,
}

impl LearnerState {
    fn current_round(&self) -> RoundNum {
        self.log.len() as RoundNum
    }

    fn append(&mut self, msg: Message) {
        self.log.push(msg);
        while let Some(next) = self.pending.remove(&self.current_round()) {
            self.log.push(next);
        }
        let round = self.current_round();
        self.pending.retain(|r, _| *r >= round);
        self.accept_counts
            .retain(|_, count| count.message.round_num() >= round);
    }
}

#[derive(Default)]
pub struct Learner {
    state: Mutex<LearnerState>,
}

impl Learner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries must satisfy `log[i].round_num == i`; the log is cut at the
    /// first entry that does not.
    pub fn initialize_log(&self, log: Vec<Message>) -> RoundNum {
        let valid = log
            .iter()
            .enumerate()
            .take_while(|(i, m)| m.round_num() == *i as RoundNum)
            .count();
        if valid < log.len() {
            warn!(
                received = log.len(),
                kept = valid,
                "initial log has out of place rounds, truncating"
            );
        }

        let mut state = self.state.lock();
        state.log = log.into_iter().take(valid).collect();
        state.pending.clear();
        let round = state.current_round();
        state
            .accept_counts
            .retain(|_, count| count.message.round_num() >= round);
        info!(round, "initialized learner log");
        round
    }

    pub fn learn_value(&self, msg: &Message) -> PaxosResult<RoundNum> {
        let mut state = self.state.lock();
        let current = state.current_round();

        if msg.round_num() < current {
            return Err(PaxosError::RoundAlreadyWritten(msg.round_num()));
        }
        if msg.round_num() > current {
            debug!(
                round = msg.round_num(),
                current, "value decided ahead of local log, parking"
            );
            state.pending.entry(msg.round_num()).or_insert_with(|| msg.clone());
            return Ok(current);
        }

        state.append(msg.clone());
        let round = state.current_round();
        info!(round = msg.round_num(), value = %msg.value(), "learned value");
        Ok(round)
    }

    /// Records that `sender` accepted `msg` and returns how many distinct
    /// senders of that proposal `is_member` admits. Repeats from one sender
    /// count once.
    pub fn num_already_accepted<F>(&self, msg: &Message, sender: &str, is_member: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut state = self.state.lock();
        let entry = state
            .accept_counts
            .entry(msg.proposal_key())
            .or_insert_with(|| AcceptCount {
                message: msg.clone(),
                senders: HashSet::new(),
            });
        entry.senders.insert(sender.to_string());
        entry.senders.iter().filter(|s| is_member(s.as_str())).count()
    }

    /// Appends the tail of `log` when the local log is a prefix of it.
    pub fn extend_from(&self, log: &[Message]) -> bool {
        let mut state = self.state.lock();
        let current = state.log.len();
        if log.len() <= current {
            return false;
        }
        if !state.log.iter().zip(log).all(|(a, b)| a.equals(b)) {
            warn!(
                local = current,
                remote = log.len(),
                "remote log diverges from local log, not extending"
            );
            return false;
        }
        let mut added = 0;
        for (i, msg) in log.iter().enumerate().skip(current) {
            if msg.round_num() != i as RoundNum || state.current_round() != i as RoundNum {
                break;
            }
            state.append(msg.clone());
            added += 1;
        }
        if added > 0 {
            info!(added, round = state.current_round(), "caught up from peer log");
        }
        added > 0
    }

    pub fn contains(&self, msg: &Message) -> bool {
        let state = self.state.lock();
        let key = (msg.id(), msg.proposer_id());
        state
            .log
            .iter()
            .chain(state.pending.values())
            .any(|m| (m.id(), m.proposer_id()) == key)
    }

    pub fn current_log(&self) -> Vec<Message> {
        self.state.lock().log.clone()
    }

    pub fn log_value(&self, round: RoundNum) -> PaxosResult<Message> {
        self.state
            .lock()
            .log
            .get(round as usize)
            .cloned()
            .ok_or(PaxosError::InvalidLogIndex(round))
    }

    pub fn current_round(&self) -> RoundNum {
        self.state.lock().current_round()
    }
}
