use crate::config::PaxosSettings;
use crate::error::{PaxosError, PaxosResult};
use crate::paxos::acceptor::{Acceptor, AcceptorState};
use crate::paxos::learner::Learner;
use crate::paxos::network::{Connector, PeerLink};
use crate::paxos::proposer::Proposer;
use crate::paxos::storage::AcceptorStorage;
use crate::types::*;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Default)]
struct NeighbourTable {
    addrs: Vec<String>,
    conns: HashMap<String, Arc<dyn PeerLink>>,
}

impl NeighbourTable {
    fn insert(&mut self, addr: &str, link: Arc<dyn PeerLink>) {
        if !self.conns.contains_key(addr) {
            self.addrs.push(addr.to_string());
        }
        self.conns.insert(addr.to_string(), link);
    }

    fn remove(&mut self, addr: &str) -> bool {
        self.addrs.retain(|a| a != addr);
        self.conns.remove(addr).is_some()
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn PeerLink>)> {
        self.addrs
            .iter()
            .filter_map(|a| self.conns.get(a).map(|l| (a.clone(), l.clone())))
            .collect()
    }
}

/// Outcome of one dissemination pass.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    pub accepted: usize,
    /// Highest promise id echoed back by an acceptor that refused.
    pub highest_promise: ProposalId,
    /// Highest-ballot value already accepted for the round by a promising
    /// acceptor.
    pub prior_accept: Option<Message>,
}

impl Tally {
    fn note_refusal(&mut self, echoed: &Message) {
        self.highest_promise = self.highest_promise.max(echoed.id());
    }

    fn note_prior(&mut self, accepted: Option<Message>) {
        let Some(accepted) = accepted else { return };
        let higher = match &self.prior_accept {
            None => true,
            Some(current) => accepted.ballot() > current.ballot(),
        };
        if higher {
            self.prior_accept = Some(accepted);
        }
    }
}

enum Vote {
    Promise(PrepareReply),
    Accepted(Option<Message>),
}

pub struct PaxosNode {
    addr: String,
    node_id: NodeId,
    settings: PaxosSettings,
    proposer: Proposer,
    acceptor: Acceptor,
    learner: Learner,
    connector: Arc<dyn Connector>,
    neighbours: RwLock<NeighbourTable>,
    failed: Mutex<Vec<String>>,
    phase: Mutex<NodePhase>,
    write_gate: tokio::sync::Mutex<()>,
}

impl PaxosNode {
    pub fn new(
        addr: String,
        node_id: NodeId,
        store: Arc<dyn AcceptorStorage>,
        connector: Arc<dyn Connector>,
        settings: PaxosSettings,
    ) -> PaxosResult<Self> {
        let proposer = Proposer::new(node_id.clone());
        let acceptor = Acceptor::new(node_id.clone(), store, settings.durability);
        acceptor.restore_from_backup()?;

        info!(addr = %addr, node_id = %node_id, "paxos node created");

        Ok(Self {
            addr,
            node_id,
            settings,
            proposer,
            acceptor,
            learner: Learner::new(),
            connector,
            neighbours: RwLock::new(NeighbourTable::default()),
            failed: Mutex::new(Vec::new()),
            phase: Mutex::new(NodePhase::Idle),
            write_gate: tokio::sync::Mutex::new(()),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn proposer(&self) -> &Proposer {
        &self.proposer
    }

    pub fn acceptor(&self) -> &Acceptor {
        &self.acceptor
    }

    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    pub fn acceptor_state(&self) -> AcceptorState {
        self.acceptor.snapshot()
    }

    pub fn phase(&self) -> NodePhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: NodePhase) {
        *self.phase.lock() = phase;
    }

    pub fn neighbours(&self) -> Vec<String> {
        self.neighbours.read().addrs.clone()
    }

    pub fn neighbour_count(&self) -> usize {
        self.neighbours.read().conns.len()
    }

    pub fn failed_neighbours(&self) -> Vec<String> {
        self.failed.lock().clone()
    }

    pub fn current_round(&self) -> RoundNum {
        self.learner.current_round()
    }

    pub fn log(&self) -> Vec<Message> {
        self.learner.current_log()
    }

    pub fn log_value(&self, round: RoundNum) -> PaxosResult<Message> {
        self.learner.log_value(round)
    }

    /// The diary as a client sees it: every decided value in order.
    pub fn read(&self) -> String {
        self.learner
            .current_log()
            .iter()
            .map(|m| m.value())
            .collect()
    }

    pub fn is_majority(&self, n: usize) -> bool {
        n > (self.neighbour_count() + 1) / 2
    }

    /// Runs Paxos until `value` is committed. Connectivity failures are
    /// retried indefinitely with backoff; protocol and storage errors abort.
    pub async fn write(self: &Arc<Self>, value: &str) -> PaxosResult<bool> {
        let _gate = self.write_gate.lock().await;
        let result = self.write_inner(value).await;
        match &result {
            Ok(_) => self.set_phase(NodePhase::Idle),
            Err(e) => {
                warn!(node = %self.addr, error = %e, "write failed");
                self.set_phase(NodePhase::Error);
            }
        }
        result
    }

    async fn write_inner(self: &Arc<Self>, value: &str) -> PaxosResult<bool> {
        let mut bounces = self.settings.max_bounces();

        loop {
            let round = self.learner.current_round();
            self.set_phase(NodePhase::Preparing);

            let prepare = self.proposer.create_prepare(round, bounces);
            debug!(node = %self.addr, id = prepare.id(), round, "phase 1");
            let tally = self.disseminate(&prepare).await?;
            self.proposer.update_message_id(tally.highest_promise);

            if !self.is_majority(tally.accepted) {
                info!(
                    node = %self.addr,
                    round,
                    promised = tally.accepted,
                    "prepare missed quorum, retrying"
                );
                bounces = self.back_off(bounces).await;
                continue;
            }

            let (proposal, own) = match &tally.prior_accept {
                Some(prior)
                    if prior.proposer_id() != self.node_id || prior.value() != value =>
                {
                    (prior.value().to_string(), false)
                }
                _ => (value.to_string(), true),
            };

            self.set_phase(NodePhase::Proposing);
            let accept = self.proposer.create_accept(&proposal, round, bounces);
            debug!(node = %self.addr, id = accept.id(), round, "phase 2");
            let tally = self.disseminate(&accept).await?;

            if !self.is_majority(tally.accepted) {
                info!(
                    node = %self.addr,
                    round,
                    accepted = tally.accepted,
                    "accept missed quorum, retrying"
                );
                bounces = self.back_off(bounces).await;
                continue;
            }

            self.set_phase(NodePhase::Learning);
            self.learn_decided(&accept);
            self.clear_failed_neighbours();

            if own {
                info!(node = %self.addr, round, "value committed");
                return Ok(true);
            }
            info!(
                node = %self.addr,
                round,
                "completed an earlier proposal for this round, proposing own value next round"
            );
            bounces = self.settings.max_bounces();
        }
    }

    async fn back_off(self: &Arc<Self>, bounces: u32) -> u32 {
        self.notify_of_majority_failure();
        self.clear_failed_neighbours();
        self.catch_up().await;
        tokio::time::sleep(self.settings.retry_backoff()).await;

        let remaining = bounces.saturating_sub(1);
        if remaining > 0 {
            return remaining;
        }
        let jitter = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0..self.settings.max_jitter_ms.max(1))
        };
        debug!(node = %self.addr, jitter_ms = jitter, "bounce budget exhausted");
        tokio::time::sleep(Duration::from_millis(jitter)).await;
        self.settings.max_bounces()
    }

    fn learn_decided(&self, msg: &Message) {
        if self.learner.contains(msg) {
            return;
        }
        match self.learner.learn_value(msg) {
            Ok(_) => {}
            Err(PaxosError::RoundAlreadyWritten(round)) => {
                debug!(node = %self.addr, round, "round already learned")
            }
            Err(e) => warn!(node = %self.addr, error = %e, "failed to learn value"),
        }
    }

    /// Sends `msg` to the local acceptor and every neighbour concurrently and
    /// counts the votes that echo exactly this message.
    pub async fn disseminate(self: &Arc<Self>, msg: &Message) -> PaxosResult<Tally> {
        let mut tally = Tally::default();

        match msg.kind() {
            MessageKind::Prepare => {
                let promised = self.acceptor.process_prepare(msg)?;
                if promised.equals(msg) {
                    tally.accepted += 1;
                    tally.note_prior(self.acceptor.accepted_for_round(msg.round_num()));
                } else {
                    tally.note_refusal(&promised);
                }
            }
            MessageKind::Accept => {
                let accepted = self.acceptor.process_accept(msg)?;
                if accepted.is_some_and(|m| m.equals(msg)) {
                    tally.accepted += 1;
                    self.say_accepted(msg);
                }
            }
        }

        let peers = self.neighbours.read().snapshot();
        let timeout = self.settings.rpc_timeout();
        let mut tasks = JoinSet::new();
        for (addr, link) in peers {
            let request = msg.clone();
            tasks.spawn(async move {
                let call = async {
                    match request.kind() {
                        MessageKind::Prepare => {
                            link.process_prepare(&request).await.map(Vote::Promise)
                        }
                        MessageKind::Accept => {
                            link.process_accept(&request).await.map(Vote::Accepted)
                        }
                    }
                };
                let result = match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(PaxosError::Timeout(addr.clone())),
                };
                (addr, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (addr, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(node = %self.addr, error = %e, "dissemination task aborted");
                    continue;
                }
            };
            match result {
                Ok(Vote::Promise(reply)) => {
                    if reply.promised.equals(msg) {
                        tally.accepted += 1;
                        tally.note_prior(reply.accepted);
                    } else {
                        tally.note_refusal(&reply.promised);
                    }
                }
                Ok(Vote::Accepted(Some(accepted))) if accepted.equals(msg) => {
                    tally.accepted += 1;
                }
                Ok(Vote::Accepted(_)) => {}
                Err(e) if e.is_connectivity() => {
                    warn!(node = %self.addr, peer = %addr, kind = %msg.kind(), error = %e, "neighbour failed");
                    self.mark_failed(&addr);
                }
                Err(e) => {
                    warn!(node = %self.addr, peer = %addr, kind = %msg.kind(), error = %e, "neighbour refused vote");
                }
            }
        }

        debug!(
            node = %self.addr,
            kind = %msg.kind(),
            accepted = tally.accepted,
            "dissemination finished"
        );
        Ok(tally)
    }

    /// Counts `msg` on the local learner, then tells every peer's learner
    /// without waiting for replies.
    pub fn say_accepted(self: &Arc<Self>, msg: &Message) {
        self.count_for_accepted(msg, &self.addr);

        let peers = self.neighbours.read().snapshot();
        let timeout = self.settings.rpc_timeout();
        for (addr, link) in peers {
            let node = Arc::clone(self);
            let msg = msg.clone();
            tokio::spawn(async move {
                let notify = link.notify_about_accepted(&node.addr, &msg);
                let result = match tokio::time::timeout(timeout, notify).await {
                    Ok(result) => result,
                    Err(_) => Err(PaxosError::Timeout(addr.clone())),
                };
                if let Err(e) = result {
                    debug!(node = %node.addr, peer = %addr, error = %e, "accepted notification failed");
                    if e.is_connectivity() {
                        node.mark_failed(&addr);
                    }
                }
            });
        }
    }

    /// Counts `sender`'s acceptance of `msg`. Only this node and current
    /// neighbours contribute to the quorum.
    pub fn count_for_accepted(&self, msg: &Message, sender: &str) {
        let members = self.neighbours();
        let seen = self.learner.num_already_accepted(msg, sender, |s| {
            s == self.addr || members.iter().any(|m| m == s)
        });
        if self.is_majority(seen) {
            self.learn_decided(msg);
        }
    }

    fn mark_failed(&self, addr: &str) {
        let mut failed = self.failed.lock();
        if !failed.iter().any(|a| a == addr) {
            failed.push(addr.to_string());
        }
    }

    pub fn clear_failed_neighbours(&self) {
        let failed = std::mem::take(&mut *self.failed.lock());
        if failed.is_empty() {
            return;
        }
        let mut table = self.neighbours.write();
        for addr in &failed {
            if table.remove(addr) {
                info!(node = %self.addr, peer = %addr, "removed failed neighbour");
            }
        }
    }

    pub fn remove_neighbour(&self, addr: &str) -> bool {
        self.neighbours.write().remove(addr)
    }

    /// Asks every other neighbour to check each neighbour that failed this
    /// round and drop it if it is unreachable.
    pub fn notify_of_majority_failure(self: &Arc<Self>) {
        let failed = self.failed.lock().clone();
        if failed.is_empty() {
            return;
        }
        let peers = self.neighbours.read().snapshot();
        let timeout = self.settings.rpc_timeout();
        for suspect in failed {
            for (addr, link) in peers.iter().filter(|(a, _)| *a != suspect) {
                let link = link.clone();
                let addr = addr.clone();
                let suspect = suspect.clone();
                let node_addr = self.addr.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(timeout, link.clean_your_neighbours(&suspect)).await
                    {
                        Ok(Ok(removed)) => {
                            debug!(node = %node_addr, peer = %addr, suspect = %suspect, removed, "clean request done")
                        }
                        Ok(Err(e)) => {
                            debug!(node = %node_addr, peer = %addr, error = %e, "clean request failed")
                        }
                        Err(_) => debug!(node = %node_addr, peer = %addr, "clean request timed out"),
                    }
                });
            }
        }
    }

    /// Pings `peer` and removes it when it does not answer.
    pub async fn clean_neighbours_on_request(&self, peer: &str) -> bool {
        let link = self.neighbours.read().conns.get(peer).cloned();
        let Some(link) = link else {
            return false;
        };
        let alive = matches!(
            tokio::time::timeout(self.settings.rpc_timeout(), link.are_you_alive()).await,
            Ok(Ok(true))
        );
        if alive {
            return false;
        }
        let removed = self.remove_neighbour(peer);
        if removed {
            info!(node = %self.addr, peer = %peer, "removed unreachable neighbour on request");
        }
        removed
    }

    /// Dials each address and performs the reciprocal handshake. Failures are
    /// returned per address; the rest of the join proceeds.
    pub async fn become_neighbours(&self, addrs: &[String]) -> Vec<PaxosError> {
        let mut errors = Vec::new();
        for addr in addrs {
            if *addr == self.addr {
                continue;
            }
            match self.connect_to(addr).await {
                Ok(()) => info!(node = %self.addr, peer = %addr, "connected to neighbour"),
                Err(e) => {
                    warn!(node = %self.addr, peer = %addr, error = %e, "could not connect to neighbour");
                    errors.push(e);
                }
            }
        }
        errors
    }

    async fn connect_to(&self, addr: &str) -> PaxosResult<()> {
        let link = self
            .connector
            .dial(addr)
            .await
            .map_err(|_| PaxosError::NeighbourConnection(addr.to_string()))?;
        let connected = tokio::time::timeout(
            self.settings.rpc_timeout(),
            link.connect_remote_neighbour(&self.addr),
        )
        .await;
        match connected {
            Ok(Ok(true)) => {
                self.record_neighbour(addr, link);
                Ok(())
            }
            _ => Err(PaxosError::NeighbourConnection(addr.to_string())),
        }
    }

    /// Inbound half of the handshake: dial back and record the connection.
    pub async fn accept_neighbour_connection(&self, addr: &str) -> PaxosResult<bool> {
        let link = self
            .connector
            .dial(addr)
            .await
            .map_err(|_| PaxosError::NeighbourConnection(addr.to_string()))?;
        self.record_neighbour(addr, link);
        info!(
            node = %self.addr,
            peer = %addr,
            neighbours = self.neighbour_count(),
            "accepted neighbour connection"
        );
        Ok(true)
    }

    fn record_neighbour(&self, addr: &str, link: Arc<dyn PeerLink>) {
        self.neighbours.write().insert(addr, link);
        // a reconnecting peer must not be evicted by a stale failure mark
        self.failed.lock().retain(|a| a != addr);
    }

    async fn pull_logs(&self) -> (Vec<(String, Vec<Message>)>, Vec<String>) {
        let peers = self.neighbours.read().snapshot();
        let timeout = self.settings.rpc_timeout();
        let mut tasks = JoinSet::new();
        for (addr, link) in peers {
            tasks.spawn(async move {
                let result = match tokio::time::timeout(timeout, link.read_from_learner()).await {
                    Ok(result) => result,
                    Err(_) => Err(PaxosError::Timeout(addr.clone())),
                };
                (addr, result)
            });
        }

        let mut logs = Vec::new();
        let mut unreachable = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((addr, Ok(log))) => logs.push((addr, log)),
                Ok((addr, Err(e))) => {
                    debug!(node = %self.addr, peer = %addr, error = %e, "log read failed");
                    unreachable.push(addr);
                }
                Err(e) => warn!(node = %self.addr, error = %e, "log read task aborted"),
            }
        }
        (logs, unreachable)
    }

    fn raise_id_floor(&self, log: &[Message]) {
        if let Some(max_id) = log.iter().map(|m| m.id()).max() {
            self.proposer.update_message_id(max_id);
        }
    }

    /// Adopts the longest log any neighbour reports. Neighbours that cannot
    /// be read are dropped.
    pub async fn set_initial_log(&self) -> PaxosResult<RoundNum> {
        let (logs, unreachable) = self.pull_logs().await;
        for addr in &unreachable {
            self.remove_neighbour(addr);
        }

        let longest = logs
            .into_iter()
            .max_by_key(|(_, log)| log.len())
            .map(|(addr, log)| {
                debug!(node = %self.addr, peer = %addr, len = log.len(), "longest peer log");
                log
            })
            .unwrap_or_default();

        self.raise_id_floor(&longest);
        Ok(self.learner.initialize_log(longest))
    }

    /// Extends the local log from the longest peer log that has it as a
    /// prefix.
    pub async fn catch_up(&self) -> bool {
        let (logs, unreachable) = self.pull_logs().await;
        for addr in &unreachable {
            self.mark_failed(addr);
        }
        let Some((_, longest)) = logs.into_iter().max_by_key(|(_, log)| log.len()) else {
            return false;
        };
        self.raise_id_floor(&longest);
        self.learner.extend_from(&longest)
    }

    pub fn unmount(&self) {
        let mut table = self.neighbours.write();
        table.addrs.clear();
        table.conns.clear();
        self.failed.lock().clear();
        info!(node = %self.addr, "unmounted paxos node");
    }
}
