use paxlog::paxos::{Acceptor, AcceptorStorage, AcceptorStore, Learner, Proposer};
use paxlog::*;
use std::sync::Arc;

fn acceptor() -> Acceptor {
    Acceptor::new(
        "acceptor-1".to_string(),
        Arc::new(AcceptorStore::temporary().unwrap()),
        Durability::Strict,
    )
}

/// Loads succeed empty, every save fails like a full disk.
struct BrokenDisk;

impl AcceptorStorage for BrokenDisk {
    fn load_promised(&self, _node_id: &str) -> PaxosResult<Option<Message>> {
        Ok(None)
    }

    fn load_accepted(&self, _node_id: &str) -> PaxosResult<Option<Message>> {
        Ok(None)
    }

    fn save_promised(&self, _node_id: &str, _msg: &Message) -> PaxosResult<()> {
        Err(sled::Error::Unsupported("disk full".to_string()).into())
    }

    fn save_accepted(&self, _node_id: &str, _msg: &Message) -> PaxosResult<()> {
        Err(sled::Error::Unsupported("disk full".to_string()).into())
    }
}

fn broken_acceptor(durability: Durability) -> Acceptor {
    Acceptor::new("acceptor-1".to_string(), Arc::new(BrokenDisk), durability)
}

fn prepare(id: u64, proposer: &str, round: u64) -> Message {
    Message::new(id, MessageKind::Prepare, "", proposer, round, 3)
}

fn accept(id: u64, value: &str, proposer: &str, round: u64) -> Message {
    Message::new(id, MessageKind::Accept, value, proposer, round, 3)
}

#[test]
fn test_proposer_ids_increase() {
    let proposer = Proposer::new("node-a".to_string());
    let first = proposer.create_prepare(0, 5);
    let second = proposer.create_prepare(0, 5);
    assert_eq!(first.id(), 1);
    assert_eq!(second.id(), 2);
    assert_eq!(second.kind(), MessageKind::Prepare);
    assert_eq!(second.value(), "");
    assert_eq!(second.proposer_id(), "node-a");
    assert_eq!(second.bounces(), 5);
}

#[test]
fn test_proposer_accept_reuses_prepare_id() {
    let proposer = Proposer::new("node-a".to_string());
    let prepare = proposer.create_prepare(2, 5);
    proposer.update_message_id(40);

    let accept = proposer.create_accept("entry", 2, 4);
    assert_eq!(accept.id(), prepare.id());
    assert_eq!(accept.kind(), MessageKind::Accept);
    assert_eq!(accept.value(), "entry");
    assert_eq!(accept.round_num(), 2);
    assert_eq!(accept.bounces(), 4);

    assert_eq!(proposer.create_prepare(2, 5).id(), 41);
}

#[test]
fn test_proposer_prepare_carries_remaining_bounces() {
    let proposer = Proposer::new("node-a".to_string());
    let fresh = proposer.create_prepare(0, 5);
    let retried = proposer.create_prepare(0, 2);
    assert_eq!(fresh.bounces(), 5);
    assert_eq!(retried.bounces(), 2);
    assert_eq!(retried.id(), fresh.id() + 1);
}

#[test]
fn test_proposer_floor_never_decreases() {
    let proposer = Proposer::new("node-a".to_string());
    proposer.update_message_id(10);
    proposer.update_message_id(3);
    assert_eq!(proposer.message_id(), 10);
}

#[test]
fn test_acceptor_first_prepare_is_promised() {
    let acceptor = acceptor();
    let p = prepare(1, "node-a", 0);
    assert!(acceptor.process_prepare(&p).unwrap().equals(&p));
    assert!(acceptor.snapshot().last_promised.unwrap().equals(&p));
}

#[test]
fn test_acceptor_out_of_order_prepares() {
    let acceptor = acceptor();
    let p5 = prepare(5, "node-a", 0);
    let p7 = prepare(7, "node-b", 0);

    assert!(acceptor.process_prepare(&p5).unwrap().equals(&p5));
    assert!(acceptor.process_prepare(&p7).unwrap().equals(&p7));

    // late prepare 5 is refused with the current promise
    assert!(acceptor.process_prepare(&p5).unwrap().equals(&p7));

    // accept 5 is refused and nothing has been accepted yet
    assert!(acceptor
        .process_accept(&accept(5, "five", "node-a", 0))
        .unwrap()
        .is_none());
    let state = acceptor.snapshot();
    assert_eq!(state.last_promised.unwrap().id(), 7);
    assert!(state.last_accepted.is_none());

    let a7 = accept(7, "seven", "node-b", 0);
    assert!(acceptor.process_accept(&a7).unwrap().unwrap().equals(&a7));
}

#[test]
fn test_acceptor_repeated_prepare_is_idempotent() {
    let acceptor = acceptor();
    let p = prepare(4, "node-a", 1);
    assert!(acceptor.process_prepare(&p).unwrap().equals(&p));
    assert!(acceptor.process_prepare(&p).unwrap().equals(&p));
}

#[test]
fn test_acceptor_repeated_accept_is_idempotent() {
    let acceptor = acceptor();
    acceptor.process_prepare(&prepare(2, "node-a", 0)).unwrap();
    let a = accept(2, "v", "node-a", 0);
    assert!(acceptor.process_accept(&a).unwrap().unwrap().equals(&a));
    assert!(acceptor.process_accept(&a).unwrap().unwrap().equals(&a));
}

#[test]
fn test_acceptor_prepare_tie_breaks_on_proposer() {
    let acceptor = acceptor();
    let a = prepare(5, "node-a", 0);
    let b = prepare(5, "node-b", 0);
    assert!(acceptor.process_prepare(&a).unwrap().equals(&a));
    assert!(acceptor.process_prepare(&b).unwrap().equals(&b));
    assert!(acceptor.process_prepare(&a).unwrap().equals(&b));
}

#[test]
fn test_acceptor_later_round_supersedes() {
    let acceptor = acceptor();
    acceptor.process_prepare(&prepare(9, "node-a", 0)).unwrap();
    let next = prepare(1, "node-b", 1);
    assert!(acceptor.process_prepare(&next).unwrap().equals(&next));
}

#[test]
fn test_acceptor_accept_above_promise_raises_promise() {
    let acceptor = acceptor();
    acceptor.process_prepare(&prepare(2, "node-a", 0)).unwrap();
    let a = accept(6, "v", "node-b", 0);
    assert!(acceptor.process_accept(&a).unwrap().unwrap().equals(&a));

    let state = acceptor.snapshot();
    assert!(state.last_promised.unwrap().equals(&a));
    assert!(acceptor
        .process_prepare(&prepare(4, "node-c", 0))
        .unwrap()
        .equals(&a));
}

#[test]
fn test_acceptor_promised_state_only_grows() {
    let acceptor = acceptor();
    let ids = [3u64, 1, 8, 2, 8, 5, 11, 7];
    let mut highest = 0;
    for id in ids {
        acceptor.process_prepare(&prepare(id, "node-a", 0)).unwrap();
        let promised = acceptor.snapshot().last_promised.unwrap().id();
        assert!(promised >= highest);
        highest = promised;
    }
    assert_eq!(highest, 11);
}

#[test]
fn test_acceptor_rejects_wrong_kind() {
    let acceptor = acceptor();
    let err = acceptor
        .process_prepare(&accept(1, "v", "node-a", 0))
        .unwrap_err();
    assert!(matches!(
        err,
        PaxosError::InvalidMessageType(MessageKind::Accept)
    ));

    let err = acceptor.process_accept(&prepare(1, "node-a", 0)).unwrap_err();
    assert!(matches!(
        err,
        PaxosError::InvalidMessageType(MessageKind::Prepare)
    ));
}

#[test]
fn test_acceptor_accepted_for_round() {
    let acceptor = acceptor();
    acceptor.process_prepare(&prepare(1, "node-a", 3)).unwrap();
    acceptor
        .process_accept(&accept(1, "entry", "node-a", 3))
        .unwrap();
    assert_eq!(acceptor.accepted_for_round(3).unwrap().value(), "entry");
    assert!(acceptor.accepted_for_round(4).is_none());
}

#[test]
fn test_acceptor_restores_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("acceptor-db");
    let p = prepare(4, "node-a", 2);
    let a = accept(4, "durable", "node-a", 2);

    {
        let store = Arc::new(AcceptorStore::open(&path).unwrap());
        let acceptor = Acceptor::new("acceptor-1".to_string(), store, Durability::Strict);
        acceptor.process_prepare(&p).unwrap();
        acceptor.process_accept(&a).unwrap();
    }

    let store = Arc::new(AcceptorStore::open(&path).unwrap());
    let acceptor = Acceptor::new("acceptor-1".to_string(), store, Durability::Strict);
    assert!(acceptor.snapshot().last_promised.is_none());
    acceptor.restore_from_backup().unwrap();

    let state = acceptor.snapshot();
    assert!(state.last_promised.unwrap().equals(&p));
    assert!(state.last_accepted.unwrap().equals(&a));

    // restored promise still refuses older ballots
    assert!(acceptor
        .process_prepare(&prepare(1, "node-b", 2))
        .unwrap()
        .equals(&p));
}

#[test]
fn test_acceptor_records_are_keyed_by_identity() {
    let store = Arc::new(AcceptorStore::temporary().unwrap());
    let a = Acceptor::new("id-a".to_string(), store.clone(), Durability::Strict);
    a.process_prepare(&prepare(1, "node-a", 0)).unwrap();

    let b = Acceptor::new("id-b".to_string(), store, Durability::Strict);
    b.restore_from_backup().unwrap();
    assert!(b.snapshot().last_promised.is_none());
}

#[test]
fn test_strict_acceptor_fails_vote_when_save_fails() {
    let acceptor = broken_acceptor(Durability::Strict);
    let p = prepare(1, "node-a", 0);
    assert!(matches!(
        acceptor.process_prepare(&p).unwrap_err(),
        PaxosError::Storage(_)
    ));
    assert!(acceptor.snapshot().last_promised.is_none());

    assert!(matches!(
        acceptor
            .process_accept(&accept(1, "v", "node-a", 0))
            .unwrap_err(),
        PaxosError::Storage(_)
    ));
    assert!(acceptor.snapshot().last_accepted.is_none());
}

#[test]
fn test_best_effort_acceptor_keeps_decision_when_save_fails() {
    let acceptor = broken_acceptor(Durability::BestEffort);
    let p = prepare(1, "node-a", 0);
    assert!(acceptor.process_prepare(&p).unwrap().equals(&p));

    let a = accept(1, "v", "node-a", 0);
    assert!(acceptor.process_accept(&a).unwrap().unwrap().equals(&a));

    let state = acceptor.snapshot();
    assert!(state.last_promised.unwrap().equals(&p));
    assert!(state.last_accepted.unwrap().equals(&a));
}

#[test]
fn test_node_identity_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity-db");
    let first = AcceptorStore::open(&path).unwrap().node_identity().unwrap();
    let second = AcceptorStore::open(&path).unwrap().node_identity().unwrap();
    assert_eq!(first, second);
    assert!(uuid::Uuid::parse_str(&first).is_ok());
}

#[test]
fn test_learner_appends_in_order() {
    let learner = Learner::new();
    assert_eq!(learner.current_round(), 0);
    assert_eq!(learner.learn_value(&accept(1, "a", "n", 0)).unwrap(), 1);
    assert_eq!(learner.learn_value(&accept(2, "b", "n", 1)).unwrap(), 2);
    assert_eq!(learner.log_value(1).unwrap().value(), "b");
    assert_eq!(learner.current_log().len(), 2);
}

#[test]
fn test_learner_rejects_written_round() {
    let learner = Learner::new();
    learner.learn_value(&accept(1, "a", "n", 0)).unwrap();
    let err = learner.learn_value(&accept(2, "b", "n", 0)).unwrap_err();
    assert!(matches!(err, PaxosError::RoundAlreadyWritten(0)));
}

#[test]
fn test_learner_parks_future_rounds() {
    let learner = Learner::new();
    let ahead = accept(5, "second", "n", 1);
    assert_eq!(learner.learn_value(&ahead).unwrap(), 0);
    assert_eq!(learner.current_round(), 0);
    assert!(learner.contains(&ahead));

    assert_eq!(learner.learn_value(&accept(4, "first", "n", 0)).unwrap(), 2);
    let values: Vec<String> = learner
        .current_log()
        .iter()
        .map(|m| m.value().to_string())
        .collect();
    assert_eq!(values, vec!["first", "second"]);
}

#[test]
fn test_learner_log_value_out_of_range() {
    let learner = Learner::new();
    assert!(matches!(
        learner.log_value(0).unwrap_err(),
        PaxosError::InvalidLogIndex(0)
    ));
}

#[test]
fn test_learner_counts_distinct_senders_per_proposal() {
    let learner = Learner::new();
    let everyone = |_: &str| true;
    let a = accept(3, "v", "node-a", 0);
    let b = accept(3, "v", "node-b", 0);
    assert_eq!(learner.num_already_accepted(&a, "x", everyone), 1);
    assert_eq!(learner.num_already_accepted(&a, "x", everyone), 1);
    assert_eq!(learner.num_already_accepted(&a, "y", everyone), 2);
    assert_eq!(learner.num_already_accepted(&b, "x", everyone), 1);
    assert_eq!(learner.num_already_accepted(&a, "z", everyone), 3);
}

#[test]
fn test_learner_ignores_non_member_senders() {
    let learner = Learner::new();
    let msg = accept(3, "v", "node-a", 0);
    let members = |s: &str| s == "x" || s == "y";
    assert_eq!(learner.num_already_accepted(&msg, "stranger", members), 0);
    assert_eq!(learner.num_already_accepted(&msg, "x", members), 1);

    // membership is evaluated on every count
    assert_eq!(learner.num_already_accepted(&msg, "y", |_| true), 3);
}

#[test]
fn test_learner_initialize_truncates_bad_rounds() {
    let learner = Learner::new();
    let log = vec![
        accept(1, "a", "n", 0),
        accept(2, "b", "n", 1),
        accept(3, "c", "n", 5),
    ];
    assert_eq!(learner.initialize_log(log), 2);
    assert_eq!(learner.current_round(), 2);
}

#[test]
fn test_learner_extend_from_prefix() {
    let learner = Learner::new();
    let r0 = accept(1, "a", "n", 0);
    let r1 = accept(2, "b", "n", 1);
    let r2 = accept(3, "c", "n", 2);
    learner.learn_value(&r0).unwrap();

    assert!(learner.extend_from(&[r0.clone(), r1.clone(), r2.clone()]));
    assert_eq!(learner.current_round(), 3);
    assert!(!learner.extend_from(&[r0, r1]));
}

#[test]
fn test_learner_extend_refuses_divergent_log() {
    let learner = Learner::new();
    learner.learn_value(&accept(1, "mine", "n", 0)).unwrap();
    let other = vec![accept(1, "theirs", "m", 0), accept(2, "next", "m", 1)];
    assert!(!learner.extend_from(&other));
    assert_eq!(learner.current_round(), 1);
    assert_eq!(learner.log_value(0).unwrap().value(), "mine");
}
