use paxlog::*;

#[test]
fn test_message_hash_is_deterministic() {
    let a = Message::new(3, MessageKind::Accept, "hello", "node-a", 0, 5);
    let b = Message::new(3, MessageKind::Accept, "hello", "node-a", 0, 5);
    assert_eq!(a.hash(), b.hash());
    assert!(a.equals(&b));
    assert_eq!(a, b);
    assert_eq!(a.hash().len(), 64);
}

#[test]
fn test_message_hash_ignores_bounces() {
    let a = Message::new(3, MessageKind::Accept, "hello", "node-a", 0, 5);
    let b = Message::new(3, MessageKind::Accept, "hello", "node-a", 0, 1);
    assert!(a.equals(&b));
    assert_eq!(b.bounces(), 1);
}

#[test]
fn test_message_hash_covers_every_field() {
    let base = Message::new(3, MessageKind::Accept, "hello", "node-a", 0, 5);
    let variants = [
        Message::new(4, MessageKind::Accept, "hello", "node-a", 0, 5),
        Message::new(3, MessageKind::Prepare, "hello", "node-a", 0, 5),
        Message::new(3, MessageKind::Accept, "hullo", "node-a", 0, 5),
        Message::new(3, MessageKind::Accept, "hello", "node-b", 0, 5),
        Message::new(3, MessageKind::Accept, "hello", "node-a", 1, 5),
    ];
    for variant in &variants {
        assert!(!base.equals(variant), "{:?} collided with base", variant);
    }
}

#[test]
fn test_message_hash_separates_proposer_and_value() {
    let a = Message::new(1, MessageKind::Accept, "bc", "a", 0, 1);
    let b = Message::new(1, MessageKind::Accept, "c", "ab", 0, 1);
    assert!(!a.equals(&b));
}

#[test]
fn test_verify_hash_after_roundtrip() {
    let msg = Message::new(9, MessageKind::Prepare, "", "node-z", 4, 2);
    let json = serde_json::to_string(&msg).unwrap();
    let decoded: Message = serde_json::from_str(&json).unwrap();
    assert!(decoded.verify_hash());
    assert!(decoded.equals(&msg));

    let tampered = json.replace("node-z", "node-y");
    let forged: Message = serde_json::from_str(&tampered).unwrap();
    assert!(!forged.verify_hash());
}

#[test]
fn test_ballot_ordering() {
    let low_round = Message::new(9, MessageKind::Prepare, "", "node-a", 0, 1);
    let high_round = Message::new(1, MessageKind::Prepare, "", "node-a", 1, 1);
    assert!(high_round.ballot() > low_round.ballot());

    let low_id = Message::new(5, MessageKind::Prepare, "", "node-z", 2, 1);
    let high_id = Message::new(7, MessageKind::Prepare, "", "node-a", 2, 1);
    assert!(high_id.ballot() > low_id.ballot());

    let tie_a = Message::new(5, MessageKind::Prepare, "", "node-a", 2, 1);
    let tie_b = Message::new(5, MessageKind::Prepare, "", "node-b", 2, 1);
    assert!(tie_b.ballot() > tie_a.ballot());
}

#[test]
fn test_proposal_key_ignores_kind() {
    let prepare = Message::new(5, MessageKind::Prepare, "", "node-a", 2, 1);
    let accept = Message::new(5, MessageKind::Accept, "v", "node-a", 2, 1);
    assert_eq!(prepare.proposal_key(), accept.proposal_key());
    assert!(!prepare.equals(&accept));
}

#[test]
fn test_node_phase_display() {
    assert_eq!(NodePhase::default(), NodePhase::Idle);
    assert_eq!(NodePhase::Preparing.to_string(), "preparing");
    assert_eq!(NodePhase::Learning.to_string(), "learning");
    assert_eq!(MessageKind::Accept.to_string(), "ACCEPT");
}

#[test]
fn test_error_classification() {
    assert!(PaxosError::Timeout("a".into()).is_connectivity());
    assert!(PaxosError::NeighbourConnection("a".into()).is_connectivity());
    assert!(PaxosError::rpc("a", "refused").is_connectivity());
    assert!(!PaxosError::RoundAlreadyWritten(2).is_connectivity());
    assert!(!PaxosError::InvalidMessageType(MessageKind::Prepare).is_connectivity());
}

#[test]
fn test_config_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paxlog.toml");

    let mut config = NodeConfig::default();
    config.bind_port = 7100;
    config.paxos.durability = Durability::BestEffort;
    config.save(&path).unwrap();

    let loaded = NodeConfig::load(&path).unwrap();
    assert_eq!(loaded.bind_port, 7100);
    assert_eq!(loaded.listen_addr(), "127.0.0.1:7100");
    assert_eq!(loaded.advertise_addr(), "127.0.0.1:7100");
    assert_eq!(loaded.paxos.durability, Durability::BestEffort);
    assert_eq!(loaded.store_path(), loaded.data_dir.join("paxos"));
}

#[test]
fn test_paxos_settings_floor_bounces() {
    let settings = PaxosSettings {
        max_bounces: 0,
        ..PaxosSettings::default()
    };
    assert_eq!(settings.max_bounces(), 1);
    assert_eq!(PaxosSettings::default().durability, Durability::Strict);
}
