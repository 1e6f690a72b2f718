mod common;

use common::*;
use rusty_masternode::{BroadcastOutcome, ChainView, MasternodeError, MasternodeRegistry, SignedMessage};
use rusty_shared_types::masternode::MasternodeState;

#[test]
fn test_lifecycle_from_broadcast_to_removal() {
    let params = params();
    let chain = chain(200);
    let node = node(1);
    node.fund(&params, &chain);
    let registry = MasternodeRegistry::new(params.clone(), config());

    let t = chain.adjusted_time();
    let outcome = registry.process_broadcast(&chain, &node.broadcast(&params, &chain, t)).unwrap();
    assert!(matches!(outcome, BroadcastOutcome::Added { relay: true }));
    assert_eq!(registry.find(&node.outpoint).unwrap().state, MasternodeState::PreEnabled);

    let state_at = |offset: i64| {
        chain.set_time(t + offset);
        registry.check_and_remove(&chain);
        registry.find(&node.outpoint).map(|e| e.state)
    };
    assert_eq!(state_at(599), Some(MasternodeState::PreEnabled));
    assert_eq!(state_at(600), Some(MasternodeState::Enabled));
    assert_eq!(state_at(7200), Some(MasternodeState::Expired));
    assert_eq!(state_at(7800), None);
    assert_eq!(registry.count_all(), 0);
}

#[test]
fn test_spent_collateral_removes_entry() {
    let params = params();
    let chain = chain(200);
    let nodes = nodes(2);
    let registry = enabled_registry(&params, &chain, &nodes);
    assert_eq!(registry.count_enabled(0), 2);

    chain.spend(&nodes[0].outpoint);
    chain.advance_time(10);
    let removed = registry.check_and_remove(&chain);
    assert_eq!(removed, vec![nodes[0].outpoint]);
    assert!(registry.contains(&nodes[1].outpoint));
}

#[test]
fn test_newer_broadcast_wins_in_any_order() {
    let params = params();
    let chain = chain(200);
    let node = node(3);
    node.fund(&params, &chain);
    let now = chain.adjusted_time();
    let older = node.broadcast(&params, &chain, now - 100);
    let newer = node.broadcast(&params, &chain, now - 50);

    let forward = MasternodeRegistry::new(params.clone(), config());
    forward.process_broadcast(&chain, &older).unwrap();
    forward.process_broadcast(&chain, &newer).unwrap();

    let backward = MasternodeRegistry::new(params.clone(), config());
    backward.process_broadcast(&chain, &newer).unwrap();
    let err = backward.process_broadcast(&chain, &older).unwrap_err();
    assert!(matches!(err, MasternodeError::NotNewer { .. }));

    assert_eq!(forward.find(&node.outpoint).unwrap().sig_time, now - 50);
    assert_eq!(backward.find(&node.outpoint).unwrap().sig_time, now - 50);
}

#[test]
fn test_newer_broadcast_updates_enabled_entry() {
    let params = params();
    let chain = chain(200);
    let nodes = nodes(1);
    let registry = enabled_registry(&params, &chain, &nodes);
    assert_eq!(registry.find(&nodes[0].outpoint).unwrap().state, MasternodeState::Enabled);

    chain.advance_time(30);
    let update = nodes[0].broadcast(&params, &chain, chain.adjusted_time());
    let outcome = registry.process_broadcast(&chain, &update).unwrap();
    assert!(matches!(outcome, BroadcastOutcome::Updated { .. }));
    assert_eq!(registry.find(&nodes[0].outpoint).unwrap().sig_time, update.sig_time);
}

#[test]
fn test_duplicate_and_forged_broadcasts() {
    let params = params();
    let chain = chain(200);
    let node = node(4);
    node.fund(&params, &chain);
    let registry = MasternodeRegistry::new(params.clone(), config());
    let broadcast = node.broadcast(&params, &chain, chain.adjusted_time());

    registry.process_broadcast(&chain, &broadcast).unwrap();
    let err = registry.process_broadcast(&chain, &broadcast).unwrap_err();
    assert!(matches!(err, MasternodeError::AlreadySeen(..)));

    let mut forged = node.broadcast(&params, &chain, chain.adjusted_time() + 5);
    forged.protocol_version += 1;
    let err = registry.process_broadcast(&chain, &forged).unwrap_err();
    assert!(matches!(err, MasternodeError::BadSignature(..)));
    assert_eq!(err.misbehavior(), 100);
}

#[test]
fn test_broadcast_rules() {
    let params = params();
    let chain = chain(200);
    let registry = MasternodeRegistry::new(params.clone(), config());
    let now = chain.adjusted_time();

    let unfunded = node(5);
    let err = registry
        .process_broadcast(&chain, &unfunded.broadcast(&params, &chain, now))
        .unwrap_err();
    assert!(matches!(err, MasternodeError::CollateralNotFound(_)));
    assert!(err.is_deferred());

    let future = node(6);
    future.fund(&params, &chain);
    let err = registry
        .process_broadcast(&chain, &future.broadcast(&params, &chain, now + 3601))
        .unwrap_err();
    assert!(matches!(err, MasternodeError::FutureTimestamp(..)));
    assert_eq!(err.misbehavior(), 30);

    let wrong_port = node(7);
    wrong_port.fund(&params, &chain);
    let mut broadcast = wrong_port.broadcast(&params, &chain, now);
    broadcast.addr.set_port(9999);
    broadcast.sign(&wrong_port.collateral);
    let err = registry.process_broadcast(&chain, &broadcast).unwrap_err();
    assert!(matches!(err, MasternodeError::WrongPort { .. }));

    // Signed before the collateral reached its confirmations.
    let early = node(8);
    early.fund(&params, &chain);
    let err = registry
        .process_broadcast(&chain, &early.broadcast(&params, &chain, GENESIS_TIME))
        .unwrap_err();
    assert!(matches!(err, MasternodeError::SignedBeforeConfirmation { .. }));
}

#[test]
fn test_deferred_broadcast_is_retried() {
    let params = params();
    let chain = chain(200);
    let node = node(9);
    let registry = MasternodeRegistry::new(params.clone(), config());
    let broadcast = node.broadcast(&params, &chain, chain.adjusted_time());

    assert!(registry.process_broadcast(&chain, &broadcast).unwrap_err().is_deferred());
    node.fund(&params, &chain);
    assert!(registry.process_broadcast(&chain, &broadcast).is_ok());
}

#[test]
fn test_ping_rules() {
    let params = params();
    let chain = chain(200);
    let nodes = nodes(2);
    let registry = enabled_registry(&params, &chain, &nodes);
    let now = chain.adjusted_time();

    // The embedded ping is 700 seconds old, so a fresh one is accepted.
    let outcome = registry.process_ping(&chain, &nodes[0].ping(&chain, now), true).unwrap();
    assert_eq!(outcome.state, MasternodeState::Enabled);
    assert!(outcome.relay);

    let err = registry.process_ping(&chain, &nodes[0].ping(&chain, now + 30), true).unwrap_err();
    assert!(matches!(err, MasternodeError::PingTooEarly { .. }));

    let mut forged = nodes[1].ping(&chain, now);
    forged.signature = nodes[0].ping(&chain, now).signature;
    let err = registry.process_ping(&chain, &forged, true).unwrap_err();
    assert_eq!(err.misbehavior(), 33);

    let stranger = node(40);
    let err = registry.process_ping(&chain, &stranger.ping(&chain, now), true).unwrap_err();
    assert!(matches!(err, MasternodeError::UnknownMasternode(_)));
}

#[test]
fn test_older_ping_never_replaces_newer() {
    let params = params();
    let chain = chain(200);
    let nodes = nodes(1);
    let registry = enabled_registry(&params, &chain, &nodes);
    let now = chain.adjusted_time();

    registry.process_ping(&chain, &nodes[0].ping(&chain, now), true).unwrap();
    for sig_time in [now - 1200, now - 100, now - 1] {
        let err = registry
            .process_ping(&chain, &nodes[0].ping(&chain, sig_time), true)
            .unwrap_err();
        assert!(matches!(err, MasternodeError::PingTooEarly { last, .. } if last == now));
    }
    assert_eq!(registry.find(&nodes[0].outpoint).unwrap().last_ping_time(), now);
}

#[test]
fn test_ping_timestamp_and_anchor_rules() {
    let params = params();
    let chain = chain(200);
    let nodes = nodes(1);
    let registry = enabled_registry(&params, &chain, &nodes);
    let now = chain.adjusted_time();
    let tip = chain.tip().unwrap().height;

    let err = registry
        .process_ping(&chain, &nodes[0].ping(&chain, now - 3600), true)
        .unwrap_err();
    assert!(matches!(err, MasternodeError::ExpiredTimestamp(..)));

    let deep = nodes[0].ping_at(chain.block_hash(tip - 25).unwrap(), now);
    let err = registry.process_ping(&chain, &deep, true).unwrap_err();
    assert!(matches!(err, MasternodeError::StaleAnchor { depth: 25, limit: 24, .. }));

    let unknown = nodes[0].ping_at([0xee; 32], now);
    let err = registry.process_ping(&chain, &unknown, true).unwrap_err();
    assert!(matches!(err, MasternodeError::UnknownBlock(_)));
    assert!(err.is_deferred());
    assert_eq!(err.misbehavior(), 0);

    // Deepest anchor still accepted.
    let edge = nodes[0].ping_at(chain.block_hash(tip - 24).unwrap(), now);
    assert!(registry.process_ping(&chain, &edge, true).is_ok());
}

#[test]
fn test_newer_broadcast_re_enables_under_timelock() {
    let params = timelock_params();
    let chain = chain(200);
    let nodes = nodes(1);
    let registry = enabled_registry(&params, &chain, &nodes);
    assert_eq!(registry.find(&nodes[0].outpoint).unwrap().state, MasternodeState::Enabled);

    chain.advance_time(30);
    let update = nodes[0].broadcast(&params, &chain, chain.adjusted_time());
    let outcome = registry.process_broadcast(&chain, &update).unwrap();
    assert!(matches!(outcome, BroadcastOutcome::Updated { relay: true }));
    assert_eq!(registry.find(&nodes[0].outpoint).unwrap().state, MasternodeState::ReEnabled);

    chain.advance_time(600);
    registry.check_and_remove(&chain);
    assert_eq!(registry.find(&nodes[0].outpoint).unwrap().state, MasternodeState::Enabled);
}

#[test]
fn test_snapshot_restores_entries() {
    let params = params();
    let chain = chain(200);
    let registry = enabled_registry(&params, &chain, &nodes(3));

    let restored = MasternodeRegistry::new(params.clone(), config());
    restored.restore(registry.snapshot());
    assert_eq!(restored.entries(), registry.entries());
}
