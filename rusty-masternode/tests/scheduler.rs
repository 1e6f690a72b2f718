mod common;

use std::sync::Arc;

use common::*;
use rusty_masternode::{ChainView, MasternodeRegistry, MemoryChain, PaymentScheduler, PaymentVoteLedger, StagedRewards};

fn scheduler() -> PaymentScheduler {
    let params = params();
    PaymentScheduler::new(params.clone(), config(), Arc::new(StagedRewards::new(params)), None)
}

/// Records two votes for `payee` at `height`, enough to count as paid.
fn pay(
    chain: &MemoryChain,
    registry: &MasternodeRegistry,
    ledger: &PaymentVoteLedger,
    voters: [&TestNode; 2],
    payee: &TestNode,
    height: u64,
) {
    for voter in voters {
        let vote = voter.vote(height, payee.payee_script(), chain.adjusted_time());
        ledger.add_vote(chain, registry, &vote).unwrap();
    }
}

#[test]
fn test_longest_waiting_unscheduled_entry_is_next() {
    let params = params();
    let chain = chain(300);
    let tip = chain.tip().unwrap().height;
    let nodes = nodes(12);
    let registry = enabled_registry(&params, &chain, &nodes);
    let ledger = ledger(&params);
    let scheduler = scheduler();

    pay(&chain, &registry, &ledger, [&nodes[0], &nodes[1]], &nodes[0], tip - 12);
    pay(&chain, &registry, &ledger, [&nodes[0], &nodes[1]], &nodes[1], tip - 8);
    for (i, payee) in nodes[2..].iter().enumerate() {
        let voters = [&nodes[2 * (i % 5)], &nodes[2 * (i % 5) + 1]];
        let height = if i < 5 { tip - 2 } else { tip - 1 };
        pay(&chain, &registry, &ledger, voters, payee, height);
    }

    // Every entry registered less than 12 × 156 s ago, so the registration
    // filter leaves nobody and is dropped.
    let next = scheduler.next_in_queue(&chain, &registry, &ledger, tip + 1).unwrap();
    assert_eq!(next.outpoint, nodes[0].outpoint);
    assert!(
        scheduler.seconds_since_payment(&chain, &ledger, &next, 12)
            > scheduler.seconds_since_payment(&chain, &ledger, &registry.find(&nodes[1].outpoint).unwrap(), 12)
    );

    // Once it leads an upcoming block it is skipped.
    for voter in &nodes[..3] {
        let vote = voter.vote(tip + 2, nodes[0].payee_script(), chain.adjusted_time());
        ledger.add_vote(&chain, &registry, &vote).unwrap();
    }
    let next = scheduler.next_in_queue(&chain, &registry, &ledger, tip + 1).unwrap();
    assert_eq!(next.outpoint, nodes[1].outpoint);
}

#[test]
fn test_fresh_registrations_wait_their_turn() {
    let params = params();
    let chain = chain(300);
    let tip = chain.tip().unwrap().height;
    let nodes = nodes(4);
    let registry = enabled_registry(&params, &chain, &nodes[..3]);
    let ledger = ledger(&params);
    let scheduler = scheduler();

    let fresh = &nodes[3];
    fresh.fund(&params, &chain);
    registry
        .process_broadcast(&chain, &fresh.broadcast(&params, &chain, chain.adjusted_time()))
        .unwrap();
    assert_eq!(registry.count_enabled(0), 3);

    for (i, payee) in nodes[..3].iter().enumerate() {
        pay(&chain, &registry, &ledger, [&nodes[0], &nodes[1]], payee, tip - 1 - i as u64);
    }

    // Never paid, yet too young while enough settled entries remain.
    let fresh_entry = registry.find(&fresh.outpoint).unwrap();
    let paid_entry = registry.find(&nodes[0].outpoint).unwrap();
    assert!(
        scheduler.seconds_since_payment(&chain, &ledger, &fresh_entry, 3)
            > scheduler.seconds_since_payment(&chain, &ledger, &paid_entry, 3)
    );
    let next = scheduler.next_in_queue(&chain, &registry, &ledger, tip + 1).unwrap();
    assert_ne!(next.outpoint, fresh.outpoint);
    assert!(nodes[..3].iter().any(|n| n.outpoint == next.outpoint));
}
