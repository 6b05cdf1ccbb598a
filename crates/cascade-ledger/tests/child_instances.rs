mod common;

use cascade_ledger::{Call, Engine, EngineConfig, Error, LeaderTransaction, LedgerEvent, UNIT};
use common::{accounts, approve, funded_engine, params, root_with_leaders, FUNDS};

#[test]
fn seeded_child_contributes_into_parent() {
    let accts = accounts(3);
    let mut engine = funded_engine(&accts);
    let root = root_with_leaders(&mut engine, &accts, 2, UNIT);

    let child = engine
        .deploy_child(root.ledger, accts[2].address, params("Child"), 2 * UNIT)
        .unwrap();

    let board = engine.leaderboard(&child.ledger).unwrap();
    assert_eq!(board.owner_of(0), Some(accts[2].address));
    assert_eq!(board.contribution_of(0).unwrap(), 2 * UNIT);
    assert_eq!(board.name(), "Child Leaderboard");

    // The child wallet is now a leader upstream
    let parent = engine.leaderboard(&root.ledger).unwrap();
    assert_eq!(parent.owner_of(2), Some(child.wallet));
    assert_eq!(parent.contribution_of(2).unwrap(), 2 * UNIT);

    assert_eq!(engine.balance(&accts[0].address), FUNDS + UNIT + UNIT);
    assert_eq!(engine.balance(&accts[1].address), FUNDS - UNIT + UNIT);
    assert_eq!(engine.balance(&accts[2].address), FUNDS - 2 * UNIT);
    assert_eq!(engine.balance(&child.ledger), 0);
    assert_eq!(engine.balance(&child.wallet), 0);

    assert_eq!(engine.total_children(&root.ledger), 1);
    let record = engine.child_at(&root.ledger, 0).unwrap();
    assert_eq!(record.child, child.ledger);
    assert_eq!(record.wallet, child.wallet);
    assert_eq!(record.deployer, accts[2].address);
    assert_eq!(record.parent, Some(root.ledger));
    assert_eq!(record.order, 0);

    assert!(engine.events().iter().any(|e| matches!(
        e,
        LedgerEvent::ChildDeployed { child: c, amount, .. } if *c == child.ledger && *amount == 2 * UNIT
    )));
}

#[test]
fn unfunded_child_keeps_its_first_contribution() {
    let accts = accounts(4);
    let mut engine = funded_engine(&accts);
    let root = root_with_leaders(&mut engine, &accts, 1, UNIT);

    let child = engine
        .deploy_child(root.ledger, accts[1].address, params("Child"), 0)
        .unwrap();
    let board = engine.leaderboard(&child.ledger).unwrap();
    assert_eq!(board.owner_of(0), Some(accts[1].address));
    assert_eq!(board.contribution_of(0).unwrap(), 0);
    assert_eq!(engine.child_at(&root.ledger, 0).unwrap().seed, 0);

    engine.contribute(child.ledger, accts[2].address, 3 * UNIT).unwrap();

    // Nothing went upstream and the empty slot 0 earned nothing
    assert_eq!(engine.leaderboard(&root.ledger).unwrap().filled(), 1);
    assert_eq!(engine.balance(&accts[0].address), FUNDS);
    assert_eq!(engine.balance(&accts[1].address), FUNDS);
    assert_eq!(engine.balance(&child.ledger), 3 * UNIT);
    assert_eq!(
        engine.leaderboard(&child.ledger).unwrap().owner_of(1),
        Some(accts[2].address)
    );

    // Later contributions are paid by stake
    engine.contribute(child.ledger, accts[3].address, UNIT).unwrap();
    assert_eq!(engine.balance(&accts[2].address), FUNDS - 3 * UNIT + UNIT);
    assert_eq!(engine.balance(&accts[1].address), FUNDS);
    assert_eq!(engine.total_balances(), engine.total_minted());
}

#[test]
fn funded_grandchild_stakes_only_in_its_parent() {
    let accts = accounts(4);
    let mut engine = funded_engine(&accts);
    let root = root_with_leaders(&mut engine, &accts, 1, UNIT);
    let child = engine
        .deploy_child(root.ledger, accts[1].address, params("Child"), 0)
        .unwrap();

    let grandchild = engine
        .deploy_child(child.ledger, accts[2].address, params("Grandchild"), 4 * UNIT)
        .unwrap();

    assert_eq!(
        engine.leaderboard(&grandchild.ledger).unwrap().owner_of(0),
        Some(accts[2].address)
    );
    let child_board = engine.leaderboard(&child.ledger).unwrap();
    assert_eq!(child_board.owner_of(1), Some(grandchild.wallet));
    assert_eq!(child_board.contribution_of(1).unwrap(), 4 * UNIT);

    // The child had no stake to pay, so the value rests there
    assert_eq!(engine.balance(&child.ledger), 4 * UNIT);
    assert_eq!(engine.balance(&grandchild.wallet), 0);
    assert_eq!(engine.leaderboard(&root.ledger).unwrap().filled(), 1);
    assert_eq!(engine.balance(&accts[0].address), FUNDS);
    assert_eq!(engine.total_children(&child.ledger), 1);
    assert_eq!(engine.total_children(&root.ledger), 1);
    assert_eq!(engine.total_balances(), engine.total_minted());
}

#[test]
fn leaders_deploy_a_child_from_the_wallet() {
    let accts = accounts(3);
    let mut engine = funded_engine(&accts);
    let root = root_with_leaders(&mut engine, &accts, 3, UNIT);
    engine.transfer(accts[0].address, root.wallet, 2 * UNIT).unwrap();

    let tx = LeaderTransaction::new(
        root.ledger,
        2 * UNIT,
        Call::DeployChild { params: params("Governed") },
        1,
    );
    let (slots, sigs) = approve(&tx, &accts, &[0, 1]);
    engine
        .execute_leader_transaction(root.wallet, &tx, &slots, &sigs)
        .unwrap();

    let record = engine.child_at(&root.ledger, 0).unwrap().clone();
    assert_eq!(record.deployer, root.wallet);
    assert_eq!(
        engine.leaderboard(&record.child).unwrap().owner_of(0),
        Some(root.wallet)
    );
    assert_eq!(engine.instance(&record.child).unwrap().name, "Governed");
    assert_eq!(engine.balance(&root.wallet), 0);
    assert_eq!(
        engine.leaderboard(&root.ledger).unwrap().slot_of(&record.wallet),
        Some(3)
    );
}

#[test]
fn child_wallet_claims_leadership_upstream() {
    let accts = accounts(4);
    let mut engine = Engine::new(EngineConfig {
        capacity: 2,
        ..EngineConfig::default()
    })
    .unwrap();
    for a in &accts {
        engine.mint(a.address, FUNDS).unwrap();
    }
    let root = engine
        .create_root(accts[0].address, params("Cascade"), 10)
        .unwrap();
    engine.contribute(root.ledger, accts[1].address, 20).unwrap();

    // Child's seed is too small for the full root board
    let child = engine
        .deploy_child(root.ledger, accts[2].address, params("Child"), 5)
        .unwrap();
    assert_eq!(engine.balance_of(&root.ledger, &child.wallet).unwrap(), 5);

    engine.contribute(root.ledger, accts[3].address, 6).unwrap();
    engine
        .transfer_escrow(root.ledger, accts[3].address, child.wallet, 6)
        .unwrap();

    // The child's only leader (accts[2], slot 0) approves the claim
    let tx = LeaderTransaction::new(root.ledger, 0, Call::ClaimLeadership, 1);
    let (slots, sigs) = approve(&tx, &accts[2..], &[0]);
    engine
        .execute_leader_transaction(child.wallet, &tx, &slots, &sigs)
        .unwrap();

    let board = engine.leaderboard(&root.ledger).unwrap();
    assert_eq!(board.owner_of(0), Some(child.wallet));
    assert_eq!(board.contribution_of(0).unwrap(), 11);
    assert_eq!(board.escrow_balance_of(&accts[0].address), 10);
}

#[test]
fn unknown_parent_changes_nothing() {
    let accts = accounts(2);
    let mut engine = funded_engine(&accts);

    let err = engine
        .deploy_child(accts[1].address, accts[0].address, params("Orphan"), UNIT)
        .unwrap_err();

    assert!(matches!(err, Error::UnknownInstance(_)));
    assert!(engine.registry().is_empty());
    assert_eq!(engine.balance(&accts[0].address), FUNDS);
}

#[test]
fn children_are_listed_in_deployment_order() {
    let accts = accounts(4);
    let mut engine = funded_engine(&accts);
    let root = root_with_leaders(&mut engine, &accts, 1, UNIT);

    let deployed: Vec<_> = (1..4)
        .map(|i| {
            engine
                .deploy_child(root.ledger, accts[i].address, params(&format!("Child{}", i)), 0)
                .unwrap()
        })
        .collect();

    assert_eq!(engine.total_children(&root.ledger), 3);
    for (i, d) in deployed.iter().enumerate() {
        let record = engine.child_at(&root.ledger, i).unwrap();
        assert_eq!(record.child, d.ledger);
        assert_eq!(record.order, i as u64);
    }
    assert!(engine.child_at(&root.ledger, 3).is_none());
}
