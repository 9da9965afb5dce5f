//! Bet placement lifecycle and concurrency guarantees.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use vector::engine::PlaceBetError;
use vector::types::{BetStatus, TransactionType};

use crate::support::Harness;

#[tokio::test]
async fn placement_moves_stake_and_logs_exactly_once() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    let user = h.user("wallet-1", dec!(1000)).await;

    let before = h.balance(&user).await;
    let bet = h
        .bets
        .place_bet(&user, "m1-home", dec!(100), dec!(2.20))
        .await
        .unwrap();

    let after = h.balance(&user).await;
    assert_eq!(after.available, before.available - dec!(100));
    assert_eq!(after.locked, before.locked + dec!(100));
    assert_eq!(after.total(), before.total());

    let txs = h.store.transactions_for_bet(&bet.id).await.unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].tx_type, TransactionType::BetStake);
    assert_eq!(txs[0].amount, dec!(-100));
    assert_eq!(txs[0].bet_id.as_deref(), Some(bet.id.as_str()));
}

#[tokio::test]
async fn recorded_price_is_the_live_quote() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    let user = h.user("wallet-1", dec!(1000)).await;

    // The odds feed moves the quote inside the tolerance band.
    h.store.update_odds("m1-home", dec!(2.25)).await.unwrap();

    let bet = h
        .bets
        .place_bet(&user, "m1-home", dec!(100), dec!(2.20))
        .await
        .unwrap();
    // Frozen at the live 2.25, not the client's 2.20.
    assert_eq!(bet.odds, dec!(2.25));
    assert_eq!(bet.potential_return, dec!(225));
}

#[tokio::test]
async fn drift_boundary_is_inclusive() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    let user = h.user("wallet-1", dec!(1000)).await;

    // Live 2.20 accepted 2.20: no drift.
    h.bets
        .place_bet(&user, "m1-home", dec!(10), dec!(2.20))
        .await
        .unwrap();

    // Live 2.10 vs accepted 2.00 is exactly 5%: accepted.
    h.store.update_odds("m1-home", dec!(2.10)).await.unwrap();
    h.bets
        .place_bet(&user, "m1-home", dec!(10), dec!(2.00))
        .await
        .unwrap();

    // A hair above 5% rejects with both quotes attached.
    h.store
        .update_odds("m1-home", dec!(2.1000001))
        .await
        .unwrap();
    match h
        .bets
        .place_bet(&user, "m1-home", dec!(10), dec!(2.00))
        .await
    {
        Err(PlaceBetError::OddsChanged { current, requested }) => {
            assert_eq!(current, dec!(2.1000001));
            assert_eq!(requested, dec!(2.00));
        }
        other => panic!("expected OddsChanged, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_bet_leaves_no_trace() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    let user = h.user("wallet-1", dec!(50)).await;

    let err = h
        .bets
        .place_bet(&user, "m1-home", dec!(80), dec!(2.20))
        .await
        .unwrap_err();
    assert!(matches!(err, PlaceBetError::InsufficientBalance { .. }));

    let b = h.balance(&user).await;
    assert_eq!(b.available, dec!(50));
    assert_eq!(b.locked, Decimal::ZERO);
    assert!(h
        .store
        .bets_for_user(&user, None, 10, 0)
        .await
        .unwrap()
        .is_empty());
    // Only the funding deposit is on the log.
    let txs = h.store.transactions_for_user(&user, 10, 0).await.unwrap();
    assert_eq!(txs.len(), 1);
}

#[tokio::test]
async fn concurrent_bets_accept_exactly_the_subset_that_fits() {
    let h = Arc::new(Harness::new().await);
    h.seed_match("m1").await;
    let user = h.user("wallet-1", dec!(1000)).await;

    // Ten concurrent 150-stake bets against 1000 available: six fit.
    let mut handles = Vec::new();
    for _ in 0..10 {
        let h = h.clone();
        let user = user.clone();
        handles.push(tokio::spawn(async move {
            h.bets
                .place_bet(&user, "m1-home", dec!(150), dec!(2.20))
                .await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(PlaceBetError::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 6);

    let b = h.balance(&user).await;
    assert_eq!(b.available, dec!(100));
    assert_eq!(b.locked, dec!(900));
    assert_eq!(b.total(), dec!(1000));

    // One stake-debit entry per accepted bet, none for rejections.
    let stake_entries: usize = h
        .store
        .transactions_for_user(&user, 100, 0)
        .await
        .unwrap()
        .iter()
        .filter(|t| t.tx_type == TransactionType::BetStake)
        .count();
    assert_eq!(stake_entries, 6);
}

#[tokio::test]
async fn users_do_not_contend_with_each_other() {
    let h = Arc::new(Harness::new().await);
    h.seed_match("m1").await;
    let alice = h.user("wallet-alice", dec!(100)).await;
    let bob = h.user("wallet-bob", dec!(100)).await;

    let (a, b) = tokio::join!(
        h.bets.place_bet(&alice, "m1-home", dec!(100), dec!(2.20)),
        h.bets.place_bet(&bob, "m1-home", dec!(100), dec!(2.20)),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(h.balance(&alice).await.locked, dec!(100));
    assert_eq!(h.balance(&bob).await.locked, dec!(100));
}

#[tokio::test]
async fn pending_bets_survive_a_reread() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    let user = h.user("wallet-1", dec!(1000)).await;

    let placed = h
        .bets
        .place_bet(&user, "m1-draw", dec!(25), dec!(3.40))
        .await
        .unwrap();

    let listed = h.store.bets_for_user(&user, None, 10, 0).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, placed.id);
    assert_eq!(listed[0].status, BetStatus::Pending);
    assert_eq!(listed[0].stake, dec!(25));
    assert_eq!(listed[0].odds, dec!(3.40));
    assert_eq!(listed[0].potential_return, dec!(85));
}
