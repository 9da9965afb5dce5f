//! Settlement lifecycle: payouts, refunds, idempotency, conservation.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use vector::types::{BetStatus, MarketStatus, TransactionType};

use crate::support::Harness;

#[tokio::test]
async fn home_win_pays_stake_times_odds() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    let user = h.user("wallet-1", dec!(1000)).await;

    // available=1000, stake=100 @ 2.20 on Home.
    let bet = h
        .bets
        .place_bet(&user, "m1-home", dec!(100), dec!(2.20))
        .await
        .unwrap();
    assert_eq!(bet.potential_return, dec!(220));

    let mid = h.balance(&user).await;
    assert_eq!(mid.available, dec!(900));
    assert_eq!(mid.locked, dec!(100));

    // Home wins 2-1.
    let report = h.settlements.settle_match("m1", 2, 1).await.unwrap();
    assert_eq!(report.bets_won, 1);

    let settled = h.store.bet(&bet.id).await.unwrap().unwrap();
    assert_eq!(settled.status, BetStatus::Won);
    assert_eq!(settled.actual_return, Some(dec!(220)));
    assert_eq!(settled.profit(), dec!(120));

    // 900 + 220 back = 1120, lock fully released.
    let after = h.balance(&user).await;
    assert_eq!(after.available, dec!(1120));
    assert_eq!(after.locked, Decimal::ZERO);
}

#[tokio::test]
async fn over_under_scenarios_from_the_book() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    h.seed_over_under("m1", dec!(2.5)).await;
    let user = h.user("wallet-1", dec!(1000)).await;

    h.bets
        .place_bet(&user, "m1-under", dec!(100), dec!(1.90))
        .await
        .unwrap();
    h.bets
        .place_bet(&user, "m1-over", dec!(100), dec!(1.90))
        .await
        .unwrap();

    // 1-1: total 2. Under-2.5 wins, Over-2.5 loses.
    let report = h.settlements.settle_match("m1", 1, 1).await.unwrap();
    assert_eq!(report.bets_won, 1);
    assert_eq!(report.bets_lost, 1);

    // 800 + 190 = 990.
    let b = h.balance(&user).await;
    assert_eq!(b.available, dec!(990));
    assert_eq!(b.locked, Decimal::ZERO);
}

#[tokio::test]
async fn whole_line_push_voids_the_market() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    h.seed_over_under("m1", dec!(3.0)).await;
    let user = h.user("wallet-1", dec!(500)).await;

    let over = h
        .bets
        .place_bet(&user, "m1-over", dec!(80), dec!(1.90))
        .await
        .unwrap();
    let under = h
        .bets
        .place_bet(&user, "m1-under", dec!(70), dec!(1.90))
        .await
        .unwrap();

    // 2-1: total exactly 3.0. Both sides void, stakes refund.
    let report = h.settlements.settle_match("m1", 2, 1).await.unwrap();
    assert_eq!(report.bets_voided, 2);

    for (id, stake) in [(&over.id, dec!(80)), (&under.id, dec!(70))] {
        let bet = h.store.bet(id).await.unwrap().unwrap();
        assert_eq!(bet.status, BetStatus::Void);
        assert_eq!(bet.actual_return, Some(stake));
        assert_eq!(bet.profit(), Decimal::ZERO);
    }

    let b = h.balance(&user).await;
    assert_eq!(b.available, dec!(500));
    assert_eq!(b.locked, Decimal::ZERO);
}

#[tokio::test]
async fn double_settlement_is_a_no_op() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    let user = h.user("wallet-1", dec!(1000)).await;

    let bet = h
        .bets
        .place_bet(&user, "m1-home", dec!(100), dec!(2.20))
        .await
        .unwrap();

    h.settlements.settle_match("m1", 2, 1).await.unwrap();
    let first = h.balance(&user).await;
    let first_bet = h.store.bet(&bet.id).await.unwrap().unwrap();

    // The feed redelivers the identical result.
    h.settlements.settle_match("m1", 2, 1).await.unwrap();
    let second = h.balance(&user).await;
    let second_bet = h.store.bet(&bet.id).await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(first_bet.status, second_bet.status);
    assert_eq!(first_bet.actual_return, second_bet.actual_return);

    // No second win credit appeared.
    let wins = h
        .store
        .transactions_for_bet(&bet.id)
        .await
        .unwrap()
        .iter()
        .filter(|t| t.tx_type == TransactionType::BetWin)
        .count();
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn settled_markets_stop_accepting_bets() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    let user = h.user("wallet-1", dec!(1000)).await;

    h.settlements.settle_match("m1", 0, 0).await.unwrap();

    let markets = h.store.markets_for_match("m1").await.unwrap();
    assert_eq!(markets[0].status, MarketStatus::Settled);

    // The match is finished and the market settled; both gates reject.
    let err = h
        .bets
        .place_bet(&user, "m1-home", dec!(10), dec!(2.20))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        vector::engine::PlaceBetError::MarketSuspended { .. }
    ));
}

#[tokio::test]
async fn conservation_holds_across_mixed_results() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    h.seed_over_under("m1", dec!(3.0)).await;
    let user = h.user("wallet-1", dec!(1000)).await;

    // Win, lose, and void in one settlement run.
    h.bets
        .place_bet(&user, "m1-home", dec!(100), dec!(2.20))
        .await
        .unwrap();
    h.bets
        .place_bet(&user, "m1-away", dec!(50), dec!(3.10))
        .await
        .unwrap();
    h.bets
        .place_bet(&user, "m1-over", dec!(30), dec!(1.90))
        .await
        .unwrap();

    let before = h.balance(&user).await;
    assert_eq!(before.locked, dec!(180));
    assert_eq!(before.available, dec!(820));

    // 2-1: Home wins (220 back), Away loses, total 3 pushes the over/under.
    h.settlements.settle_match("m1", 2, 1).await.unwrap();

    let after = h.balance(&user).await;
    assert_eq!(after.locked, Decimal::ZERO);
    assert_eq!(after.available, dec!(820) + dec!(220) + dec!(30));

    // Sum of signed log entries equals the net funds movement.
    let net: Decimal = h
        .store
        .transactions_for_user(&user, 100, 0)
        .await
        .unwrap()
        .iter()
        .map(|t| t.amount)
        .sum();
    assert_eq!(net, after.total());
}

#[tokio::test]
async fn void_match_refunds_all_pending_stakes() {
    let h = Harness::new().await;
    h.seed_match("m1").await;
    let alice = h.user("wallet-alice", dec!(200)).await;
    let bob = h.user("wallet-bob", dec!(300)).await;

    h.bets
        .place_bet(&alice, "m1-home", dec!(60), dec!(2.20))
        .await
        .unwrap();
    h.bets
        .place_bet(&bob, "m1-away", dec!(90), dec!(3.10))
        .await
        .unwrap();

    let report = h.settlements.void_match("m1").await.unwrap();
    assert_eq!(report.bets_voided, 2);

    assert_eq!(h.balance(&alice).await.available, dec!(200));
    assert_eq!(h.balance(&bob).await.available, dec!(300));

    // Re-voiding changes nothing.
    let again = h.settlements.void_match("m1").await.unwrap();
    assert_eq!(again.bets_voided, 0);
    assert_eq!(h.balance(&alice).await.available, dec!(200));
}

#[tokio::test]
async fn settlement_races_a_late_bet_safely() {
    let h = std::sync::Arc::new(Harness::new().await);
    h.seed_match("m1").await;
    let user = h.user("wallet-1", dec!(1000)).await;

    // A bet lands while settlement fires. Whichever wins the race, the
    // final state is consistent: either the bet was accepted before the
    // match flipped to finished and then settled, or it was rejected.
    let h2 = h.clone();
    let user2 = user.clone();
    let place = tokio::spawn(async move {
        h2.bets
            .place_bet(&user2, "m1-home", dec!(100), dec!(2.20))
            .await
    });
    let h3 = h.clone();
    let settle = tokio::spawn(async move { h3.settlements.settle_match("m1", 2, 1).await });

    let placed = place.await.unwrap();
    settle.await.unwrap().unwrap();

    // Sweep any bet the placement race let through.
    h.settlements.settle_match("m1", 2, 1).await.unwrap();

    let b = h.balance(&user).await;
    assert_eq!(b.locked, Decimal::ZERO);
    match placed {
        Ok(bet) => {
            let settled = h.store.bet(&bet.id).await.unwrap().unwrap();
            assert!(settled.is_settled());
            assert_eq!(b.available, dec!(1120));
        }
        Err(_) => assert_eq!(b.available, dec!(1000)),
    }
}
