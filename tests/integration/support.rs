//! Test harness: an in-memory store with deterministic fixtures.
//!
//! Markets and outcomes carry fixed ids derived from the match id so tests
//! can reference them without plumbing.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use vector::engine::{BetEngine, PlacementConfig, SettlementEngine};
use vector::ledger;
use vector::storage::Store;
use vector::types::{
    Balance, Market, MarketStatus, MarketType, Match, MatchStatus, Outcome,
};

pub struct Harness {
    pub store: Store,
    pub bets: BetEngine,
    pub settlements: SettlementEngine,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Store::open_in_memory().await.unwrap();
        Self {
            bets: BetEngine::new(store.clone(), PlacementConfig::default()),
            settlements: SettlementEngine::new(store.clone()),
            store,
        }
    }

    /// Create a user and fund their available balance.
    pub async fn user(&self, wallet: &str, funds: Decimal) -> String {
        let user = self.store.create_user(wallet).await.unwrap();
        if funds > Decimal::ZERO {
            ledger::credit(self.store.pool(), &user.id, funds)
                .await
                .unwrap();
        }
        user.id
    }

    pub async fn balance(&self, user_id: &str) -> Balance {
        ledger::balance(self.store.pool(), user_id)
            .await
            .unwrap()
            .unwrap()
    }

    /// Upcoming match with an open match-result market.
    ///
    /// Outcome ids: `{id}-home` @ 2.20, `{id}-draw` @ 3.40, `{id}-away` @ 3.10.
    pub async fn seed_match(&self, id: &str) {
        let m = Match {
            id: id.to_string(),
            league: "Premier League".into(),
            home_team: "Liverpool".into(),
            away_team: "Arsenal".into(),
            start_time: Utc::now() + chrono::Duration::hours(4),
            status: MatchStatus::Upcoming,
            home_score: None,
            away_score: None,
        };
        self.store.insert_match(&m).await.unwrap();

        let market = Market {
            id: format!("{id}-1x2"),
            match_id: id.to_string(),
            name: "Match Result".into(),
            market_type: MarketType::MatchResult,
            line: None,
            status: MarketStatus::Open,
        };
        self.store.insert_market(&market).await.unwrap();

        for (suffix, name, odds) in [
            ("home", "Home", dec!(2.20)),
            ("draw", "Draw", dec!(3.40)),
            ("away", "Away", dec!(3.10)),
        ] {
            self.store
                .insert_outcome(&Outcome {
                    id: format!("{id}-{suffix}"),
                    market_id: market.id.clone(),
                    name: name.into(),
                    odds,
                    previous_odds: None,
                })
                .await
                .unwrap();
        }
    }

    /// Open over/under market on an existing match.
    ///
    /// Outcome ids: `{match_id}-over` and `{match_id}-under`, both @ 1.90.
    pub async fn seed_over_under(&self, match_id: &str, line: Decimal) {
        let market = Market {
            id: format!("{match_id}-ou"),
            match_id: match_id.to_string(),
            name: format!("Over/Under {line}"),
            market_type: MarketType::OverUnder,
            line: Some(line),
            status: MarketStatus::Open,
        };
        self.store.insert_market(&market).await.unwrap();

        for (suffix, name) in [("over", "Over"), ("under", "Under")] {
            self.store
                .insert_outcome(&Outcome {
                    id: format!("{match_id}-{suffix}"),
                    market_id: market.id.clone(),
                    name: name.into(),
                    odds: dec!(1.90),
                    previous_odds: None,
                })
                .await
                .unwrap();
        }
    }
}
