//! Bet Engine.
//!
//! Validates a wager against the live market snapshot and the user's
//! available funds, then commits the stake lock, the bet row, and the
//! stake-debit log entry as one database transaction. A rejected or failed
//! placement leaves no trace: the lock, the bet, and the log entry exist
//! together or not at all.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;
use uuid::Uuid;

use crate::ledger::{self, LedgerError};
use crate::storage::{self, to_units, Store};
use crate::types::{
    Bet, BetStatus, MarketStatus, MatchStatus, TransactionStatus, TransactionType,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed rejections so callers can react programmatically, e.g. show the
/// fresh quote on `OddsChanged`.
#[derive(Debug, thiserror::Error)]
pub enum PlaceBetError {
    #[error("Outcome not found: {0}")]
    OutcomeNotFound(String),

    #[error("Market {market_id} is not accepting bets ({status})")]
    MarketSuspended {
        market_id: String,
        status: MarketStatus,
    },

    #[error("Match {match_id} has already started ({status})")]
    MatchStarted {
        match_id: String,
        status: MatchStatus,
    },

    #[error("Odds have changed: current {current}, requested {requested}")]
    OddsChanged { current: Decimal, requested: Decimal },

    #[error("Not enough available balance: have {available}, need {required}")]
    InsufficientBalance {
        available: Decimal,
        required: Decimal,
    },

    #[error("Invalid stake {stake}: must be between {min} and {max} with at most 6 decimal places")]
    InvalidStake {
        stake: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<anyhow::Error> for PlaceBetError {
    fn from(e: anyhow::Error) -> Self {
        PlaceBetError::Storage(e)
    }
}

impl From<sqlx::Error> for PlaceBetError {
    fn from(e: sqlx::Error) -> Self {
        PlaceBetError::Storage(e.into())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PlacementConfig {
    pub min_stake: Decimal,
    pub max_stake: Decimal,
    /// Relative drift above which the quote is considered gone.
    pub drift_tolerance: Decimal,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            min_stake: dec!(1),
            max_stake: dec!(10000),
            drift_tolerance: dec!(0.05),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct BetEngine {
    store: Store,
    config: PlacementConfig,
}

impl BetEngine {
    pub fn new(store: Store, config: PlacementConfig) -> Self {
        Self { store, config }
    }

    /// Place a bet for `user_id` on `outcome_id`.
    ///
    /// `odds_accepted` is the quote the client last saw. It is only a
    /// tolerance check: the recorded price is always the live odds read at
    /// commit time.
    pub async fn place_bet(
        &self,
        user_id: &str,
        outcome_id: &str,
        stake: Decimal,
        odds_accepted: Decimal,
    ) -> Result<Bet, PlaceBetError> {
        let snapshot = self
            .store
            .outcome_snapshot(outcome_id)
            .await?
            .ok_or_else(|| PlaceBetError::OutcomeNotFound(outcome_id.to_string()))?;

        if snapshot.market_status != MarketStatus::Open {
            return Err(PlaceBetError::MarketSuspended {
                market_id: snapshot.market_id,
                status: snapshot.market_status,
            });
        }

        if snapshot.match_status != MatchStatus::Upcoming {
            return Err(PlaceBetError::MatchStarted {
                match_id: snapshot.match_id,
                status: snapshot.match_status,
            });
        }

        let current = snapshot.outcome.odds;

        // The client's quote is the denominator, kept for wire compatibility
        // with the original drift check. Drift strictly above the tolerance
        // rejects; exactly at the tolerance passes.
        if odds_accepted <= Decimal::ZERO {
            return Err(PlaceBetError::OddsChanged {
                current,
                requested: odds_accepted,
            });
        }
        let drift = (current - odds_accepted).abs() / odds_accepted;
        if drift > self.config.drift_tolerance {
            return Err(PlaceBetError::OddsChanged {
                current,
                requested: odds_accepted,
            });
        }

        if stake < self.config.min_stake
            || stake > self.config.max_stake
            || to_units(stake).is_none()
        {
            return Err(PlaceBetError::InvalidStake {
                stake,
                min: self.config.min_stake,
                max: self.config.max_stake,
            });
        }

        let bet = Bet {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            outcome_id: outcome_id.to_string(),
            stake,
            odds: current,
            potential_return: (stake * current).round_dp(6),
            status: BetStatus::Pending,
            actual_return: None,
            created_at: Utc::now(),
            settled_at: None,
        };

        // Atomic unit: stake lock + bet row + stake-debit entry.
        let mut tx = self.store.pool().begin().await?;

        ledger::lock_funds(&mut *tx, user_id, stake)
            .await
            .map_err(|e| match e {
                LedgerError::InsufficientFunds {
                    available,
                    required,
                } => PlaceBetError::InsufficientBalance {
                    available,
                    required,
                },
                LedgerError::UnknownUser(u) => PlaceBetError::UserNotFound(u),
                other => PlaceBetError::Storage(other.into()),
            })?;

        storage::insert_bet(&mut *tx, &bet).await?;

        ledger::record(
            &mut *tx,
            user_id,
            TransactionType::BetStake,
            -stake,
            TransactionStatus::Confirmed,
            Some(&bet.id),
        )
        .await
        .map_err(|e| PlaceBetError::Storage(e.into()))?;

        tx.commit().await?;

        info!(
            user_id,
            bet_id = %bet.id,
            outcome_id,
            stake = %stake,
            odds = %current,
            potential_return = %bet.potential_return,
            "Bet placed"
        );

        Ok(bet)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
