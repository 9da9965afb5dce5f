//! Settlement Engine.
//!
//! Resolves every pending bet on a finished match. Each bet settles as its
//! own atomic unit: a conditional status update (pending only) gates the
//! balance mutation and the log append, which makes retries of the external
//! results trigger at-most-once-effective. Anomalies void the affected bets
//! and never halt the rest of the batch.

use chrono::Utc;
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use tracing::{info, warn};

use crate::ledger;
use crate::storage::{self, Store};
use crate::types::{
    Bet, BetStatus, MarketStatus, MarketType, MatchStatus, OutcomeResult, TransactionStatus,
    TransactionType,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Match not found: {0}")]
    MatchNotFound(String),

    #[error("Match {0} is cancelled; results are not settleable")]
    MatchCancelled(String),

    #[error("Storage failure: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<anyhow::Error> for SettlementError {
    fn from(e: anyhow::Error) -> Self {
        SettlementError::Storage(e)
    }
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        SettlementError::Storage(e.into())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Summary of one settlement run.
#[derive(Debug, Clone, Default)]
pub struct SettlementReport {
    pub match_id: String,
    pub markets_settled: usize,
    pub bets_won: usize,
    pub bets_lost: usize,
    pub bets_voided: usize,
    pub bets_half_won: usize,
    pub bets_half_lost: usize,
    /// Bets that were already terminal when this run reached them.
    pub already_settled: usize,
    /// Unresolvable markets, unknown outcome labels, failed bet settlements.
    pub anomalies: usize,
}

impl SettlementReport {
    pub fn bets_settled(&self) -> usize {
        self.bets_won + self.bets_lost + self.bets_voided + self.bets_half_won + self.bets_half_lost
    }
}

impl fmt::Display for SettlementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "match {}: markets={} settled={} (W{}/L{}/V{}/HW{}/HL{}) repeats={} anomalies={}",
            self.match_id,
            self.markets_settled,
            self.bets_settled(),
            self.bets_won,
            self.bets_lost,
            self.bets_voided,
            self.bets_half_won,
            self.bets_half_lost,
            self.already_settled,
            self.anomalies,
        )
    }
}

enum SettleOutcome {
    Settled(BetStatus),
    AlreadySettled,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SettlementEngine {
    store: Store,
}

impl SettlementEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Settle every market on a finished match.
    ///
    /// Safe to call more than once with the same result: re-settling a
    /// terminal bet is a no-op, not an error.
    pub async fn settle_match(
        &self,
        match_id: &str,
        home_score: i64,
        away_score: i64,
    ) -> Result<SettlementReport, SettlementError> {
        let m = self
            .store
            .match_by_id(match_id)
            .await?
            .ok_or_else(|| SettlementError::MatchNotFound(match_id.to_string()))?;

        if m.status == MatchStatus::Cancelled {
            return Err(SettlementError::MatchCancelled(match_id.to_string()));
        }

        self.store
            .record_match_result(match_id, home_score, away_score)
            .await?;

        let mut report = SettlementReport {
            match_id: match_id.to_string(),
            ..Default::default()
        };

        for market in self.store.markets_for_match(match_id).await? {
            // Settled markets are re-swept: a placement that raced the
            // previous run may have left a pending bet behind, and the
            // pending-only gate makes reprocessing free.
            if market.status == MarketStatus::Void {
                continue;
            }

            let resolvable = market.market_type.resolvable_from_score() && {
                // Line-parameterized markets without a line cannot be scored.
                match market.market_type {
                    MarketType::OverUnder | MarketType::AsianHandicap => market.line.is_some(),
                    _ => true,
                }
            };
            if !resolvable {
                warn!(
                    market_id = %market.id,
                    market_type = %market.market_type,
                    "Market cannot be resolved from the final score; voiding its bets"
                );
                report.anomalies += 1;
            }

            for outcome in self.store.outcomes_for_market(&market.id).await? {
                let result = if !resolvable {
                    OutcomeResult::Void
                } else {
                    match outcome_result(
                        market.market_type,
                        market.line,
                        &outcome.name,
                        home_score,
                        away_score,
                    ) {
                        Some(r) => r,
                        None => {
                            warn!(
                                outcome_id = %outcome.id,
                                outcome_name = %outcome.name,
                                market_type = %market.market_type,
                                "Unknown outcome label; voiding its bets"
                            );
                            report.anomalies += 1;
                            OutcomeResult::Void
                        }
                    }
                };

                let bets = self.store.pending_bets_for_outcome(&outcome.id).await?;
                let settlements =
                    join_all(bets.into_iter().map(|bet| self.settle_bet(bet, result))).await;
                for settlement in settlements {
                    match settlement {
                        Ok(SettleOutcome::Settled(BetStatus::Won)) => report.bets_won += 1,
                        Ok(SettleOutcome::Settled(BetStatus::Lost)) => report.bets_lost += 1,
                        Ok(SettleOutcome::Settled(BetStatus::Void)) => report.bets_voided += 1,
                        Ok(SettleOutcome::Settled(BetStatus::HalfWon)) => {
                            report.bets_half_won += 1
                        }
                        Ok(SettleOutcome::Settled(BetStatus::HalfLost)) => {
                            report.bets_half_lost += 1
                        }
                        Ok(SettleOutcome::Settled(BetStatus::Pending)) => {}
                        Ok(SettleOutcome::AlreadySettled) => report.already_settled += 1,
                        Err(e) => {
                            warn!(error = %e, "Bet settlement failed; retryable on next trigger");
                            report.anomalies += 1;
                        }
                    }
                }
            }

            self.store
                .set_market_status(&market.id, MarketStatus::Settled)
                .await?;
            report.markets_settled += 1;
        }

        info!(%report, "Match settled");
        Ok(report)
    }

    /// Void every open market on a postponed or cancelled match, refunding
    /// all pending stakes. Idempotent.
    pub async fn void_match(&self, match_id: &str) -> Result<SettlementReport, SettlementError> {
        self.store
            .match_by_id(match_id)
            .await?
            .ok_or_else(|| SettlementError::MatchNotFound(match_id.to_string()))?;

        self.store
            .set_match_status(match_id, MatchStatus::Cancelled)
            .await?;

        let mut report = SettlementReport {
            match_id: match_id.to_string(),
            ..Default::default()
        };

        for market in self.store.markets_for_match(match_id).await? {
            if !matches!(
                market.status,
                MarketStatus::Open | MarketStatus::Suspended
            ) {
                continue;
            }

            for outcome in self.store.outcomes_for_market(&market.id).await? {
                let bets = self.store.pending_bets_for_outcome(&outcome.id).await?;
                let settlements = join_all(
                    bets.into_iter()
                        .map(|bet| self.settle_bet(bet, OutcomeResult::Void)),
                )
                .await;
                for settlement in settlements {
                    match settlement {
                        Ok(SettleOutcome::Settled(_)) => report.bets_voided += 1,
                        Ok(SettleOutcome::AlreadySettled) => report.already_settled += 1,
                        Err(e) => {
                            warn!(error = %e, "Bet void failed; retryable on next trigger");
                            report.anomalies += 1;
                        }
                    }
                }
            }

            self.store
                .set_market_status(&market.id, MarketStatus::Void)
                .await?;
            report.markets_settled += 1;
        }

        info!(%report, "Match voided");
        Ok(report)
    }

    /// Settle one bet: status write, lock release, log append — atomically.
    async fn settle_bet(
        &self,
        bet: Bet,
        result: OutcomeResult,
    ) -> Result<SettleOutcome, SettlementError> {
        let status = result.bet_status();
        let (actual_return, entry) = settlement_money(&bet, result);

        let mut tx = self.store.pool().begin().await?;

        let updated =
            storage::mark_bet_settled(&mut *tx, &bet.id, status, actual_return, Utc::now()).await?;
        if !updated {
            return Ok(SettleOutcome::AlreadySettled);
        }

        ledger::release_lock(&mut *tx, &bet.user_id, bet.stake, actual_return)
            .await
            .map_err(|e| SettlementError::Storage(e.into()))?;

        if let Some((tx_type, amount)) = entry {
            ledger::record(
                &mut *tx,
                &bet.user_id,
                tx_type,
                amount,
                TransactionStatus::Confirmed,
                Some(&bet.id),
            )
            .await
            .map_err(|e| SettlementError::Storage(e.into()))?;
        }

        tx.commit().await?;
        Ok(SettleOutcome::Settled(status))
    }
}

/// Money movement for one settled bet: the recorded `actual_return` (also
/// the amount credited back to available on lock release) and the log entry
/// to append, if any. Losses append nothing: the placement's stake debit
/// already recorded the outflow.
fn settlement_money(
    bet: &Bet,
    result: OutcomeResult,
) -> (Decimal, Option<(TransactionType, Decimal)>) {
    let half_stake = (bet.stake / dec!(2)).round_dp(6);
    match result {
        OutcomeResult::Win => (
            bet.potential_return,
            Some((TransactionType::BetWin, bet.potential_return)),
        ),
        OutcomeResult::Lose => (Decimal::ZERO, None),
        OutcomeResult::Void => (bet.stake, Some((TransactionType::BetRefund, bet.stake))),
        OutcomeResult::HalfWin => {
            // Half the stake wins at full odds, the other half is refunded.
            let refunded = bet.stake - half_stake;
            let returned = (half_stake * bet.odds).round_dp(6) + refunded;
            (returned, Some((TransactionType::BetWin, returned)))
        }
        OutcomeResult::HalfLose => {
            let refunded = bet.stake - half_stake;
            (refunded, Some((TransactionType::BetRefund, refunded)))
        }
    }
}

// ---------------------------------------------------------------------------
// Market-type result logic
// ---------------------------------------------------------------------------

/// Decide one outcome's result from the final score.
///
/// Returns None for an outcome label the market type does not define, or a
/// line-parameterized market missing its line; the caller treats that as an
/// anomaly and voids.
pub fn outcome_result(
    market_type: MarketType,
    line: Option<Decimal>,
    outcome_name: &str,
    home_score: i64,
    away_score: i64,
) -> Option<OutcomeResult> {
    use OutcomeResult::*;

    match market_type {
        MarketType::MatchResult => {
            let won = match outcome_name {
                "Home" => home_score > away_score,
                "Draw" => home_score == away_score,
                "Away" => away_score > home_score,
                _ => return None,
            };
            Some(if won { Win } else { Lose })
        }

        MarketType::OverUnder => {
            let line = line?;
            let total = Decimal::from(home_score + away_score);
            if total == line {
                // A total landing exactly on the line pushes: stakes refund.
                return Some(Void);
            }
            let over_won = total > line;
            match outcome_name {
                "Over" => Some(if over_won { Win } else { Lose }),
                "Under" => Some(if over_won { Lose } else { Win }),
                _ => None,
            }
        }

        MarketType::AsianHandicap => {
            // The line is stated from the home side's perspective.
            let line = line?;
            let (margin, effective_line) = match outcome_name {
                "Home" => (Decimal::from(home_score - away_score), line),
                "Away" => (Decimal::from(away_score - home_score), -line),
                _ => return None,
            };
            Some(handicap_result(margin, effective_line))
        }

        MarketType::BothToScore => {
            let both = home_score > 0 && away_score > 0;
            match outcome_name {
                "Yes" => Some(if both { Win } else { Lose }),
                "No" => Some(if both { Lose } else { Win }),
                _ => None,
            }
        }

        MarketType::DoubleChance => {
            let won = match outcome_name {
                "Home/Draw" => home_score >= away_score,
                "Home/Away" => home_score != away_score,
                "Draw/Away" => away_score >= home_score,
                _ => return None,
            };
            Some(if won { Win } else { Lose })
        }

        MarketType::CorrectScore => {
            let (h, a) = parse_score(outcome_name)?;
            Some(if h == home_score && a == away_score {
                Win
            } else {
                Lose
            })
        }

        // Not decidable from a final score; the caller voids.
        MarketType::HalfTimeResult | MarketType::FirstGoalscorer => None,
    }
}

/// Whole- and half-line handicap: win above the line, push exactly on it.
fn flat_handicap(margin: Decimal, line: Decimal) -> OutcomeResult {
    let adjusted = margin + line;
    if adjusted > Decimal::ZERO {
        OutcomeResult::Win
    } else if adjusted.is_zero() {
        OutcomeResult::Void
    } else {
        OutcomeResult::Lose
    }
}

/// Quarter lines split the stake across the two adjacent half-lines; a push
/// on one half combined with a win or loss on the other produces the half
/// results.
fn handicap_result(margin: Decimal, line: Decimal) -> OutcomeResult {
    use OutcomeResult::*;

    let frac = line.fract().abs();
    if frac != dec!(0.25) && frac != dec!(0.75) {
        return flat_handicap(margin, line);
    }

    let lower = flat_handicap(margin, line - dec!(0.25));
    let upper = flat_handicap(margin, line + dec!(0.25));
    match (lower, upper) {
        (Win, Win) => Win,
        (Lose, Lose) => Lose,
        (Void, Win) | (Win, Void) => HalfWin,
        (Lose, Void) | (Void, Lose) => HalfLose,
        // Adjacent quarter halves are 0.5 apart; mixed win/lose cannot occur.
        _ => Void,
    }
}

fn parse_score(name: &str) -> Option<(i64, i64)> {
    let (h, a) = name.split_once('-')?;
    Some((h.trim().parse().ok()?, a.trim().parse().ok()?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
