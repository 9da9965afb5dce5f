//! Shared types for the VECTOR marketplace core.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that storage, engine, and API
//! modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a match. Transitions are monotonic:
/// upcoming → live → finished, or → postponed/cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Upcoming,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
            MatchStatus::Postponed => "postponed",
            MatchStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(MatchStatus::Upcoming),
            "live" => Ok(MatchStatus::Live),
            "finished" => Ok(MatchStatus::Finished),
            "postponed" => Ok(MatchStatus::Postponed),
            "cancelled" => Ok(MatchStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Unknown match status: {s}")),
        }
    }
}

/// Betting proposition type. `(match, type, line)` is unique per match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    MatchResult,
    AsianHandicap,
    OverUnder,
    BothToScore,
    DoubleChance,
    CorrectScore,
    HalfTimeResult,
    FirstGoalscorer,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::MatchResult => "match_result",
            MarketType::AsianHandicap => "asian_handicap",
            MarketType::OverUnder => "over_under",
            MarketType::BothToScore => "both_to_score",
            MarketType::DoubleChance => "double_chance",
            MarketType::CorrectScore => "correct_score",
            MarketType::HalfTimeResult => "half_time_result",
            MarketType::FirstGoalscorer => "first_goalscorer",
        }
    }

    /// Whether a final score alone is enough to settle this market type.
    pub fn resolvable_from_score(&self) -> bool {
        !matches!(
            self,
            MarketType::HalfTimeResult | MarketType::FirstGoalscorer
        )
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MarketType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "match_result" => Ok(MarketType::MatchResult),
            "asian_handicap" => Ok(MarketType::AsianHandicap),
            "over_under" => Ok(MarketType::OverUnder),
            "both_to_score" => Ok(MarketType::BothToScore),
            "double_chance" => Ok(MarketType::DoubleChance),
            "correct_score" => Ok(MarketType::CorrectScore),
            "half_time_result" => Ok(MarketType::HalfTimeResult),
            "first_goalscorer" => Ok(MarketType::FirstGoalscorer),
            _ => Err(anyhow::anyhow!("Unknown market type: {s}")),
        }
    }
}

/// Whether a market is accepting bets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Open,
    Suspended,
    Settled,
    Void,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Open => "open",
            MarketStatus::Suspended => "suspended",
            MarketStatus::Settled => "settled",
            MarketStatus::Void => "void",
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MarketStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(MarketStatus::Open),
            "suspended" => Ok(MarketStatus::Suspended),
            "settled" => Ok(MarketStatus::Settled),
            "void" => Ok(MarketStatus::Void),
            _ => Err(anyhow::anyhow!("Unknown market status: {s}")),
        }
    }
}

/// Bet lifecycle. `Pending` is the only non-terminal state; the Settlement
/// Engine writes exactly one terminal state, which never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Void,
    HalfWon,
    HalfLost,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Pending => "pending",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
            BetStatus::Void => "void",
            BetStatus::HalfWon => "half_won",
            BetStatus::HalfLost => "half_lost",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BetStatus::Pending)
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BetStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BetStatus::Pending),
            "won" => Ok(BetStatus::Won),
            "lost" => Ok(BetStatus::Lost),
            "void" => Ok(BetStatus::Void),
            "half_won" => Ok(BetStatus::HalfWon),
            "half_lost" => Ok(BetStatus::HalfLost),
            _ => Err(anyhow::anyhow!("Unknown bet status: {s}")),
        }
    }
}

/// Result of a single outcome once the match result is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeResult {
    Win,
    Lose,
    Void,
    HalfWin,
    HalfLose,
}

impl OutcomeResult {
    /// The bet status a pending bet on this outcome settles into.
    pub fn bet_status(&self) -> BetStatus {
        match self {
            OutcomeResult::Win => BetStatus::Won,
            OutcomeResult::Lose => BetStatus::Lost,
            OutcomeResult::Void => BetStatus::Void,
            OutcomeResult::HalfWin => BetStatus::HalfWon,
            OutcomeResult::HalfLose => BetStatus::HalfLost,
        }
    }
}

impl fmt::Display for OutcomeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeResult::Win => write!(f, "win"),
            OutcomeResult::Lose => write!(f, "lose"),
            OutcomeResult::Void => write!(f, "void"),
            OutcomeResult::HalfWin => write!(f, "half_win"),
            OutcomeResult::HalfLose => write!(f, "half_lose"),
        }
    }
}

/// Balance-affecting event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    BetStake,
    BetWin,
    BetRefund,
    YieldDeposit,
    YieldWithdraw,
    YieldEarned,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::BetStake => "bet_stake",
            TransactionType::BetWin => "bet_win",
            TransactionType::BetRefund => "bet_refund",
            TransactionType::YieldDeposit => "yield_deposit",
            TransactionType::YieldWithdraw => "yield_withdraw",
            TransactionType::YieldEarned => "yield_earned",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "bet_stake" => Ok(TransactionType::BetStake),
            "bet_win" => Ok(TransactionType::BetWin),
            "bet_refund" => Ok(TransactionType::BetRefund),
            "yield_deposit" => Ok(TransactionType::YieldDeposit),
            "yield_withdraw" => Ok(TransactionType::YieldWithdraw),
            "yield_earned" => Ok(TransactionType::YieldEarned),
            _ => Err(anyhow::anyhow!("Unknown transaction type: {s}")),
        }
    }
}

/// Ledger entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "confirmed" => Ok(TransactionStatus::Confirmed),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(anyhow::anyhow!("Unknown transaction status: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// User & Balance
// ---------------------------------------------------------------------------

/// A marketplace user, identified externally by wallet address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
}

/// Custodied funds for one user, split by state.
///
/// Invariant: all three components are non-negative and their sum equals the
/// user's total custodied funds. A bet's stake moves from `available` to
/// `locked` atomically with bet creation, never partially.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub available: Decimal,
    pub locked: Decimal,
    pub in_yield: Decimal,
}

impl Balance {
    pub fn zero() -> Self {
        Balance {
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
            in_yield: Decimal::ZERO,
        }
    }

    /// Total custodied funds across all states.
    pub fn total(&self) -> Decimal {
        self.available + self.locked + self.in_yield
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "available={} locked={} in_yield={} (total={})",
            self.available,
            self.locked,
            self.in_yield,
            self.total(),
        )
    }
}

// ---------------------------------------------------------------------------
// Match, Market, Outcome
// ---------------------------------------------------------------------------

/// A fixture between two teams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

impl Match {
    /// "2-1" once both scores are recorded.
    pub fn result_string(&self) -> Option<String> {
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) => Some(format!("{h}-{a}")),
            _ => None,
        }
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} vs {} ({})",
            self.league, self.home_team, self.away_team, self.status,
        )
    }
}

/// A betting proposition on a match, grouping mutually exclusive outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub match_id: String,
    pub name: String,
    pub market_type: MarketType,
    /// Numeric parameter, e.g. the goal threshold of an over/under market.
    pub line: Option<Decimal>,
    pub status: MarketStatus,
}

/// A single wagerable result within a market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub id: String,
    pub market_id: String,
    pub name: String,
    /// Current decimal odds, always > 1.0. Updated by the odds feed.
    pub odds: Decimal,
    pub previous_odds: Option<Decimal>,
}

impl Outcome {
    /// Odds movement direction since the previous quote.
    pub fn movement(&self) -> Option<&'static str> {
        let prev = self.previous_odds?;
        Some(if self.odds > prev {
            "up"
        } else if self.odds < prev {
            "down"
        } else {
            "stable"
        })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.name, self.odds)
    }
}

/// The Market Snapshot Reader's view of an outcome at decision time:
/// the current persisted odds plus the market and match status that gate
/// bet acceptance.
#[derive(Debug, Clone)]
pub struct OutcomeSnapshot {
    pub outcome: Outcome,
    pub market_id: String,
    pub market_type: MarketType,
    pub line: Option<Decimal>,
    pub market_status: MarketStatus,
    pub match_id: String,
    pub match_status: MatchStatus,
}

// ---------------------------------------------------------------------------
// Bet
// ---------------------------------------------------------------------------

/// A wager on a single outcome. Immutable once created except for
/// `status`, `actual_return`, and `settled_at`, written exactly once
/// by the Settlement Engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub user_id: String,
    pub outcome_id: String,
    pub stake: Decimal,
    /// Odds at acceptance time, frozen for the life of the bet.
    pub odds: Decimal,
    pub potential_return: Decimal,
    pub status: BetStatus,
    pub actual_return: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Bet {
    /// Realized profit. Negative until the bet wins or is refunded.
    pub fn profit(&self) -> Decimal {
        match self.actual_return {
            Some(ret) => ret - self.stake,
            None => -self.stake,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status.is_terminal()
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stake={} odds={} returns={} [{}]",
            self.id, self.stake, self.odds, self.potential_return, self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Append-only ledger entry. Never mutated after creation; corrections are
/// modeled as new offsetting entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub tx_type: TransactionType,
    /// Signed amount: negative for debits, positive for credits.
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub bet_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}]",
            self.tx_type, self.amount, self.user_id, self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
