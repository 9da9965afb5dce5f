//! Persistence layer.
//!
//! SQLite via sqlx. The schema is bootstrapped at startup (idempotent
//! CREATE TABLE IF NOT EXISTS), WAL mode with a busy timeout so concurrent
//! writers queue instead of failing.
//!
//! Monetary amounts are persisted as INTEGER micro-units (10^-6, USDC's
//! native scale) so balance guards are single conditional UPDATE statements.
//! Odds are persisted as TEXT; `rust_decimal` lives at the domain boundary.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::types::{
    Bet, BetStatus, Market, MarketStatus, Match, MatchStatus, Outcome, OutcomeSnapshot,
    Transaction, User,
};

// ---------------------------------------------------------------------------
// Amount units
// ---------------------------------------------------------------------------

/// Decimal places carried by the integer unit representation.
pub const UNIT_SCALE: u32 = 6;

const UNITS_PER_WHOLE: i64 = 1_000_000;

/// Convert a decimal amount to integer micro-units.
///
/// Returns None if the amount carries more than 6 decimal places or
/// overflows i64; callers reject such input before it reaches storage.
pub fn to_units(amount: Decimal) -> Option<i64> {
    let scaled = amount.checked_mul(Decimal::from(UNITS_PER_WHOLE))?;
    if scaled.fract() != Decimal::ZERO {
        return None;
    }
    scaled.to_i64()
}

/// Convert integer micro-units back to a decimal amount.
pub fn from_units(units: i64) -> Decimal {
    Decimal::new(units, UNIT_SCALE).normalize()
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Betting statistics for one user, computed from the bets table.
#[derive(Debug, Clone, Default)]
pub struct BetStats {
    pub total_bets: i64,
    pub won: i64,
    pub lost: i64,
    pub voided: i64,
    pub total_staked: Decimal,
    pub total_returned: Decimal,
}

impl BetStats {
    pub fn profit(&self) -> Decimal {
        self.total_returned - self.total_staked
    }

    /// Return on investment as a percentage, 0 when nothing was staked.
    pub fn roi(&self) -> Decimal {
        if self.total_staked.is_zero() {
            Decimal::ZERO
        } else {
            (self.profit() / self.total_staked * Decimal::from(100)).round_dp(2)
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to the SQLite database. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `url` and bootstrap the
    /// schema.
    pub async fn open(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url: {url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to open database")?;

        let store = Store { pool };
        store.migrate().await?;
        info!(url, "Database ready");
        Ok(store)
    }

    /// Open an in-memory database for tests.
    ///
    /// A single pooled connection is used: SQLite gives each connection its
    /// own private memory database, and the pool must never recycle it.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let store = Store { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id             TEXT PRIMARY KEY,
                wallet_address TEXT NOT NULL UNIQUE,
                created_at     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS balances (
                user_id  TEXT PRIMARY KEY REFERENCES users(id),
                available INTEGER NOT NULL DEFAULT 0 CHECK (available >= 0),
                locked    INTEGER NOT NULL DEFAULT 0 CHECK (locked >= 0),
                in_yield  INTEGER NOT NULL DEFAULT 0 CHECK (in_yield >= 0)
            );

            CREATE TABLE IF NOT EXISTS matches (
                id         TEXT PRIMARY KEY,
                league     TEXT NOT NULL,
                home_team  TEXT NOT NULL,
                away_team  TEXT NOT NULL,
                start_time TEXT NOT NULL,
                status     TEXT NOT NULL,
                home_score INTEGER,
                away_score INTEGER
            );

            CREATE TABLE IF NOT EXISTS markets (
                id       TEXT PRIMARY KEY,
                match_id TEXT NOT NULL REFERENCES matches(id),
                name     TEXT NOT NULL,
                type     TEXT NOT NULL,
                line     TEXT,
                status   TEXT NOT NULL,
                UNIQUE (match_id, type, line)
            );

            CREATE TABLE IF NOT EXISTS outcomes (
                id            TEXT PRIMARY KEY,
                market_id     TEXT NOT NULL REFERENCES markets(id),
                name          TEXT NOT NULL,
                odds          TEXT NOT NULL,
                previous_odds TEXT
            );

            CREATE TABLE IF NOT EXISTS bets (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL REFERENCES users(id),
                outcome_id       TEXT NOT NULL REFERENCES outcomes(id),
                stake            INTEGER NOT NULL,
                odds             TEXT NOT NULL,
                potential_return INTEGER NOT NULL,
                status           TEXT NOT NULL,
                actual_return    INTEGER,
                created_at       TEXT NOT NULL,
                settled_at       TEXT
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL REFERENCES users(id),
                type       TEXT NOT NULL,
                amount     INTEGER NOT NULL,
                status     TEXT NOT NULL,
                bet_id     TEXT REFERENCES bets(id),
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_markets_match ON markets(match_id);
            CREATE INDEX IF NOT EXISTS idx_outcomes_market ON outcomes(market_id);
            CREATE INDEX IF NOT EXISTS idx_bets_user ON bets(user_id, status);
            CREATE INDEX IF NOT EXISTS idx_bets_outcome ON bets(outcome_id, status);
            CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Schema bootstrap failed")?;
        Ok(())
    }

    // -- Users ------------------------------------------------------------

    /// Create a user with a zero balance. The insert pair is atomic.
    pub async fn create_user(&self, wallet_address: &str) -> Result<User> {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            wallet_address: wallet_address.to_string(),
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO users (id, wallet_address, created_at) VALUES (?, ?, ?)")
            .bind(&user.id)
            .bind(&user.wallet_address)
            .bind(user.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .context("Failed to insert user")?;
        sqlx::query("INSERT INTO balances (user_id, available, locked, in_yield) VALUES (?, 0, 0, 0)")
            .bind(&user.id)
            .execute(&mut *tx)
            .await
            .context("Failed to insert balance")?;
        tx.commit().await?;

        Ok(user)
    }

    pub async fn user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, wallet_address, created_at FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(user_from_row).transpose()
    }

    pub async fn user_by_wallet(&self, wallet_address: &str) -> Result<Option<User>> {
        let row =
            sqlx::query("SELECT id, wallet_address, created_at FROM users WHERE wallet_address = ?")
                .bind(wallet_address)
                .fetch_optional(&self.pool)
                .await?;
        row.map(user_from_row).transpose()
    }

    // -- Fixtures ---------------------------------------------------------

    pub async fn insert_match(&self, m: &Match) -> Result<()> {
        sqlx::query(
            "INSERT INTO matches (id, league, home_team, away_team, start_time, status, home_score, away_score)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&m.id)
        .bind(&m.league)
        .bind(&m.home_team)
        .bind(&m.away_team)
        .bind(m.start_time.to_rfc3339())
        .bind(m.status.as_str())
        .bind(m.home_score)
        .bind(m.away_score)
        .execute(&self.pool)
        .await
        .context("Failed to insert match")?;
        Ok(())
    }

    pub async fn insert_market(&self, market: &Market) -> Result<()> {
        sqlx::query(
            "INSERT INTO markets (id, match_id, name, type, line, status) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&market.id)
        .bind(&market.match_id)
        .bind(&market.name)
        .bind(market.market_type.as_str())
        .bind(market.line.map(|l| l.to_string()))
        .bind(market.status.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to insert market")?;
        Ok(())
    }

    pub async fn insert_outcome(&self, outcome: &Outcome) -> Result<()> {
        sqlx::query(
            "INSERT INTO outcomes (id, market_id, name, odds, previous_odds) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&outcome.id)
        .bind(&outcome.market_id)
        .bind(&outcome.name)
        .bind(outcome.odds.to_string())
        .bind(outcome.previous_odds.map(|o| o.to_string()))
        .execute(&self.pool)
        .await
        .context("Failed to insert outcome")?;
        Ok(())
    }

    pub async fn match_by_id(&self, match_id: &str) -> Result<Option<Match>> {
        let row = sqlx::query(
            "SELECT id, league, home_team, away_team, start_time, status, home_score, away_score
             FROM matches WHERE id = ?",
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(match_from_row).transpose()
    }

    pub async fn matches(
        &self,
        status: Option<MatchStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Match>> {
        let rows = match status {
            Some(s) => {
                sqlx::query(
                    "SELECT id, league, home_team, away_team, start_time, status, home_score, away_score
                     FROM matches WHERE status = ? ORDER BY start_time ASC LIMIT ? OFFSET ?",
                )
                .bind(s.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, league, home_team, away_team, start_time, status, home_score, away_score
                     FROM matches ORDER BY start_time ASC LIMIT ? OFFSET ?",
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(match_from_row).collect()
    }

    pub async fn markets_for_match(&self, match_id: &str) -> Result<Vec<Market>> {
        let rows = sqlx::query(
            "SELECT id, match_id, name, type, line, status FROM markets WHERE match_id = ?",
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(market_from_row).collect()
    }

    pub async fn outcomes_for_market(&self, market_id: &str) -> Result<Vec<Outcome>> {
        let rows = sqlx::query(
            "SELECT id, market_id, name, odds, previous_odds FROM outcomes WHERE market_id = ?",
        )
        .bind(market_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(outcome_from_row).collect()
    }

    /// Record the final result and flip the match to finished. Idempotent.
    pub async fn record_match_result(
        &self,
        match_id: &str,
        home_score: i64,
        away_score: i64,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE matches SET status = 'finished', home_score = ?, away_score = ? WHERE id = ?",
        )
        .bind(home_score)
        .bind(away_score)
        .bind(match_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_match_status(&self, match_id: &str, status: MatchStatus) -> Result<bool> {
        let res = sqlx::query("UPDATE matches SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(match_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_market_status(&self, market_id: &str, status: MarketStatus) -> Result<bool> {
        let res = sqlx::query("UPDATE markets SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(market_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // -- Market Snapshot Reader -------------------------------------------

    /// Read the current odds and gating statuses for one outcome.
    ///
    /// Always reads the persisted odds at call time; never a cached quote.
    pub async fn outcome_snapshot(&self, outcome_id: &str) -> Result<Option<OutcomeSnapshot>> {
        let row = sqlx::query(
            "SELECT o.id, o.market_id, o.name, o.odds, o.previous_odds,
                    mk.type AS market_type, mk.line, mk.status AS market_status,
                    mk.match_id, m.status AS match_status
             FROM outcomes o
             JOIN markets mk ON mk.id = o.market_id
             JOIN matches m  ON m.id = mk.match_id
             WHERE o.id = ?",
        )
        .bind(outcome_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let outcome = outcome_from_row_prefixed(&row)?;
        let market_id: String = row.try_get("market_id")?;
        let market_type: String = row.try_get("market_type")?;
        let line: Option<String> = row.try_get("line")?;
        let market_status: String = row.try_get("market_status")?;
        let match_id: String = row.try_get("match_id")?;
        let match_status: String = row.try_get("match_status")?;

        Ok(Some(OutcomeSnapshot {
            outcome,
            market_id,
            market_type: market_type.parse()?,
            line: line.map(|l| parse_decimal(&l)).transpose()?,
            market_status: market_status.parse()?,
            match_id,
            match_status: match_status.parse()?,
        }))
    }

    /// Odds feed write-through: replace the quote and remember the previous
    /// one for movement display.
    pub async fn update_odds(&self, outcome_id: &str, new_odds: Decimal) -> Result<bool> {
        let res = sqlx::query("UPDATE outcomes SET previous_odds = odds, odds = ? WHERE id = ?")
            .bind(new_odds.to_string())
            .bind(outcome_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // -- Bets -------------------------------------------------------------

    pub async fn bet(&self, bet_id: &str) -> Result<Option<Bet>> {
        let row = sqlx::query(&format!("{BET_SELECT} WHERE id = ?"))
            .bind(bet_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(bet_from_row).transpose()
    }

    pub async fn bets_for_user(
        &self,
        user_id: &str,
        status: Option<BetStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Bet>> {
        let rows = match status {
            Some(s) => {
                sqlx::query(&format!(
                    "{BET_SELECT} WHERE user_id = ? AND status = ?
                     ORDER BY created_at DESC LIMIT ? OFFSET ?"
                ))
                .bind(user_id)
                .bind(s.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "{BET_SELECT} WHERE user_id = ?
                     ORDER BY created_at DESC LIMIT ? OFFSET ?"
                ))
                .bind(user_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(bet_from_row).collect()
    }

    /// Settled bets only, newest settlement first.
    pub async fn settled_bets_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Bet>> {
        let rows = sqlx::query(&format!(
            "{BET_SELECT} WHERE user_id = ? AND status != 'pending'
             ORDER BY settled_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(bet_from_row).collect()
    }

    /// All pending bets referencing an outcome, for settlement.
    pub async fn pending_bets_for_outcome(&self, outcome_id: &str) -> Result<Vec<Bet>> {
        let rows = sqlx::query(&format!(
            "{BET_SELECT} WHERE outcome_id = ? AND status = 'pending'"
        ))
        .bind(outcome_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(bet_from_row).collect()
    }

    pub async fn bet_stats(&self, user_id: &str) -> Result<BetStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN status = 'won' THEN 1 ELSE 0 END), 0) AS won,
                    COALESCE(SUM(CASE WHEN status = 'lost' THEN 1 ELSE 0 END), 0) AS lost,
                    COALESCE(SUM(CASE WHEN status = 'void' THEN 1 ELSE 0 END), 0) AS voided,
                    COALESCE(SUM(stake), 0) AS staked,
                    COALESCE(SUM(actual_return), 0) AS returned
             FROM bets WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(BetStats {
            total_bets: row.try_get("total")?,
            won: row.try_get("won")?,
            lost: row.try_get("lost")?,
            voided: row.try_get("voided")?,
            total_staked: from_units(row.try_get("staked")?),
            total_returned: from_units(row.try_get("returned")?),
        })
    }

    // -- Transactions -----------------------------------------------------

    pub async fn transactions_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            "SELECT id, user_id, type, amount, status, bet_id, created_at
             FROM transactions WHERE user_id = ?
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(transaction_from_row).collect()
    }

    pub async fn transactions_for_bet(&self, bet_id: &str) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            "SELECT id, user_id, type, amount, status, bet_id, created_at
             FROM transactions WHERE bet_id = ? ORDER BY created_at ASC",
        )
        .bind(bet_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(transaction_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Connection-scoped writers
// ---------------------------------------------------------------------------

/// Insert a bet row inside a caller-owned transaction.
pub async fn insert_bet(conn: &mut sqlx::SqliteConnection, bet: &Bet) -> Result<()> {
    let stake = to_units(bet.stake).ok_or_else(|| anyhow!("Stake not unit-representable"))?;
    let potential_return = to_units(bet.potential_return)
        .ok_or_else(|| anyhow!("Potential return not unit-representable"))?;

    sqlx::query(
        "INSERT INTO bets (id, user_id, outcome_id, stake, odds, potential_return, status,
                           actual_return, created_at, settled_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, NULL)",
    )
    .bind(&bet.id)
    .bind(&bet.user_id)
    .bind(&bet.outcome_id)
    .bind(stake)
    .bind(bet.odds.to_string())
    .bind(potential_return)
    .bind(bet.status.as_str())
    .bind(bet.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .context("Failed to insert bet")?;
    Ok(())
}

/// Write a bet's terminal state, gated on it still being pending.
///
/// Returns false when the bet was already settled (or does not exist); the
/// caller must then skip the balance mutation. This gate is what makes
/// settlement at-most-once-effective under retries.
pub async fn mark_bet_settled(
    conn: &mut sqlx::SqliteConnection,
    bet_id: &str,
    status: BetStatus,
    actual_return: Decimal,
    settled_at: DateTime<Utc>,
) -> Result<bool> {
    let units =
        to_units(actual_return).ok_or_else(|| anyhow!("Actual return not unit-representable"))?;

    let res = sqlx::query(
        "UPDATE bets SET status = ?, actual_return = ?, settled_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(status.as_str())
    .bind(units)
    .bind(settled_at.to_rfc3339())
    .bind(bet_id)
    .execute(&mut *conn)
    .await
    .context("Failed to settle bet")?;
    Ok(res.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const BET_SELECT: &str = "SELECT id, user_id, outcome_id, stake, odds, potential_return, status,
                                 actual_return, created_at, settled_at
                          FROM bets";

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Invalid timestamp: {s}"))?
        .with_timezone(&Utc))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| anyhow!("Invalid decimal '{s}': {e}"))
}

fn user_from_row(row: SqliteRow) -> Result<User> {
    let created_at: String = row.try_get("created_at")?;
    Ok(User {
        id: row.try_get("id")?,
        wallet_address: row.try_get("wallet_address")?,
        created_at: parse_ts(&created_at)?,
    })
}

fn match_from_row(row: SqliteRow) -> Result<Match> {
    let start_time: String = row.try_get("start_time")?;
    let status: String = row.try_get("status")?;
    Ok(Match {
        id: row.try_get("id")?,
        league: row.try_get("league")?,
        home_team: row.try_get("home_team")?,
        away_team: row.try_get("away_team")?,
        start_time: parse_ts(&start_time)?,
        status: status.parse()?,
        home_score: row.try_get("home_score")?,
        away_score: row.try_get("away_score")?,
    })
}

fn market_from_row(row: SqliteRow) -> Result<Market> {
    let market_type: String = row.try_get("type")?;
    let line: Option<String> = row.try_get("line")?;
    let status: String = row.try_get("status")?;
    Ok(Market {
        id: row.try_get("id")?,
        match_id: row.try_get("match_id")?,
        name: row.try_get("name")?,
        market_type: market_type.parse()?,
        line: line.map(|l| parse_decimal(&l)).transpose()?,
        status: status.parse()?,
    })
}

fn outcome_from_row(row: SqliteRow) -> Result<Outcome> {
    outcome_from_row_prefixed(&row)
}

fn outcome_from_row_prefixed(row: &SqliteRow) -> Result<Outcome> {
    let odds: String = row.try_get("odds")?;
    let previous_odds: Option<String> = row.try_get("previous_odds")?;
    Ok(Outcome {
        id: row.try_get("id")?,
        market_id: row.try_get("market_id")?,
        name: row.try_get("name")?,
        odds: parse_decimal(&odds)?,
        previous_odds: previous_odds.map(|o| parse_decimal(&o)).transpose()?,
    })
}

fn bet_from_row(row: SqliteRow) -> Result<Bet> {
    let odds: String = row.try_get("odds")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let settled_at: Option<String> = row.try_get("settled_at")?;
    let actual_return: Option<i64> = row.try_get("actual_return")?;
    Ok(Bet {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        outcome_id: row.try_get("outcome_id")?,
        stake: from_units(row.try_get("stake")?),
        odds: parse_decimal(&odds)?,
        potential_return: from_units(row.try_get("potential_return")?),
        status: status.parse()?,
        actual_return: actual_return.map(from_units),
        created_at: parse_ts(&created_at)?,
        settled_at: settled_at.map(|s| parse_ts(&s)).transpose()?,
    })
}

fn transaction_from_row(row: SqliteRow) -> Result<Transaction> {
    let tx_type: String = row.try_get("type")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(Transaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        tx_type: tx_type.parse()?,
        amount: from_units(row.try_get("amount")?),
        status: status.parse()?,
        bet_id: row.try_get("bet_id")?,
        created_at: parse_ts(&created_at)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketType;
    use rust_decimal_macros::dec;

    pub(crate) async fn seed_fixture(store: &Store) -> (Match, Market, Outcome) {
        let m = Match {
            id: "match-1".into(),
            league: "Premier League".into(),
            home_team: "Liverpool".into(),
            away_team: "Arsenal".into(),
            start_time: Utc::now() + chrono::Duration::hours(4),
            status: MatchStatus::Upcoming,
            home_score: None,
            away_score: None,
        };
        let market = Market {
            id: "market-1".into(),
            match_id: m.id.clone(),
            name: "Match Result".into(),
            market_type: MarketType::MatchResult,
            line: None,
            status: MarketStatus::Open,
        };
        let outcome = Outcome {
            id: "outcome-home".into(),
            market_id: market.id.clone(),
            name: "Home".into(),
            odds: dec!(2.20),
            previous_odds: None,
        };
        store.insert_match(&m).await.unwrap();
        store.insert_market(&market).await.unwrap();
        store.insert_outcome(&outcome).await.unwrap();
        (m, market, outcome)
    }

    #[test]
    fn test_units_roundtrip() {
        assert_eq!(to_units(dec!(1)), Some(1_000_000));
        assert_eq!(to_units(dec!(0.000001)), Some(1));
        assert_eq!(to_units(dec!(100.25)), Some(100_250_000));
        assert_eq!(from_units(100_250_000), dec!(100.25));
        assert_eq!(from_units(0), Decimal::ZERO);
    }

    #[test]
    fn test_units_reject_sub_micro() {
        assert_eq!(to_units(dec!(0.0000001)), None);
        assert_eq!(to_units(dec!(1.1234567)), None);
    }

    #[test]
    fn test_bet_stats_roi() {
        let stats = BetStats {
            total_bets: 4,
            won: 1,
            lost: 2,
            voided: 1,
            total_staked: dec!(400),
            total_returned: dec!(500),
        };
        assert_eq!(stats.profit(), dec!(100));
        assert_eq!(stats.roi(), dec!(25));
        assert_eq!(BetStats::default().roi(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_create_user_with_zero_balance() {
        let store = Store::open_in_memory().await.unwrap();
        let user = store.create_user("wallet-abc").await.unwrap();

        let fetched = store.user(&user.id).await.unwrap().unwrap();
        assert_eq!(fetched.wallet_address, "wallet-abc");

        let by_wallet = store.user_by_wallet("wallet-abc").await.unwrap().unwrap();
        assert_eq!(by_wallet.id, user.id);

        let balance = crate::ledger::balance(store.pool(), &user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance, crate::types::Balance::zero());
    }

    #[tokio::test]
    async fn test_duplicate_wallet_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        store.create_user("wallet-abc").await.unwrap();
        assert!(store.create_user("wallet-abc").await.is_err());
    }

    #[tokio::test]
    async fn test_outcome_snapshot_joins_statuses() {
        let store = Store::open_in_memory().await.unwrap();
        let (m, market, outcome) = seed_fixture(&store).await;

        let snap = store
            .outcome_snapshot(&outcome.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snap.outcome.odds, dec!(2.20));
        assert_eq!(snap.market_id, market.id);
        assert_eq!(snap.market_status, MarketStatus::Open);
        assert_eq!(snap.match_id, m.id);
        assert_eq!(snap.match_status, MatchStatus::Upcoming);

        assert!(store.outcome_snapshot("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_odds_tracks_previous() {
        let store = Store::open_in_memory().await.unwrap();
        let (_, _, outcome) = seed_fixture(&store).await;

        assert!(store.update_odds(&outcome.id, dec!(2.35)).await.unwrap());
        let snap = store.outcome_snapshot(&outcome.id).await.unwrap().unwrap();
        assert_eq!(snap.outcome.odds, dec!(2.35));
        assert_eq!(snap.outcome.previous_odds, Some(dec!(2.20)));
        assert_eq!(snap.outcome.movement(), Some("up"));

        assert!(!store.update_odds("nope", dec!(2.0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_market_line_uniqueness() {
        let store = Store::open_in_memory().await.unwrap();
        let (m, _, _) = seed_fixture(&store).await;

        let ou = Market {
            id: "market-ou".into(),
            match_id: m.id.clone(),
            name: "Over/Under 2.5".into(),
            market_type: MarketType::OverUnder,
            line: Some(dec!(2.5)),
            status: MarketStatus::Open,
        };
        store.insert_market(&ou).await.unwrap();

        // Same (match, type, line) is rejected.
        let dup = Market {
            id: "market-ou-dup".into(),
            ..ou.clone()
        };
        assert!(store.insert_market(&dup).await.is_err());

        // A different line on the same type is fine.
        let other_line = Market {
            id: "market-ou-35".into(),
            name: "Over/Under 3.5".into(),
            line: Some(dec!(3.5)),
            ..ou.clone()
        };
        store.insert_market(&other_line).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_match_result() {
        let store = Store::open_in_memory().await.unwrap();
        let (m, _, _) = seed_fixture(&store).await;

        assert!(store.record_match_result(&m.id, 2, 1).await.unwrap());
        let updated = store.match_by_id(&m.id).await.unwrap().unwrap();
        assert_eq!(updated.status, MatchStatus::Finished);
        assert_eq!(updated.result_string().unwrap(), "2-1");

        assert!(!store.record_match_result("nope", 0, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_matches_filter_and_order() {
        let store = Store::open_in_memory().await.unwrap();
        let (m, _, _) = seed_fixture(&store).await;

        let later = Match {
            id: "match-2".into(),
            start_time: m.start_time + chrono::Duration::days(1),
            status: MatchStatus::Finished,
            home_score: Some(1),
            away_score: Some(1),
            ..m.clone()
        };
        store.insert_match(&later).await.unwrap();

        let upcoming = store
            .matches(Some(MatchStatus::Upcoming), 20, 0)
            .await
            .unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, m.id);

        let all = store.matches(None, 20, 0).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, m.id); // earliest start first
    }
}
