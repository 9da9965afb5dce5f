//! Balance ledger and transaction log.
//!
//! Every balance mutation here is a single conditional UPDATE over integer
//! micro-units, so no two concurrent operations on the same user can both
//! observe sufficient funds and overcommit. Mutations that belong to a larger
//! atomic unit (bet placement, settlement) take a `&mut SqliteConnection`
//! owned by the caller's transaction; the paired transaction-log append
//! happens inside the same unit via [`record`].
//!
//! The log is append-only: no update or delete exists in this module or
//! anywhere else. Corrections are new offsetting entries.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::storage::{from_units, to_units};
use crate::types::{Balance, Transaction, TransactionStatus, TransactionType};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        available: Decimal,
        required: Decimal,
    },

    #[error("Insufficient locked funds: need {required}, have {locked}")]
    InsufficientLock { locked: Decimal, required: Decimal },

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Positive amount representable in micro-units, or `InvalidAmount`.
fn positive_units(amount: Decimal) -> Result<i64, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    to_units(amount).ok_or(LedgerError::InvalidAmount(amount))
}

/// Signed amount representable in micro-units, or `InvalidAmount`.
fn signed_units(amount: Decimal) -> Result<i64, LedgerError> {
    to_units(amount).ok_or(LedgerError::InvalidAmount(amount))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Current balance for a user, `None` if the user does not exist.
pub async fn balance(pool: &SqlitePool, user_id: &str) -> Result<Option<Balance>, LedgerError> {
    let row = sqlx::query("SELECT available, locked, in_yield FROM balances WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(r) => Ok(Some(Balance {
            available: from_units(r.try_get("available")?),
            locked: from_units(r.try_get("locked")?),
            in_yield: from_units(r.try_get("in_yield")?),
        })),
        None => Ok(None),
    }
}

async fn balance_on(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<(i64, i64)>, LedgerError> {
    let row = sqlx::query("SELECT available, locked FROM balances WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(r) => Ok(Some((r.try_get("available")?, r.try_get("locked")?))),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Mutations (caller-owned transaction)
// ---------------------------------------------------------------------------

/// Move `amount` from available to locked.
///
/// The guard `available >= amount` and the move are one statement; zero rows
/// affected means the funds were not there (or the user is unknown), and the
/// balance is untouched either way.
pub async fn lock_funds(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: Decimal,
) -> Result<(), LedgerError> {
    let units = positive_units(amount)?;

    let res = sqlx::query(
        "UPDATE balances SET available = available - ?, locked = locked + ?
         WHERE user_id = ? AND available >= ?",
    )
    .bind(units)
    .bind(units)
    .bind(user_id)
    .bind(units)
    .execute(&mut *conn)
    .await?;

    if res.rows_affected() == 0 {
        return match balance_on(conn, user_id).await? {
            Some((available, _)) => Err(LedgerError::InsufficientFunds {
                available: from_units(available),
                required: amount,
            }),
            None => Err(LedgerError::UnknownUser(user_id.to_string())),
        };
    }

    debug!(user_id, %amount, "Funds locked");
    Ok(())
}

/// Release `stake` from locked, crediting `credit` back to available.
///
/// `credit` is the settlement's call: the full return for a win, the stake
/// for a void, zero for a loss (the lock is dropped without returning funds).
pub async fn release_lock(
    conn: &mut SqliteConnection,
    user_id: &str,
    stake: Decimal,
    credit: Decimal,
) -> Result<(), LedgerError> {
    let stake_units = positive_units(stake)?;
    let credit_units = if credit.is_zero() {
        0
    } else {
        positive_units(credit)?
    };

    let res = sqlx::query(
        "UPDATE balances SET locked = locked - ?, available = available + ?
         WHERE user_id = ? AND locked >= ?",
    )
    .bind(stake_units)
    .bind(credit_units)
    .bind(user_id)
    .bind(stake_units)
    .execute(&mut *conn)
    .await?;

    if res.rows_affected() == 0 {
        return match balance_on(conn, user_id).await? {
            Some((_, locked)) => Err(LedgerError::InsufficientLock {
                locked: from_units(locked),
                required: stake,
            }),
            None => Err(LedgerError::UnknownUser(user_id.to_string())),
        };
    }

    debug!(user_id, %stake, %credit, "Lock released");
    Ok(())
}

/// Append one entry to the transaction log.
pub async fn record(
    conn: &mut SqliteConnection,
    user_id: &str,
    tx_type: TransactionType,
    amount: Decimal,
    status: TransactionStatus,
    bet_id: Option<&str>,
) -> Result<Transaction, LedgerError> {
    let units = signed_units(amount)?;
    let entry = Transaction {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        tx_type,
        amount,
        status,
        bet_id: bet_id.map(str::to_string),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO transactions (id, user_id, type, amount, status, bet_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.user_id)
    .bind(entry.tx_type.as_str())
    .bind(units)
    .bind(entry.status.as_str())
    .bind(&entry.bet_id)
    .bind(entry.created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}

// ---------------------------------------------------------------------------
// Deposits & withdrawals (self-contained atomic units)
// ---------------------------------------------------------------------------

/// Credit `amount` to a user's available balance, paired with a confirmed
/// deposit entry in the same transaction. Returns the new balance.
pub async fn credit(
    pool: &SqlitePool,
    user_id: &str,
    amount: Decimal,
) -> Result<Balance, LedgerError> {
    let units = positive_units(amount)?;

    let mut tx = pool.begin().await?;
    let res = sqlx::query("UPDATE balances SET available = available + ? WHERE user_id = ?")
        .bind(units)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(LedgerError::UnknownUser(user_id.to_string()));
    }
    record(
        &mut *tx,
        user_id,
        TransactionType::Deposit,
        amount,
        TransactionStatus::Confirmed,
        None,
    )
    .await?;
    tx.commit().await?;

    balance(pool, user_id)
        .await?
        .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))
}

/// Debit `amount` from a user's available balance, paired with a confirmed
/// withdrawal entry in the same transaction. Returns the new balance.
pub async fn debit(
    pool: &SqlitePool,
    user_id: &str,
    amount: Decimal,
) -> Result<Balance, LedgerError> {
    let units = positive_units(amount)?;

    let mut tx = pool.begin().await?;
    let res = sqlx::query(
        "UPDATE balances SET available = available - ?
         WHERE user_id = ? AND available >= ?",
    )
    .bind(units)
    .bind(user_id)
    .bind(units)
    .execute(&mut *tx)
    .await?;
    if res.rows_affected() == 0 {
        return match balance_on(&mut *tx, user_id).await? {
            Some((available, _)) => Err(LedgerError::InsufficientFunds {
                available: from_units(available),
                required: amount,
            }),
            None => Err(LedgerError::UnknownUser(user_id.to_string())),
        };
    }
    record(
        &mut *tx,
        user_id,
        TransactionType::Withdrawal,
        -amount,
        TransactionStatus::Confirmed,
        None,
    )
    .await?;
    tx.commit().await?;

    balance(pool, user_id)
        .await?
        .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
