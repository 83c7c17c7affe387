//! Credit ledger.
//!
//! `users.credits` is a cached balance; `credit_transactions` is the journal.
//! Every change to the balance goes through [`record`], which updates both in
//! the caller's transaction, so the sum of a user's journal always equals the
//! balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};

use crate::{
    error::{AppError, AppResult},
    utils::auth::UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "credit_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreditKind {
    SignupBonus,
    UploadReward,
    DownloadPurchase,
    DownloadEarning,
    AnswerReward,
    Purchase,
    Refund,
    AdminAdjustment,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransaction {
    pub id: i32,
    pub amount: i32,
    pub kind: CreditKind,
    pub reference_id: Option<i32>,
    pub description: String,
    pub balance_after: i32,
    pub created_at: DateTime<Utc>,
}

/// One ledger entry to apply.
#[derive(Debug, Clone)]
pub struct Entry<'a> {
    pub user_id: UserId,
    pub amount: i32,
    pub kind: CreditKind,
    pub reference_id: Option<i32>,
    pub description: &'a str,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAudit {
    pub user_id: UserId,
    pub balance: i32,
    pub ledger_sum: i64,
    pub transaction_count: i64,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        i64::from(self.balance) == self.ledger_sum
    }
}

/// Checks a debit against a balance without touching storage.
pub fn ensure_affordable(balance: i32, cost: i32) -> AppResult<()> {
    if cost > balance {
        return Err(AppError::InsufficientCredits {
            required: cost,
            available: balance,
        });
    }
    Ok(())
}

/// Applies one entry and returns the resulting balance.
///
/// The balance update is guarded so it never goes negative; a debit that
/// would overdraw fails with `InsufficientCredits` and writes nothing.
pub async fn record(conn: &mut PgConnection, entry: Entry<'_>) -> AppResult<i32> {
    if entry.amount == 0 {
        return current_balance(conn, entry.user_id).await;
    }

    let balance = sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE users
        SET credits = credits + $2, updated_at = NOW()
        WHERE id = $1 AND credits + $2 >= 0
        RETURNING credits
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.amount)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(balance) = balance else {
        let available = current_balance(conn, entry.user_id).await?;
        return Err(AppError::InsufficientCredits {
            required: -entry.amount,
            available,
        });
    };

    sqlx::query(
        r#"
        INSERT INTO credit_transactions (user_id, amount, kind, reference_id, description, balance_after)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.amount)
    .bind(entry.kind)
    .bind(entry.reference_id)
    .bind(entry.description)
    .bind(balance)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        user_id = entry.user_id,
        amount = entry.amount,
        kind = ?entry.kind,
        balance,
        "ledger entry recorded"
    );

    Ok(balance)
}

async fn current_balance(conn: &mut PgConnection, user_id: UserId) -> AppResult<i32> {
    sqlx::query_scalar::<_, i32>("SELECT credits FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(AppError::not_found)
}

pub async fn balance(pool: &PgPool, user_id: UserId) -> AppResult<i32> {
    let mut conn = pool.acquire().await?;
    current_balance(&mut conn, user_id).await
}

pub async fn list_transactions(
    pool: &PgPool,
    user_id: UserId,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<CreditTransaction>> {
    Ok(sqlx::query_as::<_, CreditTransaction>(
        r#"
        SELECT id, amount, kind, reference_id, description, balance_after, created_at
        FROM credit_transactions
        WHERE user_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}

pub async fn audit(pool: &PgPool, user_id: UserId) -> AppResult<LedgerAudit> {
    sqlx::query_as::<_, LedgerAudit>(
        r#"
        SELECT
            users.id AS user_id,
            users.credits AS balance,
            COALESCE(SUM(credit_transactions.amount), 0)::BIGINT AS ledger_sum,
            COUNT(credit_transactions.id) AS transaction_count
        FROM users
        LEFT JOIN credit_transactions ON credit_transactions.user_id = users.id
        WHERE users.id = $1
        GROUP BY users.id
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(AppError::not_found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_requires_full_cost() {
        assert!(ensure_affordable(10, 10).is_ok());
        assert!(ensure_affordable(10, 0).is_ok());
        assert!(matches!(
            ensure_affordable(3, 4),
            Err(AppError::InsufficientCredits {
                required: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn audit_compares_balance_with_journal() {
        let audit = LedgerAudit {
            user_id: 1,
            balance: 15,
            ledger_sum: 15,
            transaction_count: 3,
        };
        assert!(audit.is_consistent());

        let drifted = LedgerAudit {
            ledger_sum: 12,
            ..audit
        };
        assert!(!drifted.is_consistent());
    }
}
