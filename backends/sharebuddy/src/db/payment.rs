use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};

use crate::{
    error::{AppError, AppResult},
    utils::auth::UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CreditPackage {
    pub id: i32,
    pub name: String,
    pub credits: i32,
    pub price_cents: i32,
    pub currency: String,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub id: i32,
    #[serde(skip)]
    pub user_id: UserId,
    pub package_id: i32,
    pub provider_session_id: String,
    pub credits: i32,
    pub amount_cents: i32,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

const PAYMENT_COLUMNS: &str = "id, user_id, package_id, provider_session_id, credits, \
     amount_cents, currency, status, created_at, completed_at";

pub async fn list_packages(pool: &PgPool) -> AppResult<Vec<CreditPackage>> {
    Ok(sqlx::query_as::<_, CreditPackage>(
        r#"
        SELECT id, name, credits, price_cents, currency
        FROM credit_packages
        WHERE active
        ORDER BY price_cents ASC
        "#,
    )
    .fetch_all(pool)
    .await?)
}

pub async fn get_package(pool: &PgPool, package_id: i32) -> AppResult<CreditPackage> {
    sqlx::query_as::<_, CreditPackage>(
        "SELECT id, name, credits, price_cents, currency FROM credit_packages WHERE id = $1 AND active",
    )
    .bind(package_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(AppError::not_found)
}

pub async fn create_pending(
    pool: &PgPool,
    user_id: UserId,
    package: &CreditPackage,
    session_id: &str,
) -> AppResult<PaymentTransaction> {
    Ok(sqlx::query_as::<_, PaymentTransaction>(&format!(
        "INSERT INTO payment_transactions
            (user_id, package_id, provider_session_id, credits, amount_cents, currency)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(user_id)
    .bind(package.id)
    .bind(session_id)
    .bind(package.credits)
    .bind(package.price_cents)
    .bind(&package.currency)
    .fetch_one(pool)
    .await?)
}

/// Flips a pending payment to `status`; `None` when it was already settled
/// or never existed, so a replayed webhook does nothing.
pub async fn settle(
    conn: &mut PgConnection,
    session_id: &str,
    status: PaymentStatus,
) -> AppResult<Option<PaymentTransaction>> {
    Ok(sqlx::query_as::<_, PaymentTransaction>(&format!(
        "UPDATE payment_transactions
        SET status = $2,
            completed_at = CASE WHEN $2 = 'completed'::payment_status THEN NOW() ELSE NULL END
        WHERE provider_session_id = $1 AND status = 'pending'
        RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(session_id)
    .bind(status)
    .fetch_optional(&mut *conn)
    .await?)
}

pub async fn history(
    pool: &PgPool,
    user_id: UserId,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<PaymentTransaction>> {
    Ok(sqlx::query_as::<_, PaymentTransaction>(&format!(
        "SELECT {PAYMENT_COLUMNS}
        FROM payment_transactions
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3"
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}
