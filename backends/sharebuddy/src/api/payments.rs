use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    config::Config,
    db::{
        credit::{self, CreditKind, Entry},
        notify,
        payment::{self, PaymentStatus},
        Notice, NotificationKind,
    },
    error::{AppError, AppResult},
    payments::{verify_signature, SessionEvent, StripeClient, WebhookEvent, SIGNATURE_HEADER},
    utils::jwt::{self, BearerToken},
};

use super::Paging;

// GET /api/payments/packages
pub async fn get_packages(State(pool): State<PgPool>) -> AppResult<impl IntoResponse> {
    let packages = payment::list_packages(&pool).await?;
    Ok(Json(json!({ "success": true, "packages": packages })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    package_id: i32,
}

// POST /api/payments/checkout
pub async fn create_checkout(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    State(stripe): State<StripeClient>,
    token: BearerToken,
    Json(Checkout { package_id }): Json<Checkout>,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let package = payment::get_package(&pool, package_id).await?;

    let session = stripe.create_checkout_session(user_id, &package).await?;
    let transaction = payment::create_pending(&pool, user_id, &package, &session.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "checkoutUrl": session.url,
            "sessionId": session.id,
            "payment": transaction,
        })),
    ))
}

// POST /api/payments/webhook
pub async fn stripe_webhook(
    State(pool): State<PgPool>,
    State(config): State<Arc<Config>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing webhook signature".to_string()))?;

    verify_signature(
        signature,
        &body,
        &config.stripe.webhook_secret,
        config.stripe.signature_tolerance_secs,
        chrono::Utc::now().timestamp(),
    )?;

    let event = WebhookEvent::parse(&body)?;
    match event.session_event() {
        SessionEvent::Paid(session_id) => complete_purchase(&pool, session_id).await?,
        SessionEvent::Expired(session_id) => {
            let mut conn = pool.acquire().await?;
            if payment::settle(&mut conn, session_id, PaymentStatus::Failed)
                .await?
                .is_some()
            {
                tracing::info!(session_id, "checkout session expired");
            }
        }
        SessionEvent::Ignored => {
            tracing::debug!(event_id = %event.id, kind = %event.kind, "webhook event ignored");
        }
    }

    Ok(Json(json!({ "received": true })))
}

/// Credits a paid session once; replays find nothing pending and stop.
async fn complete_purchase(pool: &PgPool, session_id: &str) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let Some(payment) = payment::settle(&mut tx, session_id, PaymentStatus::Completed).await? else {
        tracing::debug!(session_id, "payment already settled or unknown");
        return Ok(());
    };

    credit::record(
        &mut tx,
        Entry {
            user_id: payment.user_id,
            amount: payment.credits,
            kind: CreditKind::Purchase,
            reference_id: Some(payment.id),
            description: "Credit package purchase",
        },
    )
    .await?;

    notify(
        &mut tx,
        Notice::new(
            payment.user_id,
            NotificationKind::CreditsPurchased,
            format!("{} credits were added to your account", payment.credits),
        ),
    )
    .await?;

    tx.commit().await?;
    tracing::info!(
        payment_id = payment.id,
        user_id = payment.user_id,
        credits = payment.credits,
        "payment completed"
    );
    Ok(())
}

// GET /api/payments/history
pub async fn get_history(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Query(paging): Query<Paging>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let (limit, offset) = paging.resolve();

    let payments = payment::history(&pool, user_id, limit, offset).await?;
    Ok(Json(json!({ "success": true, "payments": payments })))
}
