use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use jsonwebtoken::DecodingKey;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    db::credit,
    error::AppResult,
    utils::jwt::{self, BearerToken},
};

use super::Paging;

// GET /api/credits
pub async fn get_balance(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let balance = credit::balance(&pool, user_id).await?;
    Ok(Json(json!({ "success": true, "credits": balance })))
}

// GET /api/credits/transactions
pub async fn get_transactions(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Query(paging): Query<Paging>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let (limit, offset) = paging.resolve();

    let transactions = credit::list_transactions(&pool, user_id, limit, offset).await?;
    Ok(Json(json!({ "success": true, "transactions": transactions })))
}
