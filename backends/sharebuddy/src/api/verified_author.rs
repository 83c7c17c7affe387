use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use jsonwebtoken::DecodingKey;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    config::Config,
    db::{get_user, verified_author},
    error::{is_unique_violation, AppError, AppResult},
    utils::jwt::{self, BearerToken},
};

// GET /api/verified-author/eligibility
pub async fn get_eligibility(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    State(config): State<Arc<Config>>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let user = get_user(user_id, &pool).await?;

    let stats = verified_author::author_stats(&pool, user_id).await?;
    let eligibility = config.verified_author.evaluate(stats);
    Ok(Json(json!({
        "success": true,
        "isVerifiedAuthor": user.is_verified_author,
        "eligibility": eligibility,
    })))
}

// POST /api/verified-author/request
pub async fn request_verification(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    State(config): State<Arc<Config>>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let user = get_user(user_id, &pool).await?;
    if user.is_verified_author {
        return Err(AppError::conflict("You are already a verified author"));
    }

    let stats = verified_author::author_stats(&pool, user_id).await?;
    let unmet = config.verified_author.unmet(&stats);
    if !unmet.is_empty() {
        return Err(AppError::Unprocessable(format!(
            "Not yet eligible: {}",
            unmet.join("; ")
        )));
    }

    let request_id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO verified_author_requests (user_id, document_count, average_rating, total_downloads)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(stats.document_count)
    .bind(stats.average_rating)
    .bind(stats.total_downloads)
    .fetch_one(&pool)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            AppError::conflict("A verification request is already pending")
        } else {
            err.into()
        }
    })?;

    tracing::info!(request_id, user_id, "verified author request submitted");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "requestId": request_id, "stats": stats })),
    ))
}
