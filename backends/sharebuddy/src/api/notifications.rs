use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    db,
    error::{AppError, AppResult},
    utils::jwt::{self, BearerToken},
};

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    unread_only: bool,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

// GET /api/notifications
pub async fn get_notifications(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Query(params): Query<NotificationQuery>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let (limit, offset) = db::page(params.limit, params.offset);

    let notifications =
        db::list_notifications(&pool, user_id, params.unread_only, limit, offset).await?;
    let unread = db::unread_count(&pool, user_id).await?;
    Ok(Json(json!({
        "success": true,
        "notifications": notifications,
        "unreadCount": unread,
    })))
}

// GET /api/notifications/unread-count
pub async fn get_unread_count(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let unread = db::unread_count(&pool, user_id).await?;
    Ok(Json(json!({ "success": true, "unreadCount": unread })))
}

// POST /api/notifications/:id/read
pub async fn mark_read(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(notification_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;

    if !db::mark_read(&pool, user_id, notification_id).await? {
        return Err(AppError::not_found());
    }
    Ok(Json(json!({ "success": true })))
}

// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let updated = db::mark_all_read(&pool, user_id).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

// DELETE /api/notifications/:id
pub async fn delete_notification(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(notification_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;

    if !db::delete_notification(&pool, user_id, notification_id).await? {
        return Err(AppError::not_found());
    }
    Ok(Json(json!({ "success": true })))
}
