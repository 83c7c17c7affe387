use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::{
    error::{AppError, AppResult},
    utils::{
        auth::{UserAuth, UserId},
        jwt,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(skip)]
    pub id: UserId,
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub university: Option<String>,
    pub is_verified_author: bool,
    pub document_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
    pub following: bool,
    pub created_at: DateTime<Utc>,
}

/// Compact user reference for follower lists.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub username: String,
    pub image: Option<String>,
    pub is_verified_author: bool,
}

pub const USER_AUTH_COLUMNS: &str = "id, hash, email, username, bio, image, university, role, \
     credits, is_verified_author, created_at";

pub async fn auth_user(pool: &PgPool, token: &str, key: &DecodingKey) -> AppResult<UserAuth> {
    let user_id = jwt::verify_token(token, key)?;
    let mut user = get_user(user_id, pool).await?;
    user.token = Some(token.to_string());
    Ok(user)
}

pub async fn get_user(user_id: UserId, pool: &PgPool) -> AppResult<UserAuth> {
    let user = sqlx::query_as::<_, UserAuth>(&format!(
        "SELECT {USER_AUTH_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    user.ok_or_else(AppError::not_found)
}

pub async fn get_user_by_email(email: &str, pool: &PgPool) -> AppResult<Option<UserAuth>> {
    Ok(sqlx::query_as::<_, UserAuth>(&format!(
        "SELECT {USER_AUTH_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?)
}

/// Loads the caller and fails with 403 unless they hold the admin role.
pub async fn require_admin(pool: &PgPool, user_id: UserId) -> AppResult<UserAuth> {
    let user = get_user(user_id, pool).await?;
    if !user.is_admin() {
        return Err(AppError::Forbidden("admin role required"));
    }
    Ok(user)
}

pub async fn get_user_profile(
    pool: &PgPool,
    username: &str,
    req_user_id: Option<UserId>,
) -> AppResult<UserProfile> {
    let profile = sqlx::query_as::<_, UserProfile>(
        r#"
        SELECT
            users.id,
            users.username,
            users.bio,
            users.image,
            users.university,
            users.is_verified_author,
            (SELECT COUNT(*) FROM documents
                WHERE documents.author_id = users.id AND documents.status = 'approved') AS document_count,
            (SELECT COUNT(*) FROM follows WHERE follows.followee_id = users.id) AS follower_count,
            (SELECT COUNT(*) FROM follows WHERE follows.follower_id = users.id) AS following_count,
            EXISTS (
                SELECT 1 FROM follows
                WHERE follows.follower_id = $2 AND follows.followee_id = users.id
            ) AS following,
            users.created_at
        FROM users
        WHERE users.username = $1
        "#,
    )
    .bind(username)
    .bind(req_user_id)
    .fetch_optional(pool)
    .await?;

    profile.ok_or_else(AppError::not_found)
}

pub async fn user_id_by_username(pool: &PgPool, username: &str) -> AppResult<UserId> {
    sqlx::query_scalar::<_, UserId>("SELECT id FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or_else(AppError::not_found)
}
