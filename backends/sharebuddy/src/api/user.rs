use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use axum_extra::{headers::Authorization, TypedHeader};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    db::{
        auth_user, get_user, get_user_profile, list_author_documents, notify,
        user_id_by_username, Notice, NotificationKind, UserSummary, USER_AUTH_COLUMNS,
    },
    error::{is_unique_violation, AppError, AppResult},
    utils::{
        auth::UserAuth,
        hasher,
        jwt::{self, BearerToken},
    },
};

use super::{auth::printable, Paging};

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserData {
    #[validate(length(max = 1000))]
    pub bio: Option<String>,
    #[validate(url)]
    pub image: Option<String>,
    #[validate(length(max = 128))]
    pub university: Option<String>,

    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 64), custom(function = "printable"))]
    pub username: Option<String>,
    #[validate(length(min = 8, max = 64), custom(function = "printable"))]
    pub password: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct UpdateUser {
    user: UpdateUserData,
}

// GET /api/user
pub async fn get_current_user(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let user = get_user(user_id, &pool).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

// PUT /api/user
pub async fn update_user(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    token: BearerToken,
    Json(UpdateUser { user: updated_user }): Json<UpdateUser>,
) -> AppResult<impl IntoResponse> {
    let Some(TypedHeader(Authorization(token))) = token else {
        return Err(AppError::Unauthorized);
    };

    updated_user.validate()?;

    let user = auth_user(&pool, &token.0, &key).await?;
    let hash = updated_user
        .password
        .map(hasher::hash_password)
        .transpose()?;

    let updated = sqlx::query_as::<_, UserAuth>(&format!(
        "UPDATE users
            SET (email, username, bio, image, university, hash, updated_at) =
                (
                    COALESCE($1, email),
                    COALESCE($2, username),
                    COALESCE($3, bio),
                    COALESCE($4, image),
                    COALESCE($5, university),
                    COALESCE($6, hash),
                    NOW()
                )
            WHERE id = $7
        RETURNING {USER_AUTH_COLUMNS}"
    ))
    .bind(updated_user.email)
    .bind(updated_user.username)
    .bind(updated_user.bio)
    .bind(updated_user.image)
    .bind(updated_user.university)
    .bind(hash)
    .bind(user.id)
    .fetch_one(&pool)
    .await;

    let mut updated = match updated {
        Ok(updated) => updated,
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::conflict("username or email is already taken"))
        }
        Err(err) => return Err(err.into()),
    };

    updated.token = Some(token.0);
    Ok(Json(json!({ "success": true, "user": updated })))
}

// GET /api/profiles/:username
pub async fn get_profile(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(username): Path<String>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::optional_user(token, &key)?;

    let profile = get_user_profile(&pool, &username, user_id).await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

// POST /api/profiles/:username/follow
pub async fn follow_profile(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(username): Path<String>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let follower_id = jwt::require_user(token, &key)?;
    let followee = get_user_profile(&pool, &username, Some(follower_id)).await?;

    if followee.id == follower_id {
        return Err(AppError::Unprocessable("you can't follow yourself".to_string()));
    }

    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        "
        INSERT INTO follows (follower_id, followee_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(follower_id)
    .bind(followee.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted > 0 {
        let follower = get_user(follower_id, &pool).await?;
        notify(
            &mut tx,
            Notice::new(
                followee.id,
                NotificationKind::NewFollower,
                format!("{} started following you", follower.username),
            )
            .by(follower_id),
        )
        .await?;
    }
    tx.commit().await?;

    let profile = get_user_profile(&pool, &username, Some(follower_id)).await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

// DELETE /api/profiles/:username/follow
pub async fn unfollow_profile(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(username): Path<String>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let follower_id = jwt::require_user(token, &key)?;
    let followee_id = user_id_by_username(&pool, &username).await?;

    sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
        .bind(follower_id)
        .bind(followee_id)
        .execute(&pool)
        .await?;

    let profile = get_user_profile(&pool, &username, Some(follower_id)).await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

async fn follow_list(
    pool: &PgPool,
    username: &str,
    followers: bool,
    paging: Paging,
) -> AppResult<Vec<UserSummary>> {
    let user_id = user_id_by_username(pool, username).await?;
    let (limit, offset) = paging.resolve();

    // followers: rows where the user is followed; following: rows where they follow.
    let (match_column, other_column) = if followers {
        ("followee_id", "follower_id")
    } else {
        ("follower_id", "followee_id")
    };

    Ok(sqlx::query_as::<_, UserSummary>(&format!(
        "SELECT u.username, u.image, u.is_verified_author
        FROM follows f
        INNER JOIN users u ON u.id = f.{other_column}
        WHERE f.{match_column} = $1
        ORDER BY f.created_at DESC
        LIMIT $2 OFFSET $3"
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}

// GET /api/profiles/:username/followers
pub async fn get_followers(
    State(pool): State<PgPool>,
    Path(username): Path<String>,
    Query(paging): Query<Paging>,
) -> AppResult<impl IntoResponse> {
    let users = follow_list(&pool, &username, true, paging).await?;
    Ok(Json(json!({ "success": true, "users": users })))
}

// GET /api/profiles/:username/following
pub async fn get_following(
    State(pool): State<PgPool>,
    Path(username): Path<String>,
    Query(paging): Query<Paging>,
) -> AppResult<impl IntoResponse> {
    let users = follow_list(&pool, &username, false, paging).await?;
    Ok(Json(json!({ "success": true, "users": users })))
}

// GET /api/profiles/:username/documents
pub async fn get_profile_documents(
    State(pool): State<PgPool>,
    Path(username): Path<String>,
    Query(paging): Query<Paging>,
) -> AppResult<impl IntoResponse> {
    let author_id = user_id_by_username(&pool, &username).await?;
    let (limit, offset) = paging.resolve();

    let documents = list_author_documents(&pool, author_id, true, limit, offset).await?;
    let count = documents.len();
    Ok(Json(
        json!({ "success": true, "documents": documents, "documentsCount": count }),
    ))
}

// GET /api/user/documents
pub async fn get_own_documents(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Query(paging): Query<Paging>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let (limit, offset) = paging.resolve();

    let documents = list_author_documents(&pool, user_id, false, limit, offset).await?;
    let count = documents.len();
    Ok(Json(
        json!({ "success": true, "documents": documents, "documentsCount": count }),
    ))
}
