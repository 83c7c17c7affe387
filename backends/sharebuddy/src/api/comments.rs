use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::json;
use sqlx::{FromRow, PgPool};
use validator::Validate;

use crate::{
    db::{
        get_approved_document, get_comment, get_user, list_comments, notify, record_interaction,
        InteractionKind, Notice, NotificationKind,
    },
    error::{AppError, AppResult},
    utils::{
        auth::UserId,
        jwt::{self, BearerToken},
    },
};

#[derive(Deserialize)]
pub struct CreateComment {
    comment: CreateCommentData,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateCommentData {
    #[validate(length(min = 1, max = 5000, message = "body can't be blank"))]
    body: String,
    parent_id: Option<i32>,
}

#[derive(FromRow)]
struct CommentOwner {
    author_id: UserId,
    document_id: i32,
}

async fn comment_owner(pool: &PgPool, comment_id: i32) -> AppResult<CommentOwner> {
    sqlx::query_as::<_, CommentOwner>("SELECT author_id, document_id FROM comments WHERE id = $1")
        .bind(comment_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(AppError::not_found)
}

// GET /api/documents/:id/comments
pub async fn get_comments(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(document_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::optional_user(token, &key)?;
    let document = get_approved_document(&pool, document_id).await?;

    let comments = list_comments(&pool, document.id, user_id).await?;
    Ok(Json(json!({ "success": true, "comments": comments })))
}

// POST /api/documents/:id/comments
pub async fn create_comment(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(document_id): Path<i32>,
    token: BearerToken,
    Json(CreateComment { comment }): Json<CreateComment>,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    comment.validate()?;

    let document = get_approved_document(&pool, document_id).await?;

    let parent = match comment.parent_id {
        Some(parent_id) => {
            let parent = comment_owner(&pool, parent_id).await?;
            if parent.document_id != document.id {
                return Err(AppError::Unprocessable(
                    "reply must belong to the same document".to_string(),
                ));
            }
            Some(parent)
        }
        None => None,
    };

    let commenter = get_user(user_id, &pool).await?;
    let mut tx = pool.begin().await?;

    let comment_id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO comments (document_id, author_id, parent_id, body)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(document.id)
    .bind(user_id)
    .bind(comment.parent_id)
    .bind(&comment.body)
    .fetch_one(&mut *tx)
    .await?;

    record_interaction(&mut tx, user_id, document.id, InteractionKind::Comment).await?;

    notify(
        &mut tx,
        Notice::new(
            document.author_id,
            NotificationKind::NewComment,
            format!("{} commented on \"{}\"", commenter.username, document.title),
        )
        .by(user_id)
        .about(document.id),
    )
    .await?;

    if let Some(parent) = parent.filter(|p| p.author_id != document.author_id) {
        notify(
            &mut tx,
            Notice::new(
                parent.author_id,
                NotificationKind::NewComment,
                format!("{} replied to your comment", commenter.username),
            )
            .by(user_id)
            .about(document.id),
        )
        .await?;
    }

    tx.commit().await?;

    let comment = get_comment(&pool, comment_id, Some(user_id))
        .await?
        .ok_or_else(AppError::not_found)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "comment": comment })),
    ))
}

// DELETE /api/documents/:id/comments/:comment_id
pub async fn delete_comment(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path((document_id, comment_id)): Path<(i32, i32)>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;

    let owner = comment_owner(&pool, comment_id).await?;
    if owner.document_id != document_id {
        return Err(AppError::not_found());
    }
    if owner.author_id != user_id && !get_user(user_id, &pool).await?.is_admin() {
        return Err(AppError::Forbidden("only the author or an admin can delete a comment"));
    }

    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(&pool)
        .await?;

    Ok(Json(json!({ "success": true, "message": "Comment deleted" })))
}

// POST /api/comments/:id/like
pub async fn like_comment(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(comment_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    comment_owner(&pool, comment_id).await?;

    sqlx::query(
        "
        INSERT INTO comment_likes (comment_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        ",
    )
    .bind(comment_id)
    .bind(user_id)
    .execute(&pool)
    .await?;

    let comment = get_comment(&pool, comment_id, Some(user_id))
        .await?
        .ok_or_else(AppError::not_found)?;
    Ok(Json(json!({ "success": true, "comment": comment })))
}

// DELETE /api/comments/:id/like
pub async fn unlike_comment(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(comment_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;

    sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2")
        .bind(comment_id)
        .bind(user_id)
        .execute(&pool)
        .await?;

    let comment = get_comment(&pool, comment_id, Some(user_id))
        .await?
        .ok_or_else(AppError::not_found)?;
    Ok(Json(json!({ "success": true, "comment": comment })))
}
