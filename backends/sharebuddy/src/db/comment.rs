use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::{error::AppResult, utils::auth::UserId};

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i32,
    pub document_id: i32,
    pub parent_id: Option<i32>,
    pub body: String,
    pub author_username: String,
    pub author_image: Option<String>,
    pub like_count: i64,
    pub liked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const COMMENT_SELECT: &str = r#"
    SELECT
        c.id,
        c.document_id,
        c.parent_id,
        c.body,
        u.username AS author_username,
        u.image AS author_image,
        (SELECT COUNT(*) FROM comment_likes l WHERE l.comment_id = c.id) AS like_count,
        EXISTS (
            SELECT 1 FROM comment_likes l WHERE l.comment_id = c.id AND l.user_id = $2
        ) AS liked,
        c.created_at,
        c.updated_at
    FROM comments c
    INNER JOIN users u ON u.id = c.author_id
"#;

pub async fn get_comment(
    pool: &PgPool,
    comment_id: i32,
    viewer_id: Option<UserId>,
) -> AppResult<Option<Comment>> {
    Ok(
        sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
            .bind(comment_id)
            .bind(viewer_id)
            .fetch_optional(pool)
            .await?,
    )
}

/// Comments oldest first so replies follow their parents.
pub async fn list_comments(
    pool: &PgPool,
    document_id: i32,
    viewer_id: Option<UserId>,
) -> AppResult<Vec<Comment>> {
    Ok(sqlx::query_as::<_, Comment>(&format!(
        "{COMMENT_SELECT} WHERE c.document_id = $1 ORDER BY c.created_at ASC, c.id ASC"
    ))
    .bind(document_id)
    .bind(viewer_id)
    .fetch_all(pool)
    .await?)
}
