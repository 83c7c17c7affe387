use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};

use crate::error::AppResult;

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: i32,
    pub document_id: i32,
    pub score: i16,
    pub review: Option<String>,
    pub author_username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Recomputes the cached average and count on the document row.
pub async fn refresh_rating_summary(conn: &mut PgConnection, document_id: i32) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE documents
        SET
            average_rating = COALESCE(
                (SELECT AVG(score)::DOUBLE PRECISION FROM ratings WHERE document_id = $1), 0
            ),
            rating_count = (SELECT COUNT(*) FROM ratings WHERE document_id = $1)::INTEGER
        WHERE id = $1
        "#,
    )
    .bind(document_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_ratings(
    pool: &PgPool,
    document_id: i32,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Rating>> {
    Ok(sqlx::query_as::<_, Rating>(
        r#"
        SELECT
            r.id, r.document_id, r.score, r.review,
            u.username AS author_username,
            r.created_at, r.updated_at
        FROM ratings r
        INNER JOIN users u ON u.id = r.user_id
        WHERE r.document_id = $1
        ORDER BY r.updated_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(document_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}
