use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::{error::AppResult, utils::auth::UserId};

use super::{Document, DOCUMENT_COLUMNS, DOCUMENT_FROM, DOCUMENT_SELECT};

pub const DOWNLOAD_WEIGHT: i64 = 3;
pub const RATING_WEIGHT: i64 = 2;
pub const COMMENT_WEIGHT: i64 = 1;

/// Activity score used to rank trending documents.
pub fn trending_score(downloads: i64, ratings: i64, comments: i64) -> i64 {
    downloads * DOWNLOAD_WEIGHT + ratings * RATING_WEIGHT + comments * COMMENT_WEIGHT
}

#[derive(Debug, FromRow)]
struct TrendingRow {
    #[sqlx(flatten)]
    document: Document,
    recent_downloads: i64,
    recent_ratings: i64,
    recent_comments: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingDocument {
    #[serde(flatten)]
    pub document: Document,
    pub trending_score: i64,
}

impl From<TrendingRow> for TrendingDocument {
    fn from(row: TrendingRow) -> Self {
        Self {
            trending_score: trending_score(
                row.recent_downloads,
                row.recent_ratings,
                row.recent_comments,
            ),
            document: row.document,
        }
    }
}

fn trending_sql() -> String {
    format!(
        r#"SELECT {DOCUMENT_COLUMNS},
            COALESCE(dl.n, 0) AS recent_downloads,
            COALESCE(rt.n, 0) AS recent_ratings,
            COALESCE(cm.n, 0) AS recent_comments
        {DOCUMENT_FROM}
        LEFT JOIN (
            SELECT document_id, COUNT(*) AS n FROM downloads
            WHERE created_at >= NOW() - make_interval(days => $1)
            GROUP BY document_id
        ) dl ON dl.document_id = d.id
        LEFT JOIN (
            SELECT document_id, COUNT(*) AS n FROM ratings
            WHERE created_at >= NOW() - make_interval(days => $1)
            GROUP BY document_id
        ) rt ON rt.document_id = d.id
        LEFT JOIN (
            SELECT document_id, COUNT(*) AS n FROM comments
            WHERE created_at >= NOW() - make_interval(days => $1)
            GROUP BY document_id
        ) cm ON cm.document_id = d.id
        WHERE d.status = 'approved'
        ORDER BY
            COALESCE(dl.n, 0) * {DOWNLOAD_WEIGHT}
                + COALESCE(rt.n, 0) * {RATING_WEIGHT}
                + COALESCE(cm.n, 0) * {COMMENT_WEIGHT} DESC,
            d.download_count DESC,
            d.created_at DESC
        LIMIT $2"#
    )
}

pub async fn trending(pool: &PgPool, days: i32, limit: i64) -> AppResult<Vec<TrendingDocument>> {
    let rows = sqlx::query_as::<_, TrendingRow>(&trending_sql())
        .bind(days)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(TrendingDocument::from).collect())
}

fn for_user_sql() -> String {
    format!(
        r#"{DOCUMENT_SELECT}
        INNER JOIN (
            SELECT i.document_id, SUM(s.shared_documents) AS weight
            FROM user_similarity s
            INNER JOIN (
                SELECT DISTINCT user_id, document_id, kind FROM user_document_interactions
            ) i ON i.user_id = s.similar_user_id
            WHERE s.user_id = $1
            GROUP BY i.document_id
        ) scored ON scored.document_id = d.id
        WHERE d.status = 'approved'
            AND d.author_id <> $1
            AND NOT EXISTS (
                SELECT 1 FROM user_document_interactions own
                WHERE own.user_id = $1 AND own.document_id = d.id
            )
        ORDER BY scored.weight DESC, d.average_rating DESC, d.download_count DESC
        LIMIT $2"#
    )
}

/// Documents touched by similar users that the caller has neither written nor
/// touched, weighted by how many documents the two users share. Repeated
/// interactions of one kind count once.
pub async fn for_user(pool: &PgPool, user_id: UserId, limit: i64) -> AppResult<Vec<Document>> {
    Ok(sqlx::query_as::<_, Document>(&for_user_sql())
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?)
}

pub async fn similar_to(pool: &PgPool, document: &Document, limit: i64) -> AppResult<Vec<Document>> {
    Ok(sqlx::query_as::<_, Document>(&format!(
        r#"{DOCUMENT_SELECT}
        WHERE d.status = 'approved'
            AND d.id <> $1
            AND (d.subject = $2 OR (d.course_code IS NOT NULL AND d.course_code = $3))
        ORDER BY
            (d.course_code IS NOT DISTINCT FROM $3) DESC,
            d.average_rating DESC,
            d.download_count DESC
        LIMIT $4"#
    ))
    .bind(document.id)
    .bind(&document.subject)
    .bind(&document.course_code)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

pub async fn refresh_similarity(pool: &PgPool) -> AppResult<()> {
    sqlx::query("REFRESH MATERIALIZED VIEW CONCURRENTLY user_similarity")
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downloads_outweigh_ratings_and_comments() {
        assert_eq!(trending_score(0, 0, 0), 0);
        assert_eq!(trending_score(1, 1, 1), 6);
        assert_eq!(trending_score(10, 4, 7), 45);
        assert!(trending_score(1, 0, 0) > trending_score(0, 1, 0));
        assert!(trending_score(0, 1, 0) > trending_score(0, 0, 1));
    }

    #[test]
    fn repeated_interactions_count_once() {
        let sql = for_user_sql();
        assert!(sql.contains(
            "SELECT DISTINCT user_id, document_id, kind FROM user_document_interactions"
        ));
        assert!(!sql.contains("INNER JOIN user_document_interactions i"));
    }

    #[test]
    fn trending_query_uses_the_same_weights() {
        let sql = trending_sql();
        assert!(sql.contains("COALESCE(dl.n, 0) * 3"));
        assert!(sql.contains("COALESCE(rt.n, 0) * 2"));
        assert!(sql.contains("COALESCE(cm.n, 0) * 1"));
    }
}
