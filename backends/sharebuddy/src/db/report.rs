use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::{error::AppResult, utils::auth::UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "report_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Open,
    Dismissed,
    Actioned,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i32,
    pub document_id: i32,
    pub document_title: String,
    #[serde(skip)]
    pub reporter_id: UserId,
    pub reporter_username: String,
    pub reason: String,
    pub details: Option<String>,
    pub status: ReportStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub async fn list_reports(
    pool: &PgPool,
    status: Option<ReportStatus>,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Report>> {
    Ok(sqlx::query_as::<_, Report>(
        r#"
        SELECT
            r.id, r.document_id,
            d.title AS document_title,
            r.reporter_id,
            u.username AS reporter_username,
            r.reason, r.details, r.status, r.resolved_at, r.created_at
        FROM reports r
        INNER JOIN documents d ON d.id = r.document_id
        INNER JOIN users u ON u.id = r.reporter_id
        WHERE ($1::report_status IS NULL OR r.status = $1)
        ORDER BY r.created_at ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}
