use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};

use crate::{
    error::{AppError, AppResult},
    utils::auth::UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "document_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub university: Option<String>,
    pub course_code: Option<String>,
    #[serde(skip)]
    pub file_url: String,
    pub file_type: String,
    pub file_size: i64,
    pub credit_cost: i32,
    pub status: DocumentStatus,
    pub rejection_reason: Option<String>,
    pub author_id: UserId,
    pub author_username: String,
    pub author_verified: bool,
    pub download_count: i32,
    pub view_count: i32,
    pub average_rating: f64,
    pub rating_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Approved documents are public; anything else only reaches its author
    /// and admins.
    pub fn visible_to(&self, user_id: Option<UserId>, is_admin: bool) -> bool {
        self.status == DocumentStatus::Approved || is_admin || user_id == Some(self.author_id)
    }
}

macro_rules! document_columns {
    () => {
        "d.id, d.title, d.description, d.subject, d.university, d.course_code, \
         d.file_url, d.file_type, d.file_size, d.credit_cost, d.status, \
         d.rejection_reason, d.author_id, \
         u.username AS author_username, \
         u.is_verified_author AS author_verified, \
         d.download_count, d.view_count, d.average_rating, d.rating_count, \
         d.created_at, d.updated_at"
    };
}

/// Columns of [`Document`]; alias `d` is the document, `u` its author.
pub const DOCUMENT_COLUMNS: &str = document_columns!();

pub const DOCUMENT_FROM: &str = "FROM documents d INNER JOIN users u ON u.id = d.author_id";

pub const DOCUMENT_SELECT: &str = concat!(
    "SELECT ",
    document_columns!(),
    " FROM documents d INNER JOIN users u ON u.id = d.author_id"
);

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub author_id: UserId,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub university: Option<String>,
    pub course_code: Option<String>,
    pub file_url: String,
    pub file_type: String,
    pub file_size: i64,
    pub credit_cost: i32,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub university: Option<String>,
    pub course_code: Option<String>,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub credit_cost: Option<i32>,
}

impl DocumentChanges {
    /// Edits to what moderation screens send the document back to review.
    pub fn requires_moderation(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.file_url.is_some()
            || self.file_type.is_some()
            || self.file_size.is_some()
    }
}

pub async fn get_document(pool: &PgPool, document_id: i32) -> AppResult<Document> {
    sqlx::query_as::<_, Document>(&format!("{DOCUMENT_SELECT} WHERE d.id = $1"))
        .bind(document_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(AppError::not_found)
}

/// Fetches an approved document, the only kind users may interact with.
pub async fn get_approved_document(pool: &PgPool, document_id: i32) -> AppResult<Document> {
    let document = get_document(pool, document_id).await?;
    if document.status != DocumentStatus::Approved {
        return Err(AppError::not_found());
    }
    Ok(document)
}

pub async fn create_document(pool: &PgPool, new: NewDocument) -> AppResult<Document> {
    let id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO documents (
            author_id, title, description, subject, university, course_code,
            file_url, file_type, file_size, credit_cost
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(new.author_id)
    .bind(new.title)
    .bind(new.description)
    .bind(new.subject)
    .bind(new.university)
    .bind(new.course_code)
    .bind(new.file_url)
    .bind(new.file_type)
    .bind(new.file_size)
    .bind(new.credit_cost)
    .fetch_one(pool)
    .await?;

    get_document(pool, id).await
}

pub async fn update_document(
    pool: &PgPool,
    document_id: i32,
    author_id: UserId,
    changes: DocumentChanges,
) -> AppResult<Document> {
    let reset = changes.requires_moderation();

    let updated = sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE documents
        SET
            title = COALESCE($3, title),
            description = COALESCE($4, description),
            subject = COALESCE($5, subject),
            university = COALESCE($6, university),
            course_code = COALESCE($7, course_code),
            file_url = COALESCE($8, file_url),
            file_type = COALESCE($9, file_type),
            file_size = COALESCE($10, file_size),
            credit_cost = COALESCE($11, credit_cost),
            status = CASE WHEN $12 THEN 'pending'::document_status ELSE status END,
            rejection_reason = CASE WHEN $12 THEN NULL ELSE rejection_reason END,
            moderated_at = CASE WHEN $12 THEN NULL ELSE moderated_at END,
            updated_at = NOW()
        WHERE id = $1 AND author_id = $2
        RETURNING id
        "#,
    )
    .bind(document_id)
    .bind(author_id)
    .bind(changes.title)
    .bind(changes.description)
    .bind(changes.subject)
    .bind(changes.university)
    .bind(changes.course_code)
    .bind(changes.file_url)
    .bind(changes.file_type)
    .bind(changes.file_size)
    .bind(changes.credit_cost)
    .bind(reset)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(id) => get_document(pool, id).await,
        None => Err(AppError::not_found()),
    }
}

pub async fn list_author_documents(
    pool: &PgPool,
    author_id: UserId,
    approved_only: bool,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Document>> {
    Ok(sqlx::query_as::<_, Document>(&format!(
        "{DOCUMENT_SELECT}
        WHERE d.author_id = $1 AND (NOT $2 OR d.status = 'approved')
        ORDER BY d.created_at DESC
        LIMIT $3 OFFSET $4"
    ))
    .bind(author_id)
    .bind(approved_only)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}

pub async fn list_feed(
    pool: &PgPool,
    user_id: UserId,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Document>> {
    Ok(sqlx::query_as::<_, Document>(&format!(
        "{DOCUMENT_SELECT}
        INNER JOIN follows f ON f.followee_id = d.author_id
        WHERE f.follower_id = $1 AND d.status = 'approved'
        ORDER BY d.created_at DESC
        LIMIT $2 OFFSET $3"
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}

pub async fn list_bookmarked(
    pool: &PgPool,
    user_id: UserId,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Document>> {
    Ok(sqlx::query_as::<_, Document>(&format!(
        "{DOCUMENT_SELECT}
        INNER JOIN bookmarks b ON b.document_id = d.id
        WHERE b.user_id = $1 AND d.status = 'approved'
        ORDER BY b.created_at DESC
        LIMIT $2 OFFSET $3"
    ))
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}

pub async fn list_pending(pool: &PgPool, limit: i64, offset: i64) -> AppResult<Vec<Document>> {
    Ok(sqlx::query_as::<_, Document>(&format!(
        "{DOCUMENT_SELECT}
        WHERE d.status = 'pending'
        ORDER BY d.created_at ASC
        LIMIT $1 OFFSET $2"
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}

/// Returns whether a new bookmark row was written.
pub async fn add_bookmark(pool: &PgPool, user_id: UserId, document_id: i32) -> AppResult<bool> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO bookmarks (user_id, document_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(document_id)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(inserted > 0)
}

pub async fn remove_bookmark(pool: &PgPool, user_id: UserId, document_id: i32) -> AppResult<bool> {
    let deleted = sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND document_id = $2")
        .bind(user_id)
        .bind(document_id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(deleted > 0)
}

pub async fn increment_views(conn: &mut PgConnection, document_id: i32) -> AppResult<()> {
    sqlx::query("UPDATE documents SET view_count = view_count + 1 WHERE id = $1")
        .bind(document_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn delete_document(pool: &PgPool, document_id: i32) -> AppResult<()> {
    let deleted = sqlx::query("DELETE FROM documents WHERE id = $1")
        .bind(document_id)
        .execute(pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::not_found());
    }
    Ok(())
}

/// What the caller has already done with a document.
#[derive(Debug, Default, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ViewerState {
    pub bookmarked: bool,
    pub downloaded: bool,
    pub my_rating: Option<i16>,
}

pub async fn viewer_state(pool: &PgPool, user_id: UserId, document_id: i32) -> AppResult<ViewerState> {
    Ok(sqlx::query_as::<_, ViewerState>(
        r#"
        SELECT
            EXISTS (SELECT 1 FROM bookmarks WHERE user_id = $1 AND document_id = $2) AS bookmarked,
            EXISTS (SELECT 1 FROM downloads WHERE user_id = $1 AND document_id = $2) AS downloaded,
            (SELECT score FROM ratings WHERE user_id = $1 AND document_id = $2) AS my_rating
        "#,
    )
    .bind(user_id)
    .bind(document_id)
    .fetch_one(pool)
    .await?)
}

#[derive(Debug, FromRow)]
pub struct DownloadRecord {
    pub id: i32,
    pub user_id: UserId,
    pub document_id: i32,
    pub credits_spent: i32,
}

/// Inserts the download row, or returns `None` when this user already has one.
pub async fn insert_download(
    conn: &mut PgConnection,
    user_id: UserId,
    document_id: i32,
    credits_spent: i32,
) -> AppResult<Option<i32>> {
    Ok(sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO downloads (user_id, document_id, credits_spent)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, document_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(document_id)
    .bind(credits_spent)
    .fetch_optional(&mut *conn)
    .await?)
}

pub async fn increment_downloads(conn: &mut PgConnection, document_id: i32, delta: i32) -> AppResult<()> {
    sqlx::query(
        "UPDATE documents SET download_count = GREATEST(download_count + $2, 0) WHERE id = $1",
    )
    .bind(document_id)
    .bind(delta)
    .execute(conn)
    .await?;
    Ok(())
}

/// Removes a download row so the refund can't be claimed twice.
pub async fn take_download(conn: &mut PgConnection, download_id: i32) -> AppResult<DownloadRecord> {
    sqlx::query_as::<_, DownloadRecord>(
        r#"
        DELETE FROM downloads
        WHERE id = $1
        RETURNING id, user_id, document_id, credits_spent
        "#,
    )
    .bind(download_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(AppError::not_found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_only_edits_skip_moderation() {
        let changes = DocumentChanges {
            subject: Some("Physics".into()),
            credit_cost: Some(3),
            ..Default::default()
        };
        assert!(!changes.requires_moderation());

        let changes = DocumentChanges {
            title: Some("New title".into()),
            ..Default::default()
        };
        assert!(changes.requires_moderation());
    }

    fn pending_document(author_id: UserId) -> Document {
        Document {
            id: 1,
            title: "Linear algebra notes".into(),
            description: "Week one to twelve".into(),
            subject: "Mathematics".into(),
            university: None,
            course_code: Some("MATH221".into()),
            file_url: "https://files.example/la.pdf".into(),
            file_type: "pdf".into(),
            file_size: 1024,
            credit_cost: 2,
            status: DocumentStatus::Pending,
            rejection_reason: None,
            author_id,
            author_username: "ada".into(),
            author_verified: false,
            download_count: 0,
            view_count: 0,
            average_rating: 0.0,
            rating_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unapproved_documents_are_private() {
        let mut document = pending_document(7);
        assert!(document.visible_to(Some(7), false));
        assert!(document.visible_to(Some(8), true));
        assert!(!document.visible_to(Some(8), false));
        assert!(!document.visible_to(None, false));

        document.status = DocumentStatus::Approved;
        assert!(document.visible_to(None, false));
    }
}
