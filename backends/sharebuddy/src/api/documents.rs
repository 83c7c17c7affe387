use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    db::{
        self,
        credit::{self, CreditKind, Entry},
        get_approved_document, get_document, get_user, increment_downloads, increment_views,
        insert_download, record_interaction, recommendation, DocumentChanges, InteractionKind,
        NewDocument, ViewerState,
    },
    error::{AppError, AppResult},
    moderation::ModerationQueue,
    utils::{
        auth::UserId,
        jwt::{self, BearerToken},
    },
};

use super::Paging;

#[derive(Deserialize)]
pub struct CreateDocument {
    document: CreateDocumentData,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateDocumentData {
    #[validate(length(min = 1, max = 200, message = "title must be 1 to 200 characters"))]
    title: String,
    #[validate(length(min = 1, max = 5000, message = "description can't be blank"))]
    description: String,
    #[validate(length(min = 1, max = 100, message = "subject can't be blank"))]
    subject: String,
    #[validate(length(max = 128))]
    university: Option<String>,
    #[validate(length(max = 32))]
    course_code: Option<String>,
    #[validate(url(message = "file url must be a valid url"))]
    file_url: String,
    #[validate(length(min = 1, max = 16, message = "file type can't be blank"))]
    file_type: String,
    #[validate(range(min = 1, message = "file size must be positive"))]
    file_size: i64,
    #[serde(default)]
    #[validate(range(min = 0, message = "credit cost can't be negative"))]
    credit_cost: i32,
}

fn check_cost(cost: i32, config: &Config) -> AppResult<()> {
    if cost > config.credits.max_document_cost {
        return Err(AppError::Unprocessable(format!(
            "credit cost can't exceed {}",
            config.credits.max_document_cost
        )));
    }
    Ok(())
}

/// Queues screening for a pending document. The document stays pending and
/// reachable through the admin queue when Redis is down.
pub(crate) async fn enqueue_moderation(queue: &ModerationQueue, document_id: i32) {
    if let Err(err) = queue.enqueue(document_id).await {
        tracing::warn!(document_id, error = ?err, "could not enqueue moderation job");
    }
}

// POST /api/documents
pub async fn create_document(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    State(config): State<Arc<Config>>,
    State(queue): State<ModerationQueue>,
    token: BearerToken,
    Json(CreateDocument { document }): Json<CreateDocument>,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;

    document.validate()?;
    check_cost(document.credit_cost, &config)?;

    let document = db::create_document(
        &pool,
        NewDocument {
            author_id: user_id,
            title: document.title,
            description: document.description,
            subject: document.subject,
            university: document.university,
            course_code: document.course_code,
            file_url: document.file_url,
            file_type: document.file_type.trim_start_matches('.').to_ascii_lowercase(),
            file_size: document.file_size,
            credit_cost: document.credit_cost,
        },
    )
    .await?;

    enqueue_moderation(&queue, document.id).await;
    tracing::info!(document_id = document.id, author_id = user_id, "document submitted");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "document": document })),
    ))
}

// GET /api/documents/:id
pub async fn get_document_detail(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(document_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::optional_user(token, &key)?;
    let mut document = get_document(&pool, document_id).await?;

    let is_admin = match user_id {
        Some(id) if document.author_id != id => get_user(id, &pool).await?.is_admin(),
        _ => false,
    };
    if !document.visible_to(user_id, is_admin) {
        return Err(AppError::not_found());
    }

    let viewer = match user_id {
        Some(id) => {
            if id != document.author_id && document.status == db::DocumentStatus::Approved {
                let mut tx = pool.begin().await?;
                increment_views(&mut tx, document.id).await?;
                record_interaction(&mut tx, id, document.id, InteractionKind::View).await?;
                tx.commit().await?;
                document.view_count += 1;
            }
            db::viewer_state(&pool, id, document.id).await?
        }
        None => ViewerState::default(),
    };

    Ok(Json(
        json!({ "success": true, "document": document, "viewer": viewer }),
    ))
}

#[derive(Deserialize)]
pub struct UpdateDocument {
    document: UpdateDocumentData,
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UpdateDocumentData {
    #[validate(length(min = 1, max = 200))]
    title: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    subject: Option<String>,
    #[validate(length(max = 128))]
    university: Option<String>,
    #[validate(length(max = 32))]
    course_code: Option<String>,
    #[validate(url)]
    file_url: Option<String>,
    #[validate(length(min = 1, max = 16))]
    file_type: Option<String>,
    #[validate(range(min = 1))]
    file_size: Option<i64>,
    #[validate(range(min = 0))]
    credit_cost: Option<i32>,
}

// PUT /api/documents/:id
pub async fn update_document(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    State(config): State<Arc<Config>>,
    State(queue): State<ModerationQueue>,
    Path(document_id): Path<i32>,
    token: BearerToken,
    Json(UpdateDocument { document: changes }): Json<UpdateDocument>,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;

    changes.validate()?;
    if let Some(cost) = changes.credit_cost {
        check_cost(cost, &config)?;
    }

    let existing = get_document(&pool, document_id).await?;
    if existing.author_id != user_id {
        return Err(AppError::Forbidden("only the author can edit a document"));
    }

    let changes = DocumentChanges {
        title: changes.title,
        description: changes.description,
        subject: changes.subject,
        university: changes.university,
        course_code: changes.course_code,
        file_url: changes.file_url,
        file_type: changes
            .file_type
            .map(|t| t.trim_start_matches('.').to_ascii_lowercase()),
        file_size: changes.file_size,
        credit_cost: changes.credit_cost,
    };
    let resubmitted = changes.requires_moderation();

    let document = db::update_document(&pool, document_id, user_id, changes).await?;
    if resubmitted {
        enqueue_moderation(&queue, document.id).await;
        tracing::info!(document_id, "document edited, back in moderation");
    }

    Ok(Json(json!({ "success": true, "document": document })))
}

// DELETE /api/documents/:id
pub async fn delete_document(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(document_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let document = get_document(&pool, document_id).await?;

    if document.author_id != user_id && !get_user(user_id, &pool).await?.is_admin() {
        return Err(AppError::Forbidden("only the author or an admin can delete a document"));
    }

    db::delete_document(&pool, document_id).await?;
    tracing::info!(document_id, deleted_by = user_id, "document deleted");

    Ok(Json(json!({ "success": true, "message": "Document deleted" })))
}

// GET /api/documents/feed
pub async fn get_feed(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Query(paging): Query<Paging>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let (limit, offset) = paging.resolve();

    let documents = db::list_feed(&pool, user_id, limit, offset).await?;
    let count = documents.len();
    Ok(Json(
        json!({ "success": true, "documents": documents, "documentsCount": count }),
    ))
}

// POST /api/documents/:id/download
pub async fn download_document(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(document_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let document = get_approved_document(&pool, document_id).await?;

    let spent = if document.author_id == user_id {
        0
    } else {
        charge_download(&pool, user_id, &document).await?
    };

    let balance = credit::balance(&pool, user_id).await?;
    Ok(Json(json!({
        "success": true,
        "download": {
            "documentId": document.id,
            "fileUrl": document.file_url,
            "creditsSpent": spent,
            "balance": balance,
        }
    })))
}

/// Charges a first download and pays the author, all or nothing. A repeat
/// download costs nothing.
async fn charge_download(pool: &PgPool, user_id: UserId, document: &db::Document) -> AppResult<i32> {
    let cost = document.credit_cost;
    if cost > 0 && !db::viewer_state(pool, user_id, document.id).await?.downloaded {
        credit::ensure_affordable(credit::balance(pool, user_id).await?, cost)?;
    }

    let mut tx = pool.begin().await?;

    let Some(download_id) = insert_download(&mut tx, user_id, document.id, cost).await? else {
        tx.rollback().await?;
        tracing::debug!(user_id, document_id = document.id, "repeat download");
        return Ok(0);
    };

    if cost > 0 {
        let purchase = format!("Downloaded \"{}\"", document.title);
        credit::record(
            &mut tx,
            Entry {
                user_id,
                amount: -cost,
                kind: CreditKind::DownloadPurchase,
                reference_id: Some(document.id),
                description: &purchase,
            },
        )
        .await?;

        let earning = format!("\"{}\" was downloaded", document.title);
        credit::record(
            &mut tx,
            Entry {
                user_id: document.author_id,
                amount: cost,
                kind: CreditKind::DownloadEarning,
                reference_id: Some(document.id),
                description: &earning,
            },
        )
        .await?;
    }

    increment_downloads(&mut tx, document.id, 1).await?;
    record_interaction(&mut tx, user_id, document.id, InteractionKind::Download).await?;
    tx.commit().await?;

    tracing::info!(user_id, document_id = document.id, download_id, cost, "document purchased");
    Ok(cost)
}

// GET /api/documents/:id/similar
pub async fn get_similar(
    State(pool): State<PgPool>,
    Path(document_id): Path<i32>,
    Query(paging): Query<Paging>,
) -> AppResult<impl IntoResponse> {
    let document = get_approved_document(&pool, document_id).await?;
    let (limit, _) = paging.resolve();

    let documents = recommendation::similar_to(&pool, &document, limit.min(20)).await?;
    Ok(Json(json!({ "success": true, "documents": documents })))
}

// POST /api/documents/:id/bookmark
pub async fn bookmark_document(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(document_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let document = get_approved_document(&pool, document_id).await?;

    if db::add_bookmark(&pool, user_id, document.id).await? {
        let mut conn = pool.acquire().await?;
        record_interaction(&mut conn, user_id, document.id, InteractionKind::Bookmark).await?;
    }

    Ok(Json(json!({ "success": true, "bookmarked": true })))
}

// DELETE /api/documents/:id/bookmark
pub async fn remove_bookmark(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(document_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    db::remove_bookmark(&pool, user_id, document_id).await?;

    Ok(Json(json!({ "success": true, "bookmarked": false })))
}

// GET /api/user/bookmarks
pub async fn get_bookmarks(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Query(paging): Query<Paging>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let (limit, offset) = paging.resolve();

    let documents = db::list_bookmarked(&pool, user_id, limit, offset).await?;
    let count = documents.len();
    Ok(Json(
        json!({ "success": true, "documents": documents, "documentsCount": count }),
    ))
}
