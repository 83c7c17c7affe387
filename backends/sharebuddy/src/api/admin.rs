use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use validator::Validate;

use crate::{
    config::Config,
    db::{
        self,
        credit::{self, CreditKind, Entry},
        get_document, increment_downloads, list_pending, list_reports,
        moderation::{apply_decision, transition, Applied, Decision},
        notify, recommendation, require_admin, take_download,
        verified_author::{self, RequestStatus},
        Notice, NotificationKind, ReportStatus,
    },
    error::{AppError, AppResult},
    moderation::ModerationQueue,
    utils::{
        auth::{UserAuth, UserId},
        jwt::{self, BearerToken},
    },
};

use super::Paging;

async fn admin(pool: &PgPool, token: BearerToken, key: &DecodingKey) -> AppResult<UserAuth> {
    let user_id = jwt::require_user(token, key)?;
    require_admin(pool, user_id).await
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub users: i64,
    pub verified_authors: i64,
    pub pending_documents: i64,
    pub approved_documents: i64,
    pub rejected_documents: i64,
    pub downloads: i64,
    pub open_reports: i64,
    pub pending_verifications: i64,
    pub credits_in_circulation: i64,
}

// GET /api/admin/stats
pub async fn get_stats(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    State(queue): State<ModerationQueue>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    admin(&pool, token, &key).await?;

    let stats = sqlx::query_as::<_, PlatformStats>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS users,
            (SELECT COUNT(*) FROM users WHERE is_verified_author) AS verified_authors,
            (SELECT COUNT(*) FROM documents WHERE status = 'pending') AS pending_documents,
            (SELECT COUNT(*) FROM documents WHERE status = 'approved') AS approved_documents,
            (SELECT COUNT(*) FROM documents WHERE status = 'rejected') AS rejected_documents,
            (SELECT COUNT(*) FROM downloads) AS downloads,
            (SELECT COUNT(*) FROM reports WHERE status = 'open') AS open_reports,
            (SELECT COUNT(*) FROM verified_author_requests WHERE status = 'pending')
                AS pending_verifications,
            (SELECT COALESCE(SUM(credits), 0)::BIGINT FROM users) AS credits_in_circulation
        "#,
    )
    .fetch_one(&pool)
    .await?;

    let queue_stats = match queue.stats().await {
        Ok(queue_stats) => Some(queue_stats),
        Err(err) => {
            tracing::warn!(error = ?err, "moderation queue stats unavailable");
            None
        }
    };

    Ok(Json(
        json!({ "success": true, "stats": stats, "moderationQueue": queue_stats }),
    ))
}

// ================================================= MODERATION ================================================= //

// GET /api/admin/documents/pending
pub async fn get_pending_documents(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Query(paging): Query<Paging>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    admin(&pool, token, &key).await?;
    let (limit, offset) = paging.resolve();

    let documents = list_pending(&pool, limit, offset).await?;
    Ok(Json(json!({ "success": true, "documents": documents })))
}

// POST /api/admin/documents/:id/moderate
pub async fn moderate_document(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    State(config): State<Arc<Config>>,
    Path(document_id): Path<i32>,
    token: BearerToken,
    Json(decision): Json<Decision>,
) -> AppResult<impl IntoResponse> {
    let moderator = admin(&pool, token, &key).await?;

    if let Decision::Reject { reason } = &decision {
        if reason.trim().is_empty() {
            return Err(AppError::Unprocessable("a rejection needs a reason".to_string()));
        }
    }

    let document = get_document(&pool, document_id).await?;
    transition(document.status, &decision)?;

    match apply_decision(&pool, document.id, &decision, &config.credits).await? {
        Applied::Changed(status) => {
            tracing::info!(document_id, moderator_id = moderator.id, ?status, "manual moderation");
        }
        Applied::AlreadyModerated => {
            return Err(AppError::conflict("Document has already been moderated"));
        }
    }

    let document = get_document(&pool, document_id).await?;
    Ok(Json(json!({ "success": true, "document": document })))
}

// ================================================= CREDITS ================================================= //

// POST /api/admin/downloads/:id/refund
pub async fn refund_download(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(download_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let moderator = admin(&pool, token, &key).await?;

    let mut tx = pool.begin().await?;
    let download = take_download(&mut tx, download_id).await?;

    let balance = credit::record(
        &mut tx,
        Entry {
            user_id: download.user_id,
            amount: download.credits_spent,
            kind: CreditKind::Refund,
            reference_id: Some(download.document_id),
            description: "Download refunded",
        },
    )
    .await?;

    increment_downloads(&mut tx, download.document_id, -1).await?;
    tx.commit().await?;

    tracing::info!(
        download_id,
        user_id = download.user_id,
        refunded = download.credits_spent,
        admin_id = moderator.id,
        "download refunded"
    );
    Ok(Json(json!({
        "success": true,
        "refund": {
            "userId": download.user_id,
            "documentId": download.document_id,
            "credits": download.credits_spent,
            "balance": balance,
        }
    })))
}

// GET /api/admin/users/:id/credits/audit
pub async fn audit_credits(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(user_id): Path<UserId>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    admin(&pool, token, &key).await?;

    let audit = credit::audit(&pool, user_id).await?;
    if !audit.is_consistent() {
        tracing::error!(
            user_id,
            balance = audit.balance,
            ledger_sum = audit.ledger_sum,
            "credit balance disagrees with ledger"
        );
    }

    Ok(Json(json!({
        "success": true,
        "audit": audit,
        "consistent": audit.is_consistent(),
    })))
}

const MAX_ADJUSTMENT: i32 = 100_000;

#[derive(Deserialize, Validate)]
pub struct CreditAdjustment {
    amount: i32,
    #[validate(length(min = 1, max = 200, message = "a reason is required"))]
    reason: String,
}

// POST /api/admin/users/:id/credits
pub async fn adjust_credits(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(user_id): Path<UserId>,
    token: BearerToken,
    Json(adjustment): Json<CreditAdjustment>,
) -> AppResult<impl IntoResponse> {
    let moderator = admin(&pool, token, &key).await?;
    adjustment.validate()?;
    if adjustment.amount == 0 || adjustment.amount.abs() > MAX_ADJUSTMENT {
        return Err(AppError::Unprocessable(format!(
            "amount must be non-zero and within {MAX_ADJUSTMENT} credits"
        )));
    }

    let mut tx = pool.begin().await?;
    let balance = credit::record(
        &mut tx,
        Entry {
            user_id,
            amount: adjustment.amount,
            kind: CreditKind::AdminAdjustment,
            reference_id: Some(moderator.id),
            description: &adjustment.reason,
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id, amount = adjustment.amount, admin_id = moderator.id, "credits adjusted");
    Ok(Json(json!({ "success": true, "balance": balance })))
}

// ================================================= REPORTS ================================================= //

#[derive(Debug, Deserialize)]
pub struct StatusQuery<S> {
    status: Option<S>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

// GET /api/admin/reports
pub async fn get_reports(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Query(params): Query<StatusQuery<ReportStatus>>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    admin(&pool, token, &key).await?;
    let (limit, offset) = db::page(params.limit, params.offset);

    let reports = list_reports(&pool, params.status, limit, offset).await?;
    Ok(Json(json!({ "success": true, "reports": reports })))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportAction {
    Dismiss,
    Remove,
}

#[derive(Debug, Deserialize)]
pub struct ResolveReport {
    action: ReportAction,
}

#[derive(FromRow)]
struct ResolvedReport {
    document_id: i32,
    reporter_id: UserId,
    reason: String,
}

// POST /api/admin/reports/:id/resolve
pub async fn resolve_report(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(report_id): Path<i32>,
    token: BearerToken,
    Json(ResolveReport { action }): Json<ResolveReport>,
) -> AppResult<impl IntoResponse> {
    let moderator = admin(&pool, token, &key).await?;
    let status = match action {
        ReportAction::Dismiss => ReportStatus::Dismissed,
        ReportAction::Remove => ReportStatus::Actioned,
    };

    let mut tx = pool.begin().await?;
    let resolved = sqlx::query_as::<_, ResolvedReport>(
        r#"
        UPDATE reports
        SET status = $2, resolved_by = $3, resolved_at = NOW()
        WHERE id = $1 AND status = 'open'
        RETURNING document_id, reporter_id, reason
        "#,
    )
    .bind(report_id)
    .bind(status)
    .bind(moderator.id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(report) = resolved else {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM reports WHERE id = $1)")
            .bind(report_id)
            .fetch_one(&mut *tx)
            .await?;
        return Err(if exists {
            AppError::conflict("Report has already been resolved")
        } else {
            AppError::not_found()
        });
    };

    let document = get_document(&pool, report.document_id).await?;

    if action == ReportAction::Remove {
        let reason = format!("Removed after report: {}", report.reason);
        sqlx::query(
            r#"
            UPDATE documents
            SET status = 'rejected', rejection_reason = $2, moderated_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(document.id)
        .bind(&reason)
        .execute(&mut *tx)
        .await?;

        // Other open reports on the same document are settled by the removal.
        sqlx::query(
            r#"
            UPDATE reports
            SET status = 'actioned', resolved_by = $2, resolved_at = NOW()
            WHERE document_id = $1 AND status = 'open'
            "#,
        )
        .bind(document.id)
        .bind(moderator.id)
        .execute(&mut *tx)
        .await?;

        notify(
            &mut tx,
            Notice::new(
                document.author_id,
                NotificationKind::DocumentRejected,
                format!("\"{}\" was removed: {}", document.title, report.reason),
            )
            .about(document.id),
        )
        .await?;
    }

    let outcome = match action {
        ReportAction::Dismiss => "was reviewed and no action was needed",
        ReportAction::Remove => "was upheld and the document removed",
    };
    notify(
        &mut tx,
        Notice::new(
            report.reporter_id,
            NotificationKind::ReportResolved,
            format!("Your report on \"{}\" {}", document.title, outcome),
        )
        .about(document.id),
    )
    .await?;

    tx.commit().await?;
    tracing::info!(report_id, ?action, admin_id = moderator.id, "report resolved");

    Ok(Json(json!({ "success": true, "status": status })))
}

// ================================================= VERIFIED AUTHORS ================================================= //

// GET /api/admin/verified-author/requests
pub async fn get_verification_requests(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Query(params): Query<StatusQuery<RequestStatus>>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    admin(&pool, token, &key).await?;
    let (limit, offset) = db::page(params.limit, params.offset);

    let requests = verified_author::list_requests(&pool, params.status, limit, offset).await?;
    Ok(Json(json!({ "success": true, "requests": requests })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    approve: bool,
    #[validate(length(max = 1000))]
    note: Option<String>,
}

// POST /api/admin/verified-author/requests/:id/review
pub async fn review_verification_request(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(request_id): Path<i32>,
    token: BearerToken,
    Json(review): Json<ReviewRequest>,
) -> AppResult<impl IntoResponse> {
    let moderator = admin(&pool, token, &key).await?;
    review.validate()?;

    let status = if review.approve {
        RequestStatus::Approved
    } else {
        RequestStatus::Rejected
    };

    let mut tx = pool.begin().await?;
    let applicant = sqlx::query_scalar::<_, UserId>(
        r#"
        UPDATE verified_author_requests
        SET status = $2, reviewer_note = $3, reviewed_by = $4, reviewed_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING user_id
        "#,
    )
    .bind(request_id)
    .bind(status)
    .bind(&review.note)
    .bind(moderator.id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(applicant) = applicant else {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM verified_author_requests WHERE id = $1)",
        )
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;
        return Err(if exists {
            AppError::conflict("Request has already been reviewed")
        } else {
            AppError::not_found()
        });
    };

    let notice = if review.approve {
        sqlx::query("UPDATE users SET is_verified_author = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(applicant)
            .execute(&mut *tx)
            .await?;
        Notice::new(
            applicant,
            NotificationKind::VerifiedAuthorApproved,
            "You are now a verified author",
        )
    } else {
        let note = review.note.as_deref().unwrap_or("no reason given");
        Notice::new(
            applicant,
            NotificationKind::VerifiedAuthorRejected,
            format!("Your verified author request was declined: {note}"),
        )
    };
    notify(&mut tx, notice).await?;
    tx.commit().await?;

    tracing::info!(request_id, approved = review.approve, admin_id = moderator.id, "verification reviewed");
    Ok(Json(json!({ "success": true, "status": status })))
}

// ================================================= MAINTENANCE ================================================= //

// POST /api/admin/recommendations/refresh
pub async fn refresh_recommendations(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    admin(&pool, token, &key).await?;
    recommendation::refresh_similarity(&pool).await?;
    Ok(Json(json!({ "success": true, "message": "Recommendations refreshed" })))
}

// POST /api/admin/initialize
pub async fn initialize(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let moderator = admin(&pool, token, &key).await?;
    tracing::warn!(admin_id = moderator.id, "resetting database");

    db::initialize_db(&pool).await?;
    Ok(Json(json!({ "success": true, "message": "Database reset" })))
}

#[cfg(test)]
mod tests {
    use axum::http::Uri;

    use super::*;

    fn status_query<S: serde::de::DeserializeOwned>(uri: &str) -> StatusQuery<S> {
        let uri: Uri = uri.parse().unwrap();
        Query::<StatusQuery<S>>::try_from_uri(&uri).unwrap().0
    }

    #[test]
    fn status_filter_is_optional() {
        let query = status_query::<ReportStatus>("/api/admin/reports");
        assert_eq!(query.status, None);
        assert_eq!(query.limit, None);

        let query = status_query::<ReportStatus>("/api/admin/reports?status=open&limit=5");
        assert_eq!(query.status, Some(ReportStatus::Open));
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn request_status_filter_parses() {
        let query = status_query::<RequestStatus>("/api/admin/verified-author/requests?status=pending");
        assert_eq!(query.status, Some(RequestStatus::Pending));
    }
}
