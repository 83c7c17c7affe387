use axum::{
    extract::{Path, State},
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
    db::get_approved_document,
    error::{is_unique_violation, AppError, AppResult},
    utils::jwt::{self, BearerToken},
};

#[derive(Deserialize)]
pub struct CreateReport {
    report: ReportData,
}

#[derive(Deserialize, Validate)]
struct ReportData {
    #[validate(length(min = 1, max = 200, message = "reason can't be blank"))]
    reason: String,
    #[validate(length(max = 2000, message = "details are too long"))]
    details: Option<String>,
}

// POST /api/documents/:id/report
pub async fn report_document(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(document_id): Path<i32>,
    token: BearerToken,
    Json(CreateReport { report }): Json<CreateReport>,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    report.validate()?;

    let document = get_approved_document(&pool, document_id).await?;
    if document.author_id == user_id {
        return Err(AppError::Unprocessable(
            "you can't report your own document".to_string(),
        ));
    }

    let report_id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO reports (reporter_id, document_id, reason, details)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(document.id)
    .bind(report.reason.trim())
    .bind(&report.details)
    .fetch_one(&pool)
    .await
    .map_err(|err| {
        if is_unique_violation(&err) {
            AppError::conflict("You already have an open report on this document")
        } else {
            err.into()
        }
    })?;

    tracing::info!(report_id, document_id, reporter_id = user_id, "document reported");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "reportId": report_id })),
    ))
}
