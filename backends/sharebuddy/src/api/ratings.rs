use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    db::{
        get_approved_document, get_document, get_user, list_ratings, notify, record_interaction,
        refresh_rating_summary, InteractionKind, Notice, NotificationKind,
    },
    error::{AppError, AppResult},
    utils::jwt::{self, BearerToken},
};

use super::Paging;

#[derive(Deserialize)]
pub struct RateDocument {
    rating: RatingData,
}

#[derive(Deserialize, Validate)]
struct RatingData {
    #[validate(range(min = 1, max = 5, message = "score must be between 1 and 5"))]
    score: i16,
    #[validate(length(max = 2000, message = "review is too long"))]
    review: Option<String>,
}

// PUT /api/documents/:id/rating
pub async fn rate_document(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(document_id): Path<i32>,
    token: BearerToken,
    Json(RateDocument { rating }): Json<RateDocument>,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    rating.validate()?;

    let document = get_approved_document(&pool, document_id).await?;
    if document.author_id == user_id {
        return Err(AppError::Forbidden("you can't rate your own document"));
    }

    let mut tx = pool.begin().await?;

    // xmax is zero only for a freshly inserted row.
    let first_rating = sqlx::query_scalar::<_, bool>(
        r#"
        INSERT INTO ratings (user_id, document_id, score, review)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, document_id)
        DO UPDATE SET score = EXCLUDED.score, review = EXCLUDED.review, updated_at = NOW()
        RETURNING (xmax = 0)
        "#,
    )
    .bind(user_id)
    .bind(document.id)
    .bind(rating.score)
    .bind(&rating.review)
    .fetch_one(&mut *tx)
    .await?;

    refresh_rating_summary(&mut tx, document.id).await?;

    if first_rating {
        record_interaction(&mut tx, user_id, document.id, InteractionKind::Rate).await?;

        let rater = get_user(user_id, &pool).await?;
        notify(
            &mut tx,
            Notice::new(
                document.author_id,
                NotificationKind::NewRating,
                format!(
                    "{} rated \"{}\" {}/5",
                    rater.username, document.title, rating.score
                ),
            )
            .by(user_id)
            .about(document.id),
        )
        .await?;
    }

    tx.commit().await?;

    let document = get_document(&pool, document.id).await?;
    Ok(Json(json!({
        "success": true,
        "rating": { "score": rating.score, "review": rating.review },
        "averageRating": document.average_rating,
        "ratingCount": document.rating_count,
    })))
}

// DELETE /api/documents/:id/rating
pub async fn delete_rating(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(document_id): Path<i32>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;

    let mut tx = pool.begin().await?;
    let deleted = sqlx::query("DELETE FROM ratings WHERE user_id = $1 AND document_id = $2")
        .bind(user_id)
        .bind(document_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::not_found());
    }

    refresh_rating_summary(&mut tx, document_id).await?;
    tx.commit().await?;

    Ok(Json(json!({ "success": true, "message": "Rating removed" })))
}

// GET /api/documents/:id/ratings
pub async fn get_ratings(
    State(pool): State<PgPool>,
    Path(document_id): Path<i32>,
    Query(paging): Query<Paging>,
) -> AppResult<impl IntoResponse> {
    let document = get_approved_document(&pool, document_id).await?;
    let (limit, offset) = paging.resolve();

    let ratings = list_ratings(&pool, document.id, limit, offset).await?;
    Ok(Json(json!({
        "success": true,
        "ratings": ratings,
        "averageRating": document.average_rating,
        "ratingCount": document.rating_count,
    })))
}
