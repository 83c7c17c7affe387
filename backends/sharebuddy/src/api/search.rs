use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    config::Config,
    db::{
        recommendation,
        search::{self, SearchParams},
    },
    error::AppResult,
    utils::jwt::{self, BearerToken},
};

// GET /api/search
pub async fn search_documents(
    State(pool): State<PgPool>,
    Query(params): Query<SearchParams>,
) -> AppResult<impl IntoResponse> {
    let results = search::search_documents(&pool, &params).await?;
    Ok(Json(json!({ "success": true, "results": results })))
}

// GET /api/search/subjects
pub async fn get_subjects(State(pool): State<PgPool>) -> AppResult<impl IntoResponse> {
    let subjects = search::list_subjects(&pool).await?;
    Ok(Json(json!({ "success": true, "subjects": subjects })))
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    #[serde(default)]
    days: Option<i32>,
    #[serde(default)]
    limit: Option<i64>,
}

// GET /api/recommendations/trending
pub async fn get_trending(
    State(pool): State<PgPool>,
    State(config): State<Arc<Config>>,
    Query(params): Query<TrendingQuery>,
) -> AppResult<impl IntoResponse> {
    let days = params
        .days
        .unwrap_or(config.recommendations.trending_days)
        .clamp(1, 90);
    let limit = params.limit.unwrap_or(10).clamp(1, 50);

    let documents = recommendation::trending(&pool, days, limit).await?;
    Ok(Json(
        json!({ "success": true, "documents": documents, "days": days }),
    ))
}

// GET /api/recommendations
pub async fn get_recommendations(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    State(config): State<Arc<Config>>,
    Query(params): Query<TrendingQuery>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    let limit = params.limit.unwrap_or(10).clamp(1, 50);

    let documents = recommendation::for_user(&pool, user_id, limit).await?;
    if !documents.is_empty() {
        return Ok(Json(
            json!({ "success": true, "documents": documents, "source": "similar_users" }),
        ));
    }

    // New users have no neighbours yet.
    let trending =
        recommendation::trending(&pool, config.recommendations.trending_days, limit).await?;
    Ok(Json(
        json!({ "success": true, "documents": trending, "source": "trending" }),
    ))
}
