use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    BoxError, Json, Router,
};
use serde_json::json;
use std::time::Duration;
use tower::{buffer::BufferLayer, limit::RateLimitLayer, ServiceBuilder};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{api, AppState};

pub fn generate_routes(state: AppState) -> Router {
    let rate_limit = state.config.server.rate_limit_per_second.max(1);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ==== USERS ==== //
        .route("/api/users/login", post(api::auth::login)) // login
        .route("/api/users", post(api::auth::registration)) // register
        .route(
            "/api/user",
            get(api::user::get_current_user).put(api::user::update_user),
        )
        .route("/api/user/documents", get(api::user::get_own_documents))
        .route("/api/user/bookmarks", get(api::documents::get_bookmarks))
        // ==== PROFILES ==== //
        .route("/api/profiles/:username", get(api::user::get_profile))
        .route(
            "/api/profiles/:username/follow",
            post(api::user::follow_profile).delete(api::user::unfollow_profile),
        )
        .route(
            "/api/profiles/:username/followers",
            get(api::user::get_followers),
        )
        .route(
            "/api/profiles/:username/following",
            get(api::user::get_following),
        )
        .route(
            "/api/profiles/:username/documents",
            get(api::user::get_profile_documents),
        )
        // ==== DOCUMENTS ==== //
        .route("/api/documents", post(api::documents::create_document))
        .route("/api/documents/feed", get(api::documents::get_feed))
        .route(
            "/api/documents/:id",
            get(api::documents::get_document_detail)
                .put(api::documents::update_document)
                .delete(api::documents::delete_document),
        )
        .route(
            "/api/documents/:id/download",
            post(api::documents::download_document),
        )
        .route("/api/documents/:id/similar", get(api::documents::get_similar))
        .route(
            "/api/documents/:id/bookmark",
            post(api::documents::bookmark_document).delete(api::documents::remove_bookmark),
        )
        // ==== RATINGS ==== //
        .route(
            "/api/documents/:id/rating",
            put(api::ratings::rate_document).delete(api::ratings::delete_rating),
        )
        .route("/api/documents/:id/ratings", get(api::ratings::get_ratings))
        // ==== COMMENTS ==== //
        .route(
            "/api/documents/:id/comments",
            get(api::comments::get_comments).post(api::comments::create_comment),
        )
        .route(
            "/api/documents/:id/comments/:comment_id",
            delete(api::comments::delete_comment),
        )
        .route(
            "/api/comments/:id/like",
            post(api::comments::like_comment).delete(api::comments::unlike_comment),
        )
        // ==== QUESTIONS ==== //
        .route(
            "/api/documents/:id/questions",
            get(api::questions::get_questions).post(api::questions::ask_question),
        )
        .route("/api/questions/:id", get(api::questions::get_question_detail))
        .route("/api/questions/:id/answers", post(api::questions::post_answer))
        .route(
            "/api/questions/:id/answers/:answer_id/accept",
            post(api::questions::accept_answer),
        )
        // ==== REPORTS ==== //
        .route("/api/documents/:id/report", post(api::reports::report_document))
        // ==== NOTIFICATIONS ==== //
        .route(
            "/api/notifications",
            get(api::notifications::get_notifications),
        )
        .route(
            "/api/notifications/unread-count",
            get(api::notifications::get_unread_count),
        )
        .route(
            "/api/notifications/read-all",
            post(api::notifications::mark_all_read),
        )
        .route(
            "/api/notifications/:id",
            delete(api::notifications::delete_notification),
        )
        .route(
            "/api/notifications/:id/read",
            post(api::notifications::mark_read),
        )
        // ==== CREDITS ==== //
        .route("/api/credits", get(api::credits::get_balance))
        .route(
            "/api/credits/transactions",
            get(api::credits::get_transactions),
        )
        // ==== SEARCH & RECOMMENDATIONS ==== //
        .route("/api/search", get(api::search::search_documents))
        .route("/api/search/subjects", get(api::search::get_subjects))
        .route("/api/recommendations", get(api::search::get_recommendations))
        .route(
            "/api/recommendations/trending",
            get(api::search::get_trending),
        )
        // ==== VERIFIED AUTHORS ==== //
        .route(
            "/api/verified-author/eligibility",
            get(api::verified_author::get_eligibility),
        )
        .route(
            "/api/verified-author/request",
            post(api::verified_author::request_verification),
        )
        // ==== PAYMENTS ==== //
        .route("/api/payments/packages", get(api::payments::get_packages))
        .route("/api/payments/checkout", post(api::payments::create_checkout))
        .route("/api/payments/webhook", post(api::payments::stripe_webhook))
        .route("/api/payments/history", get(api::payments::get_history))
        // ==== ADMIN ==== //
        .route("/api/admin/stats", get(api::admin::get_stats))
        .route(
            "/api/admin/documents/pending",
            get(api::admin::get_pending_documents),
        )
        .route(
            "/api/admin/documents/:id/moderate",
            post(api::admin::moderate_document),
        )
        .route(
            "/api/admin/downloads/:id/refund",
            post(api::admin::refund_download),
        )
        .route(
            "/api/admin/users/:id/credits",
            post(api::admin::adjust_credits),
        )
        .route(
            "/api/admin/users/:id/credits/audit",
            get(api::admin::audit_credits),
        )
        .route("/api/admin/reports", get(api::admin::get_reports))
        .route(
            "/api/admin/reports/:id/resolve",
            post(api::admin::resolve_report),
        )
        .route(
            "/api/admin/verified-author/requests",
            get(api::admin::get_verification_requests),
        )
        .route(
            "/api/admin/verified-author/requests/:id/review",
            post(api::admin::review_verification_request),
        )
        .route(
            "/api/admin/recommendations/refresh",
            post(api::admin::refresh_recommendations),
        )
        // ==== DB ==== //
        .route("/api/admin/initialize", post(api::admin::initialize))
        .fallback(handler_404)
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|err: BoxError| async move {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "success": false, "error": format!("Unhandled error: {err}") })),
                    )
                }))
                .layer(BufferLayer::new(1024))
                .layer(RateLimitLayer::new(rate_limit, Duration::from_secs(1))),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "nothing to see here" })),
    )
}
