use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum DBError {
    #[error("User is already registered")]
    AlreadyRegistered,

    #[error("Not Found")]
    NotFound,

    #[error("{0}")]
    Conflict(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Any error: {0:?}")]
    Anyhow(#[from] anyhow::Error),

    #[error("DB Error: {0:?}")]
    DBError(#[from] DBError),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i32, available: i32 },

    #[error("{0}")]
    Unprocessable(String),

    #[error("SQL failed: {0:?}")]
    Sqlx(#[from] sqlx::Error),

    #[error("JWT error: {0:?}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Queue error: {0:?}")]
    Redis(#[from] redis::RedisError),

    #[error("Payment provider error: {0:?}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl AppError {
    pub fn not_found() -> Self {
        AppError::DBError(DBError::NotFound)
    }

    pub fn conflict(message: &'static str) -> Self {
        AppError::DBError(DBError::Conflict(message))
    }
}

/// True when the statement failed on a unique constraint.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, Some(self.to_string())),
            AppError::JwtError(_) => (StatusCode::UNAUTHORIZED, None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, Some(self.to_string())),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, Some(self.to_string())),
            AppError::InsufficientCredits { .. } => {
                (StatusCode::PAYMENT_REQUIRED, Some(self.to_string()))
            }
            AppError::Unprocessable(_) | AppError::Validation(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Some(self.to_string()))
            }
            AppError::Sqlx(sqlx::Error::RowNotFound) => (StatusCode::NOT_FOUND, None),
            AppError::Sqlx(_)
            | AppError::Anyhow(_)
            | AppError::Redis(_)
            | AppError::Http(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
            AppError::DBError(db_error) => {
                let message = db_error.to_string();

                match db_error {
                    DBError::NotFound => (StatusCode::NOT_FOUND, Some(message)),
                    _ => (StatusCode::CONFLICT, Some(message)),
                }
            }
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }

        let body = Json(json!({
            "success": false,
            "error": error_message.unwrap_or_else(|| {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            }),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_status_codes() {
        let cases = [
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("nope"), StatusCode::FORBIDDEN),
            (AppError::not_found(), StatusCode::NOT_FOUND),
            (AppError::conflict("taken"), StatusCode::CONFLICT),
            (
                AppError::InsufficientCredits {
                    required: 5,
                    available: 2,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (AppError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (
                AppError::Sqlx(sqlx::Error::PoolTimedOut),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn insufficient_credit_message_names_both_amounts() {
        let err = AppError::InsufficientCredits {
            required: 8,
            available: 3,
        };
        assert_eq!(err.to_string(), "Insufficient credits: 8 required, 3 available");
    }
}
