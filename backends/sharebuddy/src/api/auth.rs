use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use jsonwebtoken::EncodingKey;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use validator::{Validate, ValidationError};

use crate::{
    config::Config,
    db::{
        credit::{self, CreditKind, Entry},
        get_user_by_email, USER_AUTH_COLUMNS,
    },
    error::{is_unique_violation, AppError, AppResult, DBError},
    utils::{auth::UserAuth, hasher},
};

// ================================================= LOGIN ================================================= //

#[derive(Debug, Deserialize)]
pub struct Login {
    user: LoginUser,
}

#[derive(Debug, Deserialize, Validate)]
struct LoginUser {
    #[validate(email(message = "invalid email address"))]
    email: String,
    #[validate(length(min = 1, message = "password can't be blank"))]
    password: String,
}

// POST /api/users/login
pub async fn login(
    State(pool): State<PgPool>,
    State(key): State<EncodingKey>,
    State(config): State<Arc<Config>>,
    Json(Login { user }): Json<Login>,
) -> AppResult<impl IntoResponse> {
    user.validate()?;

    let Some(mut user_auth) = get_user_by_email(&user.email, &pool).await? else {
        Err(AppError::Forbidden("email or password is invalid"))?
    };

    hasher::verify_password(&user.password, &user_auth.hash)?;

    user_auth.issue_token(config.jwt.expiry_days, &key)?;
    Ok(Json(json!({ "success": true, "user": user_auth })))
}

// ================================================= REGISTRATION ================================================= //

#[derive(Deserialize, Validate)]
struct RegistrationUser {
    #[validate(
        length(min = 1, max = 64, message = "user name must be 1 to 64 characters"),
        custom(function = "printable")
    )]
    username: String,

    #[validate(
        length(min = 1, max = 64, message = "email must be 1 to 64 characters"),
        email(message = "invalid email address")
    )]
    email: String,

    #[validate(
        length(min = 8, max = 64, message = "password must be 8 to 64 characters"),
        custom(function = "printable")
    )]
    password: String,

    #[validate(length(max = 128, message = "too long university name"))]
    university: Option<String>,
}

/// Rejects control characters in user-chosen strings.
pub(crate) fn printable(value: &str) -> Result<(), ValidationError> {
    if value.chars().any(char::is_control) {
        return Err(ValidationError::new("control_character")
            .with_message("can't contain control characters".into()));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct Registration {
    user: RegistrationUser,
}

// POST /api/users
pub async fn registration(
    State(pool): State<PgPool>,
    State(key): State<EncodingKey>,
    State(config): State<Arc<Config>>,
    Json(Registration { user }): Json<Registration>,
) -> AppResult<impl IntoResponse> {
    user.validate()?;

    let hash = hasher::hash_password(&user.password)?;
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query_as::<_, UserAuth>(&format!(
        r#"
        INSERT INTO users (username, email, hash, university)
        VALUES ($1, $2, $3, $4)
        RETURNING {USER_AUTH_COLUMNS}
        "#
    ))
    .bind(&user.username)
    .bind(&user.email)
    .bind(&hash)
    .bind(&user.university)
    .fetch_one(&mut *tx)
    .await;

    let mut user_auth = match inserted {
        Ok(user_auth) => user_auth,
        Err(err) if is_unique_violation(&err) => return Err(DBError::AlreadyRegistered.into()),
        Err(err) => return Err(err.into()),
    };

    user_auth.credits = credit::record(
        &mut tx,
        Entry {
            user_id: user_auth.id,
            amount: config.credits.signup_bonus,
            kind: CreditKind::SignupBonus,
            reference_id: None,
            description: "Welcome bonus",
        },
    )
    .await?;

    tx.commit().await?;
    tracing::info!(user_id = user_auth.id, "user registered");

    user_auth.issue_token(config.jwt.expiry_days, &key)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "user": user_auth })),
    ))
}
