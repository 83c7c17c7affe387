use chrono::{DateTime, Utc};
use jsonwebtoken::EncodingKey;
use serde::Serialize;
use sqlx::FromRow;

use crate::{db::UserRole, error::AppResult};

use super::jwt;

pub type UserId = i32;

/// The caller's own account row, serialized back to them with a fresh token.
#[derive(Debug, Serialize, FromRow)]
pub struct UserAuth {
    pub id: UserId,
    #[serde(skip)]
    pub hash: String,
    pub email: String,
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub university: Option<String>,
    pub role: UserRole,
    pub credits: i32,
    pub is_verified_author: bool,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub token: Option<String>,
}

impl UserAuth {
    pub fn issue_token(&mut self, expiry_days: i64, key: &EncodingKey) -> AppResult<()> {
        self.token = Some(jwt::generate_jwt(self.id, expiry_days, key)?);
        Ok(())
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
