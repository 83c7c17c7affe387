pub mod admin;
pub mod auth;
pub mod comments;
pub mod credits;
pub mod documents;
pub mod notifications;
pub mod payments;
pub mod questions;
pub mod ratings;
pub mod reports;
pub mod search;
pub mod user;
pub mod verified_author;

use serde::Deserialize;

use crate::db;

/// `?limit=&offset=` on list endpoints.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct Paging {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

impl Paging {
    pub fn resolve(self) -> (i64, i64) {
        db::page(self.limit, self.offset)
    }
}
