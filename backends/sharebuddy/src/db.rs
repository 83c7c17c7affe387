mod user;
pub use user::*;
mod document;
pub use document::*;
mod comment;
pub use comment::*;
mod rating;
pub use rating::*;
mod question;
pub use question::*;
mod notification;
pub use notification::*;
mod report;
pub use report::*;
mod interaction;
pub use interaction::*;
pub mod credit;
pub mod moderation;
pub mod payment;
pub mod recommendation;
pub mod search;
pub mod verified_author;

use sqlx::{Executor, PgPool};

pub async fn prepare_db(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(include_str!("sql/schema.sql")).await?;
    Ok(())
}

pub async fn initialize_db(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(include_str!("sql/down.sql")).await?;
    pool.execute(include_str!("sql/schema.sql")).await?;
    Ok(())
}

/// Clamps client-supplied paging to `(limit, offset)`.
pub fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (
        limit.unwrap_or(20).clamp(1, 100),
        offset.unwrap_or(0).max(0),
    )
}

#[cfg(test)]
mod tests {
    use super::page;

    #[test]
    fn paging_is_clamped() {
        assert_eq!(page(None, None), (20, 0));
        assert_eq!(page(Some(0), Some(-5)), (1, 0));
        assert_eq!(page(Some(1000), Some(40)), (100, 40));
    }
}
