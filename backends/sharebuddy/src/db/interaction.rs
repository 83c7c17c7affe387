use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use crate::{error::AppResult, utils::auth::UserId};

/// Signals fed into `user_similarity` for recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "interaction_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Download,
    Rate,
    Bookmark,
    Comment,
}

pub async fn record_interaction(
    conn: &mut PgConnection,
    user_id: UserId,
    document_id: i32,
    kind: InteractionKind,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO user_document_interactions (user_id, document_id, kind)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(document_id)
    .bind(kind)
    .execute(conn)
    .await?;
    Ok(())
}
