use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::{
    error::{AppError, AppResult},
    utils::auth::UserId,
};

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i32,
    pub document_id: i32,
    #[serde(skip)]
    pub asker_id: UserId,
    pub asker_username: String,
    pub title: String,
    pub body: String,
    pub accepted_answer_id: Option<i32>,
    pub answer_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: i32,
    pub question_id: i32,
    #[serde(skip)]
    pub author_id: UserId,
    pub author_username: String,
    pub body: String,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
}

const QUESTION_SELECT: &str = r#"
    SELECT
        q.id, q.document_id, q.asker_id,
        u.username AS asker_username,
        q.title, q.body, q.accepted_answer_id,
        (SELECT COUNT(*) FROM answers a WHERE a.question_id = q.id) AS answer_count,
        q.created_at
    FROM questions q
    INNER JOIN users u ON u.id = q.asker_id
"#;

pub async fn get_question(pool: &PgPool, question_id: i32) -> AppResult<Question> {
    sqlx::query_as::<_, Question>(&format!("{QUESTION_SELECT} WHERE q.id = $1"))
        .bind(question_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(AppError::not_found)
}

pub async fn list_questions(
    pool: &PgPool,
    document_id: i32,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Question>> {
    Ok(sqlx::query_as::<_, Question>(&format!(
        "{QUESTION_SELECT} WHERE q.document_id = $1 ORDER BY q.created_at DESC LIMIT $2 OFFSET $3"
    ))
    .bind(document_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}

/// Accepted answer first, then oldest first.
pub async fn list_answers(pool: &PgPool, question_id: i32) -> AppResult<Vec<Answer>> {
    Ok(sqlx::query_as::<_, Answer>(
        r#"
        SELECT
            a.id, a.question_id, a.author_id,
            u.username AS author_username,
            a.body,
            (q.accepted_answer_id IS NOT NULL AND q.accepted_answer_id = a.id) AS accepted,
            a.created_at
        FROM answers a
        INNER JOIN users u ON u.id = a.author_id
        INNER JOIN questions q ON q.id = a.question_id
        WHERE a.question_id = $1
        ORDER BY accepted DESC, a.created_at ASC
        "#,
    )
    .bind(question_id)
    .fetch_all(pool)
    .await?)
}
