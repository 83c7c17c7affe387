use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::json;
use sqlx::{FromRow, PgPool};
use validator::Validate;

use crate::{
    config::Config,
    db::{
        credit::{self, CreditKind, Entry},
        get_approved_document, get_question, get_user, list_answers, list_questions, notify,
        Notice, NotificationKind,
    },
    error::{AppError, AppResult},
    utils::{
        auth::UserId,
        jwt::{self, BearerToken},
    },
};

use super::Paging;

#[derive(Deserialize)]
pub struct AskQuestion {
    question: QuestionData,
}

#[derive(Deserialize, Validate)]
struct QuestionData {
    #[validate(length(min = 1, max = 200, message = "title can't be blank"))]
    title: String,
    #[validate(length(min = 1, max = 5000, message = "body can't be blank"))]
    body: String,
}

#[derive(Deserialize)]
pub struct PostAnswer {
    answer: AnswerData,
}

#[derive(Deserialize, Validate)]
struct AnswerData {
    #[validate(length(min = 1, max = 5000, message = "body can't be blank"))]
    body: String,
}

// POST /api/documents/:id/questions
pub async fn ask_question(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(document_id): Path<i32>,
    token: BearerToken,
    Json(AskQuestion { question }): Json<AskQuestion>,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    question.validate()?;

    let document = get_approved_document(&pool, document_id).await?;
    let asker = get_user(user_id, &pool).await?;

    let mut tx = pool.begin().await?;
    let question_id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO questions (document_id, asker_id, title, body)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(document.id)
    .bind(user_id)
    .bind(&question.title)
    .bind(&question.body)
    .fetch_one(&mut *tx)
    .await?;

    notify(
        &mut tx,
        Notice::new(
            document.author_id,
            NotificationKind::NewQuestion,
            format!("{} asked about \"{}\": {}", asker.username, document.title, question.title),
        )
        .by(user_id)
        .about(document.id),
    )
    .await?;
    tx.commit().await?;

    let question = get_question(&pool, question_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "question": question })),
    ))
}

// GET /api/documents/:id/questions
pub async fn get_questions(
    State(pool): State<PgPool>,
    Path(document_id): Path<i32>,
    Query(paging): Query<Paging>,
) -> AppResult<impl IntoResponse> {
    let document = get_approved_document(&pool, document_id).await?;
    let (limit, offset) = paging.resolve();

    let questions = list_questions(&pool, document.id, limit, offset).await?;
    Ok(Json(json!({ "success": true, "questions": questions })))
}

// GET /api/questions/:id
pub async fn get_question_detail(
    State(pool): State<PgPool>,
    Path(question_id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    let question = get_question(&pool, question_id).await?;
    get_approved_document(&pool, question.document_id).await?;
    let answers = list_answers(&pool, question.id).await?;
    Ok(Json(
        json!({ "success": true, "question": question, "answers": answers }),
    ))
}

// POST /api/questions/:id/answers
pub async fn post_answer(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    Path(question_id): Path<i32>,
    token: BearerToken,
    Json(PostAnswer { answer }): Json<PostAnswer>,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;
    answer.validate()?;

    let question = get_question(&pool, question_id).await?;
    get_approved_document(&pool, question.document_id).await?;
    let answerer = get_user(user_id, &pool).await?;

    let mut tx = pool.begin().await?;
    let answer_id = sqlx::query_scalar::<_, i32>(
        "INSERT INTO answers (question_id, author_id, body) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(question.id)
    .bind(user_id)
    .bind(&answer.body)
    .fetch_one(&mut *tx)
    .await?;

    notify(
        &mut tx,
        Notice::new(
            question.asker_id,
            NotificationKind::NewAnswer,
            format!("{} answered \"{}\"", answerer.username, question.title),
        )
        .by(user_id)
        .about(question.document_id),
    )
    .await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "answerId": answer_id })),
    ))
}

#[derive(FromRow)]
struct AnswerOwner {
    author_id: UserId,
}

// POST /api/questions/:id/answers/:answer_id/accept
pub async fn accept_answer(
    State(pool): State<PgPool>,
    State(key): State<DecodingKey>,
    State(config): State<Arc<Config>>,
    Path((question_id, answer_id)): Path<(i32, i32)>,
    token: BearerToken,
) -> AppResult<impl IntoResponse> {
    let user_id = jwt::require_user(token, &key)?;

    let question = get_question(&pool, question_id).await?;
    if question.asker_id != user_id {
        return Err(AppError::Forbidden("only the asker can accept an answer"));
    }

    let answer = sqlx::query_as::<_, AnswerOwner>(
        "SELECT author_id FROM answers WHERE id = $1 AND question_id = $2",
    )
    .bind(answer_id)
    .bind(question.id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(AppError::not_found)?;

    let mut tx = pool.begin().await?;
    let accepted = sqlx::query(
        "UPDATE questions SET accepted_answer_id = $2 WHERE id = $1 AND accepted_answer_id IS NULL",
    )
    .bind(question.id)
    .bind(answer_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if accepted == 0 {
        return Err(AppError::conflict("An answer has already been accepted"));
    }

    let reward = if answer.author_id != user_id {
        config.credits.answer_reward
    } else {
        0
    };

    if reward > 0 {
        credit::record(
            &mut tx,
            Entry {
                user_id: answer.author_id,
                amount: reward,
                kind: CreditKind::AnswerReward,
                reference_id: Some(answer_id),
                description: "Answer accepted",
            },
        )
        .await?;
    }

    notify(
        &mut tx,
        Notice::new(
            answer.author_id,
            NotificationKind::AnswerAccepted,
            format!(
                "Your answer to \"{}\" was accepted. You earned {} credits.",
                question.title, reward
            ),
        )
        .by(user_id)
        .about(question.document_id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(question_id, answer_id, reward, "answer accepted");

    let question = get_question(&pool, question.id).await?;
    let answers = list_answers(&pool, question.id).await?;
    Ok(Json(
        json!({ "success": true, "question": question, "answers": answers }),
    ))
}
