//! Runs against a throwaway database per test; needs `DATABASE_URL`.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use sharebuddy::{
    config::CreditConfig,
    db::{
        self,
        credit::{self, CreditKind},
        moderation::{apply_decision, Applied, Decision},
        recommendation, DocumentChanges, DocumentStatus, NewDocument,
    },
};
use sqlx::PgPool;

async fn setup(pool: &PgPool) {
    db::prepare_db(pool).await.unwrap();
}

async fn insert_user(pool: &PgPool, username: &str, role: &str) -> i32 {
    sqlx::query_scalar(
        "INSERT INTO users (username, email, hash, role) VALUES ($1, $2, 'x', $3::user_role) RETURNING id",
    )
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind(role)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn upload(pool: &PgPool, author_id: i32, title: &str, credit_cost: i32) -> i32 {
    db::create_document(
        pool,
        NewDocument {
            author_id,
            title: title.to_string(),
            description: "Worked solutions for every problem set this term.".to_string(),
            subject: "Physics".to_string(),
            university: None,
            course_code: Some("PHYS201".to_string()),
            file_url: format!("https://files.example.com/{title}.pdf"),
            file_type: "pdf".to_string(),
            file_size: 4096,
            credit_cost,
        },
    )
    .await
    .unwrap()
    .id
}

async fn approve(pool: &PgPool, document_id: i32) -> Applied {
    apply_decision(pool, document_id, &Decision::Approve, &CreditConfig::default())
        .await
        .unwrap()
}

async fn count(pool: &PgPool, sql: &str, id: i32) -> i64 {
    sqlx::query_scalar(sql).bind(id).fetch_one(pool).await.unwrap()
}

#[sqlx::test(migrations = false)]
async fn download_without_enough_credits_writes_nothing(pool: PgPool) {
    setup(&pool).await;
    let author = insert_user(&pool, "author", "user").await;
    let reader = insert_user(&pool, "reader", "user").await;
    let document = upload(&pool, author, "thermo", 3).await;
    approve(&pool, document).await;

    let app = common::app(pool.clone());
    let (status, body) = common::send(
        &app,
        common::post(&format!("/api/documents/{document}/download"), reader, json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["success"], json!(false));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM downloads WHERE user_id = $1", reader).await, 0);
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM credit_transactions WHERE user_id = $1", reader).await,
        0
    );
    assert_eq!(credit::balance(&pool, author).await.unwrap(), 5);
    assert_eq!(
        count(&pool, "SELECT download_count::BIGINT FROM documents WHERE id = $1", document).await,
        0
    );
}

#[sqlx::test(migrations = false)]
async fn ledger_matches_balance_through_signup_download_and_refund(pool: PgPool) {
    setup(&pool).await;
    let app = common::app(pool.clone());

    let registration = Request::post("/api/users")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "user": {
                    "username": "reader",
                    "email": "reader@example.com",
                    "password": "correct horse battery"
                }
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = common::send(&app, registration).await;
    assert_eq!(status, StatusCode::CREATED);
    let reader = body["user"]["id"].as_i64().unwrap() as i32;
    assert_eq!(credit::balance(&pool, reader).await.unwrap(), 10);

    let author = insert_user(&pool, "author", "user").await;
    let admin = insert_user(&pool, "admin", "admin").await;
    let document = upload(&pool, author, "optics", 4).await;
    approve(&pool, document).await;

    let (status, body) = common::send(
        &app,
        common::post(&format!("/api/documents/{document}/download"), reader, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["download"]["creditsSpent"], json!(4));
    assert_eq!(body["download"]["balance"], json!(6));
    assert_eq!(credit::balance(&pool, author).await.unwrap(), 9);

    let download_id: i32 =
        sqlx::query_scalar("SELECT id FROM downloads WHERE user_id = $1 AND document_id = $2")
            .bind(reader)
            .bind(document)
            .fetch_one(&pool)
            .await
            .unwrap();
    let (status, body) = common::send(
        &app,
        common::post(&format!("/api/admin/downloads/{download_id}/refund"), admin, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refund"]["balance"], json!(10));

    let (status, _) = common::send(
        &app,
        common::post(&format!("/api/admin/downloads/{download_id}/refund"), admin, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for user in [reader, author, admin] {
        let audit = credit::audit(&pool, user).await.unwrap();
        assert!(audit.is_consistent(), "ledger drifted for user {user}: {audit:?}");
    }
    assert_eq!(credit::audit(&pool, reader).await.unwrap().transaction_count, 3);
}

#[sqlx::test(migrations = false)]
async fn moderation_decision_applies_once(pool: PgPool) {
    setup(&pool).await;
    let author = insert_user(&pool, "author", "user").await;
    let admin = insert_user(&pool, "admin", "admin").await;
    let document = upload(&pool, author, "circuits", 0).await;

    assert_eq!(approve(&pool, document).await, Applied::Changed(DocumentStatus::Approved));

    let reject = Decision::Reject {
        reason: "duplicate".to_string(),
    };
    let second = apply_decision(&pool, document, &reject, &CreditConfig::default())
        .await
        .unwrap();
    assert_eq!(second, Applied::AlreadyModerated);

    let app = common::app(pool.clone());
    let (status, body) = common::send(
        &app,
        common::post(
            &format!("/api/admin/documents/{document}/moderate"),
            admin,
            json!({ "decision": "approve" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], json!(false));

    let current = db::get_document(&pool, document).await.unwrap();
    assert_eq!(current.status, DocumentStatus::Approved);
    assert_eq!(credit::balance(&pool, author).await.unwrap(), 5);
}

#[sqlx::test(migrations = false)]
async fn upload_reward_is_paid_once(pool: PgPool) {
    setup(&pool).await;
    let author = insert_user(&pool, "author", "user").await;
    let document = upload(&pool, author, "statics", 0).await;

    approve(&pool, document).await;

    let edited = db::update_document(
        &pool,
        document,
        author,
        DocumentChanges {
            title: Some("statics, second edition".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(edited.status, DocumentStatus::Pending);

    assert_eq!(approve(&pool, document).await, Applied::Changed(DocumentStatus::Approved));

    let rewards: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM credit_transactions WHERE user_id = $1 AND kind = $2",
    )
    .bind(author)
    .bind(CreditKind::UploadReward)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(rewards, 1);
    assert_eq!(credit::balance(&pool, author).await.unwrap(), 5);
    assert!(credit::audit(&pool, author).await.unwrap().is_consistent());
}

#[sqlx::test(migrations = false)]
async fn bookmarking_twice_is_idempotent(pool: PgPool) {
    setup(&pool).await;
    let author = insert_user(&pool, "author", "user").await;
    let reader = insert_user(&pool, "reader", "user").await;
    let document = upload(&pool, author, "waves", 0).await;
    approve(&pool, document).await;

    let app = common::app(pool.clone());
    for _ in 0..2 {
        let (status, body) = common::send(
            &app,
            common::post(&format!("/api/documents/{document}/bookmark"), reader, json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bookmarked"], json!(true));
    }

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM bookmarks WHERE user_id = $1", reader).await, 1);
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM user_document_interactions WHERE user_id = $1 AND kind = 'bookmark'",
            reader
        )
        .await,
        1
    );
}

#[sqlx::test(migrations = false)]
async fn questions_on_rejected_documents_are_hidden(pool: PgPool) {
    setup(&pool).await;
    let author = insert_user(&pool, "author", "user").await;
    let asker = insert_user(&pool, "asker", "user").await;
    let visible = upload(&pool, author, "kinematics", 0).await;
    let hidden = upload(&pool, author, "dynamics", 0).await;
    approve(&pool, visible).await;
    let reject = Decision::Reject {
        reason: "illegible scan".to_string(),
    };
    apply_decision(&pool, hidden, &reject, &CreditConfig::default())
        .await
        .unwrap();

    let app = common::app(pool.clone());
    for (document, expected) in [(visible, StatusCode::OK), (hidden, StatusCode::NOT_FOUND)] {
        let question: i32 = sqlx::query_scalar(
            "INSERT INTO questions (document_id, asker_id, title, body) VALUES ($1, $2, 'Q', 'Why?') RETURNING id",
        )
        .bind(document)
        .bind(asker)
        .fetch_one(&pool)
        .await
        .unwrap();

        let request = Request::get(format!("/api/questions/{question}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = common::send(&app, request).await;
        assert_eq!(status, expected);

        let (status, _) = common::send(
            &app,
            common::post(
                &format!("/api/questions/{question}/answers"),
                author,
                json!({ "answer": { "body": "Because." } }),
            ),
        )
        .await;
        let answer_expected = if expected == StatusCode::OK {
            StatusCode::CREATED
        } else {
            StatusCode::NOT_FOUND
        };
        assert_eq!(status, answer_expected);
    }
}

#[sqlx::test(migrations = false)]
async fn repeated_interactions_do_not_inflate_recommendations(pool: PgPool) {
    setup(&pool).await;
    let author = insert_user(&pool, "author", "user").await;
    let viewer = insert_user(&pool, "viewer", "user").await;
    let binge = insert_user(&pool, "binge", "user").await;
    let broad = insert_user(&pool, "broad", "user").await;

    let shared = upload(&pool, author, "shared", 0).await;
    let replayed = upload(&pool, author, "replayed", 0).await;
    let engaged = upload(&pool, author, "engaged", 0).await;
    for document in [shared, replayed, engaged] {
        approve(&pool, document).await;
    }

    let mut interactions = vec![
        (viewer, shared, "view"),
        (binge, shared, "view"),
        (broad, shared, "view"),
        (broad, engaged, "view"),
        (broad, engaged, "download"),
    ];
    interactions.extend(std::iter::repeat((binge, replayed, "view")).take(10));
    for (user, document, kind) in interactions {
        sqlx::query(
            "INSERT INTO user_document_interactions (user_id, document_id, kind) VALUES ($1, $2, $3::interaction_kind)",
        )
        .bind(user)
        .bind(document)
        .bind(kind)
        .execute(&pool)
        .await
        .unwrap();
    }
    recommendation::refresh_similarity(&pool).await.unwrap();

    let picks: Vec<i32> = recommendation::for_user(&pool, viewer, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|document| document.id)
        .collect();
    assert_eq!(picks, vec![engaged, replayed]);
}
