use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};

use crate::{error::AppResult, utils::auth::UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    NewFollower,
    NewComment,
    NewRating,
    NewQuestion,
    NewAnswer,
    AnswerAccepted,
    DocumentApproved,
    DocumentRejected,
    VerifiedAuthorApproved,
    VerifiedAuthorRejected,
    CreditsPurchased,
    ReportResolved,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::NewFollower => "new_follower",
            NotificationKind::NewComment => "new_comment",
            NotificationKind::NewRating => "new_rating",
            NotificationKind::NewQuestion => "new_question",
            NotificationKind::NewAnswer => "new_answer",
            NotificationKind::AnswerAccepted => "answer_accepted",
            NotificationKind::DocumentApproved => "document_approved",
            NotificationKind::DocumentRejected => "document_rejected",
            NotificationKind::VerifiedAuthorApproved => "verified_author_approved",
            NotificationKind::VerifiedAuthorRejected => "verified_author_rejected",
            NotificationKind::CreditsPurchased => "credits_purchased",
            NotificationKind::ReportResolved => "report_resolved",
        }
    }
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i32,
    pub kind: String,
    pub message: String,
    pub actor_username: Option<String>,
    pub document_id: Option<i32>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification about to be written.
#[derive(Debug, Clone)]
pub struct Notice {
    pub recipient: UserId,
    pub actor: Option<UserId>,
    pub kind: NotificationKind,
    pub message: String,
    pub document_id: Option<i32>,
}

impl Notice {
    pub fn new(recipient: UserId, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            recipient,
            actor: None,
            kind,
            message: message.into(),
            document_id: None,
        }
    }

    pub fn by(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn about(mut self, document_id: i32) -> Self {
        self.document_id = Some(document_id);
        self
    }

    /// Users are never told about their own actions.
    pub fn is_self_inflicted(&self) -> bool {
        self.actor == Some(self.recipient)
    }
}

pub async fn notify(conn: &mut PgConnection, notice: Notice) -> AppResult<()> {
    if notice.is_self_inflicted() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO notifications (user_id, actor_id, kind, message, document_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(notice.recipient)
    .bind(notice.actor)
    .bind(notice.kind.as_str())
    .bind(notice.message)
    .bind(notice.document_id)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn list_notifications(
    pool: &PgPool,
    user_id: UserId,
    unread_only: bool,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Notification>> {
    Ok(sqlx::query_as::<_, Notification>(
        r#"
        SELECT
            n.id, n.kind, n.message,
            actor.username AS actor_username,
            n.document_id, n.is_read, n.created_at
        FROM notifications n
        LEFT JOIN users actor ON actor.id = n.actor_id
        WHERE n.user_id = $1 AND (NOT $2 OR NOT n.is_read)
        ORDER BY n.created_at DESC, n.id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(unread_only)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}

pub async fn unread_count(pool: &PgPool, user_id: UserId) -> AppResult<i64> {
    Ok(sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?)
}

/// Marks one notification read; `false` when it isn't the user's.
pub async fn mark_read(pool: &PgPool, user_id: UserId, notification_id: i32) -> AppResult<bool> {
    let updated = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(updated > 0)
}

pub async fn mark_all_read(pool: &PgPool, user_id: UserId) -> AppResult<u64> {
    Ok(
        sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
            .bind(user_id)
            .execute(pool)
            .await?
            .rows_affected(),
    )
}

pub async fn delete_notification(
    pool: &PgPool,
    user_id: UserId,
    notification_id: i32,
) -> AppResult<bool> {
    let deleted = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_actions_are_not_notified() {
        let notice = Notice::new(3, NotificationKind::NewComment, "hi").by(3);
        assert!(notice.is_self_inflicted());

        let notice = Notice::new(3, NotificationKind::NewComment, "hi").by(4).about(9);
        assert!(!notice.is_self_inflicted());
        assert_eq!(notice.document_id, Some(9));

        let system = Notice::new(3, NotificationKind::DocumentApproved, "approved");
        assert!(!system.is_self_inflicted());
    }
}
