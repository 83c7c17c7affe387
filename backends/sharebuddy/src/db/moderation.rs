//! Moderation state changes for documents.
//!
//! Each review of a `pending` document is decided at most once. The guarded
//! update is the single point that enforces it, whichever path (worker,
//! admin, report) decides. The upload reward is paid on the first approval
//! only.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};

use crate::{
    config::CreditConfig,
    db::{
        credit::{self, CreditKind, Entry},
        notify, DocumentStatus, Notice, NotificationKind,
    },
    error::{AppError, AppResult},
    utils::auth::UserId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

impl Decision {
    pub fn target_status(&self) -> DocumentStatus {
        match self {
            Decision::Approve => DocumentStatus::Approved,
            Decision::Reject { .. } => DocumentStatus::Rejected,
        }
    }

    fn reason(&self) -> Option<&str> {
        match self {
            Decision::Approve => None,
            Decision::Reject { reason } => Some(reason),
        }
    }
}

/// Validates a status change: only `pending` documents accept a decision.
pub fn transition(current: DocumentStatus, decision: &Decision) -> AppResult<DocumentStatus> {
    match current {
        DocumentStatus::Pending => Ok(decision.target_status()),
        _ => Err(AppError::conflict("Document has already been moderated")),
    }
}

#[derive(Debug, FromRow)]
struct Moderated {
    author_id: UserId,
    title: String,
}

/// Outcome of applying a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Changed(DocumentStatus),
    AlreadyModerated,
}

/// Marks the document's upload reward as paid. False when an earlier
/// approval already paid it; edits that send a document back to review
/// never earn it twice.
async fn claim_upload_reward(conn: &mut PgConnection, document_id: i32) -> AppResult<bool> {
    let claimed =
        sqlx::query("UPDATE documents SET reward_paid = TRUE WHERE id = $1 AND NOT reward_paid")
            .bind(document_id)
            .execute(conn)
            .await?
            .rows_affected();
    Ok(claimed > 0)
}

/// Moves a pending document to its decided status, awards the upload reward
/// on approval and notifies the author, all in one transaction.
pub async fn apply_decision(
    pool: &PgPool,
    document_id: i32,
    decision: &Decision,
    credits: &CreditConfig,
) -> AppResult<Applied> {
    let mut tx = pool.begin().await?;
    let status = decision.target_status();

    let moderated = sqlx::query_as::<_, Moderated>(
        r#"
        UPDATE documents
        SET status = $2, rejection_reason = $3, moderated_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING author_id, title
        "#,
    )
    .bind(document_id)
    .bind(status)
    .bind(decision.reason())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(moderated) = moderated else {
        tx.rollback().await?;
        return Ok(Applied::AlreadyModerated);
    };

    let notice = match decision {
        Decision::Approve => {
            let reward = if claim_upload_reward(&mut tx, document_id).await? {
                credits.upload_reward
            } else {
                0
            };

            credit::record(
                &mut tx,
                Entry {
                    user_id: moderated.author_id,
                    amount: reward,
                    kind: CreditKind::UploadReward,
                    reference_id: Some(document_id),
                    description: "Upload approved",
                },
            )
            .await?;

            let message = if reward > 0 {
                format!(
                    "\"{}\" was approved. You earned {} credits.",
                    moderated.title, reward
                )
            } else {
                format!("\"{}\" was approved.", moderated.title)
            };
            Notice::new(moderated.author_id, NotificationKind::DocumentApproved, message)
        }
        Decision::Reject { reason } => Notice::new(
            moderated.author_id,
            NotificationKind::DocumentRejected,
            format!("\"{}\" was rejected: {}", moderated.title, reason),
        ),
    };

    notify(&mut tx, notice.about(document_id)).await?;
    tx.commit().await?;

    tracing::info!(document_id, ?status, "document moderated");
    Ok(Applied::Changed(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_documents_accept_either_decision() {
        assert_eq!(
            transition(DocumentStatus::Pending, &Decision::Approve).unwrap(),
            DocumentStatus::Approved
        );
        let reject = Decision::Reject {
            reason: "copyrighted".into(),
        };
        assert_eq!(
            transition(DocumentStatus::Pending, &reject).unwrap(),
            DocumentStatus::Rejected
        );
    }

    #[test]
    fn moderated_documents_reject_a_second_decision() {
        for status in [DocumentStatus::Approved, DocumentStatus::Rejected] {
            assert!(transition(status, &Decision::Approve).is_err());
        }
    }

    #[test]
    fn decision_deserializes_from_tagged_json() {
        let decision: Decision =
            serde_json::from_str(r#"{"decision":"reject","reason":"spam"}"#).unwrap();
        assert_eq!(
            decision,
            Decision::Reject {
                reason: "spam".into()
            }
        );
        let decision: Decision = serde_json::from_str(r#"{"decision":"approve"}"#).unwrap();
        assert_eq!(decision, Decision::Approve);
    }
}
