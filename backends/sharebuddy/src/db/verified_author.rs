use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::{config::VerifiedAuthorConfig, error::AppResult, utils::auth::UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// What an author has achieved so far.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuthorStats {
    pub document_count: i64,
    pub average_rating: f64,
    pub total_downloads: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub eligible: bool,
    pub stats: AuthorStats,
    pub unmet: Vec<String>,
}

impl VerifiedAuthorConfig {
    /// Lists every threshold the stats fall short of.
    pub fn unmet(&self, stats: &AuthorStats) -> Vec<String> {
        let mut unmet = Vec::new();
        if stats.document_count < self.min_documents {
            unmet.push(format!(
                "at least {} approved documents required ({} so far)",
                self.min_documents, stats.document_count
            ));
        }
        if stats.average_rating < self.min_average_rating {
            unmet.push(format!(
                "average rating of {:.1} required ({:.2} so far)",
                self.min_average_rating, stats.average_rating
            ));
        }
        if stats.total_downloads < self.min_downloads {
            unmet.push(format!(
                "at least {} downloads required ({} so far)",
                self.min_downloads, stats.total_downloads
            ));
        }
        unmet
    }

    pub fn evaluate(&self, stats: AuthorStats) -> Eligibility {
        let unmet = self.unmet(&stats);
        Eligibility {
            eligible: unmet.is_empty(),
            stats,
            unmet,
        }
    }
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedAuthorRequest {
    pub id: i32,
    #[serde(skip)]
    pub user_id: UserId,
    pub username: String,
    pub status: RequestStatus,
    pub document_count: i64,
    pub average_rating: f64,
    pub total_downloads: i64,
    pub reviewer_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Averages only over documents that have been rated.
pub async fn author_stats(pool: &PgPool, user_id: UserId) -> AppResult<AuthorStats> {
    Ok(sqlx::query_as::<_, AuthorStats>(
        r#"
        SELECT
            COUNT(*) AS document_count,
            COALESCE(AVG(average_rating) FILTER (WHERE rating_count > 0), 0)::DOUBLE PRECISION
                AS average_rating,
            COALESCE(SUM(download_count), 0)::BIGINT AS total_downloads
        FROM documents
        WHERE author_id = $1 AND status = 'approved'
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?)
}

pub async fn list_requests(
    pool: &PgPool,
    status: Option<RequestStatus>,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<VerifiedAuthorRequest>> {
    Ok(sqlx::query_as::<_, VerifiedAuthorRequest>(
        r#"
        SELECT
            r.id, r.user_id, u.username, r.status,
            r.document_count, r.average_rating, r.total_downloads,
            r.reviewer_note, r.reviewed_at, r.created_at
        FROM verified_author_requests r
        INNER JOIN users u ON u.id = r.user_id
        WHERE ($1::request_status IS NULL OR r.status = $1)
        ORDER BY r.created_at ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> VerifiedAuthorConfig {
        VerifiedAuthorConfig {
            min_documents: 5,
            min_average_rating: 4.0,
            min_downloads: 50,
        }
    }

    #[test]
    fn author_meeting_every_threshold_is_eligible() {
        let eligibility = thresholds().evaluate(AuthorStats {
            document_count: 5,
            average_rating: 4.0,
            total_downloads: 50,
        });
        assert!(eligibility.eligible);
        assert!(eligibility.unmet.is_empty());
    }

    #[test]
    fn each_shortfall_is_reported() {
        let unmet = thresholds().unmet(&AuthorStats {
            document_count: 2,
            average_rating: 3.5,
            total_downloads: 10,
        });
        assert_eq!(unmet.len(), 3);
        assert!(unmet[0].contains("5 approved documents"));
        assert!(unmet[1].contains("4.0"));
        assert!(unmet[2].contains("50 downloads"));
    }

    #[test]
    fn high_volume_low_rating_is_not_enough() {
        let eligibility = thresholds().evaluate(AuthorStats {
            document_count: 40,
            average_rating: 3.9,
            total_downloads: 5000,
        });
        assert!(!eligibility.eligible);
        assert_eq!(eligibility.unmet.len(), 1);
    }
}
