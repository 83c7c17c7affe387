use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::{config::ModerationConfig, error::AppResult};

const MAX_BACKOFF: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationJob {
    pub id: Uuid,
    pub document_id: i32,
    pub attempts_made: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl ModerationJob {
    pub fn new(document_id: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            attempts_made: 0,
            enqueued_at: Utc::now(),
        }
    }
}

/// Where a failed job went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Delayed(Duration),
    Failed,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub waiting: u64,
    pub delayed: u64,
    pub failed: u64,
}

/// Delay before retry number `attempts_made`, doubling from `base_ms`.
pub fn backoff_delay(base_ms: u64, attempts_made: u32) -> Duration {
    let exponent = attempts_made.saturating_sub(1).min(20);
    Duration::from_millis(base_ms.saturating_mul(1u64 << exponent)).min(MAX_BACKOFF)
}

#[derive(Debug, Clone)]
struct QueueKeys {
    waiting: String,
    delayed: String,
    failed: String,
}

impl QueueKeys {
    fn new(prefix: &str) -> Self {
        Self {
            waiting: format!("{prefix}:waiting"),
            delayed: format!("{prefix}:delayed"),
            failed: format!("{prefix}:failed"),
        }
    }
}

/// Redis-backed job queue: a list of waiting jobs, a sorted set of jobs
/// waiting out their backoff (scored by ready time in ms), and a list of jobs
/// that ran out of attempts.
#[derive(Clone)]
pub struct ModerationQueue {
    client: Client,
    connection: Arc<OnceCell<MultiplexedConnection>>,
    keys: QueueKeys,
    max_attempts: u32,
    backoff_ms: u64,
}

impl ModerationQueue {
    /// Does not connect; the first command does.
    pub fn new(redis_url: &str, config: &ModerationConfig) -> AppResult<Self> {
        Ok(Self {
            client: Client::open(redis_url)?,
            connection: Arc::new(OnceCell::new()),
            keys: QueueKeys::new(&config.queue_key),
            max_attempts: config.max_attempts.max(1),
            backoff_ms: config.backoff_ms,
        })
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        let conn = self
            .connection
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await?;
        Ok(conn.clone())
    }

    /// A connection of its own for blocking pops, so `BRPOP` never stalls
    /// the shared one.
    pub async fn consumer_connection(&self) -> AppResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn enqueue(&self, document_id: i32) -> AppResult<ModerationJob> {
        let job = ModerationJob::new(document_id);
        self.push_waiting(&job).await?;
        tracing::debug!(job_id = %job.id, document_id, "moderation job enqueued");
        Ok(job)
    }

    async fn push_waiting(&self, job: &ModerationJob) -> AppResult<()> {
        let payload = serde_json::to_string(job).map_err(anyhow::Error::from)?;
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(&self.keys.waiting, payload).await?;
        Ok(())
    }

    /// Blocks up to `timeout` for the next waiting job.
    pub async fn next(
        &self,
        conn: &mut MultiplexedConnection,
        timeout: Duration,
    ) -> AppResult<Option<ModerationJob>> {
        let popped: Option<(String, String)> = conn
            .brpop(&self.keys.waiting, timeout.as_secs_f64())
            .await?;

        let Some((_, payload)) = popped else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(job) => Ok(Some(job)),
            Err(err) => {
                tracing::error!(%err, payload, "dropping malformed moderation job");
                conn.lpush::<_, _, ()>(&self.keys.failed, payload).await?;
                Ok(None)
            }
        }
    }

    /// Schedules another attempt with exponential backoff, or parks the job
    /// in the failed list once `max_attempts` is reached.
    pub async fn retry_or_fail(&self, mut job: ModerationJob) -> AppResult<RetryOutcome> {
        job.attempts_made += 1;
        let payload = serde_json::to_string(&job).map_err(anyhow::Error::from)?;
        let mut conn = self.connection().await?;

        if job.attempts_made >= self.max_attempts {
            conn.lpush::<_, _, ()>(&self.keys.failed, payload).await?;
            return Ok(RetryOutcome::Failed);
        }

        let delay = backoff_delay(self.backoff_ms, job.attempts_made);
        let ready_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        conn.zadd::<_, _, _, ()>(&self.keys.delayed, payload, ready_at)
            .await?;
        Ok(RetryOutcome::Delayed(delay))
    }

    /// Moves delayed jobs whose backoff has elapsed back to the waiting list.
    pub async fn promote_due(&self) -> AppResult<usize> {
        let mut conn = self.connection().await?;
        let now = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore(&self.keys.delayed, "-inf", now)
            .await?;

        let mut promoted = 0;
        for payload in due {
            // whoever removes the member owns it
            let removed: i64 = conn.zrem(&self.keys.delayed, &payload).await?;
            if removed == 1 {
                conn.lpush::<_, _, ()>(&self.keys.waiting, &payload).await?;
                promoted += 1;
            }
        }
        Ok(promoted)
    }

    pub async fn stats(&self) -> AppResult<QueueStats> {
        let mut conn = self.connection().await?;
        Ok(QueueStats {
            waiting: conn.llen(&self.keys.waiting).await?,
            delayed: conn.zcard(&self.keys.delayed).await?,
            failed: conn.llen(&self.keys.failed).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1000, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1000, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(1000, 3), Duration::from_millis(4000));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_delay(1000, 40), MAX_BACKOFF);
        assert_eq!(backoff_delay(u64::MAX, 2), MAX_BACKOFF);
    }

    #[test]
    fn job_payload_survives_serialization() {
        let job = ModerationJob::new(12);
        let payload = serde_json::to_string(&job).unwrap();
        assert!(payload.contains("\"document_id\":12"));
        assert_eq!(serde_json::from_str::<ModerationJob>(&payload).unwrap(), job);
    }

    #[test]
    fn keys_share_the_configured_prefix() {
        let keys = QueueKeys::new("sb:mod");
        assert_eq!(keys.waiting, "sb:mod:waiting");
        assert_eq!(keys.delayed, "sb:mod:delayed");
        assert_eq!(keys.failed, "sb:mod:failed");
    }

    #[test]
    fn creating_a_queue_does_not_connect() {
        let queue = ModerationQueue::new("redis://127.0.0.1:1/", &ModerationConfig::default());
        assert!(queue.is_ok());
    }
}
