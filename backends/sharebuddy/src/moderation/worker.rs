use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;

use crate::{
    config::{CreditConfig, ModerationConfig},
    db::{
        self,
        moderation::{apply_decision, Applied, Decision},
        DocumentStatus,
    },
    error::{AppError, AppResult, DBError},
};

use super::{
    queue::{ModerationJob, ModerationQueue, RetryOutcome},
    screen::{Screener, Submission, Verdict},
};

pub struct ModerationWorker {
    pool: PgPool,
    queue: ModerationQueue,
    screener: Screener,
    credits: CreditConfig,
    poll_timeout: Duration,
}

impl ModerationWorker {
    pub fn new(
        pool: PgPool,
        queue: ModerationQueue,
        screener: Screener,
        credits: CreditConfig,
        config: &ModerationConfig,
    ) -> Self {
        Self {
            pool,
            queue,
            screener,
            credits,
            poll_timeout: Duration::from_secs(config.poll_timeout_secs.max(1)),
        }
    }

    /// Runs until `shutdown` changes or its sender goes away.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("moderation worker started");

        'worker: loop {
            let mut conn = match self.queue.consumer_connection().await {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::error!(error = ?err, "moderation worker cannot reach redis");
                    tokio::select! {
                        _ = shutdown.changed() => break 'worker,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => continue 'worker,
                    }
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break 'worker,
                    result = self.poll(&mut conn) => {
                        if let Err(err) = result {
                            tracing::error!(error = ?err, "moderation poll failed, reconnecting");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            continue 'worker;
                        }
                    }
                }
            }
        }

        tracing::info!("moderation worker stopped");
    }

    async fn poll(&self, conn: &mut redis::aio::MultiplexedConnection) -> AppResult<()> {
        let promoted = self.queue.promote_due().await?;
        if promoted > 0 {
            tracing::debug!(promoted, "delayed moderation jobs promoted");
        }

        let Some(job) = self.queue.next(conn, self.poll_timeout).await? else {
            return Ok(());
        };

        if let Err(err) = self.process(&job).await {
            match self.queue.retry_or_fail(job.clone()).await? {
                RetryOutcome::Delayed(delay) => tracing::warn!(
                    job_id = %job.id,
                    document_id = job.document_id,
                    error = ?err,
                    ?delay,
                    "moderation job failed, retrying"
                ),
                RetryOutcome::Failed => tracing::error!(
                    job_id = %job.id,
                    document_id = job.document_id,
                    error = ?err,
                    "moderation job exhausted its attempts"
                ),
            }
        }
        Ok(())
    }

    pub async fn process(&self, job: &ModerationJob) -> AppResult<()> {
        let document = match db::get_document(&self.pool, job.document_id).await {
            Ok(document) => document,
            Err(AppError::DBError(DBError::NotFound)) => {
                tracing::debug!(document_id = job.document_id, "document gone, job dropped");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if document.status != DocumentStatus::Pending {
            tracing::debug!(document_id = document.id, status = ?document.status, "already moderated");
            return Ok(());
        }

        let verdict = self.screener.screen(&Submission {
            title: &document.title,
            description: &document.description,
            file_type: &document.file_type,
            file_size: document.file_size,
        });

        let decision = match verdict {
            Verdict::Approve => Decision::Approve,
            Verdict::Reject(reason) => Decision::Reject { reason },
            Verdict::Escalate(reason) => {
                tracing::info!(document_id = document.id, reason, "document escalated to manual review");
                return Ok(());
            }
        };

        match apply_decision(&self.pool, document.id, &decision, &self.credits).await? {
            Applied::Changed(status) => {
                tracing::info!(job_id = %job.id, document_id = document.id, ?status, "automatic moderation applied");
            }
            Applied::AlreadyModerated => {
                tracing::debug!(document_id = document.id, "lost race to another moderator");
            }
        }
        Ok(())
    }
}
