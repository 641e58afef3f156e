//! Durable Redis-backed job queues.
//!
//! Each queue is a sorted set scored by `scheduled_at` with the job payload
//! stored under a per-job key. A pop claims the job for exactly one worker;
//! retries re-add the member with the queue's backoff schedule. Workers are
//! cancellable tasks that exit cooperatively on shutdown.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;

use crate::error::{AppError, Result};

pub const AUDIT_QUEUE: QueueName = QueueName::AuditJobs;
pub const MEDIA_QUEUE: QueueName = QueueName::MediaJobs;
pub const TRANSCRIPT_QUEUE: QueueName = QueueName::TranscriptJobs;

/// Hard per-attempt execution timeout shared by all queues.
pub const JOB_TIMEOUT_SECONDS: u64 = 1800;
const JOB_RECORD_TTL_SECONDS: u64 = 86_400;
const POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    AuditJobs,
    MediaJobs,
    TranscriptJobs,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::AuditJobs => "audit_jobs",
            QueueName::MediaJobs => "media_jobs",
            QueueName::TranscriptJobs => "transcript_jobs",
        }
    }

    /// Retry backoff schedule in seconds, one entry per retry.
    pub fn backoff_schedule(&self) -> &'static [i64] {
        match self {
            QueueName::AuditJobs => &[15, 60, 180],
            QueueName::MediaJobs | QueueName::TranscriptJobs => &[10, 30, 120],
        }
    }

    fn queue_key(&self) -> String {
        format!("queue:{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum QueueJobStatus {
    Pending,
    Processing,
    Completed,
    Retrying,
    DeadLetter,
}

/// Queue-level job envelope. Domain state lives on the DB row; this record
/// only tracks delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: String,
    pub queue: QueueName,
    pub payload: serde_json::Value,
    pub status: QueueJobStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub error_message: Option<String>,
}

/// Trait for queue job handlers. Handlers persist domain failures onto
/// their own rows and only return Err for delivery-level retries.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &QueueJob) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct JobQueueService {
    redis_pool: deadpool_redis::Pool,
}

impl JobQueueService {
    pub fn new(redis_pool: deadpool_redis::Pool) -> Self {
        Self { redis_pool }
    }

    fn job_key(job_id: &str) -> String {
        format!("job:{}", job_id)
    }

    async fn save_job(&self, job: &QueueJob) -> Result<()> {
        let mut conn = self.redis_pool.get().await?;
        let payload = serde_json::to_string(job)?;
        let _: () = conn
            .set_ex(Self::job_key(&job.id), payload, JOB_RECORD_TTL_SECONDS)
            .await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<QueueJob>> {
        let mut conn = self.redis_pool.get().await?;
        let raw: Option<String> = conn.get(Self::job_key(job_id)).await?;
        Ok(match raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        })
    }

    /// Enqueue with a stable id; re-enqueueing the same id overwrites the
    /// record and re-scores the member, which keeps enqueue idempotent.
    pub async fn enqueue(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: serde_json::Value,
    ) -> Result<String> {
        let job = QueueJob {
            id: job_id.to_string(),
            queue,
            payload,
            status: QueueJobStatus::Pending,
            created_at: Utc::now(),
            scheduled_at: Utc::now(),
            attempts: 0,
            max_attempts: queue.backoff_schedule().len() as u32,
            error_message: None,
        };
        self.save_job(&job).await?;

        let mut conn = self.redis_pool.get().await?;
        let _: () = conn
            .zadd(
                queue.queue_key(),
                job.id.clone(),
                job.scheduled_at.timestamp() as f64,
            )
            .await?;
        tracing::info!(queue = queue.as_str(), job_id = %job.id, "enqueued job");
        Ok(job.id)
    }

    /// Claim the next due job. The ZPOPMIN + conditional re-add keeps
    /// delivery single-writer per job id.
    async fn pop_due(&self, queue: QueueName) -> Result<Option<QueueJob>> {
        let mut conn = self.redis_pool.get().await?;
        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMIN")
            .arg(queue.queue_key())
            .arg(1)
            .query_async(&mut conn)
            .await?;
        let Some((member, score)) = popped.into_iter().next() else {
            return Ok(None);
        };

        let now = Utc::now().timestamp() as f64;
        if score > now {
            // Not due yet: hand it back untouched.
            let _: () = conn.zadd(queue.queue_key(), member, score).await?;
            return Ok(None);
        }

        match self.get_job(&member).await? {
            Some(job) => Ok(Some(job)),
            None => {
                tracing::warn!(queue = queue.as_str(), job_id = %member, "queued member had no record");
                Ok(None)
            }
        }
    }

    async fn reschedule(&self, mut job: QueueJob, error: &str) -> Result<()> {
        let schedule = job.queue.backoff_schedule();
        if (job.attempts as usize) < schedule.len() {
            let delay = schedule[job.attempts as usize];
            job.attempts += 1;
            job.status = QueueJobStatus::Retrying;
            job.error_message = Some(error.to_string());
            job.scheduled_at = Utc::now() + chrono::Duration::seconds(delay);
            self.save_job(&job).await?;

            let mut conn = self.redis_pool.get().await?;
            let _: () = conn
                .zadd(
                    job.queue.queue_key(),
                    job.id.clone(),
                    job.scheduled_at.timestamp() as f64,
                )
                .await?;
            tracing::warn!(
                queue = job.queue.as_str(),
                job_id = %job.id,
                attempt = job.attempts,
                delay_s = delay,
                error = %error,
                "job failed, retry scheduled"
            );
        } else {
            job.status = QueueJobStatus::DeadLetter;
            job.error_message = Some(error.to_string());
            self.save_job(&job).await?;
            tracing::error!(
                queue = job.queue.as_str(),
                job_id = %job.id,
                attempts = job.attempts,
                error = %error,
                "job moved to dead letter"
            );
        }
        Ok(())
    }

    pub async fn queue_depth(&self, queue: QueueName) -> Result<u64> {
        let mut conn = self.redis_pool.get().await?;
        let depth: u64 = conn.zcard(queue.queue_key()).await.unwrap_or(0);
        Ok(depth)
    }

    /// Long-running worker loop for one queue. Exits when the shutdown
    /// channel flips.
    pub async fn run_worker(
        self: Arc<Self>,
        queue: QueueName,
        handler: Arc<dyn JobHandler>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        tracing::info!(queue = queue.as_str(), "queue worker started");
        let mut poll = interval(Duration::from_millis(POLL_INTERVAL_MS));

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = poll.tick() => {
                    match self.pop_due(queue).await {
                        Ok(Some(job)) => {
                            self.execute_job(queue, job, handler.clone()).await;
                        }
                        Ok(None) => {}
                        Err(err) => {
                            tracing::warn!(queue = queue.as_str(), error = %err, "queue poll failed");
                        }
                    }
                }
            }
        }
        tracing::info!(queue = queue.as_str(), "queue worker stopped");
    }

    async fn execute_job(&self, queue: QueueName, mut job: QueueJob, handler: Arc<dyn JobHandler>) {
        job.status = QueueJobStatus::Processing;
        if let Err(err) = self.save_job(&job).await {
            tracing::warn!(job_id = %job.id, error = %err, "could not persist processing state");
        }

        let outcome = tokio::time::timeout(
            Duration::from_secs(JOB_TIMEOUT_SECONDS),
            handler.handle(&job),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                job.status = QueueJobStatus::Completed;
                job.error_message = None;
                if let Err(err) = self.save_job(&job).await {
                    tracing::warn!(job_id = %job.id, error = %err, "could not persist completed state");
                }
                tracing::info!(queue = queue.as_str(), job_id = %job.id, "job completed");
            }
            Ok(Err(err)) => {
                if let Err(save_err) = self.reschedule(job, &err.to_string()).await {
                    tracing::error!(error = %save_err, "failed to reschedule job");
                }
            }
            Err(_) => {
                let message = format!("job timed out after {}s", JOB_TIMEOUT_SECONDS);
                if let Err(save_err) = self.reschedule(job, &message).await {
                    tracing::error!(error = %save_err, "failed to reschedule timed-out job");
                }
            }
        }
    }
}

/// Map any enqueue failure to the caller-visible unavailability error.
pub fn queue_unavailable(err: &AppError) -> AppError {
    AppError::ServiceUnavailable(format!("Queue unavailable: {}", err.detail()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedules_match_queue_policy() {
        assert_eq!(QueueName::AuditJobs.backoff_schedule(), &[15, 60, 180]);
        assert_eq!(QueueName::MediaJobs.backoff_schedule(), &[10, 30, 120]);
        assert_eq!(QueueName::TranscriptJobs.backoff_schedule(), &[10, 30, 120]);
    }

    #[test]
    fn queue_keys_are_stable() {
        assert_eq!(QueueName::AuditJobs.queue_key(), "queue:audit_jobs");
        assert_eq!(QueueName::MediaJobs.as_str(), "media_jobs");
    }
}
