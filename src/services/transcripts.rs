//! Feed transcript jobs.
//!
//! Preference order per item: whisper audio from a completed media asset
//! (feature-gated), then the item's caption, then its title.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::{
    FeedTranscriptJob, MediaAsset, MediaDownloadJob, ResearchItem, TranscriptSource,
};
use crate::services::job_queue::{JobHandler, JobQueueService, QueueJob, TRANSCRIPT_QUEUE};
use crate::services::multimodal::{audio, LlmClient};

const TRANSCRIPT_JOB_TEXT_LIMIT: usize = 20_000;
const TRANSCRIPT_META_TEXT_LIMIT: usize = 12_000;
const TRANSCRIPT_MAX_ATTEMPTS: i32 = 3;

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[derive(Clone)]
pub struct TranscriptService {
    pool: PgPool,
    config: Arc<AppConfig>,
    queue: Arc<JobQueueService>,
    llm: LlmClient,
}

impl TranscriptService {
    pub fn new(
        pool: PgPool,
        config: Arc<AppConfig>,
        queue: Arc<JobQueueService>,
        llm: LlmClient,
    ) -> Self {
        Self {
            pool,
            config,
            queue,
            llm,
        }
    }

    /// Create a queued transcript job for one item and hand it off.
    pub async fn enqueue_job(&self, user_id: &str, item: &ResearchItem) -> Result<FeedTranscriptJob> {
        let job = sqlx::query_as::<_, FeedTranscriptJob>(
            r#"
            INSERT INTO feed_transcript_jobs (id, user_id, research_item_id, status, progress, attempts, max_attempts)
            VALUES ($1, $2, $3, 'queued', 0, 0, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(&item.id)
        .bind(TRANSCRIPT_MAX_ATTEMPTS)
        .fetch_one(&self.pool)
        .await?;

        match self
            .queue
            .enqueue(
                TRANSCRIPT_QUEUE,
                &format!("transcript:{}", job.id),
                serde_json::json!({ "job_id": job.id.clone() }),
            )
            .await
        {
            Ok(queue_job_id) => {
                let job = sqlx::query_as::<_, FeedTranscriptJob>(
                    "UPDATE feed_transcript_jobs SET queue_job_id = $2 WHERE id = $1 RETURNING *",
                )
                .bind(&job.id)
                .bind(&queue_job_id)
                .fetch_one(&self.pool)
                .await?;
                Ok(job)
            }
            Err(err) => {
                let job = sqlx::query_as::<_, FeedTranscriptJob>(
                    "UPDATE feed_transcript_jobs SET status = 'failed', error_code = 'queue_unavailable', error_message = $2 WHERE id = $1 RETURNING *",
                )
                .bind(&job.id)
                .bind(err.detail())
                .fetch_one(&self.pool)
                .await?;
                Ok(job)
            }
        }
    }

    pub async fn get_jobs(&self, user_id: &str, job_ids: &[String]) -> Result<Vec<FeedTranscriptJob>> {
        let rows = sqlx::query_as::<_, FeedTranscriptJob>(
            "SELECT * FROM feed_transcript_jobs WHERE user_id = $1 AND id = ANY($2)",
        )
        .bind(user_id)
        .bind(job_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn resolve_media_asset(&self, user_id: &str, item: &ResearchItem) -> Result<Option<MediaAsset>> {
        let Some(download_job_id) = item.media_meta_str("feed_download_job_id") else {
            return Ok(None);
        };
        let download_job = sqlx::query_as::<_, MediaDownloadJob>(
            "SELECT * FROM media_download_jobs WHERE id = $1 AND user_id = $2 AND status = 'completed'",
        )
        .bind(&download_job_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(asset_id) = download_job.and_then(|job| job.media_asset_id) else {
            return Ok(None);
        };
        let asset = sqlx::query_as::<_, MediaAsset>(
            "SELECT * FROM media_assets WHERE id = $1 AND user_id = $2",
        )
        .bind(&asset_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(asset)
    }

    async fn mark_failed(&self, job_id: &str, error_message: &str) {
        let message: String = error_message.chars().take(1000).collect();
        let result = sqlx::query(
            r#"
            UPDATE feed_transcript_jobs
            SET status = 'failed', error_code = 'transcript_failed', error_message = $2,
                progress = 100, completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(message)
        .execute(&self.pool)
        .await;
        if let Err(err) = result {
            tracing::error!(job_id = %job_id, error = %err, "could not persist transcript failure");
        }
    }

    pub async fn process_job(&self, job_id: &str) -> Result<()> {
        let job = sqlx::query_as::<_, FeedTranscriptJob>(
            "SELECT * FROM feed_transcript_jobs WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(job) = job else {
            tracing::warn!(job_id = %job_id, "feed transcript job not found");
            return Ok(());
        };
        if job.status == "completed" {
            return Ok(());
        }

        if let Err(err) = self.run_pipeline(&job).await {
            tracing::error!(job_id = %job.id, error = %err, "feed transcript job failed");
            self.mark_failed(&job.id, &err.detail()).await;
        }
        Ok(())
    }

    async fn run_pipeline(&self, job: &FeedTranscriptJob) -> Result<()> {
        sqlx::query(
            "UPDATE feed_transcript_jobs SET status = 'processing', progress = 20, attempts = attempts + 1, error_code = NULL, error_message = NULL WHERE id = $1",
        )
        .bind(&job.id)
        .execute(&self.pool)
        .await?;

        let item = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE id = $1 AND user_id = $2",
        )
        .bind(&job.research_item_id)
        .bind(&job.user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::internal(anyhow::anyhow!("Research item not found for transcript job."))
        })?;

        let mut transcript_text = String::new();
        let mut transcript_source: Option<TranscriptSource> = None;

        if self.config.features.enable_whisper_transcription {
            if let Some(asset) = self.resolve_media_asset(&job.user_id, &item).await? {
                let asset_path = PathBuf::from(&asset.file_path);
                if asset_path.exists() {
                    sqlx::query("UPDATE feed_transcript_jobs SET progress = 55 WHERE id = $1")
                        .bind(&job.id)
                        .execute(&self.pool)
                        .await?;

                    let transcript_dir = PathBuf::from(&self.config.uploads.upload_dir)
                        .join("_feed_transcripts")
                        .join(&job.user_id);
                    tokio::fs::create_dir_all(&transcript_dir).await?;
                    let audio_path = transcript_dir.join(format!("{}.mp3", job.id));

                    let outcome = async {
                        audio::extract_audio(&asset_path, &audio_path).await?;
                        audio::transcribe_audio(&self.llm, &audio_path).await
                    }
                    .await;
                    if audio_path.exists() {
                        let _ = tokio::fs::remove_file(&audio_path).await;
                    }
                    let payload = outcome?;
                    let text = if payload.text.trim().is_empty() {
                        payload
                            .segments
                            .iter()
                            .map(|segment| segment.text.trim())
                            .filter(|text| !text.is_empty())
                            .collect::<Vec<_>>()
                            .join(" ")
                    } else {
                        payload.text.trim().to_string()
                    };
                    if !text.is_empty() {
                        transcript_text = text;
                        transcript_source = Some(TranscriptSource::WhisperAudio);
                    }
                }
            }
        }

        if transcript_text.is_empty() {
            if let Some(caption) = item.caption.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                transcript_text = caption.to_string();
                transcript_source = Some(TranscriptSource::CaptionFallback);
            } else if let Some(title) = item.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                transcript_text = title.to_string();
                transcript_source = Some(TranscriptSource::TitleFallback);
            }
        }

        let source = transcript_source.ok_or_else(|| {
            AppError::internal(anyhow::anyhow!(
                "No transcript source available for this feed item."
            ))
        })?;

        // Merge into the item's open media_meta mapping.
        let mut meta = item.media_meta();
        meta.insert("transcript_job_id".into(), serde_json::json!(job.id));
        meta.insert("transcript_source".into(), serde_json::json!(source.as_str()));
        meta.insert(
            "transcript_text".into(),
            serde_json::json!(truncate_chars(&transcript_text, TRANSCRIPT_META_TEXT_LIMIT)),
        );
        meta.insert(
            "transcript_updated_at".into(),
            serde_json::json!(Utc::now().to_rfc3339()),
        );

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE research_items SET media_meta_json = $2 WHERE id = $1")
            .bind(&item.id)
            .bind(serde_json::Value::Object(meta))
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            UPDATE feed_transcript_jobs
            SET status = 'completed', progress = 100, error_code = NULL, error_message = NULL,
                transcript_source = $2, transcript_text = $3, completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(&job.id)
        .bind(source.as_str())
        .bind(truncate_chars(&transcript_text, TRANSCRIPT_JOB_TEXT_LIMIT))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(job_id = %job.id, source = source.as_str(), "feed transcript job completed");
        Ok(())
    }
}

pub struct TranscriptJobHandler {
    pub service: TranscriptService,
}

#[async_trait::async_trait]
impl JobHandler for TranscriptJobHandler {
    async fn handle(&self, job: &QueueJob) -> anyhow::Result<()> {
        let Some(job_id) = job.payload.get("job_id").and_then(|v| v.as_str()) else {
            tracing::warn!("transcript queue job missing job_id payload");
            return Ok(());
        };
        if let Err(err) = self.service.process_job(job_id).await {
            tracing::error!(job_id = %job_id, error = %err, "transcript job pipeline errored");
        }
        Ok(())
    }
}

/// Startup recovery for stalled transcript jobs.
pub async fn recover_stalled_transcript_jobs(pool: &PgPool, max_age_minutes: i64) -> Result<u64> {
    let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::minutes(max_age_minutes.max(1));
    let result = sqlx::query(
        r#"
        UPDATE feed_transcript_jobs
        SET status = 'failed', error_code = 'stalled',
            error_message = 'Transcript extraction was interrupted. Re-run from workspace.',
            completed_at = now(), progress = GREATEST(progress, 5)
        WHERE status IN ('queued', 'processing') AND created_at < $1
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_is_char_safe() {
        let text = "é".repeat(30_000);
        let truncated = truncate_chars(&text, TRANSCRIPT_JOB_TEXT_LIMIT);
        assert_eq!(truncated.chars().count(), TRANSCRIPT_JOB_TEXT_LIMIT);
    }
}
