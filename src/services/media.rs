//! Media download jobs: download, normalize, probe, and materialize one
//! external video as an Upload + MediaAsset pair.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::{MediaDownloadJob, Platform};
use crate::services::job_queue::{queue_unavailable, JobHandler, JobQueueService, QueueJob, MEDIA_QUEUE};
use crate::services::multimodal::video;

const MEDIA_MAX_ATTEMPTS: i32 = 3;

/// Replace anything outside `[a-zA-Z0-9._-]` so downloaded names are safe
/// under the shared upload root.
pub fn safe_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download.mp4".to_string());
    let cleaned: String = base
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "download.mp4".to_string()
    } else {
        cleaned
    }
}

pub fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .as_deref()
    {
        Some("mov") => "video/quicktime",
        Some("m4v") => "video/x-m4v",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        _ => "video/mp4",
    }
}

/// Best-effort sweep of upload files older than the retention window.
pub fn sweep_stale_uploads(upload_dir: &str, retention_hours: i64) {
    let root = PathBuf::from(upload_dir);
    if !root.exists() {
        return;
    }
    let cutoff = std::time::SystemTime::now()
        - std::time::Duration::from_secs((retention_hours.max(1) as u64) * 3600);

    let mut stack = vec![root];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let stale = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false);
            if stale {
                if let Err(err) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %err, "could not sweep stale upload");
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct MediaService {
    pool: PgPool,
    config: Arc<AppConfig>,
    queue: Arc<JobQueueService>,
}

impl MediaService {
    pub fn new(pool: PgPool, config: Arc<AppConfig>, queue: Arc<JobQueueService>) -> Self {
        Self {
            pool,
            config,
            queue,
        }
    }

    fn assert_downloads_allowed(&self) -> Result<()> {
        if !self.config.features.allow_external_media_download {
            return Err(AppError::FeatureDisabled(
                "External media download is disabled. Set ALLOW_EXTERNAL_MEDIA_DOWNLOAD=true or use upload mode."
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Create a `queued` row and hand it to the durable queue. On handoff
    /// failure the row is marked failed with `queue_unavailable` and the
    /// caller sees ServiceUnavailable.
    pub async fn enqueue_download(
        &self,
        user_id: &str,
        platform: Platform,
        source_url: &str,
    ) -> Result<MediaDownloadJob> {
        self.assert_downloads_allowed()?;
        let source_url = source_url.trim();
        if !source_url.starts_with("http://") && !source_url.starts_with("https://") {
            return Err(AppError::bad_request(
                "source_url must be an absolute http(s) URL",
            ));
        }

        let job = sqlx::query_as::<_, MediaDownloadJob>(
            r#"
            INSERT INTO media_download_jobs (id, user_id, platform, source_url, status, progress, attempts, max_attempts)
            VALUES ($1, $2, $3, $4, 'queued', 0, 0, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(platform.as_str())
        .bind(source_url)
        .bind(MEDIA_MAX_ATTEMPTS)
        .fetch_one(&self.pool)
        .await?;

        match self
            .queue
            .enqueue(
                MEDIA_QUEUE,
                &format!("media:{}", job.id),
                serde_json::json!({ "job_id": job.id.clone() }),
            )
            .await
        {
            Ok(queue_job_id) => {
                let job = sqlx::query_as::<_, MediaDownloadJob>(
                    "UPDATE media_download_jobs SET queue_job_id = $2 WHERE id = $1 RETURNING *",
                )
                .bind(&job.id)
                .bind(&queue_job_id)
                .fetch_one(&self.pool)
                .await?;
                Ok(job)
            }
            Err(err) => {
                sqlx::query(
                    "UPDATE media_download_jobs SET status = 'failed', error_code = 'queue_unavailable', error_message = $2 WHERE id = $1",
                )
                .bind(&job.id)
                .bind(err.detail())
                .execute(&self.pool)
                .await?;
                Err(queue_unavailable(&err))
            }
        }
    }

    pub async fn get_job(&self, user_id: &str, job_id: &str) -> Result<MediaDownloadJob> {
        sqlx::query_as::<_, MediaDownloadJob>(
            "SELECT * FROM media_download_jobs WHERE id = $1 AND user_id = $2",
        )
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Media download job"))
    }

    pub async fn get_jobs(&self, user_id: &str, job_ids: &[String]) -> Result<Vec<MediaDownloadJob>> {
        let rows = sqlx::query_as::<_, MediaDownloadJob>(
            "SELECT * FROM media_download_jobs WHERE user_id = $1 AND id = ANY($2)",
        )
        .bind(user_id)
        .bind(job_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_progress(&self, job_id: &str, status: &str, progress: i32) -> Result<()> {
        sqlx::query("UPDATE media_download_jobs SET status = $2, progress = $3 WHERE id = $1")
            .bind(job_id)
            .bind(status)
            .bind(progress)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: &str, error_code: &str, error_message: &str) {
        let message: String = error_message.chars().take(1000).collect();
        let result = sqlx::query(
            r#"
            UPDATE media_download_jobs
            SET status = 'failed', error_code = $2, error_message = $3,
                progress = 100, completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error_code)
        .bind(message)
        .execute(&self.pool)
        .await;
        if let Err(err) = result {
            tracing::error!(job_id = %job_id, error = %err, "could not persist media job failure");
        }
    }

    /// Worker body: download -> probe -> move -> materialize Upload +
    /// MediaAsset -> complete. Any exception marks the row failed and
    /// best-effort deletes the temp + final files.
    pub async fn process_job(&self, job_id: &str) -> Result<()> {
        let job = sqlx::query_as::<_, MediaDownloadJob>(
            "SELECT * FROM media_download_jobs WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(job) = job else {
            tracing::warn!(job_id = %job_id, "media download job not found");
            return Ok(());
        };
        if job.status == "completed" {
            return Ok(());
        }

        let temp_root = PathBuf::from(&self.config.uploads.upload_dir)
            .join("_media_tmp")
            .join(&job.user_id);
        tokio::fs::create_dir_all(&temp_root).await?;
        let temp_output = temp_root.join(format!("{}.mp4", job.id));

        let result = self.run_pipeline(&job, &temp_output).await;
        if let Err(err) = &result {
            tracing::error!(job_id = %job.id, error = %err, "media download job failed");
            self.mark_failed(&job.id, "download_failed", &err.detail())
                .await;
        }
        // Temp cleanup on every exit path.
        if temp_output.exists() {
            let _ = tokio::fs::remove_file(&temp_output).await;
        }
        Ok(())
    }

    async fn run_pipeline(&self, job: &MediaDownloadJob, temp_output: &Path) -> Result<()> {
        sqlx::query(
            "UPDATE media_download_jobs SET status = 'downloading', progress = 20, attempts = attempts + 1, error_code = NULL, error_message = NULL WHERE id = $1",
        )
        .bind(&job.id)
        .execute(&self.pool)
        .await?;

        let downloaded_path = video::download_video(&job.source_url, temp_output).await?;
        if !downloaded_path.exists() {
            return Err(AppError::internal(anyhow::anyhow!(
                "Downloaded media file missing after downloader completed."
            )));
        }

        self.update_progress(&job.id, "processing", 65).await?;
        let duration_seconds = video::get_video_duration_seconds(&downloaded_path).await;
        let file_size_bytes = tokio::fs::metadata(&downloaded_path).await?.len() as i64;

        let final_dir = PathBuf::from(&self.config.uploads.upload_dir).join(&job.user_id);
        tokio::fs::create_dir_all(&final_dir).await?;
        let suffix = downloaded_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_else(|| ".mp4".to_string());
        let final_name = safe_filename(&format!("{}{}", job.id, suffix));
        let final_path = final_dir.join(&final_name);
        tokio::fs::rename(&downloaded_path, &final_path).await?;

        let mime = guess_mime(&final_path);
        let completion = self
            .materialize(job, &final_path, &final_name, file_size_bytes, mime, duration_seconds)
            .await;
        if completion.is_err() && final_path.exists() {
            let _ = tokio::fs::remove_file(&final_path).await;
        }
        completion
    }

    /// Atomically create the Upload + MediaAsset and link both onto the job.
    async fn materialize(
        &self,
        job: &MediaDownloadJob,
        final_path: &Path,
        final_name: &str,
        file_size_bytes: i64,
        mime: &str,
        duration_seconds: i64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let upload_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO uploads (id, user_id, file_url, file_type, original_filename, file_size_bytes, mime_type)
            VALUES ($1, $2, $3, 'video', $4, $5, $6)
            "#,
        )
        .bind(&upload_id)
        .bind(&job.user_id)
        .bind(final_path.to_string_lossy().as_ref())
        .bind(final_name)
        .bind(file_size_bytes)
        .bind(mime)
        .execute(&mut *tx)
        .await?;

        let media_asset_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO media_assets (
                id, user_id, platform, source_url, file_path, file_name,
                file_size_bytes, mime_type, duration_seconds, transcript_status, upload_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10)
            "#,
        )
        .bind(&media_asset_id)
        .bind(&job.user_id)
        .bind(&job.platform)
        .bind(&job.source_url)
        .bind(final_path.to_string_lossy().as_ref())
        .bind(final_name)
        .bind(file_size_bytes)
        .bind(mime)
        .bind(duration_seconds.max(0) as i32)
        .bind(&upload_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE media_download_jobs
            SET status = 'completed', progress = 100, error_code = NULL, error_message = NULL,
                media_asset_id = $2, upload_id = $3, completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(&job.id)
        .bind(&media_asset_id)
        .bind(&upload_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(job_id = %job.id, upload_id = %upload_id, "media download job completed");
        Ok(())
    }

    /// Record the latest download job onto the item's open media_meta
    /// mapping (bounded job-id history).
    pub async fn stamp_item_download(
        &self,
        item_id: &str,
        media_meta: &serde_json::Value,
        job_id: &str,
    ) -> Result<()> {
        let mut meta = match media_meta {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        let mut history: Vec<serde_json::Value> = meta
            .get("feed_download_job_ids")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        history.push(serde_json::json!(job_id));
        let history: Vec<serde_json::Value> = history
            .into_iter()
            .rev()
            .take(20)
            .rev()
            .collect();

        meta.insert("feed_download_job_id".into(), serde_json::json!(job_id));
        meta.insert("feed_download_job_ids".into(), serde_json::json!(history));
        meta.insert(
            "feed_download_updated_at".into(),
            serde_json::json!(Utc::now().to_rfc3339()),
        );

        sqlx::query("UPDATE research_items SET media_meta_json = $2 WHERE id = $1")
            .bind(item_id)
            .bind(serde_json::Value::Object(meta))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Queue adapter: the worker never raises to the queue runtime for domain
/// failures; it writes them onto the job row.
pub struct MediaJobHandler {
    pub service: MediaService,
}

#[async_trait::async_trait]
impl JobHandler for MediaJobHandler {
    async fn handle(&self, job: &QueueJob) -> anyhow::Result<()> {
        let Some(job_id) = job.payload.get("job_id").and_then(|v| v.as_str()) else {
            tracing::warn!("media queue job missing job_id payload");
            return Ok(());
        };
        if let Err(err) = self.service.process_job(job_id).await {
            tracing::error!(job_id = %job_id, error = %err, "media job pipeline errored");
        }
        Ok(())
    }
}

/// Startup recovery: mark long-stalled in-flight jobs failed.
pub async fn recover_stalled_media_jobs(pool: &PgPool, max_age_minutes: i64) -> Result<u64> {
    let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::minutes(max_age_minutes.max(1));
    let result = sqlx::query(
        r#"
        UPDATE media_download_jobs
        SET status = 'failed', error_code = 'stalled',
            error_message = 'Media download was interrupted. Re-run download from workspace.',
            completed_at = now(), progress = GREATEST(progress, 5)
        WHERE status IN ('queued', 'downloading', 'processing') AND created_at < $1
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
    fn filenames_are_sanitized() {
        assert_eq!(safe_filename("clip final (1).mp4"), "clip_final__1_.mp4");
        assert_eq!(safe_filename("../../etc/passwd"), "passwd");
        assert_eq!(safe_filename("ok-name_2.webm"), "ok-name_2.webm");
        assert_eq!(safe_filename(""), "download.mp4");
    }

    #[test]
    fn mime_guessed_from_extension() {
        assert_eq!(guess_mime(Path::new("a.webm")), "video/webm");
        assert_eq!(guess_mime(Path::new("a.mov")), "video/quicktime");
        assert_eq!(guess_mime(Path::new("a.unknown")), "video/mp4");
    }

    #[test]
    fn stale_sweep_ignores_missing_root() {
        sweep_stale_uploads("/nonexistent/upload/root", 1);
    }
}
