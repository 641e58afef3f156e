//! Audit job runner.
//!
//! State machine per audit:
//! pending(0) -> downloading(10) -> processing_video(30) ->
//! processing_audio(50) -> analyzing(70) -> completed(100) | failed.
//! Progress persists before each stage runs; the scratch directory is
//! cleaned on every exit path.

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::{Audit, Platform, RetentionPoint, Upload};
use crate::services::job_queue::{JobHandler, JobQueueService, QueueJob, AUDIT_QUEUE};
use crate::services::multimodal::{audio, llm, video, LlmClient};
use crate::services::optimizer::scoring::OptionalMetrics;
use crate::services::optimizer::{OptimizerService, ScriptEvaluation};

const FRAME_INTERVAL_SECONDS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSourceMode {
    Url,
    Upload,
}

impl AuditSourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSourceMode::Url => "url",
            AuditSourceMode::Upload => "upload",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "url" => Ok(AuditSourceMode::Url),
            "upload" => Ok(AuditSourceMode::Upload),
            _ => Err(AppError::bad_request("source_mode must be url or upload")),
        }
    }
}

#[derive(Clone)]
pub struct AuditService {
    pool: PgPool,
    config: Arc<AppConfig>,
    llm: LlmClient,
    optimizer: OptimizerService,
    queue: Arc<JobQueueService>,
}

impl AuditService {
    pub fn new(
        pool: PgPool,
        config: Arc<AppConfig>,
        llm: LlmClient,
        optimizer: OptimizerService,
        queue: Arc<JobQueueService>,
    ) -> Self {
        Self {
            pool,
            config,
            llm,
            optimizer,
            queue,
        }
    }

    pub async fn create_audit(&self, user_id: &str, input_json: serde_json::Value) -> Result<Audit> {
        let audit = sqlx::query_as::<_, Audit>(
            r#"
            INSERT INTO audits (id, user_id, status, progress, input_json)
            VALUES ($1, $2, 'pending', '0', $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(&input_json)
        .fetch_one(&self.pool)
        .await?;
        Ok(audit)
    }

    /// Hand the audit to the durable queue. Enqueue failures surface as
    /// ServiceUnavailable and leave the row for the caller to fail/refund.
    pub async fn enqueue_audit(&self, audit_id: &str) -> Result<String> {
        self.queue
            .enqueue(
                AUDIT_QUEUE,
                &format!("audit:{}", audit_id),
                json!({ "audit_id": audit_id }),
            )
            .await
            .map_err(|err| {
                AppError::ServiceUnavailable(format!(
                    "Audit queue unavailable. Try again shortly. ({})",
                    err.detail()
                ))
            })
    }

    pub async fn mark_enqueue_failed(&self, audit_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE audits SET status = 'failed', error_message = 'Could not enqueue audit job. Check queue/worker availability.' WHERE id = $1",
        )
        .bind(audit_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_audit(&self, user_id: &str, audit_id: &str) -> Result<Audit> {
        sqlx::query_as::<_, Audit>("SELECT * FROM audits WHERE id = $1 AND user_id = $2")
            .bind(audit_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Audit"))
    }

    pub async fn list_audits(&self, user_id: &str, limit: i64) -> Result<Vec<Audit>> {
        let rows = sqlx::query_as::<_, Audit>(
            "SELECT * FROM audits WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn latest_completed(&self, user_id: &str) -> Result<Option<Audit>> {
        let row = sqlx::query_as::<_, Audit>(
            "SELECT * FROM audits WHERE user_id = $1 AND status = 'completed' ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn resolve_upload(&self, user_id: &str, upload_id: &str) -> Result<Upload> {
        let upload = sqlx::query_as::<_, Upload>(
            "SELECT * FROM uploads WHERE id = $1 AND user_id = $2 AND file_type = 'video'",
        )
        .bind(upload_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Upload"))?;
        if !PathBuf::from(&upload.file_url).exists() {
            return Err(AppError::not_found("Uploaded file on disk"));
        }
        Ok(upload)
    }

    async fn set_stage(&self, audit_id: &str, status: &str, progress: &str) -> Result<()> {
        sqlx::query("UPDATE audits SET status = $2, progress = $3 WHERE id = $1")
            .bind(audit_id)
            .bind(status)
            .bind(progress)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, audit_id: &str, message: &str) {
        let message: String = message.chars().take(1000).collect();
        let result = sqlx::query(
            "UPDATE audits SET status = 'failed', error_message = $2, completed_at = now() WHERE id = $1",
        )
        .bind(audit_id)
        .bind(message)
        .execute(&self.pool)
        .await;
        if let Err(err) = result {
            tracing::error!(audit_id = %audit_id, error = %err, "could not persist audit failure");
        }
    }

    /// Worker body. Duplicate deliveries for the same audit id are no-ops
    /// once the row has completed.
    pub async fn process_audit(&self, audit_id: &str) -> Result<()> {
        let audit = sqlx::query_as::<_, Audit>("SELECT * FROM audits WHERE id = $1")
            .bind(audit_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(audit) = audit else {
            tracing::warn!(audit_id = %audit_id, "audit not found for processing");
            return Ok(());
        };
        if audit.status == "completed" {
            return Ok(());
        }

        let scratch_dir = PathBuf::from(&self.config.uploads.upload_dir)
            .join("_audit_scratch")
            .join(&audit.id);

        let outcome = self.run_pipeline(&audit, &scratch_dir).await;
        if let Err(err) = &outcome {
            tracing::error!(audit_id = %audit.id, error = %err, "audit failed");
            self.mark_failed(&audit.id, &err.detail()).await;
        }
        if scratch_dir.exists() {
            if let Err(err) = tokio::fs::remove_dir_all(&scratch_dir).await {
                tracing::warn!(path = %scratch_dir.display(), error = %err, "could not clean audit scratch dir");
            }
        }
        Ok(())
    }

    async fn run_pipeline(&self, audit: &Audit, scratch_dir: &PathBuf) -> Result<()> {
        let input = &audit.input_json;
        let source_mode = AuditSourceMode::parse(
            input
                .get("source_mode")
                .and_then(|v| v.as_str())
                .unwrap_or("url"),
        )?;
        let platform = Platform::parse_or_default(input.get("platform").and_then(|v| v.as_str()))?;

        tokio::fs::create_dir_all(scratch_dir).await?;
        let frames_dir = scratch_dir.join("frames");
        let audio_path = scratch_dir.join("audio.mp3");

        // 1. Resolve the playable file.
        self.set_stage(&audit.id, "downloading", "10").await?;
        let video_path = match source_mode {
            AuditSourceMode::Url => {
                let url = audit
                    .input_str("video_url")
                    .ok_or_else(|| AppError::bad_request("video_url missing from audit input"))?;
                let target = scratch_dir.join("video.mp4");
                video::download_video(&url, &target).await?
            }
            AuditSourceMode::Upload => {
                let upload_path = audit
                    .input_str("upload_path")
                    .or_else(|| audit.input_str("upload_id"))
                    .ok_or_else(|| AppError::bad_request("upload reference missing from audit input"))?;
                let path = if PathBuf::from(&upload_path).exists() {
                    PathBuf::from(upload_path)
                } else {
                    // upload_id stored instead of a raw path
                    let upload = self.resolve_upload(&audit.user_id, &upload_path).await?;
                    PathBuf::from(upload.file_url)
                };
                path
            }
        };

        // 2. Frames at a fixed cadence.
        self.set_stage(&audit.id, "processing_video", "30").await?;
        let frames = video::extract_frames(&video_path, &frames_dir, FRAME_INTERVAL_SECONDS).await?;
        tracing::info!(audit_id = %audit.id, frame_count = frames.len(), "extracted frames");

        // 3. Audio + transcription.
        self.set_stage(&audit.id, "processing_audio", "50").await?;
        audio::extract_audio(&video_path, &audio_path).await?;
        let transcript = audio::transcribe_audio(&self.llm, &audio_path).await?;

        // 4. Multimodal analysis.
        self.set_stage(&audit.id, "analyzing", "70").await?;
        let title = audit
            .input_str("upload_file_name")
            .or_else(|| audit.input_str("video_url"))
            .unwrap_or_else(|| "Unknown Video".to_string());
        let analysis =
            llm::analyze_content(&self.llm, &frames, &transcript, &audit.id, &title).await?;

        // 5. Performance prediction over the real transcript + analysis.
        let duration_s = {
            let probed = video::get_video_duration_seconds(&video_path).await;
            if probed > 0 {
                probed
            } else {
                transcript
                    .segments
                    .last()
                    .map(|segment| segment.end.ceil() as i64)
                    .unwrap_or(0)
                    .max(1)
            }
        };
        let retention_points = parse_retention_points(input.get("retention_points"));
        let optional_metrics = input
            .get("platform_metrics")
            .and_then(|v| serde_json::from_value::<OptionalMetrics>(v.clone()).ok())
            .unwrap_or_default();
        let prediction = self
            .optimizer
            .predict_performance(
                &audit.user_id,
                platform,
                &transcript,
                analysis.clone(),
                duration_s,
                &retention_points,
                &optional_metrics,
            )
            .await?;

        // 6. Persist the final bundle.
        let output = json!({
            "diagnosis": input.get("diagnosis").cloned().unwrap_or(json!({})),
            "video_analysis": analysis,
            "performance_prediction": prediction_payload(platform, &prediction),
        });
        sqlx::query(
            "UPDATE audits SET status = 'completed', progress = '100', output_json = $2, error_message = NULL, completed_at = now() WHERE id = $1",
        )
        .bind(&audit.id)
        .bind(&output)
        .execute(&self.pool)
        .await?;

        if self.config.uploads.delete_upload_after_audit && source_mode == AuditSourceMode::Upload {
            let _ = tokio::fs::remove_file(&video_path).await;
        }

        tracing::info!(audit_id = %audit.id, "audit completed");
        Ok(())
    }
}

fn parse_retention_points(value: Option<&serde_json::Value>) -> Vec<RetentionPoint> {
    value
        .and_then(|v| v.as_array())
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let time = row.get("time")?.as_f64()?;
                    let retention = row.get("retention")?.as_f64()?;
                    (time >= 0.0 && retention >= 0.0).then_some(RetentionPoint { time, retention })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Shape of `output_json.performance_prediction` consumed by the report.
pub fn prediction_payload(platform: Platform, evaluation: &ScriptEvaluation) -> serde_json::Value {
    json!({
        "platform": platform.as_str(),
        "format_type": evaluation.format_type,
        "duration_seconds": evaluation.duration_seconds,
        "platform_metrics": &evaluation.platform_metrics,
        "competitor_metrics": &evaluation.competitor_metrics,
        "historical_metrics": &evaluation.historical_metrics,
        "combined_metrics": {
            "score": evaluation.combined_score,
            "confidence": &evaluation.combined_confidence,
            "weights": &evaluation.weights,
        },
        "next_actions": &evaluation.next_actions,
    })
}

pub struct AuditJobHandler {
    pub service: AuditService,
}

#[async_trait::async_trait]
impl JobHandler for AuditJobHandler {
    async fn handle(&self, job: &QueueJob) -> anyhow::Result<()> {
        let Some(audit_id) = job.payload.get("audit_id").and_then(|v| v.as_str()) else {
            tracing::warn!("audit queue job missing audit_id payload");
            return Ok(());
        };
        if let Err(err) = self.service.process_audit(audit_id).await {
            tracing::error!(audit_id = %audit_id, error = %err, "audit pipeline errored");
        }
        Ok(())
    }
}

/// Startup recovery: stale in-flight audits become failed.
pub async fn recover_stalled_audits(pool: &PgPool, max_age_minutes: i64) -> Result<u64> {
    let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::minutes(max_age_minutes.max(1));
    let result = sqlx::query(
        r#"
        UPDATE audits
        SET status = 'failed',
            error_message = 'Audit execution was interrupted. Re-run the audit from workspace.',
            completed_at = now()
        WHERE status IN ('pending', 'downloading', 'processing_video', 'processing_audio', 'analyzing')
          AND created_at < $1
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
    fn source_mode_parses() {
        assert_eq!(AuditSourceMode::parse("url").unwrap(), AuditSourceMode::Url);
        assert_eq!(
            AuditSourceMode::parse("Upload").unwrap(),
            AuditSourceMode::Upload
        );
        assert!(AuditSourceMode::parse("ftp").is_err());
    }

    #[test]
    fn retention_points_drop_negatives() {
        let raw = json!([
            {"time": 0.0, "retention": 100.0},
            {"time": -1.0, "retention": 50.0},
            {"time": 10.0, "retention": -2.0},
            {"time": 30.0, "retention": 62.0},
        ]);
        let points = parse_retention_points(Some(&raw));
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].retention, 62.0);
    }
}
