//! Per-item loop stages: bulk downloads, transcripts, the variant loop,
//! the audit loop, and the stage-completion summary.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{Audit, DraftSnapshot, MediaDownloadJob, Platform, ResearchItem, Upload};
use crate::services::optimizer::GenerateVariantsParams;

use super::discovery::{extract_topic_keywords, project_item};
use super::repost::RepostPackagePayload;
use super::{FeedService, TelemetryDetails};

#[derive(Debug, Clone, Serialize)]
pub struct BulkJobRow {
    pub item_id: String,
    pub job_id: Option<String>,
    pub status: String,
    pub queue_job_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkJobReport {
    pub submitted_count: usize,
    pub queued_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub jobs: Vec<BulkJobRow>,
}

fn summarize(rows: Vec<BulkJobRow>, submitted: usize) -> BulkJobReport {
    let queued_count = rows.iter().filter(|row| row.status == "queued").count();
    let failed_count = rows.iter().filter(|row| row.status == "failed").count();
    let skipped_count = rows.iter().filter(|row| row.status == "skipped").count();
    BulkJobReport {
        submitted_count: submitted,
        queued_count,
        failed_count,
        skipped_count,
        jobs: rows,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopSummary {
    pub source_item_id: String,
    pub source_item: super::discovery::FeedItemPayload,
    pub latest_repost_package: Option<RepostPackagePayload>,
    pub latest_draft_snapshot: Option<serde_json::Value>,
    pub latest_audit: Option<serde_json::Value>,
    pub stage_completion: StageCompletion,
    pub next_step: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageCompletion {
    pub discovered: bool,
    pub packaged: bool,
    pub scripted: bool,
    pub audited: bool,
    pub reported: bool,
}

/// First unmet stage's prescribed action.
pub fn next_step_for(stages: &StageCompletion) -> &'static str {
    if !stages.packaged {
        "Generate a repost package."
    } else if !stages.scripted {
        "Generate AI variants and save a draft snapshot."
    } else if !stages.audited {
        "Run feed loop audit from downloaded upload."
    } else if !stages.reported {
        "Wait for audit completion and open report."
    } else {
        "Log post outcomes to continue calibration."
    }
}

pub fn infer_loop_topic(item: &ResearchItem) -> String {
    let blob = [
        item.title.as_deref().unwrap_or_default(),
        item.caption.as_deref().unwrap_or_default(),
        item.media_meta_str("transcript_text")
            .unwrap_or_default()
            .as_str(),
    ]
    .join(" ");
    let tokens = extract_topic_keywords(&blob, 5);
    if !tokens.is_empty() {
        return tokens.into_iter().take(3).collect::<Vec<_>>().join(" ");
    }
    item.title
        .as_deref()
        .map(|title| title.trim().chars().take(90).collect::<String>())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| "content strategy".to_string())
}

pub fn infer_loop_audience(item: &ResearchItem) -> String {
    let handle = item
        .creator_handle
        .as_deref()
        .unwrap_or_default()
        .trim()
        .trim_start_matches('@');
    if handle.is_empty() {
        "solo creators".to_string()
    } else {
        format!("creators similar to {handle}")
    }
}

pub fn infer_loop_objective(item: &ResearchItem) -> String {
    let metrics = item.metrics();
    if metrics.shares + metrics.saves > metrics.comments {
        "increase shares and saves".to_string()
    } else {
        "increase watch retention and comments".to_string()
    }
}

impl FeedService {
    /// Queue a media download per item. Items with no absolute URL are
    /// skipped; queue handoff failures surface per-row.
    pub async fn start_bulk_download(
        &self,
        user_id: &str,
        item_ids: &[String],
    ) -> Result<BulkJobReport> {
        self.assert_research_enabled()?;
        if !self.config().features.allow_external_media_download {
            return Err(AppError::FeatureDisabled(
                "External media download is disabled. Set ALLOW_EXTERNAL_MEDIA_DOWNLOAD=true or use upload mode."
                    .to_string(),
            ));
        }
        let unique_ids = super::clean_ids(item_ids);
        if unique_ids.is_empty() {
            return Err(AppError::bad_request("item_ids must include at least one id."));
        }

        let items = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE user_id = $1 AND id = ANY($2)",
        )
        .bind(user_id)
        .bind(&unique_ids)
        .fetch_all(self.pool())
        .await?;
        let by_id: std::collections::HashMap<String, &ResearchItem> =
            items.iter().map(|item| (item.id.clone(), item)).collect();

        let mut rows = Vec::with_capacity(unique_ids.len());
        for item_id in &unique_ids {
            let Some(item) = by_id.get(item_id) else {
                rows.push(BulkJobRow {
                    item_id: item_id.clone(),
                    job_id: None,
                    status: "skipped".to_string(),
                    queue_job_id: None,
                    error_code: Some("item_not_found".to_string()),
                    error_message: Some("Feed item not found.".to_string()),
                });
                continue;
            };
            let source_url = item.url.as_deref().unwrap_or_default().trim().to_string();
            if !source_url.starts_with("http://") && !source_url.starts_with("https://") {
                rows.push(BulkJobRow {
                    item_id: item.id.clone(),
                    job_id: None,
                    status: "skipped".to_string(),
                    queue_job_id: None,
                    error_code: Some("missing_source_url".to_string()),
                    error_message: Some(
                        "Feed item must include an absolute source URL to download.".to_string(),
                    ),
                });
                continue;
            }

            let platform = Platform::parse(&item.platform)?;
            match self.media().enqueue_download(user_id, platform, &source_url).await {
                Ok(job) => {
                    self.media()
                        .stamp_item_download(&item.id, &item.media_meta_json, &job.id)
                        .await?;
                    rows.push(BulkJobRow {
                        item_id: item.id.clone(),
                        job_id: Some(job.id.clone()),
                        status: job.status,
                        queue_job_id: job.queue_job_id,
                        error_code: None,
                        error_message: None,
                    });
                }
                Err(err) => {
                    rows.push(BulkJobRow {
                        item_id: item.id.clone(),
                        job_id: None,
                        status: "failed".to_string(),
                        queue_job_id: None,
                        error_code: Some("queue_unavailable".to_string()),
                        error_message: Some(err.detail()),
                    });
                }
            }
        }

        let report = summarize(rows, unique_ids.len());
        self.telemetry()
            .record(
                user_id,
                "feed_download_bulk_start",
                if report.failed_count == 0 { "ok" } else { "partial" },
                TelemetryDetails {
                    platform: None,
                    source_item_id: None,
                    details: Some(json!({
                        "submitted_count": report.submitted_count,
                        "queued_count": report.queued_count,
                        "failed_count": report.failed_count,
                        "skipped_count": report.skipped_count,
                    })),
                },
            )
            .await;
        Ok(report)
    }

    pub async fn bulk_download_status(
        &self,
        user_id: &str,
        job_ids: &[String],
    ) -> Result<serde_json::Value> {
        self.assert_research_enabled()?;
        let unique_ids = super::clean_ids(job_ids);
        if unique_ids.is_empty() {
            return Err(AppError::bad_request("job_ids must include at least one id."));
        }
        let jobs = self.media().get_jobs(user_id, &unique_ids).await?;
        let by_id: std::collections::HashMap<String, &MediaDownloadJob> =
            jobs.iter().map(|job| (job.id.clone(), job)).collect();

        let payload_jobs: Vec<serde_json::Value> = unique_ids
            .iter()
            .map(|job_id| match by_id.get(job_id) {
                Some(job) => json!({
                    "job_id": &job.id,
                    "status": &job.status,
                    "progress": job.progress,
                    "queue_job_id": &job.queue_job_id,
                    "media_asset_id": &job.media_asset_id,
                    "upload_id": &job.upload_id,
                    "error_code": &job.error_code,
                    "error_message": &job.error_message,
                }),
                None => json!({
                    "job_id": job_id,
                    "status": "missing",
                    "progress": 0,
                    "queue_job_id": null,
                    "media_asset_id": null,
                    "upload_id": null,
                    "error_code": "not_found",
                    "error_message": "Job not found.",
                }),
            })
            .collect();
        let failed_count = payload_jobs
            .iter()
            .filter(|row| row["status"] == "failed")
            .count();

        self.telemetry()
            .record(
                user_id,
                "feed_download_status_poll",
                if failed_count == 0 { "ok" } else { "partial" },
                TelemetryDetails {
                    platform: None,
                    source_item_id: None,
                    details: Some(json!({
                        "requested_count": unique_ids.len(),
                        "failed_count": failed_count,
                    })),
                },
            )
            .await;
        Ok(json!({
            "requested_count": unique_ids.len(),
            "jobs": payload_jobs,
        }))
    }

    pub async fn start_bulk_transcripts(
        &self,
        user_id: &str,
        item_ids: &[String],
    ) -> Result<BulkJobReport> {
        self.assert_research_enabled()?;
        let unique_ids = super::clean_ids(item_ids);
        if unique_ids.is_empty() {
            return Err(AppError::bad_request("item_ids must include at least one id."));
        }

        let items = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE user_id = $1 AND id = ANY($2)",
        )
        .bind(user_id)
        .bind(&unique_ids)
        .fetch_all(self.pool())
        .await?;
        let by_id: std::collections::HashMap<String, &ResearchItem> =
            items.iter().map(|item| (item.id.clone(), item)).collect();

        let mut rows = Vec::with_capacity(unique_ids.len());
        for item_id in &unique_ids {
            let Some(item) = by_id.get(item_id) else {
                rows.push(BulkJobRow {
                    item_id: item_id.clone(),
                    job_id: None,
                    status: "skipped".to_string(),
                    queue_job_id: None,
                    error_code: Some("item_not_found".to_string()),
                    error_message: Some("Feed item not found.".to_string()),
                });
                continue;
            };

            let job = self.transcripts().enqueue_job(user_id, item).await?;
            let mut meta = item.media_meta();
            meta.insert("transcript_job_id".into(), json!(job.id));
            meta.insert(
                "transcript_job_updated_at".into(),
                json!(Utc::now().to_rfc3339()),
            );
            sqlx::query("UPDATE research_items SET media_meta_json = $2 WHERE id = $1")
                .bind(&item.id)
                .bind(serde_json::Value::Object(meta))
                .execute(self.pool())
                .await?;

            rows.push(BulkJobRow {
                item_id: item.id.clone(),
                job_id: Some(job.id.clone()),
                status: job.status.clone(),
                queue_job_id: job.queue_job_id.clone(),
                error_code: job.error_code.clone(),
                error_message: job.error_message.clone(),
            });
        }

        let report = summarize(rows, unique_ids.len());
        self.telemetry()
            .record(
                user_id,
                "feed_transcript_bulk_start",
                if report.failed_count == 0 { "ok" } else { "partial" },
                TelemetryDetails {
                    platform: None,
                    source_item_id: None,
                    details: Some(json!({
                        "submitted_count": report.submitted_count,
                        "queued_count": report.queued_count,
                        "failed_count": report.failed_count,
                        "skipped_count": report.skipped_count,
                    })),
                },
            )
            .await;
        Ok(report)
    }

    pub async fn bulk_transcript_status(
        &self,
        user_id: &str,
        job_ids: &[String],
    ) -> Result<serde_json::Value> {
        self.assert_research_enabled()?;
        let unique_ids = super::clean_ids(job_ids);
        if unique_ids.is_empty() {
            return Err(AppError::bad_request("job_ids must include at least one id."));
        }
        let jobs = self.transcripts().get_jobs(user_id, &unique_ids).await?;
        let by_id: std::collections::HashMap<String, _> =
            jobs.iter().map(|job| (job.id.clone(), job)).collect();

        let payload_jobs: Vec<serde_json::Value> = unique_ids
            .iter()
            .map(|job_id| match by_id.get(job_id) {
                Some(job) => json!({
                    "job_id": &job.id,
                    "status": &job.status,
                    "progress": job.progress,
                    "queue_job_id": &job.queue_job_id,
                    "item_id": &job.research_item_id,
                    "transcript_source": &job.transcript_source,
                    "transcript_preview": job.transcript_text.as_deref().map(|text| {
                        text.chars().take(180).collect::<String>()
                    }),
                    "error_code": &job.error_code,
                    "error_message": &job.error_message,
                }),
                None => json!({
                    "job_id": job_id,
                    "status": "missing",
                    "progress": 0,
                    "queue_job_id": null,
                    "item_id": null,
                    "transcript_source": null,
                    "transcript_preview": null,
                    "error_code": "not_found",
                    "error_message": "Job not found.",
                }),
            })
            .collect();
        let failed_count = payload_jobs
            .iter()
            .filter(|row| row["status"] == "failed")
            .count();

        self.telemetry()
            .record(
                user_id,
                "feed_transcript_status_poll",
                if failed_count == 0 { "ok" } else { "partial" },
                TelemetryDetails {
                    platform: None,
                    source_item_id: None,
                    details: Some(json!({
                        "requested_count": unique_ids.len(),
                        "failed_count": failed_count,
                    })),
                },
            )
            .await;
        Ok(json!({
            "requested_count": unique_ids.len(),
            "jobs": payload_jobs,
        }))
    }

    /// Stage 3: debit credits, infer brief fields from the item, delegate
    /// to the optimizer, fingerprint media_meta.
    pub async fn loop_variant_generate(
        &self,
        user_id: &str,
        source_item_id: &str,
        overrides: GenerateVariantsParams,
    ) -> Result<serde_json::Value> {
        self.assert_research_enabled()?;
        let item = self.resolve_source_item(user_id, source_item_id).await?;

        let platform = match overrides.platform.as_deref() {
            Some(platform) if !platform.trim().is_empty() => Platform::parse(platform)?,
            _ => Platform::parse(&item.platform)?,
        };
        let topic = overrides
            .topic
            .trim()
            .is_empty()
            .then(|| infer_loop_topic(&item))
            .unwrap_or_else(|| overrides.topic.trim().to_string());
        let audience = overrides
            .audience
            .clone()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| infer_loop_audience(&item));
        let objective = overrides
            .objective
            .clone()
            .filter(|o| !o.trim().is_empty())
            .unwrap_or_else(|| infer_loop_objective(&item));

        let cost = self.credits().costs().cost_optimizer_variants;
        let charge = self
            .credits()
            .consume(
                user_id,
                cost,
                "Feed loop variant generation",
                Some("feed_loop_variant_generate"),
                Some(source_item_id),
            )
            .await?;

        let params = GenerateVariantsParams {
            topic: topic.clone(),
            audience: Some(audience.clone()),
            objective: Some(objective.clone()),
            tone: overrides.tone.clone(),
            platform: Some(platform.as_str().to_string()),
            duration_s: overrides.duration_s,
            source_item_id: Some(source_item_id.to_string()),
            source_context_note: overrides.source_context_note.clone(),
            generation_mode: overrides.generation_mode.clone(),
            hook_style: overrides.hook_style.clone(),
            cta_style: overrides.cta_style.clone(),
            pacing_density: overrides.pacing_density.clone(),
        };
        let result = self.optimizer().generate_variants(user_id, params).await?;

        let mut meta = item.media_meta();
        meta.insert(
            "loop_last_variant_batch_at".into(),
            json!(Utc::now().to_rfc3339()),
        );
        meta.insert(
            "loop_last_variant_count".into(),
            json!(result.variants.len()),
        );
        sqlx::query("UPDATE research_items SET media_meta_json = $2 WHERE id = $1")
            .bind(&item.id)
            .bind(serde_json::Value::Object(meta))
            .execute(self.pool())
            .await?;

        self.telemetry()
            .record(
                user_id,
                "feed_loop_variant_generate",
                "ok",
                TelemetryDetails {
                    platform: Some(platform.as_str().to_string()),
                    source_item_id: Some(source_item_id.to_string()),
                    details: Some(json!({
                        "variant_count": result.variants.len(),
                        "used_fallback": result.generation.used_fallback,
                        "charged": charge.charged,
                    })),
                },
            )
            .await;

        Ok(json!({
            "source_item_id": source_item_id,
            "platform": platform.as_str(),
            "topic": topic,
            "audience": audience,
            "objective": objective,
            "optimizer": result,
            "credits": charge,
        }))
    }

    /// Resolve the completed download backing an item's audit. Prefers the
    /// stamped feed_download_job_id, else the latest job on the same URL.
    async fn resolve_source_upload(
        &self,
        user_id: &str,
        item: &ResearchItem,
    ) -> Result<(Upload, String)> {
        let mut candidates: Vec<MediaDownloadJob> = Vec::new();
        if let Some(job_id) = item.media_meta_str("feed_download_job_id") {
            if let Some(job) = sqlx::query_as::<_, MediaDownloadJob>(
                "SELECT * FROM media_download_jobs WHERE id = $1 AND user_id = $2",
            )
            .bind(&job_id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?
            {
                candidates.push(job);
            }
        }
        if candidates.is_empty() {
            if let Some(url) = item.url.as_deref() {
                let rows = sqlx::query_as::<_, MediaDownloadJob>(
                    "SELECT * FROM media_download_jobs WHERE user_id = $1 AND source_url = $2 ORDER BY created_at DESC",
                )
                .bind(user_id)
                .bind(url)
                .fetch_all(self.pool())
                .await?;
                candidates.extend(rows);
            }
        }
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let (selected_job_id, upload_id) = candidates
            .into_iter()
            .find_map(|job| {
                if job.status != "completed" {
                    return None;
                }
                job.upload_id.clone().map(|upload_id| (job.id, upload_id))
            })
            .ok_or_else(|| {
                AppError::Conflict(
                    "No completed feed download found for this item. Run /feed/download/bulk and wait for completion before starting audit."
                        .to_string(),
                )
            })?;

        let upload = sqlx::query_as::<_, Upload>(
            "SELECT * FROM uploads WHERE id = $1 AND user_id = $2 AND file_type = 'video'",
        )
        .bind(&upload_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::not_found("Upload for feed download"))?;
        if !std::path::Path::new(&upload.file_url).exists() {
            return Err(AppError::not_found("Downloaded upload file on disk"));
        }
        Ok((upload, selected_job_id))
    }

    /// Stage 4: debit credits, create the pending audit against the
    /// upload, enqueue, and refund on handoff failure.
    pub async fn loop_audit(
        &self,
        user_id: &str,
        source_item_id: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.assert_research_enabled()?;
        let item = self.resolve_source_item(user_id, source_item_id).await?;
        let (upload, download_job_id) = self.resolve_source_upload(user_id, &item).await?;

        let platform = match payload.get("platform").and_then(|v| v.as_str()) {
            Some(platform) if !platform.trim().is_empty() => Platform::parse(platform)?,
            _ => Platform::parse(&item.platform)?,
        };

        let cost = self.credits().costs().cost_audit_run;
        let charge = self
            .credits()
            .consume(
                user_id,
                cost,
                "Feed loop audit run",
                Some("feed_loop_audit"),
                Some(source_item_id),
            )
            .await?;

        let input_json = json!({
            "source_mode": "upload",
            "platform": platform.as_str(),
            "video_url": null,
            "upload_id": &upload.id,
            "upload_path": &upload.file_url,
            "upload_file_name": &upload.original_filename,
            "source_item_id": source_item_id,
            "feed_download_job_id": download_job_id,
            "draft_snapshot_id": payload.get("draft_snapshot_id").cloned(),
            "repost_package_id": payload.get("repost_package_id").cloned(),
            "retention_points": payload.get("retention_points").cloned().unwrap_or(json!([])),
            "platform_metrics": payload.get("platform_metrics").cloned(),
        });
        let audit = self.audits().create_audit(user_id, input_json).await?;

        match self.audits().enqueue_audit(&audit.id).await {
            Ok(queue_job_id) => {
                sqlx::query(
                    "UPDATE audits SET input_json = input_json || $2 WHERE id = $1",
                )
                .bind(&audit.id)
                .bind(json!({ "queue_job_id": queue_job_id }))
                .execute(self.pool())
                .await?;

                let mut meta = item.media_meta();
                meta.insert("loop_last_audit_id".into(), json!(audit.id.clone()));
                meta.insert("loop_last_audit_at".into(), json!(Utc::now().to_rfc3339()));
                sqlx::query("UPDATE research_items SET media_meta_json = $2 WHERE id = $1")
                    .bind(&item.id)
                    .bind(serde_json::Value::Object(meta))
                    .execute(self.pool())
                    .await?;

                self.telemetry()
                    .record(
                        user_id,
                        "feed_loop_audit_start",
                        "ok",
                        TelemetryDetails {
                            platform: Some(platform.as_str().to_string()),
                            source_item_id: Some(source_item_id.to_string()),
                            details: Some(json!({
                                "audit_id": audit.id.clone(),
                                "upload_id": upload.id.clone(),
                                "charged": charge.charged,
                            })),
                        },
                    )
                    .await;

                Ok(json!({
                    "audit_id": audit.id.clone(),
                    "status": "pending",
                    "source_item_id": source_item_id,
                    "upload_id": upload.id,
                    "report_path": format!("/report/{}", audit.id),
                    "credits": charge,
                }))
            }
            Err(err) => {
                if charge.charged > 0 {
                    if let Err(refund_err) = self
                        .credits()
                        .refund_failed_operation(
                            user_id,
                            charge.charged,
                            &format!("feed_loop_audit_refund:{}", audit.id),
                            "Refund for failed feed loop audit queue enqueue",
                        )
                        .await
                    {
                        tracing::warn!(error = %refund_err, "refund for failed audit enqueue did not apply");
                    }
                }
                self.audits().mark_enqueue_failed(&audit.id).await?;
                Err(err)
            }
        }
    }

    /// Stage summary: latest package/draft/audit plus the first unmet
    /// stage's next step.
    pub async fn loop_summary(&self, user_id: &str, source_item_id: &str) -> Result<LoopSummary> {
        self.assert_research_enabled()?;
        let item = self.resolve_source_item(user_id, source_item_id).await?;

        let latest_package = self
            .list_repost_packages(user_id, Some(source_item_id), 1)
            .await?
            .into_iter()
            .next();

        let latest_snapshot = sqlx::query_as::<_, DraftSnapshot>(
            "SELECT * FROM draft_snapshots WHERE user_id = $1 AND source_item_id = $2 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(source_item_id)
        .fetch_optional(self.pool())
        .await?
        .map(|row| {
            json!({
                "snapshot_id": row.id,
                "platform": row.platform,
                "rescored_score": row.rescored_score,
                "delta_score": row.delta_score,
                "created_at": row.created_at.to_rfc3339(),
            })
        });

        let audits = sqlx::query_as::<_, Audit>(
            "SELECT * FROM audits WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        let latest_audit_row = audits
            .iter()
            .find(|audit| audit.source_item_id().as_deref() == Some(source_item_id));
        let latest_audit = latest_audit_row.map(|audit| {
            json!({
                "audit_id": audit.id,
                "status": audit.status,
                "progress": audit.progress,
                "created_at": audit.created_at.to_rfc3339(),
                "completed_at": audit.completed_at.map(|ts| ts.to_rfc3339()),
                "report_path": format!("/report/{}", audit.id),
            })
        });

        let stage_completion = StageCompletion {
            discovered: true,
            packaged: latest_package.is_some(),
            scripted: latest_snapshot.is_some(),
            audited: latest_audit.is_some(),
            reported: latest_audit_row
                .map(|audit| audit.status == "completed")
                .unwrap_or(false),
        };
        let next_step = next_step_for(&stage_completion).to_string();

        self.telemetry()
            .record(
                user_id,
                "feed_loop_summary_view",
                "ok",
                TelemetryDetails {
                    platform: Some(item.platform.clone()),
                    source_item_id: Some(source_item_id.to_string()),
                    details: Some(json!({
                        "packaged": stage_completion.packaged,
                        "scripted": stage_completion.scripted,
                        "audited": stage_completion.audited,
                        "reported": stage_completion.reported,
                    })),
                },
            )
            .await;

        Ok(LoopSummary {
            source_item_id: source_item_id.to_string(),
            source_item: project_item(&item, Utc::now()),
            latest_repost_package: latest_package,
            latest_draft_snapshot: latest_snapshot,
            latest_audit,
            stage_completion,
            next_step,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages(packaged: bool, scripted: bool, audited: bool, reported: bool) -> StageCompletion {
        StageCompletion {
            discovered: true,
            packaged,
            scripted,
            audited,
            reported,
        }
    }

    #[test]
    fn next_step_follows_stage_order() {
        assert_eq!(
            next_step_for(&stages(false, false, false, false)),
            "Generate a repost package."
        );
        assert_eq!(
            next_step_for(&stages(true, false, false, false)),
            "Generate AI variants and save a draft snapshot."
        );
        assert_eq!(
            next_step_for(&stages(true, true, false, false)),
            "Run feed loop audit from downloaded upload."
        );
        assert_eq!(
            next_step_for(&stages(true, true, true, false)),
            "Wait for audit completion and open report."
        );
        assert_eq!(
            next_step_for(&stages(true, true, true, true)),
            "Log post outcomes to continue calibration."
        );
    }

    #[test]
    fn loop_objective_prefers_amplification_when_it_dominates() {
        let mut item = ResearchItem {
            id: "i".into(),
            user_id: "u".into(),
            collection_id: None,
            platform: "tiktok".into(),
            source_type: "manual_url".into(),
            url: None,
            external_id: None,
            creator_handle: Some("@maker".into()),
            creator_display_name: None,
            title: Some("Growth hooks for creators".into()),
            caption: None,
            metrics_json: serde_json::json!({"views": 1000, "likes": 10, "comments": 5, "shares": 20, "saves": 30}),
            media_meta_json: serde_json::json!({}),
            published_at: None,
            created_at: Utc::now(),
        };
        assert_eq!(infer_loop_objective(&item), "increase shares and saves");
        item.metrics_json =
            serde_json::json!({"views": 1000, "likes": 10, "comments": 80, "shares": 2, "saves": 3});
        assert_eq!(
            infer_loop_objective(&item),
            "increase watch retention and comments"
        );
        assert_eq!(infer_loop_audience(&item), "creators similar to maker");
        assert!(!infer_loop_topic(&item).is_empty());
    }
}
