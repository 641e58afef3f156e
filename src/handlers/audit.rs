//! Audit handlers: upload, run, list, poll.

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::AuthContext;
use crate::services::media::{safe_filename, sweep_stale_uploads};
use crate::services::session::ensure_user_scope;
use crate::services::users;
use crate::AppState;

const MAX_VIDEO_UPLOAD_BYTES: usize = 300 * 1024 * 1024;
const ALLOWED_VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "m4v", "webm", "avi", "mkv"];

#[derive(Debug, Deserialize)]
pub struct CreateAuditRequest {
    pub user_id: Option<String>,
    #[serde(default = "default_source_mode")]
    pub source_mode: String,
    pub video_url: Option<String>,
    pub upload_id: Option<String>,
    pub platform: Option<String>,
    pub retention_points: Option<serde_json::Value>,
    pub platform_metrics: Option<serde_json::Value>,
}

fn default_source_mode() -> String {
    "url".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// Upload a local video file for audit processing.
pub async fn upload_video(
    State(state): State<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_filename = "upload.mp4".to_string();
    let mut content_type: Option<String> = None;
    let mut supplied_user_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("Could not read upload: {err}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                if let Some(name) = field.file_name() {
                    original_filename = safe_filename(name);
                }
                content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("Could not read file: {err}")))?;
                if bytes.len() > MAX_VIDEO_UPLOAD_BYTES {
                    return Err(AppError::PayloadTooLarge(format!(
                        "File too large. Max upload size is {}MB.",
                        MAX_VIDEO_UPLOAD_BYTES / (1024 * 1024)
                    )));
                }
                file_bytes = Some(bytes.to_vec());
            }
            "user_id" => {
                supplied_user_id = field.text().await.ok().filter(|text| !text.trim().is_empty());
            }
            _ => {}
        }
    }

    let user_id = ensure_user_scope(&auth.user_id, supplied_user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;
    let bytes = file_bytes.ok_or_else(|| AppError::bad_request("file field is required."))?;

    let extension = PathBuf::from(&original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();
    let mime_ok = content_type
        .as_deref()
        .map(|mime| mime.to_lowercase().starts_with("video/"))
        .unwrap_or(false);
    if !ALLOWED_VIDEO_EXTENSIONS.contains(&extension.as_str()) && !mime_ok {
        return Err(AppError::bad_request(
            "Unsupported file type. Upload a video file (mp4, mov, m4v, webm, avi, mkv).",
        ));
    }

    let upload_id = Uuid::new_v4().to_string();
    let user_dir = PathBuf::from(&state.config.uploads.upload_dir).join(&user_id);
    tokio::fs::create_dir_all(&user_dir).await?;
    let stored_filename = format!("{}_{}", upload_id, original_filename);
    let destination = user_dir.join(&stored_filename);
    let total_size = bytes.len() as i64;
    tokio::fs::write(&destination, bytes).await?;

    sqlx::query(
        r#"
        INSERT INTO uploads (id, user_id, file_url, file_type, original_filename, file_size_bytes, mime_type)
        VALUES ($1, $2, $3, 'video', $4, $5, $6)
        "#,
    )
    .bind(&upload_id)
    .bind(&user_id)
    .bind(destination.to_string_lossy().as_ref())
    .bind(&original_filename)
    .bind(total_size)
    .bind(content_type.as_deref())
    .execute(&state.db_pool)
    .await?;

    // Opportunistic retention sweep after each write.
    let upload_dir = state.config.uploads.upload_dir.clone();
    let retention_hours = state.config.uploads.retention_hours;
    tokio::task::spawn_blocking(move || sweep_stale_uploads(&upload_dir, retention_hours));

    Ok(Json(json!({
        "upload_id": upload_id,
        "file_name": original_filename,
        "mime_type": content_type,
        "file_size_bytes": total_size,
        "status": "uploaded",
    })))
}

/// Start a new multimodal audit. Charges audit_run credits; a failed
/// queue handoff refunds them.
pub async fn run_multimodal(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateAuditRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;

    let source_mode = request.source_mode.trim().to_lowercase();
    let mut upload_path: Option<String> = None;
    let mut upload_file_name: Option<String> = None;
    match source_mode.as_str() {
        "url" => {
            if request
                .video_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .is_none()
            {
                return Err(AppError::bad_request(
                    "video_url is required for source_mode='url'",
                ));
            }
        }
        "upload" => {
            let upload_id = request
                .upload_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    AppError::bad_request("upload_id is required for source_mode='upload'")
                })?;
            let upload = state.audits.resolve_upload(&user_id, upload_id).await?;
            upload_path = Some(upload.file_url);
            upload_file_name = Some(upload.original_filename);
        }
        _ => return Err(AppError::bad_request("source_mode must be url or upload")),
    }

    let cost = state.credits.costs().cost_audit_run;
    let charge = state
        .credits
        .consume(&user_id, cost, "Multimodal audit run", Some("audit_run"), None)
        .await?;

    let input_json = json!({
        "source_mode": source_mode,
        "video_url": request.video_url,
        "upload_id": request.upload_id,
        "upload_path": upload_path,
        "upload_file_name": upload_file_name,
        "platform": request.platform,
        "retention_points": request.retention_points.clone().unwrap_or(json!([])),
        "platform_metrics": request.platform_metrics,
    });
    let audit = state.audits.create_audit(&user_id, input_json).await?;

    match state.audits.enqueue_audit(&audit.id).await {
        Ok(queue_job_id) => {
            sqlx::query("UPDATE audits SET input_json = input_json || $2 WHERE id = $1")
                .bind(&audit.id)
                .bind(json!({ "queue_job_id": queue_job_id }))
                .execute(&state.db_pool)
                .await?;
            Ok(Json(json!({
                "audit_id": audit.id,
                "status": "pending",
                "credits": charge,
            })))
        }
        Err(err) => {
            if charge.charged > 0 {
                if let Err(refund_err) = state
                    .credits
                    .refund_failed_operation(
                        &user_id,
                        charge.charged,
                        &format!("audit_run_refund:{}", audit.id),
                        "Refund for failed audit queue enqueue",
                    )
                    .await
                {
                    tracing::warn!(error = %refund_err, "refund for failed audit enqueue did not apply");
                }
            }
            state.audits.mark_enqueue_failed(&audit.id).await?;
            Err(err)
        }
    }
}

pub async fn list_audits(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>> {
    let audits = state
        .audits
        .list_audits(&auth.user_id, query.limit.unwrap_or(20))
        .await?;
    let rows: Vec<serde_json::Value> = audits
        .iter()
        .map(|audit| {
            json!({
                "audit_id": &audit.id,
                "status": &audit.status,
                "progress": &audit.progress,
                "created_at": audit.created_at.to_rfc3339(),
                "completed_at": audit.completed_at.map(|ts| ts.to_rfc3339()),
            })
        })
        .collect();
    Ok(Json(json!(rows)))
}

/// Poll one audit's status: final state carries output or error detail.
pub async fn get_audit(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(audit_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let audit = state.audits.get_audit(&auth.user_id, &audit_id).await?;
    Ok(Json(json!({
        "audit_id": audit.id,
        "status": audit.status,
        "progress": audit.progress,
        "created_at": audit.created_at.to_rfc3339(),
        "output": audit.output_json,
        "error": audit.error_message,
    })))
}
