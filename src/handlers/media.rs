//! Media download job handlers.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{AuthContext, MediaDownloadJob, Platform};
use crate::services::rate_limit::client_identifier;
use crate::services::session::ensure_user_scope;
use crate::services::users;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMediaDownloadRequest {
    pub user_id: Option<String>,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[validate(length(min = 8, max = 2000))]
    pub source_url: String,
}

fn default_platform() -> String {
    "instagram".to_string()
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub user_id: Option<String>,
}

fn serialize_job(job: &MediaDownloadJob) -> serde_json::Value {
    json!({
        "job_id": &job.id,
        "platform": &job.platform,
        "source_url": &job.source_url,
        "status": &job.status,
        "progress": job.progress,
        "attempts": job.attempts,
        "max_attempts": job.max_attempts,
        "queue_job_id": &job.queue_job_id,
        "media_asset_id": &job.media_asset_id,
        "upload_id": &job.upload_id,
        "error_code": &job.error_code,
        "error_message": &job.error_message,
        "created_at": job.created_at.to_rfc3339(),
        "completed_at": job.completed_at.map(|ts| ts.to_rfc3339()),
    })
}

/// Create and enqueue a media download job.
pub async fn create_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    auth: AuthContext,
    Json(request): Json<CreateMediaDownloadRequest>,
) -> Result<Json<serde_json::Value>> {
    request
        .validate()
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    state
        .rate_limiter
        .check(
            "media_download_create",
            &client_identifier(&headers, None),
            60,
            Duration::from_secs(3600),
        )
        .await?;
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;

    let platform = Platform::parse(&request.platform)?;
    let job = state
        .media
        .enqueue_download(&user_id, platform, &request.source_url)
        .await?;
    Ok(Json(serialize_job(&job)))
}

/// Poll a media download job's status.
pub async fn get_download(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(job_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, query.user_id.as_deref())?;
    let job = state.media.get_job(&user_id, &job_id).await?;
    Ok(Json(serialize_job(&job)))
}
