use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Media download job lifecycle:
/// queued -> downloading -> processing -> completed, any state -> failed.
/// A completed job always references a MediaAsset and an Upload; a failed
/// job always carries an error_code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MediaDownloadJob {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub source_url: String,
    pub status: String,
    pub progress: i32,
    pub queue_job_id: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub media_asset_id: Option<String>,
    pub upload_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub const MEDIA_JOB_IN_PROGRESS_STATUSES: [&str; 3] = ["queued", "downloading", "processing"];

/// A materialized media file on local disk.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MediaAsset {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub source_url: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size_bytes: i64,
    pub mime_type: String,
    pub duration_seconds: i32,
    pub transcript_status: String,
    pub upload_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How audits reference a playable file. `file_url` is an absolute path
/// under the configured upload root.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Upload {
    pub id: String,
    pub user_id: String,
    pub file_url: String,
    pub file_type: String,
    pub original_filename: String,
    pub file_size_bytes: i64,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}
