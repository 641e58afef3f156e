use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A posted video's observed performance. Immutable once written.
/// `calibration_delta = actual_score - predicted_score` when both present.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutcomeMetric {
    pub id: String,
    pub user_id: String,
    pub content_item_id: Option<String>,
    pub draft_snapshot_id: Option<String>,
    pub report_id: Option<String>,
    pub platform: String,
    pub video_external_id: String,
    pub posted_at: DateTime<Utc>,
    pub actual_metrics_json: serde_json::Value,
    pub retention_points_json: Option<serde_json::Value>,
    pub predicted_score: Option<f64>,
    pub actual_score: f64,
    pub calibration_delta: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Per-(user, platform) prediction-accuracy snapshot. A pure function of
/// the OutcomeMetric set; rebuilt on every ingest.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CalibrationSnapshot {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub sample_size: i32,
    pub mean_abs_error: f64,
    pub hit_rate: f64,
    pub trend: String,
    pub recommendations_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single (time, retention%) point of an audience-retention curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetentionPoint {
    pub time: f64,
    pub retention: f64,
}
