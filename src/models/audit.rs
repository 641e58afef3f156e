use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Multimodal audit record. Progress is a stringified percentage written
/// before each pipeline stage runs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Audit {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub progress: String,
    pub input_json: serde_json::Value,
    pub output_json: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub const AUDIT_IN_PROGRESS_STATUSES: [&str; 5] = [
    "pending",
    "downloading",
    "processing_video",
    "processing_audio",
    "analyzing",
];

impl Audit {
    pub fn input_str(&self, key: &str) -> Option<String> {
        self.input_json
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn source_item_id(&self) -> Option<String> {
        self.input_str("source_item_id")
    }
}

/// Timestamped observation in the multimodal analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampFeedback {
    /// "MM:SS"
    pub timestamp: String,
    /// Hook | Pacing | Visuals | Audio
    pub category: String,
    pub observation: String,
    /// Positive | Negative | Neutral
    pub impact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSection {
    pub name: String,
    pub score: f64,
    #[serde(default)]
    pub feedback: Vec<String>,
}

/// Strict output contract of the multimodal analysis step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub video_id: String,
    /// 0-10 scale
    pub overall_score: f64,
    pub summary: String,
    pub sections: Vec<AuditSection>,
    #[serde(default)]
    pub timestamp_feedback: Vec<TimestampFeedback>,
}
