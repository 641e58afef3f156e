use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored discovery query, re-run on a cadence while active.
/// Invariant: active follows always carry `next_run_at`; inactive follows
/// never do.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedSourceFollow {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub mode: String,
    pub query: String,
    pub timeframe: String,
    pub sort_by: String,
    pub sort_direction: String,
    pub item_limit: i32,
    pub cadence_minutes: i32,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One execution of a follow's discovery query. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedAutoIngestRun {
    pub id: String,
    pub follow_id: String,
    pub user_id: String,
    pub status: String,
    pub item_count: i32,
    pub item_ids_json: serde_json::Value,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Deterministic repost package synthesized from a research item.
/// Status moves freely within {draft, scheduled, published, archived}.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedRepostPackage {
    pub id: String,
    pub user_id: String,
    pub source_item_id: String,
    pub status: String,
    pub target_platforms_json: serde_json::Value,
    pub package_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const REPOST_ALLOWED_STATUSES: [&str; 4] = ["draft", "scheduled", "published", "archived"];

/// Funnel telemetry event. Unordered, append-only; writes must never break
/// the primary workflow.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedTelemetryEvent {
    pub id: String,
    pub user_id: String,
    pub event_name: String,
    pub status: String,
    pub platform: Option<String>,
    pub source_item_id: Option<String>,
    pub details_json: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Transcript extraction job for a research item.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedTranscriptJob {
    pub id: String,
    pub user_id: String,
    pub research_item_id: String,
    pub status: String,
    pub progress: i32,
    pub queue_job_id: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub transcript_source: Option<String>,
    pub transcript_text: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Transcript sources in preference order: whisper audio from a completed
/// media asset, then caption, then title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    WhisperAudio,
    CaptionFallback,
    TitleFallback,
}

impl TranscriptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptSource::WhisperAudio => "whisper_audio",
            TranscriptSource::CaptionFallback => "caption_fallback",
            TranscriptSource::TitleFallback => "title_fallback",
        }
    }
}
