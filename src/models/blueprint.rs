use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Cached competitor blueprint, one row per user. Invalidated by TTL,
/// competitor-signature change, or platform mismatch.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlueprintSnapshot {
    pub id: String,
    pub user_id: String,
    pub payload_json: serde_json::Value,
    pub competitor_signature: String,
    pub generated_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}
