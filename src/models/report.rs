use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Public share link for a consolidated report.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReportShareLink {
    pub id: String,
    pub user_id: String,
    pub audit_id: String,
    pub share_token: String,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
