use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Application user. Created lazily on first reference; root of every
/// ownership edge.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A linked platform account (OAuth tokens are stored sealed; their
/// encryption is an external collaborator).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Connection {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub platform_user_id: Option<String>,
    pub platform_handle: Option<String>,
    pub access_token_sealed: Option<String>,
    pub refresh_token_sealed: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Channel identity snapshot hydrated on OAuth sync.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub external_id: Option<String>,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub subscriber_count: Option<String>,
    pub profile_picture_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A competitor channel tracked for benchmark + blueprint purposes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Competitor {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub external_id: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}
