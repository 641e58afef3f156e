//! Authentication handlers: OAuth session sync, current user, logout.

use axum::{extract::State, Json};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AuthContext, Connection, Profile};
use crate::services::users;
use crate::services::youtube::YouTubeClient;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SyncYouTubeSessionRequest {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds)
    pub expires_at: Option<i64>,
    pub scope: Option<String>,
    pub user_id: Option<String>,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncYouTubeSessionResponse {
    pub user_id: String,
    pub email: String,
    pub youtube_connected: bool,
    pub session_token: String,
    pub session_expires_at: i64,
    pub channel_id: Option<String>,
    pub channel_title: Option<String>,
    pub channel_handle: Option<String>,
    pub subscriber_count: Option<String>,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub youtube_connected: bool,
    pub channel_id: Option<String>,
    pub channel_title: Option<String>,
    pub channel_handle: Option<String>,
    pub subscriber_count: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Token sealing is an external collaborator (KMS-backed); this placeholder
/// keeps the storage contract without a key dependency.
fn seal_token(raw: &str) -> String {
    format!(
        "sealed:{}",
        base64::engine::general_purpose::STANDARD.encode(raw)
    )
}

fn to_datetime(value: Option<i64>) -> Option<DateTime<Utc>> {
    value.and_then(|ts| DateTime::from_timestamp(ts, 0))
}

/// Persist a frontend OAuth session into backend tables and hydrate the
/// channel identity.
pub async fn sync_youtube_session(
    State(state): State<AppState>,
    Json(request): Json<SyncYouTubeSessionRequest>,
) -> Result<Json<SyncYouTubeSessionResponse>> {
    let channel_info = match YouTubeClient::unauthenticated()
        .get_my_channel_info(&request.access_token)
        .await
    {
        Ok(info) => Some(info),
        Err(err) => {
            tracing::warn!(error = %err, "channel hydration failed during session sync");
            None
        }
    };

    let user = users::upsert_user_identity(
        &state.db_pool,
        request.user_id.as_deref(),
        request.email.trim(),
        request.name.as_deref(),
        request.picture.as_deref(),
    )
    .await?;

    // Upsert the youtube connection row.
    let existing = sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections WHERE user_id = $1 AND platform = 'youtube' LIMIT 1",
    )
    .bind(&user.id)
    .fetch_optional(&state.db_pool)
    .await?;
    let connection_id = existing
        .map(|connection| connection.id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    sqlx::query(
        r#"
        INSERT INTO connections (
            id, user_id, platform, platform_user_id, platform_handle,
            access_token_sealed, refresh_token_sealed, token_expires_at, scope
        )
        VALUES ($1, $2, 'youtube', $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE SET
            platform_user_id = EXCLUDED.platform_user_id,
            platform_handle = EXCLUDED.platform_handle,
            access_token_sealed = EXCLUDED.access_token_sealed,
            refresh_token_sealed = EXCLUDED.refresh_token_sealed,
            token_expires_at = EXCLUDED.token_expires_at,
            scope = EXCLUDED.scope
        "#,
    )
    .bind(&connection_id)
    .bind(&user.id)
    .bind(channel_info.as_ref().map(|info| info.channel_id.clone()))
    .bind(channel_info.as_ref().and_then(|info| info.handle.clone()))
    .bind(seal_token(&request.access_token))
    .bind(request.refresh_token.as_deref().map(seal_token))
    .bind(to_datetime(request.expires_at))
    .bind(request.scope.as_deref())
    .execute(&state.db_pool)
    .await?;

    if let Some(info) = &channel_info {
        sqlx::query(
            r#"
            INSERT INTO profiles (
                id, user_id, platform, external_id, handle, display_name,
                subscriber_count, profile_picture_url
            )
            VALUES ($1, $2, 'youtube', $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.id)
        .bind(&info.channel_id)
        .bind(info.handle.as_deref())
        .bind(info.title.as_deref())
        .bind(info.subscriber_count.as_deref())
        .bind(info.thumbnail_url.as_deref())
        .execute(&state.db_pool)
        .await?;
    }

    let issued = state
        .sessions
        .create_session_token(&user.id, Some(&user.email), None)?;

    Ok(Json(SyncYouTubeSessionResponse {
        user_id: user.id,
        email: user.email,
        youtube_connected: channel_info.is_some(),
        session_token: issued.token,
        session_expires_at: issued.expires_at,
        channel_id: channel_info.as_ref().map(|info| info.channel_id.clone()),
        channel_title: channel_info.as_ref().and_then(|info| info.title.clone()),
        channel_handle: channel_info.as_ref().and_then(|info| info.handle.clone()),
        subscriber_count: channel_info
            .as_ref()
            .and_then(|info| info.subscriber_count.clone()),
        thumbnail_url: channel_info
            .as_ref()
            .and_then(|info| info.thumbnail_url.clone()),
    }))
}

/// Get the current user's profile and YouTube connection status.
pub async fn get_current_user(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<CurrentUserResponse>> {
    let user = users::ensure_user(&state.db_pool, &auth.user_id).await?;

    let profile = sqlx::query_as::<_, Profile>(
        "SELECT * FROM profiles WHERE user_id = $1 AND platform = 'youtube' ORDER BY created_at DESC LIMIT 1",
    )
    .bind(&user.id)
    .fetch_optional(&state.db_pool)
    .await?;
    let connection = sqlx::query_as::<_, Connection>(
        "SELECT * FROM connections WHERE user_id = $1 AND platform = 'youtube' LIMIT 1",
    )
    .bind(&user.id)
    .fetch_optional(&state.db_pool)
    .await?;

    Ok(Json(CurrentUserResponse {
        user_id: user.id,
        email: user.email,
        name: user.name,
        picture: user.picture,
        youtube_connected: connection.is_some(),
        channel_id: profile.as_ref().and_then(|p| p.external_id.clone()),
        channel_title: profile.as_ref().and_then(|p| p.display_name.clone()),
        channel_handle: profile.as_ref().and_then(|p| p.handle.clone()),
        subscriber_count: profile.as_ref().and_then(|p| p.subscriber_count.clone()),
        thumbnail_url: profile
            .as_ref()
            .and_then(|p| p.profile_picture_url.clone()),
    }))
}

/// Stateless logout acknowledgement; clients drop the bearer token.
pub async fn logout(auth: AuthContext) -> Json<serde_json::Value> {
    tracing::info!(user_id = %auth.user_id, "session logout");
    Json(serde_json::json!({ "ok": true }))
}
