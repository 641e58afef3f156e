//! Outcome calibration handlers.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::Result;
use crate::models::{AuthContext, Platform};
use crate::services::outcomes::IngestOutcomeParams;
use crate::services::session::ensure_user_scope;
use crate::services::users;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub params: IngestOutcomeParams,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub platform: Option<String>,
}

pub async fn ingest(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<IngestRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;
    let response = state.outcomes.ingest(&user_id, request.params).await?;
    Ok(Json(serde_json::to_value(response)?))
}

pub async fn summary(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<serde_json::Value>> {
    match Platform::parse_optional(query.platform.as_deref())? {
        Some(platform) => {
            let summary = state
                .outcomes
                .platform_summary(&auth.user_id, platform)
                .await?;
            Ok(Json(serde_json::to_value(summary)?))
        }
        None => {
            let summary = state.outcomes.overall_summary(&auth.user_id).await?;
            Ok(Json(summary))
        }
    }
}

pub async fn recalibrate(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<serde_json::Value>> {
    let report = state.outcomes.recalibrate_all_users().await?;
    Ok(Json(serde_json::to_value(report)?))
}
