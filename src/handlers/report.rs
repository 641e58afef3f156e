//! Consolidated report + share-link handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::error::Result;
use crate::models::AuthContext;
use crate::services::session::ensure_user_scope;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateShareLinkRequest {
    pub user_id: Option<String>,
    pub audit_id: String,
    pub expires_hours: Option<i64>,
}

pub async fn latest_report(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<serde_json::Value>> {
    let report = state.report.consolidated_report(&auth.user_id, None).await?;
    Ok(Json(report))
}

pub async fn report_by_audit(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(audit_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let report = state
        .report
        .consolidated_report(&auth.user_id, Some(&audit_id))
        .await?;
    Ok(Json(report))
}

pub async fn create_share_link(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateShareLinkRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let link = state
        .report_share
        .create_share_link(&user_id, &request.audit_id, request.expires_hours)
        .await?;
    Ok(Json(link))
}

/// Public endpoint: resolves a shared report by token, no session needed.
pub async fn resolve_shared_report(
    State(state): State<AppState>,
    Path(share_token): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let report = state.report_share.resolve_shared_report(&share_token).await?;
    Ok(Json(report))
}
