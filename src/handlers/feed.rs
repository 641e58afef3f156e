//! Feed loop handlers: discovery, follows, packaging, loop stages, and
//! telemetry.

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{AuthContext, ExportFormat};
use crate::services::feed::discovery::DiscoverParams;
use crate::services::feed::follows::UpsertFollowParams;
use crate::services::optimizer::GenerateVariantsParams;
use crate::services::session::ensure_user_scope;
use crate::services::users;
use crate::AppState;

use super::research::stream_export_file;

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub params: DiscoverParams,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteToggleRequest {
    pub user_id: Option<String>,
    pub item_id: String,
    pub favorite: bool,
}

#[derive(Debug, Deserialize)]
pub struct CollectionAssignRequest {
    pub user_id: Option<String>,
    pub item_ids: Vec<String>,
    pub collection_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedExportRequest {
    pub user_id: Option<String>,
    pub format: String,
    pub item_ids: Option<Vec<String>>,
    pub max_rows: Option<i64>,
    #[serde(flatten)]
    pub params: DiscoverParams,
}

#[derive(Debug, Deserialize)]
pub struct ItemIdsRequest {
    pub user_id: Option<String>,
    pub item_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct JobIdsRequest {
    pub user_id: Option<String>,
    pub job_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FollowUpsertRequest {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub params: UpsertFollowParams,
}

#[derive(Debug, Deserialize)]
pub struct FollowListQuery {
    pub platform: Option<String>,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct FollowIngestRequest {
    pub user_id: Option<String>,
    pub follow_ids: Option<Vec<String>>,
    #[serde(default)]
    pub run_due_only: bool,
    pub max_follows: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct IngestRunsQuery {
    pub follow_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RepostPackageRequest {
    pub user_id: Option<String>,
    pub source_item_id: String,
    pub target_platforms: Option<Vec<String>>,
    pub objective: Option<String>,
    pub tone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RepostListQuery {
    pub source_item_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RepostStatusRequest {
    pub user_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct LoopVariantRequest {
    pub user_id: Option<String>,
    pub source_item_id: String,
    pub topic: Option<String>,
    pub audience: Option<String>,
    pub objective: Option<String>,
    pub tone: Option<String>,
    pub platform: Option<String>,
    pub duration_s: Option<i64>,
    pub generation_mode: Option<String>,
    pub source_context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoopSummaryQuery {
    pub source_item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TelemetrySummaryQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TelemetryEventsQuery {
    pub days: Option<i64>,
    pub limit: Option<i64>,
    pub event_name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub token: String,
}

pub async fn discover(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<DiscoverRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;
    let response = state.feed.discover(&user_id, &request.params).await?;
    Ok(Json(serde_json::to_value(response)?))
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<DiscoverRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let response = state.feed.search(&user_id, &request.params).await?;
    Ok(Json(serde_json::to_value(response)?))
}

pub async fn toggle_favorite(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<FavoriteToggleRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let response = state
        .feed
        .toggle_favorite(&user_id, &request.item_id, request.favorite)
        .await?;
    Ok(Json(response))
}

pub async fn assign_collection(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CollectionAssignRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let response = state
        .feed
        .assign_collection(&user_id, &request.item_ids, &request.collection_id)
        .await?;
    Ok(Json(response))
}

pub async fn export(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<FeedExportRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let format = ExportFormat::parse(&request.format)?;
    let receipt = state
        .feed
        .export(
            &user_id,
            &request.params,
            format,
            request.item_ids.as_deref(),
            request.max_rows,
        )
        .await?;
    Ok(Json(serde_json::to_value(receipt)?))
}

pub async fn download_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let path = state.feed.resolve_feed_export_file(&export_id, &query.token)?;
    stream_export_file(path).await
}

pub async fn bulk_download(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ItemIdsRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let report = state
        .feed
        .start_bulk_download(&user_id, &request.item_ids)
        .await?;
    Ok(Json(serde_json::to_value(report)?))
}

pub async fn bulk_download_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<JobIdsRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let response = state
        .feed
        .bulk_download_status(&user_id, &request.job_ids)
        .await?;
    Ok(Json(response))
}

pub async fn bulk_transcripts(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ItemIdsRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let report = state
        .feed
        .start_bulk_transcripts(&user_id, &request.item_ids)
        .await?;
    Ok(Json(serde_json::to_value(report)?))
}

pub async fn bulk_transcript_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<JobIdsRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let response = state
        .feed
        .bulk_transcript_status(&user_id, &request.job_ids)
        .await?;
    Ok(Json(response))
}

pub async fn upsert_follow(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<FollowUpsertRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;
    let (created, follow) = state.feed.upsert_follow(&user_id, &request.params).await?;
    Ok(Json(serde_json::json!({
        "created": created,
        "follow": follow,
    })))
}

pub async fn list_follows(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<FollowListQuery>,
) -> Result<Json<serde_json::Value>> {
    let follows = state
        .feed
        .list_follows(&auth.user_id, query.platform.as_deref(), query.active_only)
        .await?;
    Ok(Json(serde_json::json!({
        "count": follows.len(),
        "follows": follows,
    })))
}

pub async fn delete_follow(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(follow_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.feed.delete_follow(&auth.user_id, &follow_id).await?;
    Ok(Json(serde_json::json!({
        "deleted": true,
        "follow_id": follow_id,
    })))
}

pub async fn run_follow_ingest(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<FollowIngestRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let report = state
        .feed
        .run_follow_ingests(
            &user_id,
            request.follow_ids.as_deref(),
            request.run_due_only,
            request.max_follows.unwrap_or(25),
        )
        .await?;
    Ok(Json(serde_json::to_value(report)?))
}

pub async fn list_ingest_runs(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<IngestRunsQuery>,
) -> Result<Json<serde_json::Value>> {
    let runs = state
        .feed
        .list_ingest_runs(
            &auth.user_id,
            query.follow_id.as_deref(),
            query.limit.unwrap_or(50),
        )
        .await?;
    Ok(Json(serde_json::json!({
        "count": runs.len(),
        "runs": runs,
    })))
}

pub async fn create_repost_package(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<RepostPackageRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let package = state
        .feed
        .create_repost_package(
            &user_id,
            &request.source_item_id,
            request.target_platforms.as_deref(),
            request.objective.as_deref(),
            request.tone.as_deref(),
        )
        .await?;
    Ok(Json(serde_json::to_value(package)?))
}

pub async fn list_repost_packages(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<RepostListQuery>,
) -> Result<Json<serde_json::Value>> {
    let packages = state
        .feed
        .list_repost_packages(
            &auth.user_id,
            query.source_item_id.as_deref(),
            query.limit.unwrap_or(20),
        )
        .await?;
    Ok(Json(serde_json::json!({
        "count": packages.len(),
        "packages": packages,
    })))
}

pub async fn get_repost_package(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(package_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let package = state
        .feed
        .get_repost_package(&auth.user_id, &package_id)
        .await?;
    Ok(Json(serde_json::to_value(package)?))
}

pub async fn update_repost_package_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(package_id): Path<String>,
    Json(request): Json<RepostStatusRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let package = state
        .feed
        .update_repost_package_status(&user_id, &package_id, &request.status)
        .await?;
    Ok(Json(serde_json::to_value(package)?))
}

pub async fn loop_variant_generate(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<LoopVariantRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    if request.source_item_id.trim().is_empty() {
        return Err(AppError::bad_request("source_item_id is required."));
    }
    users::ensure_user(&state.db_pool, &user_id).await?;

    let overrides = GenerateVariantsParams {
        topic: request.topic.clone().unwrap_or_default(),
        audience: request.audience.clone(),
        objective: request.objective.clone(),
        tone: request.tone.clone(),
        platform: request.platform.clone(),
        duration_s: request.duration_s,
        source_item_id: Some(request.source_item_id.clone()),
        source_context_note: request.source_context.clone(),
        generation_mode: request.generation_mode.clone(),
        hook_style: None,
        cta_style: None,
        pacing_density: None,
    };
    let response = state
        .feed
        .loop_variant_generate(&user_id, &request.source_item_id, overrides)
        .await?;
    Ok(Json(response))
}

pub async fn loop_audit(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(
        &auth.user_id,
        payload.get("user_id").and_then(|v| v.as_str()),
    )?;
    let source_item_id = payload
        .get("source_item_id")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request("source_item_id is required."))?;
    users::ensure_user(&state.db_pool, &user_id).await?;
    let response = state
        .feed
        .loop_audit(&user_id, source_item_id, &payload)
        .await?;
    Ok(Json(response))
}

pub async fn loop_summary(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<LoopSummaryQuery>,
) -> Result<Json<serde_json::Value>> {
    let summary = state
        .feed
        .loop_summary(&auth.user_id, &query.source_item_id)
        .await?;
    Ok(Json(serde_json::to_value(summary)?))
}

pub async fn telemetry_summary(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<TelemetrySummaryQuery>,
) -> Result<Json<serde_json::Value>> {
    let summary = state
        .feed
        .telemetry()
        .summary(&auth.user_id, query.days.unwrap_or(30))
        .await?;
    Ok(Json(serde_json::to_value(summary)?))
}

pub async fn telemetry_events(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<TelemetryEventsQuery>,
) -> Result<Json<serde_json::Value>> {
    let events = state
        .feed
        .telemetry()
        .list_events(
            &auth.user_id,
            query.days.unwrap_or(30),
            query.limit.unwrap_or(50),
            query.event_name.as_deref(),
            query.status.as_deref(),
        )
        .await?;
    Ok(Json(serde_json::json!({
        "count": events.len(),
        "events": events,
    })))
}
