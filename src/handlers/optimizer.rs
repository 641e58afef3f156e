//! Optimizer handlers: variant generation, rescoring, draft snapshots.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{AuthContext, DetectorRanking, RetentionPoint};
use crate::services::optimizer::scoring::OptionalMetrics;
use crate::services::optimizer::{DraftSnapshotParams, GenerateVariantsParams, RescoreParams};
use crate::services::session::ensure_user_scope;
use crate::services::users;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct VariantGenerateRequest {
    pub user_id: Option<String>,
    pub topic: String,
    pub audience: Option<String>,
    pub objective: Option<String>,
    pub tone: Option<String>,
    pub platform: Option<String>,
    pub duration_s: Option<i64>,
    pub source_item_id: Option<String>,
    pub source_context: Option<String>,
    pub generation_mode: Option<String>,
    pub constraints: Option<ConstraintOverrides>,
}

#[derive(Debug, Deserialize)]
pub struct ConstraintOverrides {
    pub platform: Option<String>,
    pub duration_s: Option<i64>,
    pub tone: Option<String>,
    pub hook_style: Option<String>,
    pub cta_style: Option<String>,
    pub pacing_density: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RescoreRequest {
    pub user_id: Option<String>,
    pub script_text: String,
    pub platform: Option<String>,
    pub duration_s: Option<i64>,
    pub optional_metrics: Option<OptionalMetrics>,
    pub retention_points: Option<Vec<RetentionPoint>>,
    pub baseline_score: Option<f64>,
    pub baseline_detector_rankings: Option<Vec<DetectorRanking>>,
}

#[derive(Debug, Deserialize)]
pub struct DraftSnapshotRequest {
    pub user_id: Option<String>,
    pub platform: Option<String>,
    pub source_item_id: Option<String>,
    pub variant_id: Option<String>,
    pub script_text: String,
    pub baseline_score: Option<f64>,
    pub rescored_score: Option<f64>,
    pub delta_score: Option<f64>,
    pub detector_rankings: Option<serde_json::Value>,
    pub next_actions: Option<serde_json::Value>,
    pub line_level_edits: Option<serde_json::Value>,
    pub rescore_output: Option<serde_json::Value>,
    pub score_breakdown: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotListQuery {
    pub platform: Option<String>,
    pub limit: Option<i64>,
}

pub async fn variant_generate(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<VariantGenerateRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;

    // Validate before charging so a rejected request never debits.
    if request.topic.trim().len() < 2 {
        return Err(AppError::bad_request("topic is required"));
    }

    let cost = state.credits.costs().cost_optimizer_variants;
    state
        .credits
        .consume(
            &user_id,
            cost,
            "Optimizer variant generation",
            Some("optimizer_variants"),
            request.source_item_id.as_deref(),
        )
        .await?;

    let constraints = request.constraints.as_ref();
    let params = GenerateVariantsParams {
        topic: request.topic.clone(),
        audience: request.audience.clone(),
        objective: request.objective.clone(),
        tone: constraints
            .and_then(|c| c.tone.clone())
            .or_else(|| request.tone.clone()),
        platform: constraints
            .and_then(|c| c.platform.clone())
            .or_else(|| request.platform.clone()),
        duration_s: constraints
            .and_then(|c| c.duration_s)
            .or(request.duration_s),
        source_item_id: request.source_item_id.clone(),
        source_context_note: request.source_context.clone(),
        generation_mode: request.generation_mode.clone(),
        hook_style: constraints.and_then(|c| c.hook_style.clone()),
        cta_style: constraints.and_then(|c| c.cta_style.clone()),
        pacing_density: constraints.and_then(|c| c.pacing_density.clone()),
    };
    let response = state.optimizer.generate_variants(&user_id, params).await?;
    Ok(Json(serde_json::to_value(response)?))
}

pub async fn rescore(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<RescoreRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let params = RescoreParams {
        script_text: request.script_text.clone(),
        platform: request.platform.clone(),
        duration_s: request.duration_s,
        optional_metrics: request.optional_metrics.clone(),
        retention_points: request.retention_points.clone().unwrap_or_default(),
        baseline_score: request.baseline_score,
        baseline_detector_rankings: request.baseline_detector_rankings.clone().unwrap_or_default(),
    };
    let response = state.optimizer.rescore(&user_id, params).await?;
    Ok(Json(serde_json::to_value(response)?))
}

pub async fn create_draft_snapshot(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<DraftSnapshotRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;

    // rescored_score may arrive directly or inside a score breakdown.
    let rescore_output = request.rescore_output.as_ref();
    let rescored_score = request
        .rescored_score
        .or_else(|| {
            request
                .score_breakdown
                .as_ref()
                .and_then(|breakdown| breakdown.get("combined"))
                .and_then(|v| v.as_f64())
        })
        .or_else(|| {
            rescore_output
                .and_then(|output| output.pointer("/score_breakdown/combined"))
                .and_then(|v| v.as_f64())
        });
    if rescored_score.is_none() {
        return Err(AppError::bad_request(
            "rescored_score or score_breakdown.combined is required",
        ));
    }

    let pick_list = |direct: &Option<serde_json::Value>, key: &str| -> Option<serde_json::Value> {
        direct
            .clone()
            .filter(|value| value.is_array())
            .or_else(|| rescore_output.and_then(|output| output.get(key).cloned()))
            .filter(|value| value.is_array())
    };

    let params = DraftSnapshotParams {
        platform: request.platform.clone(),
        source_item_id: request.source_item_id.clone(),
        variant_id: request.variant_id.clone(),
        script_text: request.script_text.clone(),
        baseline_score: request.baseline_score,
        rescored_score,
        delta_score: request.delta_score,
        detector_rankings: pick_list(&request.detector_rankings, "detector_rankings"),
        next_actions: pick_list(&request.next_actions, "next_actions"),
        line_level_edits: pick_list(&request.line_level_edits, "line_level_edits"),
    };
    let snapshot = state
        .optimizer
        .create_draft_snapshot(&user_id, params)
        .await?;
    Ok(Json(serde_json::to_value(snapshot)?))
}

pub async fn list_draft_snapshots(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<SnapshotListQuery>,
) -> Result<Json<serde_json::Value>> {
    let items = state
        .optimizer
        .list_draft_snapshots(
            &auth.user_id,
            query.platform.as_deref(),
            query.limit.unwrap_or(20),
        )
        .await?;
    Ok(Json(serde_json::json!({
        "count": items.len(),
        "items": items,
    })))
}

pub async fn get_draft_snapshot(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(snapshot_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let snapshot = state
        .optimizer
        .get_draft_snapshot(&auth.user_id, &snapshot_id)
        .await?;
    Ok(Json(serde_json::to_value(snapshot)?))
}
