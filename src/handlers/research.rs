//! Research corpus handlers.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::Response,
    Json,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{AuthContext, ExportFormat};
use crate::services::research::{SearchFilters, CSV_IMPORT_MAX_BYTES};
use crate::services::session::ensure_user_scope;
use crate::services::users;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ImportUrlRequest {
    pub user_id: Option<String>,
    pub platform: Option<String>,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub filters: SearchFilters,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub user_id: Option<String>,
    pub collection_id: String,
    pub format: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub token: String,
}

pub async fn import_url(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ImportUrlRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;
    let payload = state
        .research
        .import_url(&user_id, request.platform.as_deref(), &request.url)
        .await?;
    Ok(Json(serde_json::to_value(payload)?))
}

pub async fn capture(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(
        &auth.user_id,
        payload.get("user_id").and_then(|v| v.as_str()),
    )?;
    users::ensure_user(&state.db_pool, &user_id).await?;
    let item = state.research.capture(&user_id, &payload).await?;
    Ok(Json(serde_json::to_value(item)?))
}

/// Multipart CSV import: fields `file` (required) and `platform`
/// (optional). Files over 5 MiB are rejected with 413.
pub async fn import_csv(
    State(state): State<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut platform: Option<String> = None;
    let mut supplied_user_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("Could not read CSV upload: {err}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(format!("Could not read CSV file: {err}")))?;
                if bytes.len() > CSV_IMPORT_MAX_BYTES {
                    return Err(AppError::PayloadTooLarge(
                        "CSV file too large. Max 5MB.".to_string(),
                    ));
                }
                file_bytes = Some(bytes.to_vec());
            }
            "platform" => {
                platform = field.text().await.ok().filter(|text| !text.trim().is_empty());
            }
            "user_id" => {
                supplied_user_id = field.text().await.ok().filter(|text| !text.trim().is_empty());
            }
            _ => {}
        }
    }

    let user_id = ensure_user_scope(&auth.user_id, supplied_user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;
    let content =
        file_bytes.ok_or_else(|| AppError::bad_request("CSV file field is required."))?;
    let report = state
        .research
        .import_csv(&user_id, platform.as_deref(), &content)
        .await?;
    Ok(Json(serde_json::to_value(report)?))
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let charge_cost = state.credits.costs().cost_research_search;
    if charge_cost > 0 {
        users::ensure_user(&state.db_pool, &user_id).await?;
        state
            .credits
            .consume(&user_id, charge_cost, "Research search", Some("research_search"), None)
            .await?;
    }
    let page = state.research.search(&user_id, &request.filters).await?;
    Ok(Json(serde_json::to_value(page)?))
}

pub async fn list_collections(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<serde_json::Value>> {
    let collections = state.research.list_collections(&auth.user_id).await?;
    Ok(Json(serde_json::to_value(collections)?))
}

pub async fn get_item(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(item_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let item = state.research.get_item(&auth.user_id, &item_id).await?;
    Ok(Json(serde_json::to_value(item)?))
}

pub async fn export_collection(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<ExportRequest>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    let format = ExportFormat::parse(&request.format)?;
    let receipt = state
        .research
        .export_collection(&user_id, &request.collection_id, format)
        .await?;
    Ok(Json(serde_json::to_value(receipt)?))
}

/// Signed-URL download: the token binds the user and export id.
pub async fn download_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let path = state.research.resolve_export_file(&export_id, &query.token)?;
    stream_export_file(path).await
}

pub(crate) async fn stream_export_file(path: std::path::PathBuf) -> Result<Response> {
    let bytes = tokio::fs::read(&path).await?;
    let content_type = if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
        "application/json"
    } else {
        "text/csv"
    };
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "export".to_string());

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        )
        .body(Body::from(bytes))
        .map_err(|err| AppError::internal(anyhow::anyhow!(err)))
}
