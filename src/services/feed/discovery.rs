//! Feed discovery/search over the research corpus with trending
//! projection.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    DiscoveryMode, ExportFormat, ItemMetrics, Platform, ResearchCollection, ResearchItem,
    SortDirection, Timeframe,
};
use crate::services::signed_url::FEED_EXPORT_PURPOSE;

use super::{FeedService, TelemetryDetails};

pub const FEED_SORT_KEYS: [&str; 10] = [
    "trending_score",
    "engagement_rate",
    "views_per_hour",
    "views",
    "likes",
    "comments",
    "shares",
    "saves",
    "posted_at",
    "created_at",
];

pub const TOPIC_STOPWORDS: [&str; 18] = [
    "the", "and", "with", "from", "that", "this", "your", "for", "are", "you", "how", "why",
    "what", "when", "into", "about", "news", "video",
];

/// Projected feed row: canonical item plus derived ranking signals.
#[derive(Debug, Clone, Serialize)]
pub struct FeedItemPayload {
    pub item_id: String,
    pub platform: String,
    pub source_type: String,
    pub url: Option<String>,
    pub external_id: Option<String>,
    pub creator_handle: Option<String>,
    pub creator_display_name: Option<String>,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub metrics: ItemMetrics,
    pub published_at: Option<String>,
    pub created_at: String,
    pub engagement_rate: f64,
    pub views_per_hour: f64,
    pub trending_score: f64,
}

pub fn engagement_rate(metrics: &ItemMetrics) -> f64 {
    let views = metrics.views.max(1) as f64;
    (metrics.likes + metrics.comments + metrics.shares + metrics.saves) as f64 / views
}

pub fn published_reference(item: &ResearchItem) -> DateTime<Utc> {
    item.published_at.unwrap_or(item.created_at)
}

pub fn views_per_hour(views: i64, reference_ts: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_hours = ((now - reference_ts).num_seconds() as f64 / 3600.0).max(1.0);
    views as f64 / age_hours
}

pub fn recency_decay(reference_ts: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_hours = ((now - reference_ts).num_seconds() as f64 / 3600.0).max(0.0);
    (-age_hours / 120.0).exp()
}

/// [0,100] ranking value combining velocity, engagement, amplification,
/// and recency.
pub fn trending_score(
    metrics: &ItemMetrics,
    views_per_hour: f64,
    engagement_rate: f64,
    reference_ts: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let velocity_signal = (views_per_hour / 10_000.0).clamp(0.0, 1.0);
    let engagement_signal = (engagement_rate * 4.0).clamp(0.0, 1.0);
    let shares_saves = (metrics.shares + metrics.saves) as f64;
    let views = metrics.views.max(1) as f64;
    let share_save_signal = ((shares_saves / views) * 8.0).clamp(0.0, 1.0);
    let recency_signal = recency_decay(reference_ts, now).clamp(0.0, 1.0);

    let score = (0.35 * velocity_signal
        + 0.25 * engagement_signal
        + 0.20 * share_save_signal
        + 0.20 * recency_signal)
        * 100.0;
    (score * 100.0).round() / 100.0
}

pub fn project_item(item: &ResearchItem, now: DateTime<Utc>) -> FeedItemPayload {
    let metrics = item.metrics();
    let reference_ts = published_reference(item);
    let rate = engagement_rate(&metrics);
    let velocity = views_per_hour(metrics.views, reference_ts, now);
    FeedItemPayload {
        item_id: item.id.clone(),
        platform: item.platform.clone(),
        source_type: item.source_type.clone(),
        url: item.url.clone(),
        external_id: item.external_id.clone(),
        creator_handle: item.creator_handle.clone(),
        creator_display_name: item.creator_display_name.clone(),
        title: item.title.clone(),
        caption: item.caption.clone(),
        metrics,
        published_at: item.published_at.map(|ts| ts.to_rfc3339()),
        created_at: item.created_at.to_rfc3339(),
        engagement_rate: (rate * 10_000.0).round() / 10_000.0,
        views_per_hour: (velocity * 100.0).round() / 100.0,
        trending_score: trending_score(&metrics, velocity, rate, reference_ts, now),
    }
}

pub fn search_blob(item: &ResearchItem) -> String {
    [
        item.url.as_deref().unwrap_or_default(),
        item.title.as_deref().unwrap_or_default(),
        item.caption.as_deref().unwrap_or_default(),
        item.creator_handle.as_deref().unwrap_or_default(),
        item.creator_display_name.as_deref().unwrap_or_default(),
    ]
    .join(" ")
    .to_lowercase()
}

/// Hashtags are matched case-insensitively: the blob is lowercased before
/// extraction and queries are normalized the same way.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([a-zA-Z0-9_]+)").unwrap())
        .captures_iter(&text.to_lowercase())
        .map(|captures| captures[1].to_string())
        .collect()
}

pub fn extract_topic_keywords(text: &str, limit: usize) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[a-zA-Z0-9]{3,}").unwrap());
    let mut seen = HashSet::new();
    re.find_iter(&text.to_lowercase())
        .map(|token| token.as_str().to_string())
        .filter(|token| !TOPIC_STOPWORDS.contains(&token.as_str()))
        .filter(|token| seen.insert(token.clone()))
        .take(limit)
        .collect()
}

pub fn mode_match(item: &ResearchItem, mode: DiscoveryMode, query: &str) -> bool {
    let query = query.to_lowercase();
    let blob = search_blob(item);
    match mode {
        DiscoveryMode::Profile => {
            item.creator_handle
                .as_deref()
                .unwrap_or_default()
                .to_lowercase()
                .contains(&query)
                || item
                    .creator_display_name
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase()
                    .contains(&query)
        }
        DiscoveryMode::Hashtag => {
            let hashtags: HashSet<String> = extract_hashtags(&blob).into_iter().collect();
            let normalized = query.strip_prefix('#').unwrap_or(&query);
            hashtags.contains(normalized)
        }
        DiscoveryMode::Audio => {
            let meta_blob = [
                item.media_meta_str("audio_id").unwrap_or_default(),
                item.media_meta_str("audio_title").unwrap_or_default(),
                item.media_meta_str("sound_id").unwrap_or_default(),
                item.media_meta_str("sound_title").unwrap_or_default(),
                item.media_meta_str("music").unwrap_or_default(),
                blob,
            ]
            .join(" ")
            .to_lowercase();
            meta_blob.contains(&query)
        }
        DiscoveryMode::Keyword => blob.contains(&query),
    }
}

/// Stable sorting: rows pre-sorted alphabetically by item_id, then a
/// stable sort by the requested key.
pub fn sort_rows(rows: &mut Vec<FeedItemPayload>, sort_by: &str, direction: SortDirection) {
    let resolved = if FEED_SORT_KEYS.contains(&sort_by) {
        sort_by
    } else {
        "trending_score"
    };

    rows.sort_by(|a, b| a.item_id.cmp(&b.item_id));
    rows.sort_by(|a, b| {
        let ordering = match resolved {
            "views" => a.metrics.views.cmp(&b.metrics.views),
            "likes" => a.metrics.likes.cmp(&b.metrics.likes),
            "comments" => a.metrics.comments.cmp(&b.metrics.comments),
            "shares" => a.metrics.shares.cmp(&b.metrics.shares),
            "saves" => a.metrics.saves.cmp(&b.metrics.saves),
            "engagement_rate" => a
                .engagement_rate
                .partial_cmp(&b.engagement_rate)
                .unwrap_or(std::cmp::Ordering::Equal),
            "views_per_hour" => a
                .views_per_hour
                .partial_cmp(&b.views_per_hour)
                .unwrap_or(std::cmp::Ordering::Equal),
            "posted_at" => a
                .published_at
                .clone()
                .unwrap_or_default()
                .cmp(&b.published_at.clone().unwrap_or_default()),
            "created_at" => a.created_at.cmp(&b.created_at),
            _ => a
                .trending_score
                .partial_cmp(&b.trending_score)
                .unwrap_or(std::cmp::Ordering::Equal),
        };
        if direction.is_descending() {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub page: i64,
    pub limit: i64,
    pub total_count: usize,
    pub has_more: bool,
    pub items: Vec<FeedItemPayload>,
}

pub fn paginate(rows: Vec<FeedItemPayload>, page: Option<i64>, limit: Option<i64>) -> FeedPage {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(20).clamp(1, 100);
    let start = ((page - 1) * limit) as usize;
    let end = (start + limit as usize).min(rows.len());
    let has_more = end < rows.len();
    let items = if start < rows.len() {
        rows[start..end].to_vec()
    } else {
        Vec::new()
    };
    FeedPage {
        page,
        limit,
        total_count: rows.len(),
        has_more,
        items,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoverParams {
    pub platform: Option<String>,
    pub mode: Option<String>,
    pub query: Option<String>,
    pub timeframe: Option<String>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverResponse {
    pub run_id: String,
    pub platform: String,
    pub mode: String,
    pub query: String,
    pub timeframe: String,
    pub ingestion_method: String,
    pub source_health: serde_json::Value,
    #[serde(flatten)]
    pub page: FeedPage,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedSearchResponse {
    pub platform: String,
    pub mode: Option<String>,
    pub query: String,
    pub timeframe: String,
    #[serde(flatten)]
    pub page: FeedPage,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedExportReceipt {
    pub export_id: String,
    pub status: String,
    pub format: String,
    pub item_count: usize,
    pub signed_url: String,
}

impl FeedService {
    async fn base_rows(
        &self,
        user_id: &str,
        platform: Option<Platform>,
        timeframe: Timeframe,
    ) -> Result<Vec<ResearchItem>> {
        let mut rows = match platform {
            Some(platform) => {
                sqlx::query_as::<_, ResearchItem>(
                    "SELECT * FROM research_items WHERE user_id = $1 AND platform = $2",
                )
                .bind(user_id)
                .bind(platform.as_str())
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, ResearchItem>(
                    "SELECT * FROM research_items WHERE user_id = $1",
                )
                .bind(user_id)
                .fetch_all(self.pool())
                .await?
            }
        };
        if let Some(cutoff) = timeframe.cutoff(Utc::now()) {
            rows.retain(|row| published_reference(row) >= cutoff);
        }
        Ok(rows)
    }

    /// Stage 1 of the loop: discovery over the corpus with trending
    /// projection.
    pub async fn discover(&self, user_id: &str, params: &DiscoverParams) -> Result<DiscoverResponse> {
        self.assert_research_enabled()?;
        let platform = Platform::parse(params.platform.as_deref().unwrap_or_default())?;
        let mode = DiscoveryMode::parse(params.mode.as_deref().unwrap_or_default())?;
        let query = params
            .query
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::bad_request("query is required for feed discovery."))?;
        let timeframe = Timeframe::parse_or(params.timeframe.as_deref(), Timeframe::Week)?;

        let base = self.base_rows(user_id, Some(platform), timeframe).await?;
        let now = Utc::now();
        let mut projected: Vec<FeedItemPayload> = base
            .iter()
            .filter(|item| mode_match(item, mode, &query))
            .map(|item| project_item(item, now))
            .collect();

        let sort_by = params.sort_by.as_deref().unwrap_or("trending_score");
        let direction = SortDirection::parse_or(params.sort_direction.as_deref(), SortDirection::Desc)?;
        sort_rows(&mut projected, sort_by, direction);
        let page = paginate(projected, params.page, params.limit);

        let response = DiscoverResponse {
            run_id: Uuid::new_v4().to_string(),
            platform: platform.as_str().to_string(),
            mode: mode.as_str().to_string(),
            query: params.query.clone().unwrap_or_default().trim().to_string(),
            timeframe: timeframe.as_str().to_string(),
            ingestion_method: "research_corpus".to_string(),
            source_health: serde_json::json!({
                "research_corpus": if page.total_count > 0 { "healthy" } else { "empty" },
                "official_provider": "not_configured",
                "collector": "not_enabled",
            }),
            page,
        };

        self.telemetry()
            .record(
                user_id,
                "feed_discover",
                "ok",
                TelemetryDetails {
                    platform: Some(platform.as_str().to_string()),
                    source_item_id: None,
                    details: Some(serde_json::json!({
                        "mode": mode.as_str(),
                        "query": query.chars().take(80).collect::<String>(),
                        "result_count": response.page.total_count,
                    })),
                },
            )
            .await;
        Ok(response)
    }

    /// Free-form feed search; mode and platform both optional.
    pub async fn search(&self, user_id: &str, params: &DiscoverParams) -> Result<FeedSearchResponse> {
        self.assert_research_enabled()?;
        let platform = Platform::parse_optional(params.platform.as_deref())?;
        let mode = match params.mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(raw) => Some(DiscoveryMode::parse(raw)?),
            None => None,
        };
        let query = params
            .query
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());
        let timeframe = Timeframe::parse_or(params.timeframe.as_deref(), Timeframe::All)?;

        let base = self.base_rows(user_id, platform, timeframe).await?;
        let now = Utc::now();
        let mut projected: Vec<FeedItemPayload> = base
            .iter()
            .filter(|item| match (&query, mode) {
                (Some(query), Some(mode)) => mode_match(item, mode, query),
                (Some(query), None) => search_blob(item).contains(query.as_str()),
                (None, _) => true,
            })
            .map(|item| project_item(item, now))
            .collect();

        let sort_by = params.sort_by.as_deref().unwrap_or("trending_score");
        let direction = SortDirection::parse_or(params.sort_direction.as_deref(), SortDirection::Desc)?;
        sort_rows(&mut projected, sort_by, direction);
        let page = paginate(projected, params.page, params.limit);

        let response = FeedSearchResponse {
            platform: platform
                .map(|p| p.as_str().to_string())
                .unwrap_or_else(|| "all".to_string()),
            mode: mode.map(|m| m.as_str().to_string()),
            query: params.query.clone().unwrap_or_default().trim().to_string(),
            timeframe: timeframe.as_str().to_string(),
            page,
        };

        self.telemetry()
            .record(
                user_id,
                "feed_search",
                "ok",
                TelemetryDetails {
                    platform: platform.map(|p| p.as_str().to_string()),
                    source_item_id: None,
                    details: Some(serde_json::json!({
                        "mode": &response.mode,
                        "query": response.query.chars().take(80).collect::<String>(),
                        "result_count": response.page.total_count,
                    })),
                },
            )
            .await;
        Ok(response)
    }

    /// Idempotent favorite toggle written into the item's media_meta.
    pub async fn toggle_favorite(
        &self,
        user_id: &str,
        item_id: &str,
        favorite: bool,
    ) -> Result<serde_json::Value> {
        self.assert_research_enabled()?;
        let item = self.resolve_source_item(user_id, item_id).await?;

        let mut meta = item.media_meta();
        meta.insert("favorite".into(), serde_json::json!(favorite));
        sqlx::query("UPDATE research_items SET media_meta_json = $2 WHERE id = $1")
            .bind(&item.id)
            .bind(serde_json::Value::Object(meta))
            .execute(self.pool())
            .await?;

        self.telemetry()
            .record(
                user_id,
                "feed_favorite_toggle",
                "ok",
                TelemetryDetails {
                    platform: Some(item.platform.clone()),
                    source_item_id: Some(item.id.clone()),
                    details: Some(serde_json::json!({ "favorite": favorite })),
                },
            )
            .await;
        Ok(serde_json::json!({ "item_id": item.id, "favorite": favorite }))
    }

    /// Reassign items to a collection (at most one collection per item).
    pub async fn assign_collection(
        &self,
        user_id: &str,
        item_ids: &[String],
        collection_id: &str,
    ) -> Result<serde_json::Value> {
        self.assert_research_enabled()?;
        let unique_ids = super::clean_ids(item_ids);
        if unique_ids.is_empty() {
            return Err(AppError::bad_request("item_ids must include at least one id."));
        }

        let collection = sqlx::query_as::<_, ResearchCollection>(
            "SELECT * FROM research_collections WHERE id = $1 AND user_id = $2",
        )
        .bind(collection_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::not_found("Collection"))?;

        let items = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE user_id = $1 AND id = ANY($2)",
        )
        .bind(user_id)
        .bind(&unique_ids)
        .fetch_all(self.pool())
        .await?;
        let found_ids: HashSet<String> = items.iter().map(|item| item.id.clone()).collect();

        sqlx::query(
            "UPDATE research_items SET collection_id = $3 WHERE user_id = $1 AND id = ANY($2)",
        )
        .bind(user_id)
        .bind(&unique_ids)
        .bind(&collection.id)
        .execute(self.pool())
        .await?;

        for item in &items {
            self.telemetry()
                .record(
                    user_id,
                    "feed_collection_assign",
                    "ok",
                    TelemetryDetails {
                        platform: Some(item.platform.clone()),
                        source_item_id: Some(item.id.clone()),
                        details: Some(serde_json::json!({ "collection_id": collection.id.clone() })),
                    },
                )
                .await;
        }

        let missing: Vec<String> = unique_ids
            .iter()
            .filter(|id| !found_ids.contains(*id))
            .take(25)
            .cloned()
            .collect();
        Ok(serde_json::json!({
            "collection_id": collection.id,
            "assigned_count": items.len(),
            "missing_count": unique_ids.len() - items.len(),
            "missing_item_ids": missing,
        }))
    }

    /// Export matching feed rows to a per-user file + signed URL.
    pub async fn export(
        &self,
        user_id: &str,
        params: &DiscoverParams,
        format: ExportFormat,
        item_ids: Option<&[String]>,
        max_rows: Option<i64>,
    ) -> Result<FeedExportReceipt> {
        self.assert_research_enabled()?;

        let now = Utc::now();
        let rows: Vec<FeedItemPayload> = if let Some(ids) = item_ids.filter(|ids| !ids.is_empty()) {
            let unique_ids = super::clean_ids(ids);
            if unique_ids.is_empty() {
                return Err(AppError::bad_request("item_ids must include at least one id."));
            }
            let items = sqlx::query_as::<_, ResearchItem>(
                "SELECT * FROM research_items WHERE user_id = $1 AND id = ANY($2)",
            )
            .bind(user_id)
            .bind(&unique_ids)
            .fetch_all(self.pool())
            .await?;
            let by_id: std::collections::HashMap<String, &ResearchItem> =
                items.iter().map(|item| (item.id.clone(), item)).collect();
            unique_ids
                .iter()
                .filter_map(|id| by_id.get(id).map(|item| project_item(item, now)))
                .collect()
        } else {
            let max_rows = max_rows.unwrap_or(500).clamp(1, 5000) as usize;
            let mut collected = Vec::new();
            let mut page = 1i64;
            loop {
                let mut scoped = params.clone();
                scoped.page = Some(page);
                scoped.limit = Some(100);
                let result = self.search(user_id, &scoped).await?;
                let has_more = result.page.has_more;
                collected.extend(result.page.items);
                if !has_more || collected.len() >= max_rows {
                    break;
                }
                page += 1;
            }
            collected.truncate(max_rows);
            collected
        };

        let export_id = Uuid::new_v4().to_string();
        let user_dir = PathBuf::from(&self.config().uploads.export_dir).join(user_id);
        tokio::fs::create_dir_all(&user_dir).await?;
        let file_path = user_dir.join(format!("feed_{}.{}", export_id, format.as_str()));

        match format {
            ExportFormat::Json => {
                let body = serde_json::to_string_pretty(&rows)
                    .map_err(|err| AppError::internal(anyhow::anyhow!(err)))?;
                tokio::fs::write(&file_path, body).await?;
            }
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_writer(Vec::new());
                writer
                    .write_record([
                        "item_id",
                        "platform",
                        "source_type",
                        "url",
                        "external_id",
                        "creator_handle",
                        "creator_display_name",
                        "title",
                        "caption",
                        "views",
                        "likes",
                        "comments",
                        "shares",
                        "saves",
                        "engagement_rate",
                        "views_per_hour",
                        "trending_score",
                        "published_at",
                        "created_at",
                    ])
                    .map_err(|err| AppError::internal(anyhow::anyhow!(err)))?;
                for row in &rows {
                    writer
                        .write_record([
                            row.item_id.as_str(),
                            row.platform.as_str(),
                            row.source_type.as_str(),
                            row.url.as_deref().unwrap_or(""),
                            row.external_id.as_deref().unwrap_or(""),
                            row.creator_handle.as_deref().unwrap_or(""),
                            row.creator_display_name.as_deref().unwrap_or(""),
                            row.title.as_deref().unwrap_or(""),
                            row.caption.as_deref().unwrap_or(""),
                            &row.metrics.views.to_string(),
                            &row.metrics.likes.to_string(),
                            &row.metrics.comments.to_string(),
                            &row.metrics.shares.to_string(),
                            &row.metrics.saves.to_string(),
                            &row.engagement_rate.to_string(),
                            &row.views_per_hour.to_string(),
                            &row.trending_score.to_string(),
                            row.published_at.as_deref().unwrap_or(""),
                            row.created_at.as_str(),
                        ])
                        .map_err(|err| AppError::internal(anyhow::anyhow!(err)))?;
                }
                let bytes = writer
                    .into_inner()
                    .map_err(|err| AppError::internal(anyhow::anyhow!(err.to_string())))?;
                tokio::fs::write(&file_path, bytes).await?;
            }
        }

        let token = self
            .signed_urls()
            .mint_export_token(user_id, &export_id, FEED_EXPORT_PURPOSE)?;
        self.telemetry()
            .record(
                user_id,
                "feed_export",
                "ok",
                TelemetryDetails {
                    platform: params.platform.clone(),
                    source_item_id: None,
                    details: Some(serde_json::json!({
                        "format": format.as_str(),
                        "item_count": rows.len(),
                    })),
                },
            )
            .await;

        Ok(FeedExportReceipt {
            export_id: export_id.clone(),
            status: "completed".to_string(),
            format: format.as_str().to_string(),
            item_count: rows.len(),
            signed_url: format!("/feed/export/{}/download?token={}", export_id, token),
        })
    }

    pub fn resolve_feed_export_file(&self, export_id: &str, token: &str) -> Result<PathBuf> {
        let claims = self
            .signed_urls()
            .verify_export_token(token, export_id, FEED_EXPORT_PURPOSE)?;
        crate::services::research::resolve_export_path(
            &self.config().uploads.export_dir,
            &claims.sub,
            export_id,
            "feed_",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(id: &str, views: i64, published_hours_ago: i64, now: DateTime<Utc>) -> ResearchItem {
        ResearchItem {
            id: id.to_string(),
            user_id: "u".to_string(),
            collection_id: None,
            platform: "instagram".to_string(),
            source_type: "manual_url".to_string(),
            url: Some(format!("https://instagram.com/reel/{id}")),
            external_id: Some(id.to_string()),
            creator_handle: Some("@creator".to_string()),
            creator_display_name: Some("Creator".to_string()),
            title: Some("How I grew #growth".to_string()),
            caption: Some("A caption with #Growth and #hooks".to_string()),
            metrics_json: serde_json::json!({
                "views": views, "likes": views / 10, "comments": views / 100,
                "shares": views / 200, "saves": views / 200,
            }),
            media_meta_json: serde_json::json!({}),
            published_at: Some(now - Duration::hours(published_hours_ago)),
            created_at: now - Duration::hours(published_hours_ago),
        }
    }

    #[test]
    fn newer_identical_item_trends_strictly_higher() {
        let now = Utc::now();
        let newer = item("a", 47_000, 2, now);
        let older = item("b", 47_000, 48, now);
        let newer_payload = project_item(&newer, now);
        let older_payload = project_item(&older, now);
        assert!(newer_payload.trending_score > older_payload.trending_score);
    }

    #[test]
    fn zero_view_item_is_recency_dominated() {
        let now = Utc::now();
        let quiet = item("a", 0, 1, now);
        let payload = project_item(&quiet, now);
        assert_eq!(payload.engagement_rate, 0.0);
        // velocity/engagement/amplification are all zero; only recency
        // contributes (weight 0.20 -> max 20 points).
        assert!(payload.trending_score <= 20.0);
        assert!(payload.trending_score > 15.0);
    }

    #[test]
    fn hashtag_mode_is_case_insensitive() {
        let now = Utc::now();
        let row = item("a", 100, 1, now);
        assert!(mode_match(&row, DiscoveryMode::Hashtag, "#GROWTH"));
        assert!(mode_match(&row, DiscoveryMode::Hashtag, "growth"));
        assert!(!mode_match(&row, DiscoveryMode::Hashtag, "missing"));
    }

    #[test]
    fn profile_mode_matches_handles() {
        let now = Utc::now();
        let row = item("a", 100, 1, now);
        assert!(mode_match(&row, DiscoveryMode::Profile, "creator"));
        assert!(!mode_match(&row, DiscoveryMode::Profile, "someoneelse"));
    }

    #[test]
    fn sort_is_stable_with_item_id_tiebreak() {
        let now = Utc::now();
        let mut rows = vec![
            project_item(&item("b", 100, 5, now), now),
            project_item(&item("a", 100, 5, now), now),
        ];
        sort_rows(&mut rows, "views", SortDirection::Desc);
        assert_eq!(rows[0].item_id, "a");
        assert_eq!(rows[1].item_id, "b");
    }

    #[test]
    fn pagination_caps_limit_at_100() {
        let now = Utc::now();
        let rows: Vec<FeedItemPayload> = (0..150)
            .map(|i| project_item(&item(&format!("i{i:03}"), 100, 1, now), now))
            .collect();
        let page = paginate(rows, Some(1), Some(500));
        assert_eq!(page.limit, 100);
        assert_eq!(page.items.len(), 100);
        assert!(page.has_more);
    }

    #[test]
    fn topic_keywords_skip_stopwords() {
        let keywords = extract_topic_keywords("How the growth hooks work for your channel", 3);
        assert!(!keywords.contains(&"the".to_string()));
        assert!(keywords.contains(&"growth".to_string()));
        assert!(keywords.len() <= 3);
    }
}
