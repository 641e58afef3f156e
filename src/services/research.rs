//! Research corpus ingestion, search, and export.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::{
    ExportFormat, ItemMetrics, Platform, ResearchCollection, ResearchItem, SortDirection, Timeframe,
};
use crate::services::signed_url::{SignedUrlService, RESEARCH_EXPORT_PURPOSE};
use crate::services::youtube::YouTubeClient;

pub const CSV_IMPORT_MAX_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_COLLECTION_NAME: &str = "Default Collection";

const RESEARCH_SORT_KEYS: [&str; 7] = [
    "created_at",
    "posted_at",
    "views",
    "likes",
    "comments",
    "shares",
    "saves",
];

#[derive(Debug, Clone, Serialize)]
pub struct ResearchItemPayload {
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
    pub media_meta: serde_json::Value,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub collection_id: Option<String>,
}

impl ResearchItemPayload {
    pub fn from_item(item: &ResearchItem) -> Self {
        Self {
            item_id: item.id.clone(),
            platform: item.platform.clone(),
            source_type: item.source_type.clone(),
            url: item.url.clone(),
            external_id: item.external_id.clone(),
            creator_handle: item.creator_handle.clone(),
            creator_display_name: item.creator_display_name.clone(),
            title: item.title.clone(),
            caption: item.caption.clone(),
            metrics: item.metrics(),
            media_meta: item.media_meta_json.clone(),
            published_at: item.published_at,
            created_at: item.created_at,
            collection_id: item.collection_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub page: i64,
    pub limit: i64,
    pub total_count: usize,
    pub has_more: bool,
    pub items: Vec<ResearchItemPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    pub platform: Option<String>,
    pub timeframe: Option<String>,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReceipt {
    pub export_id: String,
    pub status: String,
    pub format: String,
    pub item_count: usize,
    pub signed_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CsvImportReport {
    pub imported_count: usize,
    pub failed_rows: Vec<CsvRowFailure>,
    pub collection_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CsvRowFailure {
    pub row: usize,
    pub error: String,
}

/// Infer the platform from an explicit hint or the URL domain.
pub fn infer_platform(hint: Option<&str>, url: &str) -> Result<Platform> {
    if let Some(platform) = Platform::parse_optional(hint)? {
        return Ok(platform);
    }
    let lower = url.trim().to_lowercase();
    if lower.contains("instagram.com") {
        Ok(Platform::Instagram)
    } else if lower.contains("tiktok.com") {
        Ok(Platform::Tiktok)
    } else if lower.contains("youtube.com") || lower.contains("youtu.be") {
        Ok(Platform::Youtube)
    } else {
        Err(AppError::bad_request(
            "Unable to infer platform. Provide platform explicitly.",
        ))
    }
}

fn youtube_id_regexes() -> &'static [Regex; 3] {
    static REGEXES: OnceLock<[Regex; 3]> = OnceLock::new();
    REGEXES.get_or_init(|| {
        [
            Regex::new(r"v=([A-Za-z0-9_-]{11})").unwrap(),
            Regex::new(r"youtu\.be/([A-Za-z0-9_-]{11})").unwrap(),
            Regex::new(r"shorts/([A-Za-z0-9_-]{11})").unwrap(),
        ]
    })
}

/// Extract the platform-native video id from a share URL.
pub fn extract_external_id(platform: Platform, url: &str) -> Option<String> {
    let text = url.trim();
    match platform {
        Platform::Youtube => youtube_id_regexes()
            .iter()
            .find_map(|re| re.captures(text).map(|c| c[1].to_string())),
        Platform::Instagram => {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new(r"/(?:reel|p)/([A-Za-z0-9_-]+)").unwrap())
                .captures(text)
                .map(|c| c[1].to_string())
        }
        Platform::Tiktok => {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new(r"/video/([0-9]+)").unwrap())
                .captures(text)
                .map(|c| c[1].to_string())
        }
    }
}

/// Extract a `@handle` from a share URL when present.
pub fn extract_creator_handle(platform: Platform, url: &str) -> Option<String> {
    let text = url.trim();
    let pattern = match platform {
        Platform::Instagram => r"instagram\.com/([A-Za-z0-9._]+)/",
        Platform::Tiktok => r"tiktok\.com/@([A-Za-z0-9._-]+)",
        Platform::Youtube => r"youtube\.com/@([A-Za-z0-9._-]+)",
    };
    Regex::new(pattern)
        .ok()?
        .captures(text)
        .map(|c| format!("@{}", &c[1]))
}

fn parse_datetime(value: Option<&str>) -> Option<DateTime<Utc>> {
    let text = value?.trim();
    if text.is_empty() {
        return None;
    }
    let normalized = text.replace('Z', "+00:00");
    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn clean_optional(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct ResearchService {
    pool: PgPool,
    config: std::sync::Arc<AppConfig>,
    signed_urls: SignedUrlService,
}

impl ResearchService {
    pub fn new(pool: PgPool, config: std::sync::Arc<AppConfig>) -> Self {
        let signed_urls = SignedUrlService::new(&config.auth.jwt_secret);
        Self {
            pool,
            config,
            signed_urls,
        }
    }

    fn assert_enabled(&self) -> Result<()> {
        if !self.config.features.research_enabled {
            return Err(AppError::FeatureDisabled(
                "Research module disabled by feature flag.".to_string(),
            ));
        }
        Ok(())
    }

    async fn ensure_default_collection(&self, user_id: &str) -> Result<ResearchCollection> {
        if let Some(collection) = sqlx::query_as::<_, ResearchCollection>(
            "SELECT * FROM research_collections WHERE user_id = $1 AND is_system = TRUE AND name = $2 LIMIT 1",
        )
        .bind(user_id)
        .bind(DEFAULT_COLLECTION_NAME)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(collection);
        }

        let collection = sqlx::query_as::<_, ResearchCollection>(
            r#"
            INSERT INTO research_collections (id, user_id, name, platform, description, is_system)
            VALUES ($1, $2, $3, 'mixed', 'Default collection for imported research items.', TRUE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(DEFAULT_COLLECTION_NAME)
        .fetch_one(&self.pool)
        .await?;
        Ok(collection)
    }

    async fn insert_item(
        &self,
        user_id: &str,
        collection_id: &str,
        platform: Platform,
        source_type: &str,
        url: Option<&str>,
        external_id: Option<&str>,
        creator_handle: Option<&str>,
        creator_display_name: Option<&str>,
        title: Option<&str>,
        caption: Option<&str>,
        metrics: ItemMetrics,
        media_meta: serde_json::Value,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<ResearchItem> {
        let item = sqlx::query_as::<_, ResearchItem>(
            r#"
            INSERT INTO research_items (
                id, user_id, collection_id, platform, source_type, url, external_id,
                creator_handle, creator_display_name, title, caption,
                metrics_json, media_meta_json, published_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(collection_id)
        .bind(platform.as_str())
        .bind(source_type)
        .bind(url)
        .bind(external_id)
        .bind(creator_handle)
        .bind(creator_display_name)
        .bind(title)
        .bind(caption)
        .bind(metrics.to_value())
        .bind(media_meta)
        .bind(published_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(item)
    }

    /// Import a single URL; YouTube items are enriched through the
    /// platform-data client, best-effort.
    pub async fn import_url(
        &self,
        user_id: &str,
        platform_hint: Option<&str>,
        url: &str,
    ) -> Result<ResearchItemPayload> {
        self.assert_enabled()?;
        let canonical_url = url.trim();
        if canonical_url.is_empty() {
            return Err(AppError::bad_request("url is required"));
        }
        let platform = infer_platform(platform_hint, canonical_url)?;
        let collection = self.ensure_default_collection(user_id).await?;

        let external_id = extract_external_id(platform, canonical_url);
        let creator_handle = extract_creator_handle(platform, canonical_url);
        let mut title: Option<String> = None;
        let mut caption: Option<String> = None;
        let mut metrics = ItemMetrics::default();
        let mut media_meta = serde_json::json!({
            "import_mode": "manual_url",
            "download_enabled": self.config.features.allow_external_media_download,
        });

        if platform == Platform::Youtube {
            if let Some(video_id) = external_id.as_deref() {
                match self.enrich_youtube(video_id).await {
                    Ok(Some(details)) => {
                        title = clean_optional(Some(&details.title));
                        caption = clean_optional(Some(&details.description));
                        metrics.views = details.view_count;
                        metrics.likes = details.like_count;
                        metrics.comments = details.comment_count;
                        if let Some(map) = media_meta.as_object_mut() {
                            map.insert(
                                "thumbnail_url".into(),
                                serde_json::json!(details.thumbnail_url),
                            );
                            map.insert(
                                "duration_seconds".into(),
                                serde_json::json!(details.duration_seconds),
                            );
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(
                            url = %canonical_url,
                            error = %err,
                            "youtube enrichment failed for research import"
                        );
                    }
                }
            }
        }

        let item = self
            .insert_item(
                user_id,
                &collection.id,
                platform,
                "manual_url",
                Some(canonical_url),
                external_id.as_deref(),
                creator_handle.as_deref(),
                creator_handle.as_deref(),
                title.as_deref(),
                caption.as_deref(),
                metrics,
                media_meta,
                None,
            )
            .await?;
        tracing::info!(user_id = %user_id, platform = %platform, item_id = %item.id, "research_import_url");
        Ok(ResearchItemPayload::from_item(&item))
    }

    async fn enrich_youtube(&self, video_id: &str) -> Result<Option<crate::services::youtube::VideoDetails>> {
        let api_key = self.config.providers.require_youtube_api_key()
            .map_err(|err| AppError::ServiceUnavailable(err.to_string()))?;
        let client = YouTubeClient::with_api_key(api_key);
        let mut details = client.get_video_details(&[video_id.to_string()]).await?;
        Ok(details.remove(video_id))
    }

    /// Structured capture from the browser bookmarklet.
    pub async fn capture(&self, user_id: &str, payload: &serde_json::Value) -> Result<ResearchItemPayload> {
        self.assert_enabled()?;
        let url = payload
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        let platform = infer_platform(payload.get("platform").and_then(|v| v.as_str()), &url)?;
        let collection = self.ensure_default_collection(user_id).await?;

        let field = |key: &str| -> Option<String> {
            clean_optional(payload.get(key).and_then(|v| v.as_str()))
        };
        let external_id = field("external_id").or_else(|| extract_external_id(platform, &url));
        let creator_handle =
            field("creator_handle").or_else(|| extract_creator_handle(platform, &url));
        let metrics = ItemMetrics::from_value(payload);
        let media_meta = payload
            .get("media_meta")
            .filter(|v| v.is_object())
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        let item = self
            .insert_item(
                user_id,
                &collection.id,
                platform,
                "browser_capture",
                (!url.is_empty()).then_some(url.as_str()),
                external_id.as_deref(),
                creator_handle.as_deref(),
                field("creator_display_name")
                    .or_else(|| creator_handle.clone())
                    .as_deref(),
                field("title").as_deref(),
                field("caption").as_deref(),
                metrics,
                media_meta,
                parse_datetime(payload.get("published_at").and_then(|v| v.as_str())),
            )
            .await?;
        tracing::info!(user_id = %user_id, platform = %platform, item_id = %item.id, "research_capture");
        Ok(ResearchItemPayload::from_item(&item))
    }

    /// Bulk CSV import. Creates a fresh non-system collection and inserts
    /// one item per row, coercing numeric metrics.
    pub async fn import_csv(
        &self,
        user_id: &str,
        platform_hint: Option<&str>,
        content: &[u8],
    ) -> Result<CsvImportReport> {
        self.assert_enabled()?;
        if content.len() > CSV_IMPORT_MAX_BYTES {
            return Err(AppError::PayloadTooLarge(
                "CSV file too large. Max 5MB.".to_string(),
            ));
        }
        let text = String::from_utf8_lossy(content).to_string();
        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let headers = reader
            .headers()
            .map_err(|err| AppError::bad_request(format!("Invalid CSV: {err}")))?
            .clone();

        let collection = sqlx::query_as::<_, ResearchCollection>(
            r#"
            INSERT INTO research_collections (id, user_id, name, platform, description, is_system)
            VALUES ($1, $2, $3, $4, 'Bulk imported collection.', FALSE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(format!(
            "CSV Import {}",
            Utc::now().format("%Y-%m-%d %H:%M")
        ))
        .bind(platform_hint.unwrap_or("mixed"))
        .fetch_one(&self.pool)
        .await?;

        let mut imported_count = 0usize;
        let mut failures = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let row_number = idx + 2;
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    failures.push(CsvRowFailure {
                        row: row_number,
                        error: format!("Unreadable row: {err}"),
                    });
                    continue;
                }
            };
            let get = |key: &str| -> Option<String> {
                headers
                    .iter()
                    .position(|h| h.eq_ignore_ascii_case(key))
                    .and_then(|pos| record.get(pos))
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            };

            let row_url = get("url").or_else(|| get("video_url")).unwrap_or_default();
            let platform = match infer_platform(
                platform_hint.or(get("platform").as_deref()),
                &row_url,
            ) {
                Ok(platform) => platform,
                Err(_) => {
                    failures.push(CsvRowFailure {
                        row: row_number,
                        error: "Could not infer platform".to_string(),
                    });
                    continue;
                }
            };

            let metrics = ItemMetrics {
                views: parse_count(get("views")),
                likes: parse_count(get("likes")),
                comments: parse_count(get("comments")),
                shares: parse_count(get("shares")),
                saves: parse_count(get("saves")),
            };
            let media_meta = serde_json::json!({
                "thumbnail_url": get("thumbnail_url"),
                "duration_seconds": parse_count(get("duration_seconds")),
            });

            self.insert_item(
                user_id,
                &collection.id,
                platform,
                "csv_import",
                (!row_url.is_empty()).then_some(row_url.as_str()),
                get("external_id")
                    .or_else(|| get("video_external_id"))
                    .or_else(|| extract_external_id(platform, &row_url))
                    .as_deref(),
                get("creator_handle")
                    .or_else(|| extract_creator_handle(platform, &row_url))
                    .as_deref(),
                get("creator_display_name").as_deref(),
                get("title").as_deref(),
                get("caption").or_else(|| get("description")).as_deref(),
                metrics,
                media_meta,
                parse_datetime(get("published_at").as_deref()),
            )
            .await?;
            imported_count += 1;
        }

        tracing::info!(
            user_id = %user_id,
            collection_id = %collection.id,
            imported = imported_count,
            failures = failures.len(),
            "research_import_csv"
        );
        Ok(CsvImportReport {
            imported_count,
            failed_rows: failures,
            collection_id: collection.id,
        })
    }

    /// In-corpus search with platform/timeframe/text filters, sorting, and
    /// pagination.
    pub async fn search(&self, user_id: &str, filters: &SearchFilters) -> Result<SearchPage> {
        self.assert_enabled()?;
        let mut items = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if let Some(platform) = Platform::parse_optional(filters.platform.as_deref())? {
            items.retain(|item| item.platform == platform.as_str());
        }

        let timeframe = Timeframe::parse_or(filters.timeframe.as_deref(), Timeframe::All)?;
        if let Some(cutoff) = timeframe.cutoff(Utc::now()) {
            items.retain(|item| {
                item.published_at.map(|ts| ts >= cutoff).unwrap_or(false)
                    || item.created_at >= cutoff
            });
        }

        if let Some(query) = filters
            .query
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty())
        {
            items.retain(|item| search_text(item).contains(&query));
        }

        let sort_by = filters
            .sort_by
            .as_deref()
            .map(str::trim)
            .filter(|key| RESEARCH_SORT_KEYS.contains(key))
            .unwrap_or("created_at");
        let direction = SortDirection::parse_or(filters.sort_direction.as_deref(), SortDirection::Desc)?;
        sort_items(&mut items, sort_by, direction);

        let page = filters.page.unwrap_or(1).max(1);
        let limit = filters.limit.unwrap_or(20).clamp(1, 100);
        let start = ((page - 1) * limit) as usize;
        let end = (start + limit as usize).min(items.len());
        let has_more = end < items.len();
        let slice = if start < items.len() {
            &items[start..end]
        } else {
            &[]
        };

        Ok(SearchPage {
            page,
            limit,
            total_count: items.len(),
            has_more,
            items: slice.iter().map(ResearchItemPayload::from_item).collect(),
        })
    }

    pub async fn list_collections(&self, user_id: &str) -> Result<Vec<ResearchCollection>> {
        self.assert_enabled()?;
        let rows = sqlx::query_as::<_, ResearchCollection>(
            "SELECT * FROM research_collections WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_item(&self, user_id: &str, item_id: &str) -> Result<ResearchItemPayload> {
        self.assert_enabled()?;
        let item = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE id = $1 AND user_id = $2",
        )
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Research item"))?;
        Ok(ResearchItemPayload::from_item(&item))
    }

    /// Export a collection to a per-user file and return a signed URL.
    pub async fn export_collection(
        &self,
        user_id: &str,
        collection_id: &str,
        format: ExportFormat,
    ) -> Result<ExportReceipt> {
        self.assert_enabled()?;
        let collection = sqlx::query_as::<_, ResearchCollection>(
            "SELECT * FROM research_collections WHERE id = $1 AND user_id = $2",
        )
        .bind(collection_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Collection"))?;

        let items = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE user_id = $1 AND collection_id = $2",
        )
        .bind(user_id)
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        let export_id = Uuid::new_v4().to_string();
        let user_dir = PathBuf::from(&self.config.uploads.export_dir).join(user_id);
        tokio::fs::create_dir_all(&user_dir).await?;
        let file_path = user_dir.join(format!("{}.{}", export_id, format.as_str()));

        let rows: Vec<serde_json::Value> = items
            .iter()
            .map(|item| {
                let metrics = item.metrics();
                serde_json::json!({
                    "collection_id": &collection.id,
                    "collection_name": &collection.name,
                    "item_id": &item.id,
                    "platform": &item.platform,
                    "url": &item.url,
                    "external_id": &item.external_id,
                    "creator_handle": &item.creator_handle,
                    "title": &item.title,
                    "caption": &item.caption,
                    "views": metrics.views,
                    "likes": metrics.likes,
                    "comments": metrics.comments,
                    "shares": metrics.shares,
                    "saves": metrics.saves,
                    "published_at": item.published_at.map(|ts| ts.to_rfc3339()),
                    "created_at": item.created_at.to_rfc3339(),
                })
            })
            .collect();

        match format {
            ExportFormat::Json => {
                let body = serde_json::to_string_pretty(&rows)
                    .map_err(|err| AppError::internal(anyhow::anyhow!(err)))?;
                tokio::fs::write(&file_path, body).await?;
            }
            ExportFormat::Csv => {
                let body = rows_to_csv(&rows)?;
                tokio::fs::write(&file_path, body).await?;
            }
        }

        let token = self
            .signed_urls
            .mint_export_token(user_id, &export_id, RESEARCH_EXPORT_PURPOSE)?;
        Ok(ExportReceipt {
            export_id: export_id.clone(),
            status: "completed".to_string(),
            format: format.as_str().to_string(),
            item_count: rows.len(),
            signed_url: format!("/research/export/{}/download?token={}", export_id, token),
        })
    }

    /// Verify a download token and resolve the export file on disk.
    pub fn resolve_export_file(&self, export_id: &str, token: &str) -> Result<PathBuf> {
        let claims =
            self.signed_urls
                .verify_export_token(token, export_id, RESEARCH_EXPORT_PURPOSE)?;
        resolve_export_path(&self.config.uploads.export_dir, &claims.sub, export_id, "")
    }
}

pub fn resolve_export_path(
    export_dir: &str,
    user_id: &str,
    export_id: &str,
    prefix: &str,
) -> Result<PathBuf> {
    for ext in ["csv", "json"] {
        let path = Path::new(export_dir)
            .join(user_id)
            .join(format!("{}{}.{}", prefix, export_id, ext));
        if path.exists() {
            return Ok(path);
        }
    }
    Err(AppError::not_found("Export file"))
}

fn parse_count(value: Option<String>) -> i64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|f| f as i64)
        .unwrap_or(0)
        .max(0)
}

fn search_text(item: &ResearchItem) -> String {
    [
        item.title.as_deref().unwrap_or_default(),
        item.caption.as_deref().unwrap_or_default(),
        item.creator_handle.as_deref().unwrap_or_default(),
        item.creator_display_name.as_deref().unwrap_or_default(),
    ]
    .join(" ")
    .to_lowercase()
}

fn sort_items(items: &mut [ResearchItem], sort_by: &str, direction: SortDirection) {
    items.sort_by(|a, b| {
        let ordering = match sort_by {
            "views" | "likes" | "comments" | "shares" | "saves" => {
                metric_of(a, sort_by).cmp(&metric_of(b, sort_by))
            }
            "posted_at" => a
                .published_at
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
                .cmp(&b.published_at.unwrap_or(DateTime::<Utc>::MIN_UTC)),
            _ => a.created_at.cmp(&b.created_at),
        };
        if direction.is_descending() {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn metric_of(item: &ResearchItem, key: &str) -> i64 {
    let metrics = item.metrics();
    match key {
        "views" => metrics.views,
        "likes" => metrics.likes,
        "comments" => metrics.comments,
        "shares" => metrics.shares,
        "saves" => metrics.saves,
        _ => 0,
    }
}

fn rows_to_csv(rows: &[serde_json::Value]) -> Result<String> {
    let fieldnames = [
        "collection_id",
        "collection_name",
        "item_id",
        "platform",
        "url",
        "external_id",
        "creator_handle",
        "title",
        "caption",
        "views",
        "likes",
        "comments",
        "shares",
        "saves",
        "published_at",
        "created_at",
    ];
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(fieldnames)
        .map_err(|err| AppError::internal(anyhow::anyhow!(err)))?;
    for row in rows {
        let record: Vec<String> = fieldnames
            .iter()
            .map(|key| match row.get(*key) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer
            .write_record(&record)
            .map_err(|err| AppError::internal(anyhow::anyhow!(err)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| AppError::internal(anyhow::anyhow!(err.to_string())))?;
    String::from_utf8(bytes).map_err(|err| AppError::internal(anyhow::anyhow!(err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_platform_from_url_domain() {
        assert_eq!(
            infer_platform(None, "https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap(),
            Platform::Youtube
        );
        assert_eq!(
            infer_platform(None, "https://instagram.com/reel/Cabc123/").unwrap(),
            Platform::Instagram
        );
        assert_eq!(
            infer_platform(None, "https://www.tiktok.com/@user/video/123456").unwrap(),
            Platform::Tiktok
        );
        assert!(infer_platform(None, "https://vimeo.com/1").is_err());
    }

    #[test]
    fn extracts_external_ids() {
        assert_eq!(
            extract_external_id(Platform::Youtube, "https://youtu.be/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_external_id(Platform::Youtube, "https://www.youtube.com/shorts/abcDEF12345")
                .as_deref(),
            Some("abcDEF12345")
        );
        assert_eq!(
            extract_external_id(Platform::Instagram, "https://instagram.com/reel/Cxy_12-3/")
                .as_deref(),
            Some("Cxy_12-3")
        );
        assert_eq!(
            extract_external_id(Platform::Tiktok, "https://www.tiktok.com/@u/video/987654").as_deref(),
            Some("987654")
        );
    }

    #[test]
    fn extracts_creator_handles() {
        assert_eq!(
            extract_creator_handle(Platform::Tiktok, "https://www.tiktok.com/@maker/video/1")
                .as_deref(),
            Some("@maker")
        );
        assert_eq!(
            extract_creator_handle(Platform::Youtube, "https://youtube.com/@channel").as_deref(),
            Some("@channel")
        );
    }
}
