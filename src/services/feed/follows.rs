//! Stored discovery queries (follows) and their auto-ingest runs.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    DiscoveryMode, FeedAutoIngestRun, FeedSourceFollow, Platform, SortDirection, Timeframe,
};

use super::discovery::{DiscoverParams, FEED_SORT_KEYS};
use super::{FeedService, TelemetryDetails};

const DEFAULT_CADENCE_MINUTES: i64 = 360;
const MIN_CADENCE_MINUTES: i64 = 15;
const MAX_CADENCE_MINUTES: i64 = 24 * 60;

fn cadence_from_label(label: &str) -> Option<i64> {
    match label {
        "15m" => Some(15),
        "1h" => Some(60),
        "3h" => Some(180),
        "6h" => Some(360),
        "12h" => Some(720),
        "24h" => Some(1440),
        _ => None,
    }
}

pub fn normalize_cadence_minutes(cadence: Option<&str>, cadence_minutes: Option<i64>) -> i64 {
    if let Some(minutes) = cadence_minutes {
        return minutes.clamp(MIN_CADENCE_MINUTES, MAX_CADENCE_MINUTES);
    }
    cadence
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .and_then(cadence_from_label)
        .unwrap_or(DEFAULT_CADENCE_MINUTES)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpsertFollowParams {
    pub platform: Option<String>,
    pub mode: Option<String>,
    pub query: Option<String>,
    pub timeframe: Option<String>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
    pub limit: Option<i64>,
    pub cadence: Option<String>,
    pub cadence_minutes: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowPayload {
    pub id: String,
    pub platform: String,
    pub mode: String,
    pub query: String,
    pub timeframe: String,
    pub sort_by: String,
    pub sort_direction: String,
    pub limit: i64,
    pub cadence_minutes: i64,
    pub is_active: bool,
    pub last_run_at: Option<String>,
    pub next_run_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
}

impl FollowPayload {
    fn from_row(row: &FeedSourceFollow) -> Self {
        Self {
            id: row.id.clone(),
            platform: row.platform.clone(),
            mode: row.mode.clone(),
            query: row.query.clone(),
            timeframe: row.timeframe.clone(),
            sort_by: row.sort_by.clone(),
            sort_direction: row.sort_direction.clone(),
            limit: row.item_limit as i64,
            cadence_minutes: row.cadence_minutes as i64,
            is_active: row.is_active,
            last_run_at: row.last_run_at.map(|ts| ts.to_rfc3339()),
            next_run_at: row.next_run_at.map(|ts| ts.to_rfc3339()),
            last_error: row.last_error.clone(),
            created_at: row.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunPayload {
    pub run_id: String,
    pub follow_id: String,
    pub status: String,
    pub item_count: i64,
    pub item_ids: Vec<String>,
    pub error_message: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl IngestRunPayload {
    fn from_row(row: &FeedAutoIngestRun) -> Self {
        let item_ids = row
            .item_ids_json
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .take(50)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            run_id: row.id.clone(),
            follow_id: row.follow_id.clone(),
            status: row.status.clone(),
            item_count: row.item_count as i64,
            item_ids,
            error_message: row.error_message.clone(),
            started_at: row.started_at.to_rfc3339(),
            completed_at: row.completed_at.map(|ts| ts.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestBatchReport {
    pub scheduled_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub runs: Vec<IngestRunPayload>,
}

impl FeedService {
    /// Upsert keyed on (user, platform, mode, query): re-upserting updates
    /// the existing row and reports created=false.
    pub async fn upsert_follow(
        &self,
        user_id: &str,
        params: &UpsertFollowParams,
    ) -> Result<(bool, FollowPayload)> {
        self.assert_research_enabled()?;
        let platform = Platform::parse(params.platform.as_deref().unwrap_or_default())?;
        let mode = DiscoveryMode::parse(params.mode.as_deref().unwrap_or_default())?;
        let query = params
            .query
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::bad_request("query is required."))?;
        let timeframe = Timeframe::parse_or(params.timeframe.as_deref(), Timeframe::Week)?;
        let sort_by = params
            .sort_by
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .unwrap_or("trending_score");
        if !FEED_SORT_KEYS.contains(&sort_by) {
            return Err(AppError::bad_request("sort_by is invalid."));
        }
        let sort_direction =
            SortDirection::parse_or(params.sort_direction.as_deref(), SortDirection::Desc)?;
        let cadence_minutes =
            normalize_cadence_minutes(params.cadence.as_deref(), params.cadence_minutes);
        let item_limit = params.limit.unwrap_or(20).clamp(1, 100);
        let is_active = params.is_active.unwrap_or(true);
        let now = Utc::now();

        let existing = sqlx::query_as::<_, FeedSourceFollow>(
            "SELECT * FROM feed_source_follows WHERE user_id = $1 AND platform = $2 AND mode = $3 AND query = $4",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(mode.as_str())
        .bind(&query)
        .fetch_optional(self.pool())
        .await?;

        let (created, row) = match existing {
            None => {
                let next_run_at = is_active.then(|| now + Duration::minutes(cadence_minutes));
                let row = sqlx::query_as::<_, FeedSourceFollow>(
                    r#"
                    INSERT INTO feed_source_follows (
                        id, user_id, platform, mode, query, timeframe, sort_by, sort_direction,
                        item_limit, cadence_minutes, is_active, next_run_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(user_id)
                .bind(platform.as_str())
                .bind(mode.as_str())
                .bind(&query)
                .bind(timeframe.as_str())
                .bind(sort_by)
                .bind(sort_direction.as_str())
                .bind(item_limit as i32)
                .bind(cadence_minutes as i32)
                .bind(is_active)
                .bind(next_run_at)
                .fetch_one(self.pool())
                .await?;
                (true, row)
            }
            Some(existing) => {
                // Active follows always keep a next_run_at; inactive ones
                // never do.
                let next_run_at = if is_active {
                    existing
                        .next_run_at
                        .or_else(|| Some(now + Duration::minutes(cadence_minutes)))
                } else {
                    None
                };
                let row = sqlx::query_as::<_, FeedSourceFollow>(
                    r#"
                    UPDATE feed_source_follows
                    SET timeframe = $2, sort_by = $3, sort_direction = $4, item_limit = $5,
                        cadence_minutes = $6, is_active = $7, next_run_at = $8
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(&existing.id)
                .bind(timeframe.as_str())
                .bind(sort_by)
                .bind(sort_direction.as_str())
                .bind(item_limit as i32)
                .bind(cadence_minutes as i32)
                .bind(is_active)
                .bind(next_run_at)
                .fetch_one(self.pool())
                .await?;
                (false, row)
            }
        };

        self.telemetry()
            .record(
                user_id,
                "feed_follow_upsert",
                if created { "created" } else { "updated" },
                TelemetryDetails {
                    platform: Some(platform.as_str().to_string()),
                    source_item_id: None,
                    details: Some(serde_json::json!({
                        "mode": mode.as_str(),
                        "query": query.chars().take(80).collect::<String>(),
                        "cadence_minutes": cadence_minutes,
                        "is_active": is_active,
                    })),
                },
            )
            .await;
        Ok((created, FollowPayload::from_row(&row)))
    }

    pub async fn list_follows(
        &self,
        user_id: &str,
        platform: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<FollowPayload>> {
        self.assert_research_enabled()?;
        let platform = Platform::parse_optional(platform)?;
        let mut rows = match platform {
            Some(platform) => {
                sqlx::query_as::<_, FeedSourceFollow>(
                    "SELECT * FROM feed_source_follows WHERE user_id = $1 AND platform = $2",
                )
                .bind(user_id)
                .bind(platform.as_str())
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, FeedSourceFollow>(
                    "SELECT * FROM feed_source_follows WHERE user_id = $1",
                )
                .bind(user_id)
                .fetch_all(self.pool())
                .await?
            }
        };
        if active_only {
            rows.retain(|row| row.is_active);
        }
        rows.sort_by(|a, b| {
            let a_key = (a.next_run_at.is_none(), a.next_run_at, a.query.clone());
            let b_key = (b.next_run_at.is_none(), b.next_run_at, b.query.clone());
            a_key.cmp(&b_key)
        });
        Ok(rows.iter().map(FollowPayload::from_row).collect())
    }

    pub async fn delete_follow(&self, user_id: &str, follow_id: &str) -> Result<()> {
        self.assert_research_enabled()?;
        let row = sqlx::query_as::<_, FeedSourceFollow>(
            "SELECT * FROM feed_source_follows WHERE id = $1 AND user_id = $2",
        )
        .bind(follow_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::not_found("Feed follow"))?;

        sqlx::query("DELETE FROM feed_source_follows WHERE id = $1")
            .bind(&row.id)
            .execute(self.pool())
            .await?;
        self.telemetry()
            .record(
                user_id,
                "feed_follow_delete",
                "ok",
                TelemetryDetails {
                    platform: Some(row.platform.clone()),
                    source_item_id: None,
                    details: Some(serde_json::json!({ "follow_id": follow_id })),
                },
            )
            .await;
        Ok(())
    }

    /// Execute one follow's discovery query and record the run. The follow
    /// always advances `next_run_at`, success or failure.
    async fn run_follow_ingest(&self, follow: &FeedSourceFollow) -> Result<IngestRunPayload> {
        let now = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO feed_auto_ingest_runs (id, follow_id, user_id, status, item_count, item_ids_json, started_at)
            VALUES ($1, $2, $3, 'running', 0, '[]'::jsonb, $4)
            "#,
        )
        .bind(&run_id)
        .bind(&follow.id)
        .bind(&follow.user_id)
        .bind(now)
        .execute(self.pool())
        .await?;

        let params = DiscoverParams {
            platform: Some(follow.platform.clone()),
            mode: Some(follow.mode.clone()),
            query: Some(follow.query.clone()),
            timeframe: Some(follow.timeframe.clone()),
            sort_by: Some(follow.sort_by.clone()),
            sort_direction: Some(follow.sort_direction.clone()),
            page: Some(1),
            limit: Some((follow.item_limit as i64).clamp(1, 100)),
        };
        let cadence = (follow.cadence_minutes as i64).max(MIN_CADENCE_MINUTES);
        let next_run_at = now + Duration::minutes(cadence);

        let run = match self.discover(&follow.user_id, &params).await {
            Ok(result) => {
                let item_ids: Vec<String> = result
                    .page
                    .items
                    .iter()
                    .map(|item| item.item_id.clone())
                    .take(100)
                    .collect();
                sqlx::query(
                    r#"
                    UPDATE feed_auto_ingest_runs
                    SET status = 'completed', item_count = $2, item_ids_json = $3, completed_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(&run_id)
                .bind(item_ids.len() as i32)
                .bind(serde_json::json!(item_ids))
                .execute(self.pool())
                .await?;
                sqlx::query(
                    "UPDATE feed_source_follows SET last_run_at = $2, next_run_at = $3, last_error = NULL WHERE id = $1",
                )
                .bind(&follow.id)
                .bind(now)
                .bind(next_run_at)
                .execute(self.pool())
                .await?;
                run_id.clone()
            }
            Err(err) => {
                let message: String = err.detail().chars().take(1000).collect();
                sqlx::query(
                    "UPDATE feed_auto_ingest_runs SET status = 'failed', error_message = $2, completed_at = now() WHERE id = $1",
                )
                .bind(&run_id)
                .bind(&message)
                .execute(self.pool())
                .await?;
                sqlx::query(
                    "UPDATE feed_source_follows SET last_run_at = $2, next_run_at = $3, last_error = $4 WHERE id = $1",
                )
                .bind(&follow.id)
                .bind(now)
                .bind(next_run_at)
                .bind(message.chars().take(500).collect::<String>())
                .execute(self.pool())
                .await?;
                run_id.clone()
            }
        };

        let row = sqlx::query_as::<_, FeedAutoIngestRun>(
            "SELECT * FROM feed_auto_ingest_runs WHERE id = $1",
        )
        .bind(&run)
        .fetch_one(self.pool())
        .await?;
        Ok(IngestRunPayload::from_row(&row))
    }

    /// Manual UI-triggered ingest over the caller's follows.
    pub async fn run_follow_ingests(
        &self,
        user_id: &str,
        follow_ids: Option<&[String]>,
        run_due_only: bool,
        max_follows: i64,
    ) -> Result<IngestBatchReport> {
        self.assert_research_enabled()?;
        let now = Utc::now();

        let mut follows = sqlx::query_as::<_, FeedSourceFollow>(
            "SELECT * FROM feed_source_follows WHERE user_id = $1 AND is_active = TRUE",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;

        if let Some(ids) = follow_ids {
            let wanted = super::clean_ids(ids);
            if !wanted.is_empty() {
                follows.retain(|follow| wanted.contains(&follow.id));
            }
        }
        follows.sort_by_key(|follow| (follow.next_run_at.unwrap_or(now), follow.created_at));
        if run_due_only {
            follows.retain(|follow| follow.next_run_at.map(|ts| ts <= now).unwrap_or(false));
        }
        follows.truncate(max_follows.clamp(1, 100) as usize);

        let mut runs = Vec::with_capacity(follows.len());
        for follow in &follows {
            runs.push(self.run_follow_ingest(follow).await?);
        }

        let completed = runs.iter().filter(|run| run.status == "completed").count();
        let failed = runs.iter().filter(|run| run.status == "failed").count();
        self.telemetry()
            .record(
                user_id,
                "feed_follow_ingest_manual",
                if failed == 0 { "ok" } else { "partial" },
                TelemetryDetails {
                    platform: None,
                    source_item_id: None,
                    details: Some(serde_json::json!({
                        "scheduled_count": runs.len(),
                        "completed_count": completed,
                        "failed_count": failed,
                        "run_due_only": run_due_only,
                    })),
                },
            )
            .await;

        Ok(IngestBatchReport {
            scheduled_count: runs.len(),
            completed_count: completed,
            failed_count: failed,
            runs,
        })
    }

    pub async fn list_ingest_runs(
        &self,
        user_id: &str,
        follow_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<IngestRunPayload>> {
        self.assert_research_enabled()?;
        let rows = match follow_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(follow_id) => {
                sqlx::query_as::<_, FeedAutoIngestRun>(
                    "SELECT * FROM feed_auto_ingest_runs WHERE user_id = $1 AND follow_id = $2 ORDER BY created_at DESC LIMIT $3",
                )
                .bind(user_id)
                .bind(follow_id)
                .bind(limit.clamp(1, 200))
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, FeedAutoIngestRun>(
                    "SELECT * FROM feed_auto_ingest_runs WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
                )
                .bind(user_id)
                .bind(limit.clamp(1, 200))
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows.iter().map(IngestRunPayload::from_row).collect())
    }

    /// Periodic scheduler entrypoint: run every due follow across all
    /// users. A follow never overlaps its own prior run because runs are
    /// executed sequentially and `next_run_at` advances before the next
    /// tick can observe it.
    pub async fn run_due_auto_ingest(&self, max_follows: i64) -> Result<IngestBatchReport> {
        if !self.config().features.research_enabled || !self.config().features.feed_auto_ingest_enabled
        {
            return Ok(IngestBatchReport {
                scheduled_count: 0,
                completed_count: 0,
                failed_count: 0,
                runs: Vec::new(),
            });
        }

        let now = Utc::now();
        let mut follows = sqlx::query_as::<_, FeedSourceFollow>(
            "SELECT * FROM feed_source_follows WHERE is_active = TRUE AND next_run_at IS NOT NULL AND next_run_at <= $1",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        follows.sort_by_key(|follow| (follow.next_run_at.unwrap_or(now), follow.created_at));
        follows.truncate(max_follows.clamp(1, 200) as usize);

        let mut runs = Vec::with_capacity(follows.len());
        for follow in &follows {
            runs.push(self.run_follow_ingest(follow).await?);
        }

        let completed = runs.iter().filter(|run| run.status == "completed").count();
        let failed = runs.iter().filter(|run| run.status == "failed").count();
        if let Some(first) = follows.first() {
            self.telemetry()
                .record(
                    &first.user_id,
                    "feed_follow_ingest_due_tick",
                    "ok",
                    TelemetryDetails {
                        platform: Some(first.platform.clone()),
                        source_item_id: None,
                        details: Some(serde_json::json!({
                            "scheduled_count": runs.len(),
                            "completed_count": completed,
                            "failed_count": failed,
                        })),
                    },
                )
                .await;
        }

        Ok(IngestBatchReport {
            scheduled_count: runs.len(),
            completed_count: completed,
            failed_count: failed,
            runs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_labels_resolve() {
        assert_eq!(normalize_cadence_minutes(Some("15m"), None), 15);
        assert_eq!(normalize_cadence_minutes(Some("6h"), None), 360);
        assert_eq!(normalize_cadence_minutes(Some("bogus"), None), 360);
        assert_eq!(normalize_cadence_minutes(None, None), 360);
    }

    #[test]
    fn cadence_minutes_clamp_to_spec_range() {
        assert_eq!(normalize_cadence_minutes(None, Some(5)), 15);
        assert_eq!(normalize_cadence_minutes(None, Some(10_000)), 1440);
        assert_eq!(normalize_cadence_minutes(None, Some(90)), 90);
    }
}
