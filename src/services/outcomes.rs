//! Outcome ingestion and calibration snapshots.
//!
//! The actual-score computation is a pure function of the posted metrics
//! plus the retention curve; snapshots are a pure function of the outcome
//! set and may be rebuilt at any time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::{CalibrationSnapshot, OutcomeMetric, Platform, ResearchItem, RetentionPoint};

fn clip100(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn metric(value: &serde_json::Value, key: &str) -> f64 {
    value
        .get(key)
        .and_then(|v| v.as_f64().or_else(|| v.as_i64().map(|i| i as f64)))
        .unwrap_or(0.0)
        .max(0.0)
}

/// Actual score: log-scaled reach + weighted engagement + watch depth +
/// retention quality, clipped to [0, 100] and rounded to one decimal.
pub fn compute_actual_score(
    actual_metrics: &serde_json::Value,
    retention_points: &[RetentionPoint],
) -> f64 {
    let views = metric(actual_metrics, "views");
    let likes = metric(actual_metrics, "likes");
    let comments = metric(actual_metrics, "comments");
    let shares = metric(actual_metrics, "shares");
    let saves = metric(actual_metrics, "saves");
    let avg_watch_time = metric(actual_metrics, "avg_watch_time");
    let avg_view_duration_s = metric(actual_metrics, "avg_view_duration_s");

    let reach_component = ((views + 1.0).log10() * 7.5).min(30.0);

    let weighted_interactions = likes + comments * 2.0 + shares * 3.0 + saves * 3.0;
    let engagement_rate = weighted_interactions / views.max(1.0);
    let engagement_component = (engagement_rate * 900.0).min(42.0);

    let watch_component = (avg_watch_time.max(avg_view_duration_s) / 3.5).min(18.0);

    let valid_retention: Vec<f64> = retention_points
        .iter()
        .filter(|point| point.retention >= 0.0)
        .map(|point| point.retention.clamp(0.0, 100.0))
        .collect();
    let retention_component = if valid_retention.is_empty() {
        0.0
    } else {
        let avg = valid_retention.iter().sum::<f64>() / valid_retention.len() as f64;
        (avg * 0.12).min(10.0)
    };

    round1(clip100(
        reach_component + engagement_component + watch_component + retention_component,
    ))
}

/// Split the delta series in half (most-recent first) and compare means.
pub fn trend_from_deltas(deltas: &[f64]) -> &'static str {
    if deltas.len() < 4 {
        return "flat";
    }
    let midpoint = deltas.len() / 2;
    let newer = &deltas[..midpoint];
    let older = &deltas[midpoint..];
    let newer_mean = newer.iter().sum::<f64>() / newer.len().max(1) as f64;
    let older_mean = older.iter().sum::<f64>() / older.len().max(1) as f64;
    if newer_mean < older_mean - 1.5 {
        "improving"
    } else if newer_mean > older_mean + 1.5 {
        "drifting"
    } else {
        "flat"
    }
}

pub fn confidence_bucket(sample_size: usize, mean_abs_error: f64) -> &'static str {
    if sample_size >= 20 && mean_abs_error <= 10.0 {
        "high"
    } else if sample_size >= 8 && mean_abs_error <= 16.0 {
        "medium"
    } else {
        "low"
    }
}

pub fn snapshot_recommendations(sample_size: usize, mean_abs_error: f64, trend: &str) -> Vec<String> {
    let mut notes = Vec::new();
    if sample_size < 5 {
        notes.push(
            "Insufficient data: ingest at least 5 posted outcomes for stronger confidence."
                .to_string(),
        );
    }
    if mean_abs_error > 18.0 {
        notes.push(
            "Prediction error is high. Prioritize scripts with explicit detector gaps fixed before posting."
                .to_string(),
        );
    } else if mean_abs_error > 10.0 {
        notes.push(
            "Prediction error is moderate. Re-score edited drafts and compare deltas before publishing."
                .to_string(),
        );
    } else {
        notes.push(
            "Calibration error is healthy. Keep using the same score -> edit -> re-score loop."
                .to_string(),
        );
    }
    match trend {
        "drifting" => notes.push(
            "Recent posts are drifting from predictions. Revisit hook and pacing assumptions."
                .to_string(),
        ),
        "improving" => notes.push(
            "Prediction accuracy is improving. Scale what is working in your latest formats."
                .to_string(),
        ),
        _ => {}
    }
    notes.truncate(4);
    notes
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftWindow {
    pub days: i64,
    pub count: usize,
    pub mean_delta: f64,
    pub mean_abs_error: f64,
    pub bias: String,
}

/// Drift over posts newer than `days` days. Bias flips at +/- 2 points of
/// mean delta.
pub fn windowed_drift(
    rows: &[(DateTime<Utc>, Option<f64>)],
    days: i64,
    now: DateTime<Utc>,
) -> DriftWindow {
    let cutoff = now - Duration::days(days.max(1));
    let deltas: Vec<f64> = rows
        .iter()
        .filter(|(posted_at, _)| *posted_at >= cutoff)
        .filter_map(|(_, delta)| *delta)
        .collect();

    if deltas.is_empty() {
        return DriftWindow {
            days,
            count: 0,
            mean_delta: 0.0,
            mean_abs_error: 0.0,
            bias: "neutral".to_string(),
        };
    }

    let mean_delta = deltas.iter().sum::<f64>() / deltas.len() as f64;
    let mean_abs_error = deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64;
    let bias = if mean_delta >= 2.0 {
        "underpredicting"
    } else if mean_delta <= -2.0 {
        "overpredicting"
    } else {
        "neutral"
    };

    DriftWindow {
        days,
        count: deltas.len(),
        mean_delta: round2(mean_delta),
        mean_abs_error: round2(mean_abs_error),
        bias: bias.to_string(),
    }
}

/// Prose advice keyed off (sample_size, mae, bias_7d, bias_30d).
pub fn drift_actions(
    platform: Platform,
    sample_size: usize,
    mean_abs_error: f64,
    drift_7d: &DriftWindow,
    drift_30d: &DriftWindow,
) -> Vec<String> {
    let mut actions = Vec::new();
    let platform_label = {
        let name = platform.as_str();
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    };

    if sample_size < 5 {
        actions.push(format!(
            "Capture at least 5 {} post outcomes to improve confidence.",
            platform_label
        ));
    }

    match drift_7d.bias.as_str() {
        "underpredicting" => actions.push(
            "Recent actuals are above predictions. Raise targets and test stronger hook ambition."
                .to_string(),
        ),
        "overpredicting" => actions.push(
            "Recent actuals are below predictions. Tighten hooks and reduce dead zones before posting."
                .to_string(),
        ),
        _ => {}
    }

    if mean_abs_error > 16.0 {
        actions.push(
            "Re-score every edited draft and execute top 2 detector actions before publishing."
                .to_string(),
        );
    } else if mean_abs_error > 10.0 {
        actions.push(
            "Use A/B script variants and keep only drafts with positive re-score deltas."
                .to_string(),
        );
    } else {
        actions.push("Calibration is healthy. Scale the current format and topic mix.".to_string());
    }

    if drift_30d.bias != "neutral" && drift_30d.bias != drift_7d.bias {
        actions.push("7d vs 30d drift differs. Re-check posting cadence and topic consistency.".to_string());
    }

    let mut deduped: Vec<String> = Vec::new();
    for action in actions {
        let action = action.trim().to_string();
        if !action.is_empty() && !deduped.contains(&action) {
            deduped.push(action);
        }
    }
    deduped.truncate(4);
    deduped
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestOutcomeParams {
    pub platform: Option<String>,
    pub content_item_id: Option<String>,
    pub draft_snapshot_id: Option<String>,
    pub report_id: Option<String>,
    pub video_external_id: Option<String>,
    pub posted_at: Option<String>,
    pub actual_metrics: Option<serde_json::Value>,
    pub retention_points: Option<Vec<RetentionPoint>>,
    pub predicted_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcomeResponse {
    pub outcome_id: String,
    pub calibration_delta: Option<f64>,
    pub actual_score: f64,
    pub predicted_score: Option<f64>,
    pub confidence_update: SnapshotSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotSummary {
    pub platform: String,
    pub sample_size: usize,
    pub avg_error: f64,
    pub hit_rate: f64,
    pub trend: String,
    pub confidence: String,
    pub insufficient_data: bool,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentOutcome {
    pub outcome_id: String,
    pub platform: String,
    pub draft_snapshot_id: Option<String>,
    pub report_id: Option<String>,
    pub content_item_id: Option<String>,
    pub posted_at: String,
    pub predicted_score: Option<f64>,
    pub actual_score: f64,
    pub calibration_delta: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformOutcomeSummary {
    #[serde(flatten)]
    pub snapshot: SnapshotSummary,
    pub drift_windows: DriftWindows,
    pub recent_outcomes: Vec<RecentOutcome>,
    pub next_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftWindows {
    pub d7: DriftWindow,
    pub d30: DriftWindow,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecalibrationReport {
    pub refreshed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct OutcomeService {
    pool: PgPool,
    config: Arc<AppConfig>,
}

impl OutcomeService {
    pub fn new(pool: PgPool, config: Arc<AppConfig>) -> Self {
        Self { pool, config }
    }

    fn assert_enabled(&self) -> Result<()> {
        if !self.config.features.outcome_learning_enabled {
            return Err(AppError::FeatureDisabled(
                "Outcome learning disabled by feature flag.".to_string(),
            ));
        }
        Ok(())
    }

    async fn resolve_predicted_score(
        &self,
        user_id: &str,
        content_item_id: Option<&str>,
        payload_predicted: Option<f64>,
    ) -> Result<Option<f64>> {
        if let Some(predicted) = payload_predicted {
            return Ok(Some(round1(clip100(predicted))));
        }
        let Some(item_id) = content_item_id.filter(|id| !id.trim().is_empty()) else {
            return Ok(None);
        };
        let item = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE id = $1 AND user_id = $2",
        )
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item
            .and_then(|item| {
                item.media_meta_json
                    .get("predicted_score")
                    .and_then(|v| v.as_f64())
            })
            .map(|score| round1(clip100(score))))
    }

    /// Ingest one outcome, then refresh this user's platform snapshot.
    pub async fn ingest(
        &self,
        user_id: &str,
        params: IngestOutcomeParams,
    ) -> Result<IngestOutcomeResponse> {
        self.assert_enabled()?;

        let platform = Platform::parse_or_default(params.platform.as_deref())?;
        let actual_metrics = params
            .actual_metrics
            .filter(|metrics| metrics.is_object())
            .ok_or_else(|| AppError::bad_request("actual_metrics is required"))?;

        let posted_at_raw = params
            .posted_at
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::bad_request("posted_at is required"))?;
        let posted_at = DateTime::parse_from_rfc3339(&posted_at_raw.replace('Z', "+00:00"))
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| AppError::bad_request("posted_at must be a valid ISO datetime"))?;

        let retention_points: Vec<RetentionPoint> = params
            .retention_points
            .unwrap_or_default()
            .into_iter()
            .filter(|point| point.time >= 0.0 && point.retention >= 0.0)
            .collect();

        let content_item_id = params
            .content_item_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let predicted_score = self
            .resolve_predicted_score(user_id, content_item_id.as_deref(), params.predicted_score)
            .await?;
        let actual_score = compute_actual_score(&actual_metrics, &retention_points);
        let calibration_delta = predicted_score.map(|predicted| round2(actual_score - predicted));

        let video_external_id = params
            .video_external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| content_item_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let outcome_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO outcome_metrics (
                id, user_id, content_item_id, draft_snapshot_id, report_id, platform,
                video_external_id, posted_at, actual_metrics_json, retention_points_json,
                predicted_score, actual_score, calibration_delta
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&outcome_id)
        .bind(user_id)
        .bind(content_item_id.as_deref())
        .bind(params.draft_snapshot_id.as_deref().map(str::trim).filter(|id| !id.is_empty()))
        .bind(params.report_id.as_deref().map(str::trim).filter(|id| !id.is_empty()))
        .bind(platform.as_str())
        .bind(&video_external_id)
        .bind(posted_at)
        .bind(&actual_metrics)
        .bind((!retention_points.is_empty()).then(|| serde_json::to_value(&retention_points).unwrap_or_default()))
        .bind(predicted_score)
        .bind(actual_score)
        .bind(calibration_delta)
        .execute(&self.pool)
        .await?;

        let snapshot = self.refresh_snapshot(user_id, platform).await?;
        Ok(IngestOutcomeResponse {
            outcome_id,
            calibration_delta,
            actual_score,
            predicted_score,
            confidence_update: snapshot,
        })
    }

    /// Rebuild the (user, platform) snapshot from the last 250 outcomes.
    pub async fn refresh_snapshot(&self, user_id: &str, platform: Platform) -> Result<SnapshotSummary> {
        let rows = sqlx::query_as::<_, OutcomeMetric>(
            r#"
            SELECT * FROM outcome_metrics
            WHERE user_id = $1 AND platform = $2
            ORDER BY created_at DESC
            LIMIT 250
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;

        let sample_size = rows.len();
        let abs_deltas: Vec<f64> = rows
            .iter()
            .map(|row| row.calibration_delta.unwrap_or(0.0).abs())
            .collect();
        let predicted_rows: Vec<&OutcomeMetric> = rows
            .iter()
            .filter(|row| row.predicted_score.is_some())
            .collect();

        let (mean_abs_error, hit_rate) = if predicted_rows.is_empty() {
            (0.0, 0.0)
        } else {
            let mae = predicted_rows
                .iter()
                .map(|row| row.calibration_delta.unwrap_or(0.0).abs())
                .sum::<f64>()
                / predicted_rows.len() as f64;
            let hits = predicted_rows
                .iter()
                .filter(|row| row.calibration_delta.unwrap_or(0.0).abs() <= 10.0)
                .count();
            (mae, hits as f64 / predicted_rows.len() as f64)
        };

        let trend = trend_from_deltas(&abs_deltas);
        let recommendations = snapshot_recommendations(sample_size, mean_abs_error, trend);

        sqlx::query(
            r#"
            INSERT INTO calibration_snapshots (
                id, user_id, platform, sample_size, mean_abs_error, hit_rate,
                trend, recommendations_json, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
            ON CONFLICT (user_id, platform) DO UPDATE SET
                sample_size = EXCLUDED.sample_size,
                mean_abs_error = EXCLUDED.mean_abs_error,
                hit_rate = EXCLUDED.hit_rate,
                trend = EXCLUDED.trend,
                recommendations_json = EXCLUDED.recommendations_json,
                updated_at = now()
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(platform.as_str())
        .bind(sample_size as i32)
        .bind(round2(mean_abs_error))
        .bind((hit_rate * 10_000.0).round() / 10_000.0)
        .bind(trend)
        .bind(serde_json::to_value(&recommendations)?)
        .execute(&self.pool)
        .await?;

        Ok(SnapshotSummary {
            platform: platform.as_str().to_string(),
            sample_size,
            avg_error: round2(mean_abs_error),
            hit_rate: (hit_rate * 10_000.0).round() / 10_000.0,
            trend: trend.to_string(),
            confidence: confidence_bucket(sample_size, mean_abs_error).to_string(),
            insufficient_data: sample_size < 5,
            recommendations,
        })
    }

    /// Snapshot + drift windows + recent outcomes for one platform.
    pub async fn platform_summary(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<PlatformOutcomeSummary> {
        self.assert_enabled()?;
        let snapshot = self.refresh_snapshot(user_id, platform).await?;

        let rows = sqlx::query_as::<_, OutcomeMetric>(
            r#"
            SELECT * FROM outcome_metrics
            WHERE user_id = $1 AND platform = $2
            ORDER BY posted_at DESC, created_at DESC
            LIMIT 120
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;

        let delta_rows: Vec<(DateTime<Utc>, Option<f64>)> = rows
            .iter()
            .filter(|row| row.predicted_score.is_some() && row.calibration_delta.is_some())
            .map(|row| (row.posted_at, row.calibration_delta))
            .collect();
        let now = Utc::now();
        let d7 = windowed_drift(&delta_rows, 7, now);
        let d30 = windowed_drift(&delta_rows, 30, now);
        let next_actions = drift_actions(platform, snapshot.sample_size, snapshot.avg_error, &d7, &d30);

        let recent_outcomes = rows
            .iter()
            .take(12)
            .map(|row| RecentOutcome {
                outcome_id: row.id.clone(),
                platform: row.platform.clone(),
                draft_snapshot_id: row.draft_snapshot_id.clone(),
                report_id: row.report_id.clone(),
                content_item_id: row.content_item_id.clone(),
                posted_at: row.posted_at.to_rfc3339(),
                predicted_score: row.predicted_score,
                actual_score: row.actual_score,
                calibration_delta: row.calibration_delta,
            })
            .collect();

        Ok(PlatformOutcomeSummary {
            snapshot,
            drift_windows: DriftWindows { d7, d30 },
            recent_outcomes,
            next_actions,
        })
    }

    /// Cross-platform aggregate when no platform is requested.
    pub async fn overall_summary(&self, user_id: &str) -> Result<serde_json::Value> {
        self.assert_enabled()?;
        let rows = sqlx::query_as::<_, CalibrationSnapshot>(
            "SELECT * FROM calibration_snapshots WHERE user_id = $1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(serde_json::json!({
                "hit_rate": 0.0,
                "avg_error": 0.0,
                "trend": "flat",
                "confidence": "low",
                "insufficient_data": true,
                "recommendations": [
                    "No outcomes captured yet. Ingest posted results to unlock calibration confidence.",
                ],
                "platforms": [],
            }));
        }

        let platforms: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| {
                let sample_size = row.sample_size.max(0) as usize;
                serde_json::json!({
                    "platform": &row.platform,
                    "sample_size": sample_size,
                    "avg_error": round2(row.mean_abs_error),
                    "hit_rate": row.hit_rate,
                    "trend": &row.trend,
                    "confidence": confidence_bucket(sample_size, row.mean_abs_error),
                    "insufficient_data": sample_size < 5,
                    "recommendations": &row.recommendations_json,
                })
            })
            .collect();

        let count = rows.len() as f64;
        let avg_error_all = rows.iter().map(|row| row.mean_abs_error).sum::<f64>() / count;
        let hit_rate_all = rows.iter().map(|row| row.hit_rate).sum::<f64>() / count;
        let sample_size_all: usize = rows.iter().map(|row| row.sample_size.max(0) as usize).sum();
        let dominant = rows
            .iter()
            .max_by_key(|row| row.sample_size)
            .expect("rows checked non-empty");

        Ok(serde_json::json!({
            "hit_rate": (hit_rate_all * 10_000.0).round() / 10_000.0,
            "avg_error": round2(avg_error_all),
            "trend": &dominant.trend,
            "confidence": confidence_bucket(sample_size_all, avg_error_all),
            "insufficient_data": sample_size_all < 5,
            "recommendations": &dominant.recommendations_json,
            "platforms": platforms,
        }))
    }

    /// Refresh every (user, platform) pair with captured outcomes.
    pub async fn recalibrate_all_users(&self) -> Result<RecalibrationReport> {
        self.assert_enabled()?;
        let pairs: Vec<(String, String)> =
            sqlx::query_as("SELECT DISTINCT user_id, platform FROM outcome_metrics")
                .fetch_all(&self.pool)
                .await?;

        let mut refreshed = 0usize;
        let mut skipped = 0usize;
        let mut errors = Vec::new();
        for (user_id, platform) in pairs {
            let Ok(platform) = Platform::parse(&platform) else {
                skipped += 1;
                continue;
            };
            match self.refresh_snapshot(&user_id, platform).await {
                Ok(_) => refreshed += 1,
                Err(err) => {
                    skipped += 1;
                    errors.push(format!("{}:{}:{}", user_id, platform, err));
                }
            }
        }
        errors.truncate(20);
        Ok(RecalibrationReport {
            refreshed,
            skipped,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actual_score_matches_component_formula() {
        let metrics = serde_json::json!({
            "views": 12_000,
            "likes": 800,
            "comments": 90,
            "shares": 45,
            "saves": 38,
            "avg_view_duration_s": 28,
        });
        let score = compute_actual_score(&metrics, &[]);

        let reach: f64 = (12_001.0f64.log10() * 7.5).min(30.0);
        let weighted = 800.0 + 2.0 * 90.0 + 3.0 * 45.0 + 3.0 * 38.0;
        let engagement = (weighted / 12_000.0 * 900.0f64).min(42.0);
        let watch = (28.0f64 / 3.5).min(18.0);
        let expected = ((reach + engagement + watch).clamp(0.0, 100.0) * 10.0).round() / 10.0;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn retention_adds_bounded_component() {
        let metrics = serde_json::json!({"views": 1000, "likes": 10});
        let without = compute_actual_score(&metrics, &[]);
        let with = compute_actual_score(
            &metrics,
            &[
                RetentionPoint { time: 0.0, retention: 100.0 },
                RetentionPoint { time: 10.0, retention: 80.0 },
            ],
        );
        assert!(with > without);
        assert!(with - without <= 10.1);
    }

    #[test]
    fn zero_views_still_scores_zero_reach() {
        let metrics = serde_json::json!({"views": 0, "likes": 0});
        assert_eq!(compute_actual_score(&metrics, &[]), 0.0);
    }

    #[test]
    fn trend_needs_four_samples() {
        assert_eq!(trend_from_deltas(&[1.0, 2.0, 3.0]), "flat");
        // newer half mean 2.0, older half mean 8.0 -> improving
        assert_eq!(trend_from_deltas(&[2.0, 2.0, 8.0, 8.0]), "improving");
        assert_eq!(trend_from_deltas(&[9.0, 9.0, 2.0, 2.0]), "drifting");
        assert_eq!(trend_from_deltas(&[5.0, 5.0, 5.5, 5.5]), "flat");
    }

    #[test]
    fn confidence_buckets() {
        assert_eq!(confidence_bucket(25, 8.0), "high");
        assert_eq!(confidence_bucket(25, 12.0), "medium");
        assert_eq!(confidence_bucket(10, 12.0), "medium");
        assert_eq!(confidence_bucket(10, 20.0), "low");
        assert_eq!(confidence_bucket(3, 2.0), "low");
    }

    #[test]
    fn drift_window_bias_thresholds() {
        let now = Utc::now();
        let rows = vec![
            (now - Duration::days(1), Some(3.0)),
            (now - Duration::days(2), Some(4.0)),
            (now - Duration::days(20), Some(-8.0)),
        ];
        let d7 = windowed_drift(&rows, 7, now);
        assert_eq!(d7.count, 2);
        assert_eq!(d7.bias, "underpredicting");

        let d30 = windowed_drift(&rows, 30, now);
        assert_eq!(d30.count, 3);
        assert_eq!(d30.bias, "neutral");
    }

    #[test]
    fn drift_actions_dedupe_and_cap() {
        let now = Utc::now();
        let window = windowed_drift(&[], 7, now);
        let actions = drift_actions(Platform::Youtube, 2, 20.0, &window, &window);
        assert!(!actions.is_empty());
        assert!(actions.len() <= 4);
        assert!(actions[0].contains("Youtube"));
    }
}
