//! Feed funnel telemetry. Writes are best-effort and must never break the
//! primary workflow; failures are logged and swallowed.

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Audit, FeedTelemetryEvent};

fn clamp_text(value: &str, limit: usize) -> String {
    value.trim().chars().take(limit).collect()
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryDetails {
    pub platform: Option<String>,
    pub source_item_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySummary {
    pub window_days: i64,
    pub event_volume: EventVolume,
    pub funnel: FunnelSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventVolume {
    pub total_events: usize,
    pub by_event: HashMap<String, usize>,
    pub by_status: HashMap<String, usize>,
    pub error_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelSummary {
    pub discovered_count: usize,
    pub packaged_count: usize,
    pub scripted_count: usize,
    pub audited_count: usize,
    pub reported_count: usize,
    pub discover_to_package_pct: f64,
    pub package_to_script_pct: f64,
    pub script_to_audit_pct: f64,
    pub audit_to_report_pct: f64,
}

fn ratio_pct(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    ((numerator as f64 / denominator as f64) * 1000.0).round() / 10.0
}

#[derive(Clone)]
pub struct TelemetryService {
    pool: PgPool,
}

impl TelemetryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one event. Never fails the caller.
    pub async fn record(
        &self,
        user_id: &str,
        event_name: &str,
        status: &str,
        extra: TelemetryDetails,
    ) {
        let status = {
            let trimmed = clamp_text(status, 32);
            if trimmed.is_empty() {
                "ok".to_string()
            } else {
                trimmed
            }
        };
        let result = sqlx::query(
            r#"
            INSERT INTO feed_telemetry_events (id, user_id, event_name, status, platform, source_item_id, details_json)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(clamp_text(event_name, 80))
        .bind(&status)
        .bind(extra.platform.as_deref().map(|p| clamp_text(p, 32)))
        .bind(extra.source_item_id.as_deref())
        .bind(extra.details.as_ref())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    user_id = %user_id,
                    event = %event_name,
                    status = %status,
                    "feed telemetry recorded"
                );
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %user_id,
                    event = %event_name,
                    error = %err,
                    "feed telemetry write skipped"
                );
            }
        }
    }

    /// Event volume + stage funnel over the lookback window.
    pub async fn summary(&self, user_id: &str, days: i64) -> Result<TelemetrySummary> {
        let window_days = days.clamp(1, 90);
        let cutoff = Utc::now() - Duration::days(window_days);

        let events = sqlx::query_as::<_, FeedTelemetryEvent>(
            "SELECT * FROM feed_telemetry_events WHERE user_id = $1 AND created_at >= $2",
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut by_event: HashMap<String, usize> = HashMap::new();
        let mut by_status: HashMap<String, usize> = HashMap::new();
        for event in &events {
            *by_event.entry(event.event_name.clone()).or_default() += 1;
            *by_status.entry(event.status.clone()).or_default() += 1;
        }
        let error_count = events
            .iter()
            .filter(|event| matches!(event.status.as_str(), "error" | "failed"))
            .count();

        let discovered: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM research_items WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        let packaged: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT source_item_id) FROM feed_repost_packages WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let scripted: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT source_item_id) FROM draft_snapshots WHERE user_id = $1 AND source_item_id IS NOT NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let audits = sqlx::query_as::<_, Audit>("SELECT * FROM audits WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let mut audited_ids = std::collections::HashSet::new();
        let mut reported_ids = std::collections::HashSet::new();
        for audit in &audits {
            let Some(source_item_id) = audit.source_item_id() else {
                continue;
            };
            audited_ids.insert(source_item_id.clone());
            if audit.status == "completed" {
                reported_ids.insert(source_item_id);
            }
        }

        let discovered_count = discovered.max(0) as usize;
        let packaged_count = packaged.max(0) as usize;
        let scripted_count = scripted.max(0) as usize;
        let audited_count = audited_ids.len();
        let reported_count = reported_ids.len();

        Ok(TelemetrySummary {
            window_days,
            event_volume: EventVolume {
                total_events: events.len(),
                by_event,
                by_status,
                error_count,
            },
            funnel: FunnelSummary {
                discovered_count,
                packaged_count,
                scripted_count,
                audited_count,
                reported_count,
                discover_to_package_pct: ratio_pct(packaged_count, discovered_count),
                package_to_script_pct: ratio_pct(scripted_count, packaged_count),
                script_to_audit_pct: ratio_pct(audited_count, scripted_count),
                audit_to_report_pct: ratio_pct(reported_count, audited_count),
            },
        })
    }

    pub async fn list_events(
        &self,
        user_id: &str,
        days: i64,
        limit: i64,
        event_name: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<FeedTelemetryEvent>> {
        let window_days = days.clamp(1, 90);
        let cutoff = Utc::now() - Duration::days(window_days);
        let mut rows = sqlx::query_as::<_, FeedTelemetryEvent>(
            "SELECT * FROM feed_telemetry_events WHERE user_id = $1 AND created_at >= $2 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        if let Some(event_name) = event_name.map(str::trim).filter(|name| !name.is_empty()) {
            rows.retain(|row| row.event_name == event_name);
        }
        if let Some(status) = status.map(str::trim).filter(|status| !status.is_empty()) {
            rows.retain(|row| row.status == status);
        }
        rows.truncate(limit.clamp(1, 200) as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_handles_zero_denominator() {
        assert_eq!(ratio_pct(5, 0), 0.0);
        assert_eq!(ratio_pct(1, 4), 25.0);
        assert_eq!(ratio_pct(1, 3), 33.3);
    }
}
