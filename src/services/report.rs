//! Consolidated report assembly: diagnosis + multimodal audit + blueprint
//! + outcome calibration in one payload.

use serde_json::{json, Value};
use sqlx::PgPool;

use crate::error::{AppError, Result};
use crate::models::{Audit, DraftSnapshot, OutcomeMetric, Platform};
use crate::services::audits::AuditService;
use crate::services::blueprint::BlueprintService;
use crate::services::outcomes::OutcomeService;

/// Rescale mixed /10 and /100 scores onto [0, 100].
pub fn safe_score_100(value: Option<f64>, default: f64) -> f64 {
    let Some(raw) = value else {
        return default;
    };
    if raw <= 10.0 {
        (raw * 10.0).clamp(0.0, 100.0)
    } else {
        raw.clamp(0.0, 100.0)
    }
}

/// 8-item deduplicated recommendation list from prediction next actions,
/// diagnosis, first analysis feedback, blueprint velocity actions, and a
/// combined-score interpretation.
pub fn normalize_recommendations(
    diagnosis: &Value,
    video_analysis: &Value,
    performance_prediction: Option<&Value>,
    blueprint: Option<&Value>,
) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    if let Some(prediction) = performance_prediction {
        if let Some(actions) = prediction["next_actions"].as_array() {
            for action in actions.iter().take(3) {
                let title = action["title"].as_str().unwrap_or_default().trim();
                let why = action["why"].as_str().unwrap_or_default().trim();
                if !title.is_empty() && !why.is_empty() {
                    result.push(format!("{}: {}", title, why));
                } else if !title.is_empty() {
                    result.push(title.to_string());
                }
            }
        }
    }

    if let Some(recommendations) = diagnosis["recommendations"].as_array() {
        for recommendation in recommendations.iter().take(2) {
            match recommendation {
                Value::String(text) => result.push(text.clone()),
                Value::Object(map) => {
                    let title = map.get("title").and_then(|v| v.as_str()).unwrap_or_default();
                    let description = map
                        .get("description")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    if !title.is_empty() && !description.is_empty() {
                        result.push(format!("{}: {}", title, description));
                    } else if !title.is_empty() {
                        result.push(title.to_string());
                    }
                }
                _ => {}
            }
        }
    }

    if let Some(sections) = video_analysis["sections"].as_array() {
        if let Some(section) = sections.first() {
            if let Some(feedback) = section["feedback"].as_array() {
                if let Some(Value::String(text)) = feedback.first() {
                    result.push(text.clone());
                }
            }
        }
    }

    let combined_score = performance_prediction
        .and_then(|prediction| prediction["combined_metrics"]["score"].as_f64());
    if let Some(score) = combined_score {
        let score = safe_score_100(Some(score), 0.0);
        if score < 60.0 {
            result.push(
                "Combined performance likelihood is currently low; tighten the first 3-5 seconds and clarity of the payoff."
                    .to_string(),
            );
        } else if score < 80.0 {
            result.push(
                "Combined performance likelihood is medium; improve hook specificity and pacing to lift breakout odds."
                    .to_string(),
            );
        } else {
            result.push(
                "Combined performance likelihood is high; keep this structure and iterate variations for repeatable winners."
                    .to_string(),
            );
        }
    }

    if let Some(blueprint) = blueprint {
        if let Some(actions) = blueprint["velocity_actions"].as_array() {
            for action in actions.iter().take(2) {
                let title = action["title"].as_str().unwrap_or_default().trim();
                let why = action["why"].as_str().unwrap_or_default().trim();
                if !title.is_empty() && !why.is_empty() {
                    result.push(format!("{}: {}", title, why));
                }
            }
        }
    }

    result.push("Focus on the next 3 pillar topics identified in your Competitor Blueprint.".to_string());

    let mut deduped = Vec::new();
    for item in result {
        let normalized = item.trim().to_string();
        if !normalized.is_empty() && !deduped.contains(&normalized) {
            deduped.push(normalized);
        }
    }
    deduped.truncate(8);
    deduped
}

/// Report platform: prediction -> audit input -> default youtube.
pub fn resolve_report_platform(
    performance_prediction: Option<&Value>,
    audit_input: Option<&Value>,
) -> Platform {
    let candidate = performance_prediction
        .and_then(|prediction| prediction["platform"].as_str())
        .and_then(|value| Platform::parse(value).ok());
    if let Some(platform) = candidate {
        return platform;
    }
    audit_input
        .and_then(|input| input["platform"].as_str())
        .and_then(|value| Platform::parse(value).ok())
        .unwrap_or(Platform::Youtube)
}

#[derive(Clone)]
pub struct ReportService {
    pool: PgPool,
    audits: AuditService,
    blueprint: BlueprintService,
    outcomes: OutcomeService,
}

impl ReportService {
    pub fn new(
        pool: PgPool,
        audits: AuditService,
        blueprint: BlueprintService,
        outcomes: OutcomeService,
    ) -> Self {
        Self {
            pool,
            audits,
            blueprint,
            outcomes,
        }
    }

    async fn outcome_context(
        &self,
        user_id: &str,
        platform: Platform,
        audit_id: &str,
    ) -> Result<(Option<Value>, Value, Value)> {
        let linked_outcome = sqlx::query_as::<_, OutcomeMetric>(
            "SELECT * FROM outcome_metrics WHERE user_id = $1 AND report_id = $2 ORDER BY posted_at DESC, created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(audit_id)
        .fetch_optional(&self.pool)
        .await?;

        let latest_outcome = match linked_outcome {
            Some(outcome) => Some(outcome),
            None => {
                sqlx::query_as::<_, OutcomeMetric>(
                    "SELECT * FROM outcome_metrics WHERE user_id = $1 AND platform = $2 ORDER BY posted_at DESC, created_at DESC LIMIT 1",
                )
                .bind(user_id)
                .bind(platform.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
        };

        let prediction_vs_actual = latest_outcome.as_ref().map(|outcome| {
            json!({
                "outcome_id": &outcome.id,
                "platform": &outcome.platform,
                "content_item_id": &outcome.content_item_id,
                "draft_snapshot_id": &outcome.draft_snapshot_id,
                "report_id": &outcome.report_id,
                "posted_at": outcome.posted_at.to_rfc3339(),
                "predicted_score": outcome.predicted_score,
                "actual_score": outcome.actual_score,
                "calibration_delta": outcome.calibration_delta,
                "actual_metrics": &outcome.actual_metrics_json,
            })
        });

        let (calibration_confidence, outcome_drift) =
            match self.outcomes.platform_summary(user_id, platform).await {
                Ok(summary) => {
                    let snapshot = summary.snapshot;
                    (
                        json!({
                            "platform": snapshot.platform,
                            "sample_size": snapshot.sample_size,
                            "mean_abs_error": snapshot.avg_error,
                            "hit_rate": snapshot.hit_rate,
                            "trend": snapshot.trend,
                            "confidence": snapshot.confidence,
                            "insufficient_data": snapshot.insufficient_data,
                            "recommendations": snapshot.recommendations,
                        }),
                        json!({
                            "drift_windows": summary.drift_windows,
                            "next_actions": summary.next_actions,
                            "recent_outcomes": summary.recent_outcomes,
                        }),
                    )
                }
                Err(err) => {
                    tracing::warn!(error = %err, "outcome summary unavailable for report");
                    (
                        json!({
                            "platform": platform.as_str(),
                            "sample_size": 0,
                            "mean_abs_error": 0.0,
                            "hit_rate": 0.0,
                            "trend": "flat",
                            "confidence": "low",
                            "insufficient_data": true,
                            "recommendations": [
                                "No posted outcomes ingested yet. Add outcome metrics to calibrate prediction confidence.",
                            ],
                        }),
                        json!({
                            "drift_windows": {},
                            "next_actions": [],
                            "recent_outcomes": [],
                        }),
                    )
                }
            };

        Ok((prediction_vs_actual, calibration_confidence, outcome_drift))
    }

    async fn best_edited_variant(&self, user_id: &str, audit_id: &str) -> Result<Option<Value>> {
        let linked_snapshot_id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT draft_snapshot_id FROM outcome_metrics
            WHERE user_id = $1 AND report_id = $2 AND draft_snapshot_id IS NOT NULL
            ORDER BY posted_at DESC, created_at DESC LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(audit_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten();

        let snapshot = match linked_snapshot_id {
            Some(snapshot_id) => {
                sqlx::query_as::<_, DraftSnapshot>(
                    "SELECT * FROM draft_snapshots WHERE id = $1 AND user_id = $2",
                )
                .bind(&snapshot_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => None,
        };
        let snapshot = match snapshot {
            Some(snapshot) => Some(snapshot),
            None => {
                sqlx::query_as::<_, DraftSnapshot>(
                    "SELECT * FROM draft_snapshots WHERE user_id = $1 ORDER BY created_at DESC LIMIT 1",
                )
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        let Some(snapshot) = snapshot else {
            return Ok(None);
        };

        let mut script_preview = snapshot.script_text.trim().to_string();
        if script_preview.chars().count() > 340 {
            script_preview = script_preview.chars().take(337).collect::<String>() + "...";
        }
        let top_detectors: Vec<Value> = snapshot
            .detector_rankings_json
            .as_array()
            .map(|rows| {
                rows.iter()
                    .take(3)
                    .map(|row| {
                        json!({
                            "detector_key": row["detector_key"],
                            "label": row["label"],
                            "score": row["score"],
                            "target_score": row["target_score"],
                            "gap": row["gap"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(json!({
            "id": snapshot.id,
            "platform": snapshot.platform,
            "variant_id": snapshot.variant_id,
            "source_item_id": snapshot.source_item_id,
            "script_preview": script_preview,
            "baseline_score": snapshot.baseline_score,
            "rescored_score": snapshot.rescored_score,
            "delta_score": snapshot.delta_score,
            "created_at": snapshot.created_at.to_rfc3339(),
            "top_detector_improvements": top_detectors,
        })))
    }

    fn quick_actions(best_edited_variant: Option<&Value>) -> Vec<Value> {
        let mut href = "/research?mode=optimizer".to_string();
        if let Some(variant) = best_edited_variant {
            if let Some(source_item_id) = variant["source_item_id"].as_str().filter(|id| !id.is_empty())
            {
                href.push_str(&format!(
                    "&source_item_id={}",
                    urlencoding::encode(source_item_id)
                ));
            }
            if let Some(preview) = variant["script_preview"].as_str() {
                let topic_seed: String = preview
                    .split('.')
                    .next()
                    .unwrap_or_default()
                    .chars()
                    .take(120)
                    .collect::<String>()
                    .trim()
                    .to_string();
                if !topic_seed.is_empty() {
                    href.push_str(&format!("&topic={}", urlencoding::encode(&topic_seed)));
                }
            }
        }
        vec![json!({
            "type": "generate_improved_variants",
            "label": "Generate 3 improved variants now",
            "href": href,
        })]
    }

    /// Assemble the `/report/{audit_id?}` payload.
    pub async fn consolidated_report(&self, user_id: &str, audit_id: Option<&str>) -> Result<Value> {
        let audit: Audit = match audit_id {
            Some(audit_id) => self.audits.get_audit(user_id, audit_id).await?,
            None => self
                .audits
                .latest_completed(user_id)
                .await?
                .ok_or_else(|| AppError::not_found("Completed audit"))?,
        };

        let output = audit.output_json.clone().unwrap_or(json!({}));
        let diagnosis = output.get("diagnosis").cloned().unwrap_or(json!({}));
        let video_analysis = if output.get("video_analysis").map(|v| v.is_object()).unwrap_or(false)
        {
            output["video_analysis"].clone()
        } else if output.get("overall_score").is_some() && output.get("sections").is_some() {
            // Early bundles stored the analysis at top level.
            output.clone()
        } else {
            json!({})
        };
        let performance_prediction = output
            .get("performance_prediction")
            .filter(|v| v.is_object() && !v.as_object().map(|m| m.is_empty()).unwrap_or(true))
            .cloned();

        let report_platform = resolve_report_platform(
            performance_prediction.as_ref(),
            Some(&audit.input_json),
        );

        let blueprint = self
            .blueprint
            .get_or_refresh(user_id, report_platform)
            .await?;
        let (prediction_vs_actual, calibration_confidence, outcome_drift) = self
            .outcome_context(user_id, report_platform, &audit.id)
            .await?;
        let best_edited_variant = self.best_edited_variant(user_id, &audit.id).await?;

        // Weights: 30% stats metrics, 40% video hook/retention, 30%
        // strategy/blueprint.
        let stats_score = safe_score_100(
            diagnosis["metrics"]["overall_score"].as_f64(),
            70.0,
        );
        let video_score = match performance_prediction
            .as_ref()
            .and_then(|prediction| prediction["combined_metrics"]["score"].as_f64())
        {
            Some(combined) => safe_score_100(Some(combined), 70.0),
            None => safe_score_100(video_analysis["overall_score"].as_f64(), 70.0),
        };
        let strategy_score = 80.0;
        let overall_score = stats_score * 0.3 + video_score * 0.4 + strategy_score * 0.3;

        let recommendations = normalize_recommendations(
            &diagnosis,
            &video_analysis,
            performance_prediction.as_ref(),
            Some(&blueprint),
        );
        let quick_actions = Self::quick_actions(best_edited_variant.as_ref());

        Ok(json!({
            "audit_id": audit.id,
            "report_platform": report_platform.as_str(),
            "created_at": audit.created_at.to_rfc3339(),
            "overall_score": overall_score.round() as i64,
            "diagnosis": diagnosis,
            "video_analysis": video_analysis,
            "performance_prediction": performance_prediction,
            "blueprint": blueprint,
            "prediction_vs_actual": prediction_vs_actual,
            "calibration_confidence": calibration_confidence,
            "outcome_drift": outcome_drift,
            "best_edited_variant": best_edited_variant,
            "quick_actions": quick_actions,
            "recommendations": recommendations,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_rescale_from_ten_point_scale() {
        assert_eq!(safe_score_100(Some(7.5), 70.0), 75.0);
        assert_eq!(safe_score_100(Some(85.0), 70.0), 85.0);
        assert_eq!(safe_score_100(None, 70.0), 70.0);
        assert_eq!(safe_score_100(Some(150.0), 70.0), 100.0);
    }

    #[test]
    fn platform_resolution_prefers_prediction() {
        let prediction = json!({"platform": "tiktok"});
        let input = json!({"platform": "instagram"});
        assert_eq!(
            resolve_report_platform(Some(&prediction), Some(&input)),
            Platform::Tiktok
        );
        assert_eq!(
            resolve_report_platform(None, Some(&input)),
            Platform::Instagram
        );
        assert_eq!(resolve_report_platform(None, None), Platform::Youtube);
    }

    #[test]
    fn recommendations_dedupe_and_cap_at_eight() {
        let prediction = json!({
            "next_actions": [
                {"title": "Improve Time to Value", "why": "slow start"},
                {"title": "Improve CTA Style", "why": "no cta"},
                {"title": "Improve Dead Zones", "why": "long beats"},
            ],
            "combined_metrics": {"score": 85.0},
        });
        let diagnosis = json!({
            "recommendations": ["Post more consistently", "Post more consistently"],
        });
        let analysis = json!({
            "sections": [{"name": "Intro", "score": 7, "feedback": ["Sharpen the hook"]}],
        });
        let blueprint = json!({
            "velocity_actions": [
                {"title": "Double down on 'hooks'", "why": "high velocity"},
            ],
        });
        let recommendations =
            normalize_recommendations(&diagnosis, &analysis, Some(&prediction), Some(&blueprint));
        assert!(recommendations.len() <= 8);
        let unique: std::collections::HashSet<&String> = recommendations.iter().collect();
        assert_eq!(unique.len(), recommendations.len());
        assert!(recommendations
            .iter()
            .any(|rec| rec.contains("likelihood is high")));
    }
}
