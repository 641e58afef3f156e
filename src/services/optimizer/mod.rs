//! Optimizer scoring engine.
//!
//! One composable pipeline evaluates a script as if it had been audited:
//! synthetic transcript -> simulated analysis -> explicit detectors ->
//! platform/competitor/historical scores -> combined score with ranked
//! detector gaps. Variant generation and rescoring both sit on top of it.

pub mod analysis;
pub mod detectors;
pub mod rescore;
pub mod scoring;
pub mod transcript;
pub mod variants;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::{
    AuditResult, DetectorKey, DetectorRanking, DraftSnapshot, FormatType, ImprovementDiff,
    LineLevelEdit, NextAction, Platform, ResearchItem, RetentionPoint, ScriptVariantBatch,
    StyleKey, VariantStructure,
};
use crate::services::multimodal::LlmClient;

use self::scoring::{
    build_competitor_benchmark, build_competitor_metrics, build_historical_baseline,
    build_next_actions, build_platform_metrics, combined_score, confidence_label,
    CombinedWeights, CompetitorBenchmark, CompetitorMetrics, CompetitorVideoStats,
    HistoricalBaseline, OptionalMetrics, PlatformMetrics,
};
use self::transcript::{clip100, round1, SyntheticTranscript};
use self::variants::{GeneratedVariant, GenerationMeta, VariantBrief};

pub const MIN_SCRIPT_CHARS: usize = 20;
pub const MIN_DURATION_SECONDS: i64 = 15;
pub const MAX_DURATION_SECONDS: i64 = 900;

/// Platform-specific default durations for generated scripts.
pub fn default_duration(platform: Platform) -> i64 {
    match platform {
        Platform::Youtube => 45,
        Platform::Instagram => 35,
        Platform::Tiktok => 30,
    }
}

pub fn normalize_duration(duration_s: Option<i64>, platform: Platform) -> i64 {
    duration_s
        .unwrap_or_else(|| default_duration(platform))
        .clamp(MIN_DURATION_SECONDS, MAX_DURATION_SECONDS)
}

/// Full output of one script evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptEvaluation {
    pub format_type: FormatType,
    pub duration_seconds: i64,
    pub video_analysis: AuditResult,
    pub platform_metrics: PlatformMetrics,
    pub competitor_metrics: CompetitorMetrics,
    pub historical_metrics: HistoricalBaseline,
    pub combined_score: f64,
    pub combined_confidence: String,
    pub weights: CombinedWeights,
    pub next_actions: Vec<NextAction>,
}

/// Evaluate with a prebuilt transcript + analysis (also the audit runner's
/// prediction path, where both come from the real pipeline).
pub fn evaluate_with(
    transcript: &SyntheticTranscript,
    video_analysis: AuditResult,
    duration_s: i64,
    retention_points: &[RetentionPoint],
    optional_metrics: &OptionalMetrics,
    benchmark: &CompetitorBenchmark,
    historical: HistoricalBaseline,
) -> ScriptEvaluation {
    let detector_results = detectors::extract_detectors(transcript, duration_s);
    let platform_metrics = build_platform_metrics(
        &video_analysis,
        &detector_results,
        retention_points,
        optional_metrics,
    );
    let competitor_metrics = build_competitor_metrics(platform_metrics.score, benchmark);

    let historical_ready = historical.ready();
    let (combined, weights) = combined_score(
        competitor_metrics.score,
        platform_metrics.score,
        historical.score,
        historical_ready,
    );
    let confidence = confidence_label(benchmark.sample_size, &historical.confidence, historical_ready);
    let next_actions = build_next_actions(&platform_metrics.detector_rankings);

    ScriptEvaluation {
        format_type: FormatType::from_duration(duration_s),
        duration_seconds: duration_s,
        video_analysis,
        platform_metrics,
        competitor_metrics,
        historical_metrics: historical,
        combined_score: round1(clip100(combined)),
        combined_confidence: confidence,
        weights,
        next_actions,
    }
}

/// Evaluate a raw script deterministically given benchmark + baseline.
pub fn evaluate_script(
    script_text: &str,
    platform: Platform,
    duration_s: i64,
    retention_points: &[RetentionPoint],
    optional_metrics: &OptionalMetrics,
    benchmark: &CompetitorBenchmark,
    historical: HistoricalBaseline,
) -> ScriptEvaluation {
    let transcript = transcript::build_transcript(script_text, duration_s);
    let video_analysis = analysis::build_video_analysis(script_text, duration_s, platform);
    evaluate_with(
        &transcript,
        video_analysis,
        duration_s,
        retention_points,
        optional_metrics,
        benchmark,
        historical,
    )
}

/// Score summary persisted per variant and returned from rescore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub platform_metrics: f64,
    pub competitor_metrics: f64,
    pub historical_metrics: f64,
    pub combined: f64,
    pub detector_weighted_score: f64,
    pub confidence: String,
}

impl ScoreBreakdown {
    fn from_evaluation(evaluation: &ScriptEvaluation) -> Self {
        Self {
            platform_metrics: round1(evaluation.platform_metrics.score),
            competitor_metrics: round1(evaluation.competitor_metrics.score),
            historical_metrics: round1(evaluation.historical_metrics.score),
            combined: evaluation.combined_score,
            detector_weighted_score: round1(
                evaluation.platform_metrics.signals.detector_weighted_score,
            ),
            confidence: evaluation.combined_confidence.clone(),
        }
    }
}

/// One scored, ranked variant as persisted and returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedVariant {
    pub id: String,
    pub style_key: StyleKey,
    pub label: String,
    pub rationale: String,
    pub script_text: String,
    pub structure: VariantStructure,
    pub score_breakdown: ScoreBreakdown,
    pub detector_rankings: Vec<DetectorRanking>,
    pub next_actions: Vec<NextAction>,
    pub rank: usize,
    pub expected_lift_points: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariantBatchResponse {
    pub batch_id: String,
    pub generated_at: String,
    pub generation: GenerationMeta,
    pub variants: Vec<EvaluatedVariant>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateVariantsParams {
    pub topic: String,
    pub audience: Option<String>,
    pub objective: Option<String>,
    pub tone: Option<String>,
    pub platform: Option<String>,
    pub duration_s: Option<i64>,
    pub source_item_id: Option<String>,
    pub source_context_note: Option<String>,
    pub generation_mode: Option<String>,
    pub hook_style: Option<String>,
    pub cta_style: Option<String>,
    pub pacing_density: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RescoreParams {
    pub script_text: String,
    pub platform: Option<String>,
    pub duration_s: Option<i64>,
    pub optional_metrics: Option<OptionalMetrics>,
    pub retention_points: Vec<RetentionPoint>,
    pub baseline_score: Option<f64>,
    pub baseline_detector_rankings: Vec<DetectorRanking>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RescoreBreakdown {
    #[serde(flatten)]
    pub scores: ScoreBreakdown,
    pub weights: CombinedWeights,
    pub delta_from_baseline: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RescoreResponse {
    pub score_breakdown: RescoreBreakdown,
    pub detector_rankings: Vec<DetectorRanking>,
    pub next_actions: Vec<NextAction>,
    pub line_level_edits: Vec<LineLevelEdit>,
    pub improvement_diff: ImprovementDiff,
    pub signals: scoring::PlatformSignals,
    pub format_type: FormatType,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, Default)]
pub struct DraftSnapshotParams {
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
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftSnapshotPayload {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub source_item_id: Option<String>,
    pub variant_id: Option<String>,
    pub script_text: String,
    pub baseline_score: Option<f64>,
    pub rescored_score: f64,
    pub delta_score: Option<f64>,
    pub detector_rankings: serde_json::Value,
    pub next_actions: serde_json::Value,
    pub line_level_edits: serde_json::Value,
    pub created_at: String,
}

impl DraftSnapshotPayload {
    fn from_row(row: &DraftSnapshot) -> Self {
        Self {
            id: row.id.clone(),
            user_id: row.user_id.clone(),
            platform: row.platform.clone(),
            source_item_id: row.source_item_id.clone(),
            variant_id: row.variant_id.clone(),
            script_text: row.script_text.clone(),
            baseline_score: row.baseline_score,
            rescored_score: row.rescored_score,
            delta_score: row.delta_score,
            detector_rankings: row.detector_rankings_json.clone(),
            next_actions: row.next_actions_json.clone(),
            line_level_edits: row.line_level_edits_json.clone(),
            created_at: row.created_at.to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct OptimizerService {
    pool: PgPool,
    config: Arc<AppConfig>,
    llm: LlmClient,
}

impl OptimizerService {
    pub fn new(pool: PgPool, config: Arc<AppConfig>, llm: LlmClient) -> Self {
        Self { pool, config, llm }
    }

    fn assert_enabled(&self) -> Result<()> {
        if !self.config.features.optimizer_v2_enabled {
            return Err(AppError::FeatureDisabled(
                "Optimizer v2 disabled by feature flag.".to_string(),
            ));
        }
        Ok(())
    }

    /// Competitor benchmark for this user + platform. Competitor videos are
    /// the user's corpus items attributed to tracked competitor handles.
    async fn collect_competitor_benchmark(
        &self,
        user_id: &str,
        platform: Platform,
        format_type: FormatType,
    ) -> Result<CompetitorBenchmark> {
        let competitors = sqlx::query_as::<_, crate::models::Competitor>(
            "SELECT * FROM competitors WHERE user_id = $1 AND platform = $2",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;
        if competitors.is_empty() {
            return Ok(CompetitorBenchmark::empty(format_type));
        }

        let handles: Vec<String> = competitors
            .iter()
            .filter_map(|competitor| competitor.display_name.as_deref())
            .map(|name| name.trim().trim_start_matches('@').to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        let external_ids: Vec<String> = competitors
            .iter()
            .map(|competitor| competitor.external_id.to_lowercase())
            .collect();

        let items = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE user_id = $1 AND platform = $2",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;

        let rows: Vec<CompetitorVideoStats> = items
            .iter()
            .filter(|item| {
                let handle = item
                    .creator_handle
                    .as_deref()
                    .unwrap_or_default()
                    .trim_start_matches('@')
                    .to_lowercase();
                let display = item
                    .creator_display_name
                    .as_deref()
                    .unwrap_or_default()
                    .trim_start_matches('@')
                    .to_lowercase();
                let channel = item
                    .media_meta_str("channel_id")
                    .unwrap_or_default()
                    .to_lowercase();
                (!handle.is_empty() && handles.contains(&handle))
                    || (!display.is_empty() && handles.contains(&display))
                    || (!channel.is_empty() && external_ids.contains(&channel))
            })
            .map(|item| {
                let metrics = item.metrics();
                CompetitorVideoStats {
                    views: metrics.views,
                    likes: metrics.likes,
                    comments: metrics.comments,
                    shares: metrics.shares,
                    saves: metrics.saves,
                    duration_seconds: item
                        .media_meta_json
                        .get("duration_seconds")
                        .and_then(|v| v.as_i64())
                        .unwrap_or(0),
                }
            })
            .collect();

        Ok(build_competitor_benchmark(
            &rows,
            competitors.len(),
            format_type,
        ))
    }

    /// Rolling baseline from the user's recent outcomes, format-first.
    async fn collect_historical_baseline(
        &self,
        user_id: &str,
        format_type: FormatType,
    ) -> Result<HistoricalBaseline> {
        let rows: Vec<(f64, Option<serde_json::Value>)> = sqlx::query_as(
            r#"
            SELECT actual_score, actual_metrics_json
            FROM outcome_metrics
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 100
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let all_scores: Vec<f64> = rows.iter().map(|(score, _)| *score).collect();
        let format_scores: Vec<f64> = rows
            .iter()
            .filter(|(_, metrics)| {
                metrics
                    .as_ref()
                    .and_then(|m| m.get("duration_seconds"))
                    .and_then(|v| v.as_i64())
                    .map(|duration| FormatType::from_duration(duration) == format_type)
                    .unwrap_or(false)
            })
            .map(|(score, _)| *score)
            .collect();

        Ok(build_historical_baseline(&format_scores, &all_scores))
    }

    /// Fetch benchmark + baseline (degrading to empties on storage errors)
    /// and run the pure evaluation.
    pub async fn evaluate_for_user(
        &self,
        user_id: &str,
        platform: Platform,
        script_text: &str,
        duration_s: i64,
        retention_points: &[RetentionPoint],
        optional_metrics: &OptionalMetrics,
    ) -> Result<ScriptEvaluation> {
        let format_type = FormatType::from_duration(duration_s);
        let benchmark = match self
            .collect_competitor_benchmark(user_id, platform, format_type)
            .await
        {
            Ok(benchmark) => benchmark,
            Err(err) => {
                tracing::warn!(error = %err, "competitor benchmark unavailable, using empty");
                CompetitorBenchmark::empty(format_type)
            }
        };
        let historical = match self.collect_historical_baseline(user_id, format_type).await {
            Ok(historical) => historical,
            Err(err) => {
                tracing::warn!(error = %err, "historical baseline unavailable, using empty");
                HistoricalBaseline::empty()
            }
        };

        Ok(evaluate_script(
            script_text,
            platform,
            duration_s,
            retention_points,
            optional_metrics,
            &benchmark,
            historical,
        ))
    }

    /// Audit-runner prediction path: evaluate with the real transcript and
    /// multimodal analysis instead of synthesizing them from a script.
    pub async fn predict_performance(
        &self,
        user_id: &str,
        platform: Platform,
        transcript: &SyntheticTranscript,
        video_analysis: AuditResult,
        duration_s: i64,
        retention_points: &[RetentionPoint],
        optional_metrics: &OptionalMetrics,
    ) -> Result<ScriptEvaluation> {
        let format_type = FormatType::from_duration(duration_s);
        let benchmark = match self
            .collect_competitor_benchmark(user_id, platform, format_type)
            .await
        {
            Ok(benchmark) => benchmark,
            Err(err) => {
                tracing::warn!(error = %err, "competitor benchmark unavailable, using empty");
                CompetitorBenchmark::empty(format_type)
            }
        };
        let historical = match self.collect_historical_baseline(user_id, format_type).await {
            Ok(historical) => historical,
            Err(err) => {
                tracing::warn!(error = %err, "historical baseline unavailable, using empty");
                HistoricalBaseline::empty()
            }
        };
        Ok(evaluate_with(
            transcript,
            video_analysis,
            duration_s,
            retention_points,
            optional_metrics,
            &benchmark,
            historical,
        ))
    }

    async fn load_source_context(
        &self,
        user_id: &str,
        source_item_id: Option<&str>,
    ) -> Result<Option<serde_json::Value>> {
        let Some(item_id) = source_item_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let item = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE id = $1 AND user_id = $2",
        )
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item.map(|item| {
            let metrics = item.metrics();
            json!({
                "title": item.title,
                "caption": item.caption,
                "creator_handle": item.creator_handle,
                "platform": item.platform,
                "views": metrics.views,
                "likes": metrics.likes,
                "comments": metrics.comments,
                "shares": metrics.shares,
                "saves": metrics.saves,
            })
        }))
    }

    /// E1: build exactly 3 ranked variants and persist the batch.
    pub async fn generate_variants(
        &self,
        user_id: &str,
        params: GenerateVariantsParams,
    ) -> Result<VariantBatchResponse> {
        self.assert_enabled()?;

        let topic = params.topic.trim().to_string();
        if topic.len() < 2 {
            return Err(AppError::bad_request("topic is required"));
        }
        if let Some(mode) = params
            .generation_mode
            .as_deref()
            .map(str::trim)
            .filter(|mode| !mode.is_empty())
        {
            if mode != variants::DEFAULT_GENERATION_MODE {
                return Err(AppError::bad_request(
                    "generation_mode must be ai_first_fallback",
                ));
            }
        }

        let platform = Platform::parse_or_default(params.platform.as_deref())?;
        let duration_s = normalize_duration(params.duration_s, platform);
        let audience = params
            .audience
            .clone()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| "solo creators".to_string());
        let objective = params
            .objective
            .clone()
            .filter(|o| !o.trim().is_empty())
            .unwrap_or_else(|| "higher retention and shares".to_string());
        let tone = params
            .tone
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "bold".to_string());

        let mut source_context = self
            .load_source_context(user_id, params.source_item_id.as_deref())
            .await?;
        if let Some(note) = params
            .source_context_note
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty())
        {
            match source_context.as_mut().and_then(|v| v.as_object_mut()) {
                Some(map) => {
                    map.insert("context_note".into(), json!(note));
                }
                None => source_context = Some(json!({ "context_note": note })),
            }
        }

        let brief = VariantBrief {
            topic: topic.clone(),
            audience: audience.clone(),
            objective: objective.clone(),
            tone: tone.clone(),
            platform,
            duration_s,
            hook_style: params.hook_style.clone(),
            cta_style: params.cta_style.clone(),
            pacing_density: params.pacing_density.clone(),
            source_context: source_context.clone(),
        };

        let (raw_variants, generation) = variants::generate_raw_variants(&self.llm, &brief).await;

        let mut evaluated: Vec<EvaluatedVariant> = Vec::with_capacity(3);
        for raw in &raw_variants {
            let evaluation = self
                .evaluate_for_user(
                    user_id,
                    platform,
                    &raw.script_text,
                    duration_s,
                    &[],
                    &OptionalMetrics::default(),
                )
                .await?;
            evaluated.push(build_evaluated_variant(raw, &evaluation));
        }

        // Descending by combined; median is the middle of three.
        evaluated.sort_by(|a, b| {
            b.score_breakdown
                .combined
                .partial_cmp(&a.score_breakdown.combined)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let median = evaluated
            .get(1)
            .map(|variant| variant.score_breakdown.combined)
            .unwrap_or(0.0);
        for (idx, variant) in evaluated.iter_mut().enumerate() {
            variant.rank = idx + 1;
            variant.expected_lift_points =
                round1((variant.score_breakdown.combined - median).max(0.0));
        }

        let batch_id = Uuid::new_v4().to_string();
        let selected_variant_id = evaluated.first().map(|variant| variant.id.clone());
        let request_json = json!({
            "platform": platform.as_str(),
            "topic": &topic,
            "audience": audience,
            "objective": objective,
            "tone": tone,
            "duration_s": duration_s,
            "generation_mode": variants::DEFAULT_GENERATION_MODE,
            "source_item_id": &params.source_item_id,
            "source_context": source_context,
            "generation": &generation,
        });

        sqlx::query(
            r#"
            INSERT INTO script_variants (
                id, user_id, source_item_id, platform, topic,
                request_json, variants_json, selected_variant_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&batch_id)
        .bind(user_id)
        .bind(params.source_item_id.as_deref())
        .bind(platform.as_str())
        .bind(&topic)
        .bind(&request_json)
        .bind(serde_json::to_value(&evaluated)?)
        .bind(selected_variant_id.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(VariantBatchResponse {
            batch_id,
            generated_at: Utc::now().to_rfc3339(),
            generation,
            variants: evaluated,
        })
    }

    /// E2: rescore an edited script against an optional baseline.
    pub async fn rescore(&self, user_id: &str, params: RescoreParams) -> Result<RescoreResponse> {
        self.assert_enabled()?;

        let script_text = params.script_text.trim().to_string();
        if script_text.len() < MIN_SCRIPT_CHARS {
            return Err(AppError::bad_request(
                "script_text must be at least 20 characters",
            ));
        }
        let platform = Platform::parse_or_default(params.platform.as_deref())?;
        let duration_s = normalize_duration(params.duration_s, platform);

        let retention_points: Vec<RetentionPoint> = params
            .retention_points
            .iter()
            .filter(|point| point.time >= 0.0 && point.retention >= 0.0)
            .copied()
            .collect();
        let optional_metrics = params.optional_metrics.clone().unwrap_or_default();

        let evaluation = self
            .evaluate_for_user(
                user_id,
                platform,
                &script_text,
                duration_s,
                &retention_points,
                &optional_metrics,
            )
            .await?;

        let baseline_detector_scores: HashMap<DetectorKey, f64> = params
            .baseline_detector_rankings
            .iter()
            .map(|ranking| (ranking.detector_key, ranking.score))
            .collect();
        let rankings = evaluation.platform_metrics.detector_rankings.clone();
        let line_level_edits =
            rescore::build_line_level_edits(&script_text, &rankings, evaluation.format_type);
        let improvement_diff = rescore::build_improvement_diff(
            params.baseline_score,
            &baseline_detector_scores,
            evaluation.combined_score,
            &rankings,
        );
        let delta_from_baseline = params
            .baseline_score
            .map(|baseline| round1(evaluation.combined_score - baseline));

        Ok(RescoreResponse {
            score_breakdown: RescoreBreakdown {
                scores: ScoreBreakdown::from_evaluation(&evaluation),
                weights: evaluation.weights.clone(),
                delta_from_baseline,
            },
            detector_rankings: rankings,
            next_actions: evaluation.next_actions.clone(),
            line_level_edits,
            improvement_diff,
            signals: evaluation.platform_metrics.signals.clone(),
            format_type: evaluation.format_type,
            duration_seconds: evaluation.duration_seconds,
        })
    }

    /// E3: persist a rescored draft.
    pub async fn create_draft_snapshot(
        &self,
        user_id: &str,
        params: DraftSnapshotParams,
    ) -> Result<DraftSnapshotPayload> {
        self.assert_enabled()?;

        let script_text = params.script_text.trim().to_string();
        if script_text.len() < MIN_SCRIPT_CHARS {
            return Err(AppError::bad_request(
                "script_text must be at least 20 characters",
            ));
        }
        let platform = Platform::parse_or_default(params.platform.as_deref())?;

        let rescored_score = params.rescored_score.ok_or_else(|| {
            AppError::bad_request("rescored_score or score_breakdown.combined is required")
        })?;
        let delta_score = params.delta_score.or_else(|| {
            params
                .baseline_score
                .map(|baseline| round1(rescored_score - baseline))
        });

        let row = sqlx::query_as::<_, DraftSnapshot>(
            r#"
            INSERT INTO draft_snapshots (
                id, user_id, platform, source_item_id, variant_id, script_text,
                baseline_score, rescored_score, delta_score,
                detector_rankings_json, next_actions_json, line_level_edits_json
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(platform.as_str())
        .bind(params.source_item_id.as_deref())
        .bind(params.variant_id.as_deref())
        .bind(&script_text)
        .bind(params.baseline_score.map(round1))
        .bind(round1(rescored_score))
        .bind(delta_score.map(round1))
        .bind(params.detector_rankings.unwrap_or_else(|| json!([])))
        .bind(params.next_actions.unwrap_or_else(|| json!([])))
        .bind(params.line_level_edits.unwrap_or_else(|| json!([])))
        .fetch_one(&self.pool)
        .await?;
        Ok(DraftSnapshotPayload::from_row(&row))
    }

    pub async fn get_draft_snapshot(
        &self,
        user_id: &str,
        snapshot_id: &str,
    ) -> Result<DraftSnapshotPayload> {
        self.assert_enabled()?;
        let row = sqlx::query_as::<_, DraftSnapshot>(
            "SELECT * FROM draft_snapshots WHERE id = $1 AND user_id = $2",
        )
        .bind(snapshot_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Draft snapshot"))?;
        Ok(DraftSnapshotPayload::from_row(&row))
    }

    pub async fn list_draft_snapshots(
        &self,
        user_id: &str,
        platform: Option<&str>,
        limit: i64,
    ) -> Result<Vec<DraftSnapshotPayload>> {
        self.assert_enabled()?;
        let platform = Platform::parse_optional(platform)?;
        let limit = limit.clamp(1, 100);

        let rows = match platform {
            Some(platform) => {
                sqlx::query_as::<_, DraftSnapshot>(
                    "SELECT * FROM draft_snapshots WHERE user_id = $1 AND platform = $2 ORDER BY created_at DESC LIMIT $3",
                )
                .bind(user_id)
                .bind(platform.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DraftSnapshot>(
                    "SELECT * FROM draft_snapshots WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
                )
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(DraftSnapshotPayload::from_row).collect())
    }

    pub async fn latest_variant_batch(
        &self,
        user_id: &str,
        source_item_id: &str,
    ) -> Result<Option<ScriptVariantBatch>> {
        let row = sqlx::query_as::<_, ScriptVariantBatch>(
            "SELECT * FROM script_variants WHERE user_id = $1 AND source_item_id = $2 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(source_item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

fn build_evaluated_variant(raw: &GeneratedVariant, evaluation: &ScriptEvaluation) -> EvaluatedVariant {
    EvaluatedVariant {
        id: Uuid::new_v4().to_string(),
        style_key: raw.style_key,
        label: raw.label.clone(),
        rationale: raw.rationale.clone(),
        script_text: raw.script_text.clone(),
        structure: raw.structure.clone(),
        score_breakdown: ScoreBreakdown::from_evaluation(evaluation),
        detector_rankings: evaluation.platform_metrics.detector_rankings.clone(),
        next_actions: evaluation.next_actions.clone(),
        rank: 0,
        expected_lift_points: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_defaults_per_platform_and_clamps() {
        assert_eq!(normalize_duration(None, Platform::Youtube), 45);
        assert_eq!(normalize_duration(None, Platform::Instagram), 35);
        assert_eq!(normalize_duration(None, Platform::Tiktok), 30);
        assert_eq!(normalize_duration(Some(5), Platform::Youtube), 15);
        assert_eq!(normalize_duration(Some(5000), Platform::Youtube), 900);
        assert_eq!(normalize_duration(Some(120), Platform::Youtube), 120);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let benchmark = CompetitorBenchmark::empty(FormatType::ShortForm);
        let script = "I tested 3 hooks and grew 40%.\nHere is the proof.\nComment PLAN.";
        let first = evaluate_script(
            script,
            Platform::Youtube,
            40,
            &[],
            &OptionalMetrics::default(),
            &benchmark,
            HistoricalBaseline::empty(),
        );
        let second = evaluate_script(
            script,
            Platform::Youtube,
            40,
            &[],
            &OptionalMetrics::default(),
            &benchmark,
            HistoricalBaseline::empty(),
        );
        assert_eq!(first.combined_score, second.combined_score);
        assert_eq!(
            first.platform_metrics.signals.detector_weighted_score,
            second.platform_metrics.signals.detector_weighted_score
        );
        assert!((0.0..=100.0).contains(&first.combined_score));
    }

    #[test]
    fn no_history_caps_confidence_at_medium() {
        let benchmark = CompetitorBenchmark {
            sample_size: 30,
            has_data: true,
            ..CompetitorBenchmark::empty(FormatType::ShortForm)
        };
        let evaluation = evaluate_script(
            "I tested 3 hooks and grew 40%.\nProof inside.\nComment PLAN.",
            Platform::Youtube,
            40,
            &[],
            &OptionalMetrics::default(),
            &benchmark,
            HistoricalBaseline::empty(),
        );
        assert_ne!(evaluation.combined_confidence, "high");
        assert!((evaluation.weights.historical_metrics - 0.0).abs() < f64::EPSILON);
    }
}
