//! Platform / competitor / historical scoring and the combined mix.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{
    AuditResult, DetectorKey, DetectorRanking, DetectorResult, FormatType, NextAction,
    RetentionPoint,
};

use super::transcript::{clip100, round1, round2};

/// Owner-supplied true platform metrics, all optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionalMetrics {
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub saves: Option<i64>,
    pub watch_time_hours: Option<f64>,
    pub avg_view_duration_s: Option<f64>,
    pub ctr: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricCoverage {
    pub retention_curve: String,
    pub shares: String,
    pub saves: String,
}

impl Default for MetricCoverage {
    fn default() -> Self {
        Self {
            retention_curve: "proxy".to_string(),
            shares: "proxy".to_string(),
            saves: "proxy".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSignals {
    pub overall_multimodal_score: f64,
    pub detector_weighted_score: f64,
    pub hook_strength: f64,
    pub pacing_strength: f64,
    pub mean_retention: Option<f64>,
    pub interaction_boost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformMetrics {
    pub score: f64,
    pub signals: PlatformSignals,
    pub metric_coverage: MetricCoverage,
    pub true_metrics: Option<OptionalMetrics>,
    pub detector_rankings: Vec<DetectorRanking>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorBenchmark {
    pub has_data: bool,
    pub sample_size: usize,
    pub competitor_count: usize,
    pub avg_views: f64,
    pub avg_like_rate: f64,
    pub avg_comment_rate: f64,
    pub avg_engagement_rate: f64,
    pub difficulty_score: f64,
    pub used_format_filter: bool,
    pub format_type: FormatType,
}

impl CompetitorBenchmark {
    pub fn empty(format_type: FormatType) -> Self {
        Self {
            has_data: false,
            sample_size: 0,
            competitor_count: 0,
            avg_views: 0.0,
            avg_like_rate: 0.0,
            avg_comment_rate: 0.0,
            avg_engagement_rate: 0.0,
            difficulty_score: 55.0,
            used_format_filter: false,
            format_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorMetrics {
    pub score: f64,
    pub difficulty_score: f64,
    pub sample_size: usize,
    pub has_data: bool,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalBaseline {
    pub sample_size: usize,
    pub format_sample_size: usize,
    pub score: f64,
    pub confidence: String,
    pub insufficient_data: bool,
    pub summary: String,
    pub signals: Vec<String>,
}

impl HistoricalBaseline {
    pub fn empty() -> Self {
        Self {
            sample_size: 0,
            format_sample_size: 0,
            score: 0.0,
            confidence: "low".to_string(),
            insufficient_data: true,
            summary: "Historical baseline unavailable.".to_string(),
            signals: Vec::new(),
        }
    }

    pub fn ready(&self) -> bool {
        !self.insufficient_data
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedWeights {
    pub competitor_metrics: f64,
    pub platform_metrics: f64,
    pub historical_metrics: f64,
}

fn section_score_100(analysis: &AuditResult, needle: &str) -> Option<f64> {
    analysis
        .sections
        .iter()
        .find(|section| section.name.to_lowercase().contains(needle))
        .map(|section| clip100(section.score * 10.0))
}

/// Compose the platform score from the simulated analysis, detectors, and
/// any true retention/interaction signals the owner supplied.
pub fn build_platform_metrics(
    analysis: &AuditResult,
    detectors: &[DetectorResult],
    retention_points: &[RetentionPoint],
    optional_metrics: &OptionalMetrics,
) -> PlatformMetrics {
    let overall_100 = clip100(analysis.overall_score * 10.0);
    let hook_strength = section_score_100(analysis, "hook").unwrap_or(overall_100);
    let pacing_strength = section_score_100(analysis, "pacing")
        .or_else(|| section_score_100(analysis, "body"))
        .or_else(|| section_score_100(analysis, "content"))
        .unwrap_or(overall_100);

    let detector_weighted: f64 = detectors
        .iter()
        .map(|d| d.score * d.detector_key.weight())
        .sum();

    let mut coverage = MetricCoverage::default();
    let mut score = overall_100 * 0.35
        + detector_weighted * 0.40
        + hook_strength * 0.15
        + pacing_strength * 0.10;

    let mut mean_retention = None;
    let valid_retention: Vec<f64> = retention_points
        .iter()
        .filter(|point| point.retention >= 0.0)
        .map(|point| point.retention.clamp(0.0, 100.0))
        .collect();
    if !valid_retention.is_empty() {
        let mean = valid_retention.iter().sum::<f64>() / valid_retention.len() as f64;
        mean_retention = Some(round2(mean));
        score = score * 0.8 + mean * 0.2;
        coverage.retention_curve = "true".to_string();
    }

    let mut interaction_boost = 0.0;
    let shares = optional_metrics.shares.unwrap_or(0);
    let saves = optional_metrics.saves.unwrap_or(0);
    if optional_metrics.shares.is_some() || optional_metrics.saves.is_some() {
        let views = optional_metrics.views.unwrap_or(0).max(1) as f64;
        interaction_boost = (((shares + saves) as f64 / views) * 400.0).clamp(0.0, 6.0);
        score += interaction_boost;
        if optional_metrics.shares.is_some() {
            coverage.shares = "true".to_string();
        }
        if optional_metrics.saves.is_some() {
            coverage.saves = "true".to_string();
        }
    }

    let has_true_metrics = optional_metrics.views.is_some()
        || optional_metrics.shares.is_some()
        || optional_metrics.saves.is_some()
        || optional_metrics.avg_view_duration_s.is_some();

    PlatformMetrics {
        score: round1(clip100(score)),
        signals: PlatformSignals {
            overall_multimodal_score: round1(overall_100),
            detector_weighted_score: round1(detector_weighted),
            hook_strength: round1(hook_strength),
            pacing_strength: round1(pacing_strength),
            mean_retention,
            interaction_boost: round2(interaction_boost),
        },
        metric_coverage: coverage,
        true_metrics: has_true_metrics.then(|| optional_metrics.clone()),
        detector_rankings: rank_detectors(detectors),
    }
}

/// Sort detectors by (gap desc, weight desc) and annotate priority + lift.
pub fn rank_detectors(detectors: &[DetectorResult]) -> Vec<DetectorRanking> {
    let mut ordered: Vec<&DetectorResult> = detectors.iter().collect();
    ordered.sort_by(|a, b| {
        b.gap
            .partial_cmp(&a.gap)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.detector_key
                    .weight()
                    .partial_cmp(&a.detector_key.weight())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    ordered
        .into_iter()
        .enumerate()
        .map(|(idx, result)| {
            let priority = match idx {
                0 | 1 => "high",
                2 => "medium",
                _ => "low",
            };
            DetectorRanking {
                detector_key: result.detector_key,
                label: result.label.clone(),
                score: result.score,
                target_score: result.target_score,
                gap: result.gap,
                weight: result.detector_key.weight(),
                priority: priority.to_string(),
                estimated_lift_points: round1(result.gap * result.detector_key.weight() / 4.0),
                evidence: result.evidence.clone(),
                edits: result.edits.clone(),
            }
        })
        .collect()
}

/// Top 3 ranked detectors reshaped as prescriptive next actions.
pub fn build_next_actions(rankings: &[DetectorRanking]) -> Vec<NextAction> {
    rankings
        .iter()
        .take(3)
        .map(|ranking| NextAction {
            title: format!("Improve {}", ranking.label),
            detector_key: ranking.detector_key,
            priority: ranking.priority.clone(),
            why: ranking
                .evidence
                .first()
                .cloned()
                .unwrap_or_else(|| format!("{} is below target.", ranking.label)),
            expected_lift_points: ranking.estimated_lift_points,
            execution_steps: ranking.edits.clone(),
        })
        .collect()
}

/// A competitor video row used to build the benchmark.
#[derive(Debug, Clone)]
pub struct CompetitorVideoStats {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub saves: i64,
    pub duration_seconds: i64,
}

/// Aggregate competitor rows into a benchmark for the chosen format,
/// falling back to cross-format when the format slice is empty.
pub fn build_competitor_benchmark(
    rows: &[CompetitorVideoStats],
    competitor_count: usize,
    format_type: FormatType,
) -> CompetitorBenchmark {
    if rows.is_empty() {
        return CompetitorBenchmark::empty(format_type);
    }

    let format_rows: Vec<&CompetitorVideoStats> = rows
        .iter()
        .filter(|row| FormatType::from_duration(row.duration_seconds) == format_type)
        .collect();
    let (scoped, used_format_filter): (Vec<&CompetitorVideoStats>, bool) = if format_rows.is_empty()
    {
        (rows.iter().collect(), false)
    } else {
        (format_rows, true)
    };

    let count = scoped.len() as f64;
    let avg_views = scoped.iter().map(|row| row.views as f64).sum::<f64>() / count;
    let avg_like_rate = scoped
        .iter()
        .map(|row| row.likes as f64 / (row.views.max(1)) as f64)
        .sum::<f64>()
        / count;
    let avg_comment_rate = scoped
        .iter()
        .map(|row| row.comments as f64 / (row.views.max(1)) as f64)
        .sum::<f64>()
        / count;
    let avg_engagement_rate = scoped
        .iter()
        .map(|row| {
            (row.likes + row.comments + row.shares + row.saves) as f64 / (row.views.max(1)) as f64
        })
        .sum::<f64>()
        / count;

    // Higher competitor engagement means a harder pack to beat.
    let difficulty_score = (40.0 + avg_engagement_rate * 600.0 + (avg_views + 1.0).log10() * 2.0)
        .clamp(35.0, 90.0);

    CompetitorBenchmark {
        has_data: true,
        sample_size: scoped.len(),
        competitor_count,
        avg_views: round2(avg_views),
        avg_like_rate: round2(avg_like_rate * 10_000.0) / 10_000.0,
        avg_comment_rate: round2(avg_comment_rate * 10_000.0) / 10_000.0,
        avg_engagement_rate: round2(avg_engagement_rate * 10_000.0) / 10_000.0,
        difficulty_score: round1(difficulty_score),
        used_format_filter,
        format_type,
    }
}

/// How far this script sits above/below the competitor pack.
pub fn build_competitor_metrics(
    platform_score: f64,
    benchmark: &CompetitorBenchmark,
) -> CompetitorMetrics {
    if !benchmark.has_data {
        return CompetitorMetrics {
            score: 55.0,
            difficulty_score: benchmark.difficulty_score,
            sample_size: 0,
            has_data: false,
            summary: "No competitor data yet; benchmark defaults applied.".to_string(),
        };
    }

    let score = clip100(50.0 + (platform_score - benchmark.difficulty_score) * 0.6);
    let relation = if score >= 55.0 { "above" } else { "below" };
    CompetitorMetrics {
        score: round1(score),
        difficulty_score: benchmark.difficulty_score,
        sample_size: benchmark.sample_size,
        has_data: true,
        summary: format!(
            "Script projects {} the pack of {} competitor video(s).",
            relation, benchmark.sample_size
        ),
    }
}

/// Build the user's own rolling baseline from recent outcome scores.
pub fn build_historical_baseline(
    format_scores: &[f64],
    all_scores: &[f64],
) -> HistoricalBaseline {
    let (scores, format_sample_size) = if format_scores.len() >= 5 {
        (format_scores, format_scores.len())
    } else {
        (all_scores, format_scores.len())
    };
    let sample_size = scores.len();

    if sample_size < 5 {
        let mut baseline = HistoricalBaseline::empty();
        baseline.sample_size = sample_size;
        baseline.format_sample_size = format_sample_size;
        baseline.summary = format!(
            "Only {} posted outcome(s) captured; need 5 for a baseline.",
            sample_size
        );
        return baseline;
    }

    let mean = scores.iter().sum::<f64>() / sample_size as f64;
    let confidence = if sample_size >= 20 {
        "high"
    } else if sample_size >= 8 {
        "medium"
    } else {
        "low"
    };

    HistoricalBaseline {
        sample_size,
        format_sample_size,
        score: round1(clip100(mean)),
        confidence: confidence.to_string(),
        insufficient_data: false,
        summary: format!(
            "Rolling mean actual score over {} posted outcome(s).",
            sample_size
        ),
        signals: vec![format!("mean_actual_score={:.1}", mean)],
    }
}

/// Combined score: weights shift when no historical baseline is ready.
pub fn combined_score(
    competitor_score: f64,
    platform_score: f64,
    historical_score: f64,
    historical_ready: bool,
) -> (f64, CombinedWeights) {
    let weights = if historical_ready {
        CombinedWeights {
            competitor_metrics: 0.45,
            platform_metrics: 0.35,
            historical_metrics: 0.20,
        }
    } else {
        CombinedWeights {
            competitor_metrics: 0.55,
            platform_metrics: 0.45,
            historical_metrics: 0.0,
        }
    };

    let combined = competitor_score * weights.competitor_metrics
        + platform_score * weights.platform_metrics
        + historical_score * weights.historical_metrics;
    (clip100(combined), weights)
}

fn confidence_rank(label: &str) -> u8 {
    match label {
        "high" => 3,
        "medium" => 2,
        _ => 1,
    }
}

/// min(benchmark confidence, historical confidence), demoted to <= medium
/// when the historical baseline is not ready.
pub fn confidence_label(
    benchmark_samples: usize,
    historical_confidence: &str,
    historical_ready: bool,
) -> String {
    let benchmark_conf = if benchmark_samples >= 20 {
        "high"
    } else if benchmark_samples >= 8 {
        "medium"
    } else {
        "low"
    };
    let mut conf = confidence_rank(benchmark_conf).min(confidence_rank(historical_confidence));
    if !historical_ready {
        conf = conf.min(2);
    }
    match conf {
        3 => "high".to_string(),
        2 => "medium".to_string(),
        _ => "low".to_string(),
    }
}

/// detector_key -> score map from a persisted ranking payload.
pub fn detector_score_map(rankings: &[DetectorRanking]) -> HashMap<DetectorKey, f64> {
    rankings
        .iter()
        .map(|ranking| (ranking.detector_key, ranking.score))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditSection, DetectorKey};

    fn analysis() -> AuditResult {
        AuditResult {
            video_id: "test".into(),
            overall_score: 7.6,
            summary: String::new(),
            sections: vec![
                AuditSection {
                    name: "Hook".into(),
                    score: 8.4,
                    feedback: vec![],
                },
                AuditSection {
                    name: "Body/Pacing".into(),
                    score: 7.1,
                    feedback: vec![],
                },
            ],
            timestamp_feedback: vec![],
        }
    }

    fn detectors() -> Vec<DetectorResult> {
        DetectorKey::ALL
            .iter()
            .map(|key| DetectorResult {
                detector_key: *key,
                label: key.label().to_string(),
                score: 70.0,
                target_score: key.target_score(),
                gap: (key.target_score() - 70.0).max(0.0),
                count: None,
                evidence: vec!["evidence".into()],
                edits: vec!["edit".into()],
            })
            .collect()
    }

    #[test]
    fn true_retention_flips_coverage() {
        let retention = vec![
            RetentionPoint { time: 0.0, retention: 100.0 },
            RetentionPoint { time: 30.0, retention: 62.0 },
        ];
        let metrics = build_platform_metrics(
            &analysis(),
            &detectors(),
            &retention,
            &OptionalMetrics::default(),
        );
        assert_eq!(metrics.metric_coverage.retention_curve, "true");
        assert_eq!(metrics.metric_coverage.shares, "proxy");
        assert!(metrics.signals.mean_retention.is_some());
    }

    #[test]
    fn true_interactions_flip_coverage_and_boost() {
        let optional = OptionalMetrics {
            views: Some(50_000),
            shares: Some(280),
            saves: Some(520),
            ..Default::default()
        };
        let metrics = build_platform_metrics(&analysis(), &detectors(), &[], &optional);
        assert_eq!(metrics.metric_coverage.shares, "true");
        assert_eq!(metrics.metric_coverage.saves, "true");
        assert!(metrics.signals.interaction_boost > 0.0);
        assert!(metrics.true_metrics.is_some());
    }

    #[test]
    fn rankings_order_by_gap_then_weight() {
        let mut results = detectors();
        results[0].score = 40.0; // time_to_value, big gap
        results[0].gap = 45.0;
        let rankings = rank_detectors(&results);
        assert_eq!(rankings[0].detector_key, DetectorKey::TimeToValue);
        assert_eq!(rankings[0].priority, "high");
        assert_eq!(rankings[2].priority, "medium");
        assert_eq!(rankings[4].priority, "low");
    }

    #[test]
    fn combined_weights_switch_on_historical_readiness() {
        let (with_history, weights) = combined_score(60.0, 70.0, 80.0, true);
        assert!((weights.historical_metrics - 0.20).abs() < f64::EPSILON);
        assert!((with_history - (60.0 * 0.45 + 70.0 * 0.35 + 80.0 * 0.20)).abs() < 1e-9);

        let (without_history, weights) = combined_score(60.0, 70.0, 0.0, false);
        assert!((weights.historical_metrics - 0.0).abs() < f64::EPSILON);
        assert!((without_history - (60.0 * 0.55 + 70.0 * 0.45)).abs() < 1e-9);
    }

    #[test]
    fn empty_benchmark_synthesizes_55() {
        let benchmark = CompetitorBenchmark::empty(FormatType::ShortForm);
        let metrics = build_competitor_metrics(70.0, &benchmark);
        assert_eq!(metrics.score, 55.0);
        assert!(!metrics.has_data);
        assert_eq!(metrics.sample_size, 0);
    }

    #[test]
    fn historical_baseline_requires_five_samples() {
        let baseline = build_historical_baseline(&[70.0, 72.0], &[70.0, 72.0, 68.0]);
        assert!(baseline.insufficient_data);
        assert_eq!(baseline.confidence, "low");
        assert_eq!(baseline.score, 0.0);

        let scores: Vec<f64> = (0..10).map(|i| 60.0 + i as f64).collect();
        let baseline = build_historical_baseline(&scores, &scores);
        assert!(!baseline.insufficient_data);
        assert_eq!(baseline.confidence, "medium");
        assert!(baseline.score > 0.0);
    }

    #[test]
    fn confidence_demoted_without_history() {
        assert_eq!(confidence_label(25, "high", true), "high");
        assert_eq!(confidence_label(25, "high", false), "medium");
        assert_eq!(confidence_label(3, "high", true), "low");
    }
}
