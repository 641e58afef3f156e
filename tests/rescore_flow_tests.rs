//! Rescore flow over the pure builders: line edits + improvement diff.

use std::collections::HashMap;

use creator_analytics_backend::models::{DetectorKey, FormatType, Platform};
use creator_analytics_backend::services::optimizer::rescore::{
    build_improvement_diff, build_line_level_edits,
};
use creator_analytics_backend::services::optimizer::scoring::{
    CompetitorBenchmark, HistoricalBaseline, OptionalMetrics,
};
use creator_analytics_backend::services::optimizer::{evaluate_script, transcript::split_lines};

const SCRIPT: &str = "I tested 3 retention hooks and grew 40% in a month.\nIn a second I will show the exact line that did it.\nHere is the full breakdown of the before and after versions with every change explained in detail.\nStep 2: cut the slow intro entirely.\nComment PLAN and I will send the template.";

fn evaluate(script: &str) -> creator_analytics_backend::services::optimizer::ScriptEvaluation {
    evaluate_script(
        script,
        Platform::Youtube,
        45,
        &[],
        &OptionalMetrics::default(),
        &CompetitorBenchmark::empty(FormatType::ShortForm),
        HistoricalBaseline::empty(),
    )
}

#[test]
fn line_edits_cover_top_five_detectors_with_anchored_lines() {
    let evaluation = evaluate(SCRIPT);
    let rankings = &evaluation.platform_metrics.detector_rankings;
    let edits = build_line_level_edits(SCRIPT, rankings, FormatType::ShortForm);

    assert_eq!(edits.len(), 5);
    let lines = split_lines(SCRIPT);
    for edit in &edits {
        assert!(edit.line_number >= 1 && edit.line_number <= lines.len());
        assert_eq!(edit.original_line, lines[edit.line_number - 1]);
        assert!(!edit.suggested_line.is_empty());
    }

    let anchor = |key: DetectorKey| edits.iter().find(|e| e.detector_key == key).unwrap();
    assert_eq!(anchor(DetectorKey::TimeToValue).line_number, 1);
    assert_eq!(anchor(DetectorKey::OpenLoops).line_number, 2);
    // The breakdown line is the longest.
    assert_eq!(anchor(DetectorKey::DeadZones).line_number, 3);
    assert_eq!(anchor(DetectorKey::CtaStyle).line_number, lines.len());
}

#[test]
fn improvement_diff_delta_is_signed_against_baseline() {
    let evaluation = evaluate(SCRIPT);
    let rankings = evaluation.platform_metrics.detector_rankings.clone();

    let baseline_score = evaluation.combined_score + 5.0;
    let mut baseline_detectors = HashMap::new();
    for ranking in &rankings {
        baseline_detectors.insert(ranking.detector_key, ranking.score - 3.0);
    }

    let diff = build_improvement_diff(
        Some(baseline_score),
        &baseline_detectors,
        evaluation.combined_score,
        &rankings,
    );

    assert_eq!(diff.combined.before, Some((baseline_score * 10.0).round() / 10.0));
    // Rescoring the same script against a higher baseline yields a
    // negative signed delta.
    assert!(diff.combined.delta.unwrap() < 0.0);
    for detector in &diff.detectors {
        assert_eq!(detector.delta, Some(3.0));
    }
}

#[test]
fn rescored_script_with_cta_beats_script_without() {
    let without_cta = "A quiet opener about a topic.\nSome middle content that runs along.\nAn ending with no ask at all.";
    let with_cta = "I tested 3 hooks and grew 40%.\nHere is the proof and the steps.\nComment PLAN and I will send it.";

    let weak = evaluate(without_cta);
    let strong = evaluate(with_cta);
    assert!(strong.combined_score > weak.combined_score);
    assert!(
        strong.platform_metrics.signals.detector_weighted_score
            > weak.platform_metrics.signals.detector_weighted_score
    );
}

#[test]
fn short_scripts_are_rejected_upstream_by_length_rule() {
    // The 20-char minimum is enforced before evaluation; mirror the rule.
    let too_short = "tiny script";
    assert!(too_short.len() < creator_analytics_backend::services::optimizer::MIN_SCRIPT_CHARS);
}
