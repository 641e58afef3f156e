//! Rescore-only builders: line-level edit plans and the improvement diff.

use std::collections::HashMap;

use crate::models::{
    CombinedDiff, DetectorDiff, DetectorKey, DetectorRanking, FormatType, ImprovementDiff,
    LineLevelEdit,
};

use super::transcript::{round1, split_lines, word_count};

/// Pick the offending line per detector and emit a rewrite suggestion.
/// Line selection: first line for time_to_value & cta_style is the hook /
/// tail respectively, longest line for dead_zones, second line for
/// open_loops, middle line for pattern_interrupts.
pub fn build_line_level_edits(
    script_text: &str,
    rankings: &[DetectorRanking],
    format_type: FormatType,
) -> Vec<LineLevelEdit> {
    let lines = split_lines(script_text);
    if lines.is_empty() {
        return Vec::new();
    }

    let last_idx = lines.len() - 1;
    let longest_idx = lines
        .iter()
        .enumerate()
        .max_by_key(|(_, line)| word_count(line))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let cadence_target = match format_type {
        FormatType::ShortForm | FormatType::Unknown => "every 6-10 seconds",
        FormatType::LongForm => "every 20-35 seconds",
    };

    rankings
        .iter()
        .take(5)
        .map(|ranking| {
            let reason = ranking.evidence.first().cloned().unwrap_or_default();
            let (line_number, original, suggestion) = match ranking.detector_key {
                DetectorKey::TimeToValue => {
                    let original = lines[0].clone();
                    let trimmed = original.trim_end_matches('.').to_lowercase();
                    (
                        1,
                        original,
                        format!(
                            "Within one line: the outcome is {} with proof in the same sentence.",
                            trimmed
                        ),
                    )
                }
                DetectorKey::OpenLoops => {
                    let line_no = 2.min(lines.len());
                    (
                        line_no,
                        lines[line_no - 1].clone(),
                        "Add a teaser: 'In a few seconds, I will show the exact before/after line that changed results.'"
                            .to_string(),
                    )
                }
                DetectorKey::DeadZones => (
                    longest_idx + 1,
                    lines[longest_idx].clone(),
                    "Split this into two shorter lines and attach one concrete visual cue for each line."
                        .to_string(),
                ),
                DetectorKey::PatternInterrupts => {
                    let line_no = (lines.len() / 2).max(2).min(lines.len());
                    (
                        line_no,
                        lines[line_no - 1].clone(),
                        format!(
                            "Insert a pattern interrupt here (caption shift, zoom, or cut) {}.",
                            cadence_target
                        ),
                    )
                }
                DetectorKey::CtaStyle => (
                    last_idx + 1,
                    lines[last_idx].clone(),
                    "Use one CTA only: 'Comment \"PLAN\" and I will send the exact framework.'"
                        .to_string(),
                ),
            };

            LineLevelEdit {
                detector_key: ranking.detector_key,
                detector_label: ranking.label.clone(),
                priority: ranking.priority.clone(),
                line_number,
                original_line: original,
                suggested_line: suggestion,
                reason,
            }
        })
        .collect()
}

/// Diff the rescored evaluation against the caller-supplied baseline.
pub fn build_improvement_diff(
    baseline_score: Option<f64>,
    baseline_detector_scores: &HashMap<DetectorKey, f64>,
    combined_score: f64,
    rankings: &[DetectorRanking],
) -> ImprovementDiff {
    let combined = CombinedDiff {
        before: baseline_score.map(round1),
        after: round1(combined_score),
        delta: baseline_score.map(|before| round1(combined_score - before)),
    };

    let detectors = rankings
        .iter()
        .map(|ranking| {
            let before = baseline_detector_scores.get(&ranking.detector_key).copied();
            DetectorDiff {
                detector_key: ranking.detector_key,
                before_score: before.map(round1),
                after_score: round1(ranking.score),
                delta: before.map(|b| round1(ranking.score - b)),
            }
        })
        .collect();

    ImprovementDiff {
        combined,
        detectors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rankings() -> Vec<DetectorRanking> {
        DetectorKey::ALL
            .iter()
            .enumerate()
            .map(|(idx, key)| DetectorRanking {
                detector_key: *key,
                label: key.label().to_string(),
                score: 60.0 + idx as f64,
                target_score: key.target_score(),
                gap: 10.0,
                weight: key.weight(),
                priority: "high".to_string(),
                estimated_lift_points: 1.0,
                evidence: vec!["reason".to_string()],
                edits: vec![],
            })
            .collect()
    }

    #[test]
    fn one_edit_per_top_detector_with_line_anchors() {
        let script = "Hook line here.\nSecond line.\nThis is by far the single longest line of the whole script text.\nFourth line.\nComment PLAN.";
        let edits = build_line_level_edits(script, &rankings(), FormatType::ShortForm);
        assert_eq!(edits.len(), 5);

        let by_key = |key: DetectorKey| edits.iter().find(|e| e.detector_key == key).unwrap();
        assert_eq!(by_key(DetectorKey::TimeToValue).line_number, 1);
        assert_eq!(by_key(DetectorKey::OpenLoops).line_number, 2);
        assert_eq!(by_key(DetectorKey::DeadZones).line_number, 3);
        assert_eq!(by_key(DetectorKey::CtaStyle).line_number, 5);
        assert!(by_key(DetectorKey::PatternInterrupts)
            .suggested_line
            .contains("every 6-10 seconds"));
    }

    #[test]
    fn improvement_diff_carries_signed_delta() {
        let mut baseline = HashMap::new();
        baseline.insert(DetectorKey::TimeToValue, 50.0);
        let diff = build_improvement_diff(Some(62.5), &baseline, 68.4, &rankings());

        assert_eq!(diff.combined.before, Some(62.5));
        assert_eq!(diff.combined.after, 68.4);
        assert_eq!(diff.combined.delta, Some(5.9));

        let ttv = diff
            .detectors
            .iter()
            .find(|d| d.detector_key == DetectorKey::TimeToValue)
            .unwrap();
        assert_eq!(ttv.before_score, Some(50.0));
        assert_eq!(ttv.delta, Some(10.0));

        let other = diff
            .detectors
            .iter()
            .find(|d| d.detector_key == DetectorKey::OpenLoops)
            .unwrap();
        assert!(other.before_score.is_none());
        assert!(other.delta.is_none());
    }

    #[test]
    fn no_baseline_means_no_before_fields() {
        let diff = build_improvement_diff(None, &HashMap::new(), 70.0, &rankings());
        assert!(diff.combined.before.is_none());
        assert!(diff.combined.delta.is_none());
        assert_eq!(diff.combined.after, 70.0);
    }
}
