//! Explicit detector extraction over synthetic transcripts.

use creator_analytics_backend::models::{AuditSection, DetectorKey};
use creator_analytics_backend::services::optimizer::detectors::extract_detectors;
use creator_analytics_backend::services::optimizer::scoring::{
    build_platform_metrics, OptionalMetrics,
};
use creator_analytics_backend::services::optimizer::transcript::{
    SyntheticTranscript, TranscriptSegment,
};

fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
    TranscriptSegment {
        start,
        end,
        text: text.to_string(),
    }
}

#[test]
fn detectors_extract_standalone_signals() {
    let transcript = SyntheticTranscript {
        text: "I grew from zero to 100k. In a second I will show the proof. Here are the 3 steps. Stick around and comment if you want part 2."
            .to_string(),
        segments: vec![
            segment(0.0, 2.0, "I grew from zero to 100k."),
            segment(2.1, 5.0, "In a second I will show the proof."),
            segment(5.2, 8.4, "Here are the 3 steps."),
            segment(18.0, 24.0, "Comment if you want part 2."),
        ],
    };

    let detectors = extract_detectors(&transcript, 30);
    assert_eq!(detectors.len(), 5);

    let by_key = |key: DetectorKey| detectors.iter().find(|d| d.detector_key == key).unwrap();
    // Value lands in the very first segment.
    assert!(by_key(DetectorKey::TimeToValue).score >= 90.0);
    // Two teaser phrases in the body.
    assert!(by_key(DetectorKey::OpenLoops).count.unwrap() >= 1);
    // The 8.4 -> 18.0 silence is a dead zone.
    assert!(by_key(DetectorKey::DeadZones).count.unwrap() >= 1);
    assert!(by_key(DetectorKey::PatternInterrupts).count.unwrap() >= 1);
    // Single comment CTA at the tail.
    assert!(by_key(DetectorKey::CtaStyle).score >= 80.0);
}

#[test]
fn every_detector_reports_target_gap_and_evidence() {
    let transcript = SyntheticTranscript {
        text: "Plain opener. Plain middle. Plain ending.".to_string(),
        segments: vec![
            segment(0.0, 10.0, "Plain opener."),
            segment(10.0, 20.0, "Plain middle."),
            segment(20.0, 30.0, "Plain ending."),
        ],
    };
    for detector in extract_detectors(&transcript, 30) {
        assert!((0.0..=100.0).contains(&detector.score));
        assert!(detector.target_score >= 75.0);
        assert!(detector.gap >= 0.0);
        assert!(!detector.evidence.is_empty());
        assert!(!detector.edits.is_empty());
        match detector.detector_key {
            DetectorKey::OpenLoops => assert_eq!(detector.target_score, 75.0),
            DetectorKey::PatternInterrupts => assert_eq!(detector.target_score, 78.0),
            _ => assert_eq!(detector.target_score, 85.0),
        }
    }
}

#[test]
fn platform_metrics_use_true_retention_and_interaction_inputs() {
    let analysis = creator_analytics_backend::models::AuditResult {
        video_id: "test".to_string(),
        overall_score: 7.6,
        summary: String::new(),
        sections: vec![
            AuditSection {
                name: "Hook".to_string(),
                score: 8.4,
                feedback: vec![],
            },
            AuditSection {
                name: "Content".to_string(),
                score: 7.1,
                feedback: vec![],
            },
        ],
        timestamp_feedback: vec![],
    };
    let transcript = SyntheticTranscript {
        text: "I grew fast. Proof here. Comment below.".to_string(),
        segments: vec![
            segment(0.0, 10.0, "I grew fast."),
            segment(10.0, 20.0, "Proof here."),
            segment(20.0, 30.0, "Comment below."),
        ],
    };
    let detectors = extract_detectors(&transcript, 60);
    let retention = vec![
        creator_analytics_backend::models::RetentionPoint { time: 0.0, retention: 100.0 },
        creator_analytics_backend::models::RetentionPoint { time: 3.0, retention: 88.0 },
        creator_analytics_backend::models::RetentionPoint { time: 30.0, retention: 62.0 },
        creator_analytics_backend::models::RetentionPoint { time: 60.0, retention: 48.0 },
    ];
    let optional = OptionalMetrics {
        views: Some(50_000),
        likes: Some(2_400),
        comments: Some(310),
        shares: Some(280),
        saves: Some(520),
        ..Default::default()
    };

    let metrics = build_platform_metrics(&analysis, &detectors, &retention, &optional);
    assert_eq!(metrics.metric_coverage.shares, "true");
    assert_eq!(metrics.metric_coverage.saves, "true");
    assert_eq!(metrics.metric_coverage.retention_curve, "true");
    assert!(metrics.true_metrics.is_some());
    assert!(metrics.score > 0.0);
}
