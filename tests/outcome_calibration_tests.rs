//! Outcome ingestion math and calibration snapshot behavior.

use chrono::{Duration, Utc};
use creator_analytics_backend::models::{Platform, RetentionPoint};
use creator_analytics_backend::services::outcomes::{
    compute_actual_score, confidence_bucket, drift_actions, snapshot_recommendations,
    trend_from_deltas, windowed_drift,
};

#[test]
fn actual_score_for_the_reference_post() {
    // Seeded from the optimizer + outcome flow: 12k views, strong saves.
    let metrics = serde_json::json!({
        "views": 12_000,
        "likes": 800,
        "comments": 90,
        "shares": 45,
        "saves": 38,
        "avg_view_duration_s": 28,
    });
    let actual = compute_actual_score(&metrics, &[]);

    let reach: f64 = (12_001.0f64.log10() * 7.5).min(30.0);
    let weighted = 800.0 + 90.0 * 2.0 + 45.0 * 3.0 + 38.0 * 3.0;
    let engagement = (weighted / 12_000.0 * 900.0f64).min(42.0);
    let watch = (28.0f64 / 3.5).min(18.0);
    let expected = (((reach + engagement + watch).clamp(0.0, 100.0)) * 10.0).round() / 10.0;

    assert!((actual - expected).abs() < 1e-9);

    // The calibration delta against a predicted 70 is the rounded signed
    // difference.
    let predicted = 70.0;
    let delta = ((actual - predicted) * 100.0).round() / 100.0;
    assert!((delta - (actual - predicted)).abs() < 0.005);
}

#[test]
fn component_caps_hold() {
    // Reach saturates at 30 even for enormous view counts.
    let metrics = serde_json::json!({"views": 10_000_000_000i64});
    let score = compute_actual_score(&metrics, &[]);
    assert!(score <= 30.0 + 1e-9);

    // Engagement saturates at 42.
    let metrics = serde_json::json!({"views": 100, "likes": 100_000});
    let score = compute_actual_score(&metrics, &[]);
    assert!(score <= 30.0 + 42.0 + 1e-9);

    // Retention contributes at most 10.
    let retention: Vec<RetentionPoint> = (0..10)
        .map(|i| RetentionPoint {
            time: i as f64,
            retention: 100.0,
        })
        .collect();
    let base = compute_actual_score(&serde_json::json!({"views": 1000}), &[]);
    let with_retention = compute_actual_score(&serde_json::json!({"views": 1000}), &retention);
    assert!(with_retention - base <= 10.0 + 1e-9);
}

#[test]
fn negative_retention_points_are_ignored() {
    let clean = compute_actual_score(
        &serde_json::json!({"views": 1000}),
        &[RetentionPoint {
            time: 0.0,
            retention: 50.0,
        }],
    );
    let with_noise = compute_actual_score(
        &serde_json::json!({"views": 1000}),
        &[
            RetentionPoint {
                time: 0.0,
                retention: 50.0,
            },
            RetentionPoint {
                time: 1.0,
                retention: -10.0,
            },
        ],
    );
    assert_eq!(clean, with_noise);
}

#[test]
fn trend_splits_newer_vs_older_half() {
    // Newer half first (most-recent ordering).
    assert_eq!(trend_from_deltas(&[1.0, 1.0, 9.0, 9.0]), "improving");
    assert_eq!(trend_from_deltas(&[9.0, 9.0, 1.0, 1.0]), "drifting");
    assert_eq!(trend_from_deltas(&[4.0, 4.0, 5.0, 5.0]), "flat");
    assert_eq!(trend_from_deltas(&[1.0, 9.0]), "flat");
}

#[test]
fn snapshot_confidence_thresholds() {
    assert_eq!(confidence_bucket(20, 10.0), "high");
    assert_eq!(confidence_bucket(20, 10.1), "medium");
    assert_eq!(confidence_bucket(19, 5.0), "medium");
    assert_eq!(confidence_bucket(8, 16.0), "medium");
    assert_eq!(confidence_bucket(8, 16.1), "low");
    assert_eq!(confidence_bucket(7, 1.0), "low");
}

#[test]
fn drift_windows_classify_bias() {
    let now = Utc::now();
    let rows: Vec<(chrono::DateTime<Utc>, Option<f64>)> = vec![
        (now - Duration::days(1), Some(5.0)),
        (now - Duration::days(3), Some(3.0)),
        (now - Duration::days(10), Some(-6.0)),
        (now - Duration::days(12), Some(-4.0)),
        (now - Duration::days(40), Some(20.0)),
    ];

    let d7 = windowed_drift(&rows, 7, now);
    assert_eq!(d7.count, 2);
    assert_eq!(d7.bias, "underpredicting");

    let d30 = windowed_drift(&rows, 30, now);
    assert_eq!(d30.count, 4);
    assert_eq!(d30.bias, "neutral");

    let empty = windowed_drift(&[], 7, now);
    assert_eq!(empty.count, 0);
    assert_eq!(empty.bias, "neutral");
    assert_eq!(empty.mean_abs_error, 0.0);
}

#[test]
fn drift_actions_mention_divergent_windows() {
    let now = Utc::now();
    let rows_7: Vec<(chrono::DateTime<Utc>, Option<f64>)> =
        vec![(now - Duration::days(1), Some(6.0)), (now - Duration::days(2), Some(4.0))];
    let rows_30: Vec<(chrono::DateTime<Utc>, Option<f64>)> = vec![
        (now - Duration::days(1), Some(6.0)),
        (now - Duration::days(2), Some(4.0)),
        (now - Duration::days(20), Some(-20.0)),
        (now - Duration::days(25), Some(-20.0)),
    ];
    let d7 = windowed_drift(&rows_7, 7, now);
    let d30 = windowed_drift(&rows_30, 30, now);
    assert_ne!(d7.bias, d30.bias);

    let actions = drift_actions(Platform::Instagram, 10, 12.0, &d7, &d30);
    assert!(actions.iter().any(|action| action.contains("7d vs 30d")));
    assert!(actions.len() <= 4);
}

#[test]
fn recommendations_scale_with_sample_and_error() {
    let sparse = snapshot_recommendations(2, 20.0, "flat");
    assert!(sparse.iter().any(|note| note.contains("at least 5")));
    assert!(sparse.iter().any(|note| note.contains("error is high")));

    let healthy = snapshot_recommendations(40, 5.0, "improving");
    assert!(healthy.iter().any(|note| note.contains("healthy")));
    assert!(healthy.iter().any(|note| note.contains("improving")));
    assert!(healthy.len() <= 4);
}
