//! Blueprint analytics and consolidated-report composition rules.

use chrono::{Duration, Utc};
use creator_analytics_backend::models::Platform;
use creator_analytics_backend::services::blueprint::{
    build_framework_playbook, build_hook_intelligence, build_repurpose_plan,
    build_winner_pattern_signals, detect_hook_pattern, fallback_blueprint, views_per_day,
    CompetitorVideo,
};
use creator_analytics_backend::services::report::{
    normalize_recommendations, resolve_report_platform, safe_score_100,
};
use serde_json::json;

fn video(channel: &str, title: &str, views: i64, duration: i64, days_old: i64) -> CompetitorVideo {
    CompetitorVideo {
        channel: channel.to_string(),
        title: title.to_string(),
        transcript: "I grew the channel, here is the proof, step one, step two, comment below"
            .to_string(),
        views,
        likes: views / 10,
        comment_count: views / 100,
        duration_seconds: duration,
        published_at: Some(Utc::now() - Duration::days(days_old)),
        transcript_source: "caption_fallback".to_string(),
    }
}

#[test]
fn views_per_day_uses_age_floor_of_one_day() {
    let now = Utc::now();
    let fresh = views_per_day(10_000, Some(now - Duration::hours(2)), now);
    assert!((fresh - 10_000.0).abs() < 1.0);
    let old = views_per_day(10_000, Some(now - Duration::days(10)), now);
    assert!((old - 1_000.0).abs() < 1.0);
    assert_eq!(views_per_day(500, None, now), 500.0);
}

#[test]
fn hook_patterns_rank_and_carry_templates() {
    let videos = vec![
        video("Alpha", "Why your hooks fail", 50_000, 45, 5),
        video("Alpha", "Why retention drops at 3s", 40_000, 50, 6),
        video("Beta", "Why nobody watches part 2", 30_000, 40, 7),
        video("Beta", "5 ways to fix your intro", 20_000, 400, 8),
    ];
    let intelligence = build_hook_intelligence(&videos);
    let patterns = intelligence["common_patterns"].as_array().unwrap();
    assert_eq!(patterns[0]["pattern"], "Question Hook");
    assert_eq!(patterns[0]["competitor_count"], 2);
    assert!(patterns[0]["template"].as_str().unwrap().contains("{"));

    // Per-format split: three shorts, one long-form.
    assert_eq!(intelligence["format_breakdown"]["short_form"]["video_count"], 3);
    assert_eq!(intelligence["format_breakdown"]["long_form"]["video_count"], 1);
}

#[test]
fn repurpose_plan_reads_top_pattern_topic_and_cta() {
    let videos = vec![
        video("Alpha", "Why your hooks fail", 50_000, 45, 2),
        video("Alpha", "Why pacing matters", 45_000, 45, 2),
    ];
    let hooks = build_hook_intelligence(&videos);
    let signals = build_winner_pattern_signals(&videos, Utc::now());
    let playbook = build_framework_playbook(&videos);
    let plan = build_repurpose_plan(&hooks, &signals, &playbook);

    assert_eq!(plan["youtube_shorts"]["duration_target_s"], 45);
    assert_eq!(plan["instagram_reels"]["duration_target_s"], 35);
    assert_eq!(plan["tiktok"]["duration_target_s"], 28);
    let core_angle = plan["core_angle"].as_str().unwrap();
    assert!(core_angle.contains("Question Hook"));
}

#[test]
fn fallback_blueprint_platform_is_embedded_for_cache_checks() {
    let payload = fallback_blueprint("reason text", Platform::Instagram);
    assert_eq!(payload["dataset_summary"]["platform"], "instagram");
    assert_eq!(payload["gap_analysis"][0], "reason text");
}

#[test]
fn overall_report_score_weights_stats_video_strategy() {
    // 0.3 * stats + 0.4 * video + 0.3 * strategy(80)
    let stats = safe_score_100(Some(6.0), 70.0); // -> 60
    let video = safe_score_100(Some(72.0), 70.0); // already /100
    let overall = stats * 0.3 + video * 0.4 + 80.0 * 0.3;
    assert!((overall - (18.0 + 28.8 + 24.0)).abs() < 1e-9);
}

#[test]
fn report_platform_falls_back_through_prediction_then_input() {
    assert_eq!(
        resolve_report_platform(Some(&json!({"platform": "instagram"})), None),
        Platform::Instagram
    );
    assert_eq!(
        resolve_report_platform(
            Some(&json!({"platform": "not_a_platform"})),
            Some(&json!({"platform": "tiktok"}))
        ),
        Platform::Tiktok
    );
    assert_eq!(resolve_report_platform(None, None), Platform::Youtube);
}

#[test]
fn recommendations_always_include_blueprint_pillar_nudge() {
    let recommendations = normalize_recommendations(&json!({}), &json!({}), None, None);
    assert!(recommendations
        .iter()
        .any(|rec| rec.contains("Competitor Blueprint")));
    assert!(recommendations.len() <= 8);
}

#[test]
fn hook_detection_prefers_specific_patterns() {
    assert_eq!(detect_hook_pattern("How to edit faster"), "How-To Hook");
    assert_eq!(detect_hook_pattern("Is this the end of shorts?"), "Question Hook");
    assert_eq!(
        detect_hook_pattern("I tried posting 3x daily for 30 days"),
        "Challenge/Experiment Hook"
    );
}
