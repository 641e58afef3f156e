//! Trending projection and discovery matching behavior.

use chrono::{DateTime, Duration, Utc};
use creator_analytics_backend::models::{
    DiscoveryMode, ItemMetrics, ResearchItem, SortDirection, Timeframe,
};
use creator_analytics_backend::services::feed::discovery::{
    engagement_rate, mode_match, paginate, project_item, recency_decay, sort_rows, trending_score,
    views_per_hour,
};

fn item(
    id: &str,
    platform: &str,
    views: i64,
    published_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ResearchItem {
    ResearchItem {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        collection_id: None,
        platform: platform.to_string(),
        source_type: "manual_url".to_string(),
        url: Some(format!("https://{platform}.com/watch/{id}")),
        external_id: Some(id.to_string()),
        creator_handle: Some("@studiomax".to_string()),
        creator_display_name: Some("Studio Max".to_string()),
        title: Some("How we grew with #ShortFormHooks".to_string()),
        caption: Some("Breakdown of the #shortformhooks system".to_string()),
        metrics_json: serde_json::json!({
            "views": views,
            "likes": views / 20,
            "comments": views / 150,
            "shares": views / 300,
            "saves": views / 250,
        }),
        media_meta_json: serde_json::json!({"audio_title": "trending sound alpha"}),
        published_at,
        created_at: published_at.unwrap_or(now),
    }
}

#[test]
fn trending_score_is_deterministic_and_recency_sensitive() {
    let now = Utc::now();
    let newer = item("vid-a", "instagram", 47_000, Some(now - Duration::hours(3)), now);
    let older = item("vid-b", "instagram", 47_000, Some(now - Duration::hours(72)), now);

    let newer_payload = project_item(&newer, now);
    let older_payload = project_item(&older, now);

    // Two items identical except published_at: the newer one strictly wins.
    assert!(newer_payload.trending_score > older_payload.trending_score);

    // Re-projection at the same instant is byte-for-byte stable.
    let again = project_item(&newer, now);
    assert_eq!(newer_payload.trending_score, again.trending_score);
    assert_eq!(newer_payload.views_per_hour, again.views_per_hour);
}

#[test]
fn items_without_view_signal_ride_on_recency_alone() {
    let now = Utc::now();
    let quiet = item("vid-q", "tiktok", 0, Some(now - Duration::minutes(30)), now);
    let payload = project_item(&quiet, now);

    assert_eq!(payload.engagement_rate, 0.0);
    assert_eq!(payload.views_per_hour, 0.0);
    // recency weight is 0.20 -> at most 20 points, and a fresh item is
    // close to that ceiling.
    assert!(payload.trending_score <= 20.0);
    assert!(payload.trending_score >= 19.0);
}

#[test]
fn trending_components_clamp_to_unit_signals() {
    let now = Utc::now();
    let metrics = ItemMetrics {
        views: 10_000_000,
        likes: 9_000_000,
        comments: 1_000_000,
        shares: 5_000_000,
        saves: 5_000_000,
    };
    let reference = now - Duration::minutes(5);
    let rate = engagement_rate(&metrics);
    let velocity = views_per_hour(metrics.views, reference, now);
    let score = trending_score(&metrics, velocity, rate, reference, now);
    assert!(score <= 100.0);
    assert!(recency_decay(reference, now) <= 1.0);
}

#[test]
fn discovery_modes_match_their_fields() {
    let now = Utc::now();
    let row = item("vid-a", "instagram", 5_000, Some(now - Duration::hours(4)), now);

    assert!(mode_match(&row, DiscoveryMode::Profile, "studiomax"));
    assert!(!mode_match(&row, DiscoveryMode::Profile, "otherchannel"));

    // Hashtags are normalized case-insensitively with or without '#'.
    assert!(mode_match(&row, DiscoveryMode::Hashtag, "#shortformhooks"));
    assert!(mode_match(&row, DiscoveryMode::Hashtag, "SHORTFORMHOOKS"));

    assert!(mode_match(&row, DiscoveryMode::Audio, "trending sound"));
    assert!(mode_match(&row, DiscoveryMode::Keyword, "breakdown"));
    assert!(!mode_match(&row, DiscoveryMode::Keyword, "unrelated phrase"));
}

#[test]
fn sorting_is_stable_and_direction_aware() {
    let now = Utc::now();
    let mut rows = vec![
        project_item(&item("id-c", "youtube", 300, Some(now - Duration::hours(2)), now), now),
        project_item(&item("id-a", "youtube", 100, Some(now - Duration::hours(2)), now), now),
        project_item(&item("id-b", "youtube", 100, Some(now - Duration::hours(2)), now), now),
    ];

    sort_rows(&mut rows, "views", SortDirection::Desc);
    assert_eq!(rows[0].item_id, "id-c");
    // Equal views tie-break alphabetically by item id.
    assert_eq!(rows[1].item_id, "id-a");
    assert_eq!(rows[2].item_id, "id-b");

    sort_rows(&mut rows, "views", SortDirection::Asc);
    assert_eq!(rows[0].item_id, "id-a");
    assert_eq!(rows[2].item_id, "id-c");

    // Unknown keys fall back to trending score without panicking.
    sort_rows(&mut rows, "not_a_key", SortDirection::Desc);
}

#[test]
fn pagination_reports_has_more() {
    let now = Utc::now();
    let rows: Vec<_> = (0..45)
        .map(|i| {
            project_item(
                &item(&format!("id-{i:02}"), "youtube", 100 + i, Some(now - Duration::hours(1)), now),
                now,
            )
        })
        .collect();

    let first = paginate(rows.clone(), Some(1), Some(20));
    assert_eq!(first.items.len(), 20);
    assert!(first.has_more);
    assert_eq!(first.total_count, 45);

    let last = paginate(rows.clone(), Some(3), Some(20));
    assert_eq!(last.items.len(), 5);
    assert!(!last.has_more);

    let beyond = paginate(rows, Some(10), Some(20));
    assert!(beyond.items.is_empty());
}

#[test]
fn timeframe_all_keeps_everything() {
    let now = Utc::now();
    assert!(Timeframe::All.cutoff(now).is_none());
    let cutoff = Timeframe::Day.cutoff(now).unwrap();
    assert!(now - cutoff <= Duration::days(1) + Duration::seconds(1));
}
