//! Competitor blueprint generation and its signature-keyed TTL cache.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use sha1::{Digest, Sha1};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::Result;
use crate::models::{BlueprintSnapshot, Competitor, FormatType, Platform, ResearchItem, SHORT_FORM_MAX_SECONDS};
use crate::services::multimodal::LlmClient;
use crate::services::youtube::YouTubeClient;

/// One competitor video row feeding the blueprint analytics.
#[derive(Debug, Clone)]
pub struct CompetitorVideo {
    pub channel: String,
    pub title: String,
    pub transcript: String,
    pub views: i64,
    pub likes: i64,
    pub comment_count: i64,
    pub duration_seconds: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub transcript_source: String,
}

pub fn views_per_day(views: i64, published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match published_at {
        Some(published) => {
            let age_days = ((now - published).num_seconds() as f64 / 86_400.0).max(1.0);
            views as f64 / age_days
        }
        None => views as f64,
    }
}

/// Classify a title into one of the eight hook patterns.
pub fn detect_hook_pattern(title: &str) -> &'static str {
    let lower = title.trim().to_lowercase();
    if lower.is_empty() {
        return "Direct Outcome Hook";
    }
    if title.contains('?')
        || ["why ", "how ", "what ", "can ", "should ", "is ", "are ", "will "]
            .iter()
            .any(|prefix| lower.starts_with(prefix))
    {
        // "how to" titles rank as their own pattern below
        if lower.starts_with("how to ") {
            return "How-To Hook";
        }
        return "Question Hook";
    }
    if lower.chars().any(|ch| ch.is_ascii_digit()) {
        if ["i tried", "we tried", "challenge", "experiment"]
            .iter()
            .any(|token| lower.contains(token))
        {
            return "Challenge/Experiment Hook";
        }
        return "Numbered Promise";
    }
    if ["vs", "versus", "compare", "comparison"]
        .iter()
        .any(|token| lower.split_whitespace().any(|word| word == *token) || lower.contains(token))
    {
        return "Comparison Hook";
    }
    if ["mistake", "warning", "avoid", "stop doing", "wrong"]
        .iter()
        .any(|token| lower.contains(token))
    {
        return "Mistake/Warning Hook";
    }
    if ["secret", "truth", "nobody tells", "no one tells"]
        .iter()
        .any(|token| lower.contains(token))
    {
        return "Secret Reveal Hook";
    }
    if ["i tried", "we tried", "challenge", "experiment"]
        .iter()
        .any(|token| lower.contains(token))
    {
        return "Challenge/Experiment Hook";
    }
    if lower.starts_with("how to ") {
        return "How-To Hook";
    }
    "Direct Outcome Hook"
}

pub fn template_for_pattern(pattern: &str) -> &'static str {
    match pattern {
        "Question Hook" => "Why {pain_point} is hurting your growth (and what to do instead)",
        "Numbered Promise" => "{number} ways to get {result} faster in {timeframe}",
        "Comparison Hook" => "{option_a} vs {option_b}: which is better for {audience} in {year}",
        "Mistake/Warning Hook" => "Stop making this {topic} mistake before it kills your {result}",
        "Secret Reveal Hook" => "The {topic} secret most creators miss (but top channels use)",
        "Challenge/Experiment Hook" => "I tried {tactic} for {duration} - here is what happened",
        "How-To Hook" => "How to {outcome} without {common_obstacle}",
        _ => "How I got {outcome} by changing just one thing",
    }
}

fn extract_cta_style(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if ["comment", "what do you think", "tell me"]
        .iter()
        .any(|token| lower.contains(token))
    {
        "comment_prompt"
    } else if ["share", "send this", "repost"].iter().any(|token| lower.contains(token)) {
        "share_prompt"
    } else if ["save", "bookmark"].iter().any(|token| lower.contains(token)) {
        "save_prompt"
    } else if ["subscribe", "follow"].iter().any(|token| lower.contains(token)) {
        "follow_prompt"
    } else if ["link in bio", "link below", "description"]
        .iter()
        .any(|token| lower.contains(token))
    {
        "link_prompt"
    } else {
        "none"
    }
}

#[derive(Debug, Clone)]
pub struct FrameworkSignals {
    pub authority_hook: bool,
    pub fast_proof: bool,
    pub framework_steps: bool,
    pub open_loop: bool,
    pub cta_style: &'static str,
}

pub fn derive_framework_signals(title: &str, transcript: &str) -> FrameworkSignals {
    let body = format!("{}\n{}", title, transcript).to_lowercase();
    let authority_hook = title.chars().any(|ch| ch.is_ascii_digit())
        || ["i grew", "we grew", "i scaled", "we scaled", "i gained", "i tested", "we tested", "i hit", "we hit"]
            .iter()
            .any(|token| body.contains(token));
    let fast_proof = ["proof", "result", "receipts", "screenshot", "data"]
        .iter()
        .any(|token| body.contains(token));
    let framework_steps = ["first", "second", "third", "step", "framework", "formula"]
        .iter()
        .any(|token| body.contains(token));
    let open_loop = ["coming up", "in a second", "by the end", "later in this video"]
        .iter()
        .any(|token| body.contains(token));
    FrameworkSignals {
        authority_hook,
        fast_proof,
        framework_steps,
        open_loop,
        cta_style: extract_cta_style(&body),
    }
}

pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() < 2 || xs.len() != ys.len() {
        return 0.0;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let cov: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let var_x: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let var_y: f64 = ys.iter().map(|y| (y - mean_y).powi(2)).sum();
    if var_x <= 0.0 || var_y <= 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn topic_keywords(text: &str) -> Vec<String> {
    super::feed::discovery::extract_topic_keywords(text, 64)
}

/// Topic velocity ranking + hook-velocity correlation + top videos.
pub fn build_winner_pattern_signals(videos: &[CompetitorVideo], now: DateTime<Utc>) -> Value {
    if videos.is_empty() {
        return json!({
            "summary": "Not enough competitor videos to build velocity playbook.",
            "sample_size": 0,
            "top_topics_by_velocity": [],
            "hook_velocity_correlation": 0.0,
            "top_videos_by_velocity": [],
        });
    }

    let mut topic_stats: HashMap<String, (usize, f64)> = HashMap::new();
    let mut hook_scores = Vec::with_capacity(videos.len());
    let mut velocity_scores = Vec::with_capacity(videos.len());
    let mut ranked_videos = Vec::with_capacity(videos.len());

    for video in videos {
        let velocity = views_per_day(video.views, video.published_at, now);
        let pattern = detect_hook_pattern(&video.title);
        let hook_score = match pattern {
            "Question Hook" | "How-To Hook" => 2.0,
            "Numbered Promise" | "Challenge/Experiment Hook" => 1.6,
            _ => 1.0,
        };
        hook_scores.push(hook_score);
        velocity_scores.push(velocity);
        ranked_videos.push(json!({
            "channel": &video.channel,
            "title": &video.title,
            "views": video.views,
            "views_per_day": round2(velocity),
            "hook_pattern": pattern,
        }));

        for keyword in topic_keywords(&format!("{} {}", video.title, video.transcript)) {
            let entry = topic_stats.entry(keyword).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += velocity;
        }
    }

    let mut top_topics: Vec<Value> = topic_stats
        .into_iter()
        .map(|(topic, (count, velocity_sum))| {
            json!({
                "topic": topic,
                "count": count,
                "avg_views_per_day": round2(velocity_sum / count.max(1) as f64),
            })
        })
        .collect();
    top_topics.sort_by(|a, b| {
        let key = |row: &Value| {
            (
                row["avg_views_per_day"].as_f64().unwrap_or(0.0),
                row["count"].as_u64().unwrap_or(0),
            )
        };
        key(b)
            .partial_cmp(&key(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    top_topics.truncate(5);

    ranked_videos.sort_by(|a, b| {
        b["views_per_day"]
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&a["views_per_day"].as_f64().unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked_videos.truncate(5);

    json!({
        "summary": "Velocity playbook built from competitor views/day and hook style correlation.",
        "sample_size": videos.len(),
        "top_topics_by_velocity": top_topics,
        "hook_velocity_correlation": round3(pearson_correlation(&hook_scores, &velocity_scores)),
        "top_videos_by_velocity": ranked_videos,
    })
}

/// Stage adoption + CTA distribution across the competitor set.
pub fn build_framework_playbook(videos: &[CompetitorVideo]) -> Value {
    if videos.is_empty() {
        return json!({
            "summary": "No competitor framework data yet.",
            "stage_adoption": {},
            "cta_distribution": {},
            "dominant_sequence": [],
            "execution_notes": [],
        });
    }

    let mut totals = [0usize; 4];
    let mut cta_distribution: HashMap<&'static str, usize> = HashMap::new();
    for video in videos {
        let signals = derive_framework_signals(&video.title, &video.transcript);
        if signals.authority_hook {
            totals[0] += 1;
        }
        if signals.fast_proof {
            totals[1] += 1;
        }
        if signals.framework_steps {
            totals[2] += 1;
        }
        if signals.open_loop {
            totals[3] += 1;
        }
        *cta_distribution.entry(signals.cta_style).or_default() += 1;
    }

    let sample = videos.len().max(1) as f64;
    let mut cta_sorted: Vec<(&str, usize)> = cta_distribution.into_iter().collect();
    cta_sorted.sort_by(|a, b| b.1.cmp(&a.1));

    json!({
        "summary": "Transcript-first framework extraction across competitor winners.",
        "stage_adoption": {
            "authority_hook": round3(totals[0] as f64 / sample),
            "fast_proof": round3(totals[1] as f64 / sample),
            "framework_steps": round3(totals[2] as f64 / sample),
            "open_loop": round3(totals[3] as f64 / sample),
        },
        "cta_distribution": cta_sorted.into_iter().collect::<HashMap<_, _>>(),
        "dominant_sequence": ["authority_hook", "fast_proof", "framework_steps", "cta"],
        "execution_notes": [
            "Lead with authority/result claim in first line.",
            "Deliver proof quickly before deep explanation.",
            "Use explicit step framework and finish with one CTA style.",
        ],
    })
}

fn hook_profile_for(videos: &[&CompetitorVideo], format_key: &str) -> Value {
    let label = if format_key == "short_form" {
        format!("Short-form (<= {}s)", SHORT_FORM_MAX_SECONDS)
    } else {
        format!("Long-form (> {}s)", SHORT_FORM_MAX_SECONDS)
    };
    if videos.is_empty() {
        let summary = format!(
            "Not enough {} competitor videos for reliable hook extraction.",
            label.to_lowercase()
        );
        return json!({
            "format": format_key,
            "label": label,
            "video_count": 0,
            "summary": summary,
            "common_patterns": [],
            "recommended_hooks": [],
            "competitor_examples": [],
        });
    }

    let (common_patterns, recommended_hooks, competitor_examples) = hook_pattern_payload(videos);
    if common_patterns.is_empty() {
        let summary = format!(
            "{} videos exist, but titles were too sparse for hook extraction.",
            label
        );
        return json!({
            "format": format_key,
            "label": label,
            "video_count": videos.len(),
            "summary": summary,
            "common_patterns": [],
            "recommended_hooks": [],
            "competitor_examples": [],
        });
    }
    let top_pattern = common_patterns[0]["pattern"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let summary = format!(
        "{} winner pattern: {}. Prioritize this structure for this video length.",
        label, top_pattern
    );
    json!({
        "format": format_key,
        "label": label,
        "video_count": videos.len(),
        "summary": summary,
        "common_patterns": common_patterns,
        "recommended_hooks": recommended_hooks,
        "competitor_examples": competitor_examples,
    })
}

fn hook_pattern_payload(videos: &[&CompetitorVideo]) -> (Vec<Value>, Vec<String>, Vec<Value>) {
    struct PatternStats {
        frequency: usize,
        channels: std::collections::HashSet<String>,
        total_views: i64,
        examples: Vec<(i64, String)>,
    }
    let mut pattern_stats: HashMap<&'static str, PatternStats> = HashMap::new();
    let mut competitor_examples: HashMap<String, Vec<(i64, String)>> = HashMap::new();

    for video in videos {
        let title = video.title.trim().to_string();
        if title.is_empty() {
            continue;
        }
        let pattern = detect_hook_pattern(&title);
        let stats = pattern_stats.entry(pattern).or_insert_with(|| PatternStats {
            frequency: 0,
            channels: std::collections::HashSet::new(),
            total_views: 0,
            examples: Vec::new(),
        });
        stats.frequency += 1;
        stats.channels.insert(video.channel.clone());
        stats.total_views += video.views;
        stats.examples.push((video.views, title.clone()));
        competitor_examples
            .entry(video.channel.clone())
            .or_default()
            .push((video.views, title));
    }
    if pattern_stats.is_empty() {
        return (Vec::new(), Vec::new(), Vec::new());
    }

    let mut ranked: Vec<(&'static str, PatternStats)> = pattern_stats.into_iter().collect();
    ranked.sort_by(|a, b| {
        (b.1.channels.len(), b.1.frequency, b.1.total_views).cmp(&(
            a.1.channels.len(),
            a.1.frequency,
            a.1.total_views,
        ))
    });

    let mut common_patterns = Vec::new();
    let mut recommended_hooks = Vec::new();
    for (pattern, mut stats) in ranked.into_iter().take(5) {
        stats.examples.sort_by(|a, b| b.0.cmp(&a.0));
        let examples: Vec<String> = stats
            .examples
            .iter()
            .take(3)
            .map(|(_, title)| title.clone())
            .collect();
        let template = template_for_pattern(pattern).to_string();
        if !recommended_hooks.contains(&template) {
            recommended_hooks.push(template.clone());
        }
        common_patterns.push(json!({
            "pattern": pattern,
            "frequency": stats.frequency,
            "competitor_count": stats.channels.len(),
            "avg_views": stats.total_views / stats.frequency.max(1) as i64,
            "examples": examples,
            "template": template,
        }));
    }

    let mut example_rows: Vec<(String, Vec<(i64, String)>)> = competitor_examples.into_iter().collect();
    example_rows.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));
    let competitor_examples: Vec<Value> = example_rows
        .into_iter()
        .map(|(competitor, mut hooks)| {
            hooks.sort_by(|a, b| b.0.cmp(&a.0));
            json!({
                "competitor": competitor,
                "hooks": hooks.into_iter().take(3).map(|(_, title)| title).collect::<Vec<_>>(),
            })
        })
        .collect();

    (common_patterns, recommended_hooks, competitor_examples)
}

/// Overall + per-format hook intelligence.
pub fn build_hook_intelligence(videos: &[CompetitorVideo]) -> Value {
    let format_definition = format!(
        "short_form <= {}s, long_form > {}s",
        SHORT_FORM_MAX_SECONDS, SHORT_FORM_MAX_SECONDS
    );
    if videos.is_empty() {
        return json!({
            "summary": "Not enough competitor data to extract hook patterns.",
            "format_definition": format_definition,
            "common_patterns": [],
            "recommended_hooks": [],
            "competitor_examples": [],
            "format_breakdown": {
                "short_form": hook_profile_for(&[], "short_form"),
                "long_form": hook_profile_for(&[], "long_form"),
            },
        });
    }

    let refs: Vec<&CompetitorVideo> = videos.iter().collect();
    let (common_patterns, recommended_hooks, competitor_examples) = hook_pattern_payload(&refs);
    if common_patterns.is_empty() {
        return json!({
            "summary": "Competitor videos were found, but titles were too sparse for hook extraction.",
            "format_definition": format_definition,
            "common_patterns": [],
            "recommended_hooks": [],
            "competitor_examples": [],
            "format_breakdown": {
                "short_form": hook_profile_for(&[], "short_form"),
                "long_form": hook_profile_for(&[], "long_form"),
            },
        });
    }

    let short_videos: Vec<&CompetitorVideo> = videos
        .iter()
        .filter(|video| FormatType::from_duration(video.duration_seconds) == FormatType::ShortForm)
        .collect();
    let long_videos: Vec<&CompetitorVideo> = videos
        .iter()
        .filter(|video| FormatType::from_duration(video.duration_seconds) == FormatType::LongForm)
        .collect();
    let short_profile = hook_profile_for(&short_videos, "short_form");
    let long_profile = hook_profile_for(&long_videos, "long_form");

    let top_pattern = common_patterns[0]["pattern"].as_str().unwrap_or_default();
    let mut format_summary = String::new();
    let short_top = short_profile["common_patterns"][0]["pattern"].as_str();
    let long_top = long_profile["common_patterns"][0]["pattern"].as_str();
    match (short_top, long_top) {
        (Some(short), Some(long)) => {
            format_summary = format!(" Shorts winner: {short}. Long-form winner: {long}.");
        }
        (Some(short), None) => format_summary = format!(" Shorts winner: {short}."),
        (None, Some(long)) => format_summary = format!(" Long-form winner: {long}."),
        (None, None) => {}
    }

    json!({
        "summary": format!(
            "Most repeated competitor hook pattern: {}.{} Use the format-specific templates below and adapt them to your niche promise.",
            top_pattern, format_summary
        ),
        "format_definition": format_definition,
        "common_patterns": common_patterns,
        "recommended_hooks": recommended_hooks,
        "competitor_examples": competitor_examples,
        "format_breakdown": {
            "short_form": short_profile,
            "long_form": long_profile,
        },
    })
}

/// One concept, three platform-native cuts.
pub fn build_repurpose_plan(hook_intelligence: &Value, winner_signals: &Value, framework_playbook: &Value) -> Value {
    let top_pattern = hook_intelligence["common_patterns"][0]["pattern"]
        .as_str()
        .unwrap_or("Direct Outcome Hook");
    let top_topic = winner_signals["top_topics_by_velocity"][0]["topic"]
        .as_str()
        .unwrap_or("your niche");
    let primary_cta = framework_playbook["cta_distribution"]
        .as_object()
        .and_then(|dist| {
            dist.iter()
                .max_by_key(|(_, count)| count.as_u64().unwrap_or(0))
                .map(|(cta, _)| cta.clone())
        })
        .unwrap_or_else(|| "comment_prompt".to_string());

    json!({
        "summary": "One concept, three platform-native cuts with packaging adjustments.",
        "core_angle": format!("Use {top_pattern} around '{top_topic}' with fast proof and {primary_cta}."),
        "youtube_shorts": {
            "duration_target_s": 45,
            "hook_template": top_pattern,
            "edit_directives": [
                "Open with bold claim text on frame 1.",
                "Show proof by second 5.",
                "Use one comment CTA in final 3 seconds.",
            ],
        },
        "instagram_reels": {
            "duration_target_s": 35,
            "hook_template": top_pattern,
            "edit_directives": [
                "Front-load the strongest visual and caption.",
                "Keep pace dense with no dead air.",
                "End with save/share CTA card.",
            ],
        },
        "tiktok": {
            "duration_target_s": 28,
            "hook_template": top_pattern,
            "edit_directives": [
                "Lead with conflict question in first second.",
                "Add two pattern interrupts in first 10 seconds.",
                "Close with follow + comment prompt.",
            ],
        },
    })
}

fn build_velocity_actions(winner_signals: &Value) -> Vec<Value> {
    winner_signals["top_topics_by_velocity"]
        .as_array()
        .map(|topics| {
            topics
                .iter()
                .take(2)
                .map(|topic| {
                    json!({
                        "title": format!(
                            "Double down on '{}'",
                            topic["topic"].as_str().unwrap_or("top topic")
                        ),
                        "why": format!(
                            "Averaging {} views/day across {} competitor video(s).",
                            topic["avg_views_per_day"].as_f64().unwrap_or(0.0),
                            topic["count"].as_u64().unwrap_or(0)
                        ),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn build_transcript_quality(videos: &[CompetitorVideo]) -> Value {
    let sample = videos.len();
    let mut by_source: HashMap<String, usize> = HashMap::new();
    for video in videos {
        *by_source.entry(video.transcript_source.clone()).or_default() += 1;
    }
    let transcript_count = videos
        .iter()
        .filter(|video| !video.transcript.trim().is_empty())
        .count();
    let coverage = if sample == 0 {
        0.0
    } else {
        transcript_count as f64 / sample as f64
    };
    json!({
        "sample_size": sample,
        "by_source": by_source,
        "transcript_coverage_ratio": round3(coverage),
        "fallback_ratio": round3(1.0 - coverage),
        "notes": if sample == 0 {
            vec!["No competitor transcripts collected yet.".to_string()]
        } else {
            vec![format!("{} of {} competitor videos carry transcript text.", transcript_count, sample)]
        },
    })
}

fn build_series_intelligence(videos: &[CompetitorVideo]) -> Value {
    // A series is a repeated leading-keyword pair across a channel.
    let mut groups: HashMap<(String, String), Vec<String>> = HashMap::new();
    for video in videos {
        let keywords = topic_keywords(&video.title);
        if keywords.len() < 2 {
            continue;
        }
        let key = (video.channel.clone(), format!("{} {}", keywords[0], keywords[1]));
        groups.entry(key).or_default().push(video.title.clone());
    }

    let mut series: Vec<Value> = groups
        .into_iter()
        .filter(|(_, titles)| titles.len() >= 2)
        .map(|((channel, stem), titles)| {
            json!({
                "channel": channel,
                "series_stem": stem,
                "episode_count": titles.len(),
                "examples": titles.into_iter().take(3).collect::<Vec<_>>(),
            })
        })
        .collect();
    series.sort_by(|a, b| {
        b["episode_count"]
            .as_u64()
            .unwrap_or(0)
            .cmp(&a["episode_count"].as_u64().unwrap_or(0))
    });
    let total = series.len();
    series.truncate(5);

    json!({
        "summary": if total == 0 {
            "No competitor series detected yet.".to_string()
        } else {
            format!("{} repeatable series stem(s) detected across competitors.", total)
        },
        "sample_size": videos.len(),
        "total_detected_series": total,
        "series": series,
    })
}

/// Deterministic fallback payload (provider down / no data). Every field
/// keeps its normalized shape so consumers can rely on presence.
pub fn fallback_blueprint(reason: &str, platform: Platform) -> Value {
    let note = if reason.is_empty() {
        "Blueprint fallback generated because live blueprint refresh failed."
    } else {
        reason
    };
    let empty: Vec<CompetitorVideo> = Vec::new();
    let hook_intelligence = build_hook_intelligence(&empty);
    let winner_signals = build_winner_pattern_signals(&empty, Utc::now());
    let framework_playbook = build_framework_playbook(&empty);
    let repurpose_plan = build_repurpose_plan(&hook_intelligence, &winner_signals, &framework_playbook);

    json!({
        "gap_analysis": [note],
        "content_pillars": ["Audience Pain Points", "Execution Frameworks", "Retention Tweaks"],
        "video_ideas": [
            {"title": "Fix Your First 3 Seconds", "concept": "Open with direct payoff and proof."},
            {"title": "How We Keep Retention High", "concept": "Use framework steps and faster pattern interrupts."},
            {"title": "The CTA That Converts", "concept": "Use one clear CTA tied to the promise."},
        ],
        "hook_intelligence": hook_intelligence,
        "winner_pattern_signals": winner_signals,
        "framework_playbook": framework_playbook,
        "repurpose_plan": repurpose_plan,
        "transcript_quality": {
            "sample_size": 0,
            "by_source": {},
            "transcript_coverage_ratio": 0.0,
            "fallback_ratio": 1.0,
            "notes": [note],
        },
        "velocity_actions": [],
        "series_intelligence": {
            "summary": "No competitor series detected yet.",
            "sample_size": 0,
            "total_detected_series": 0,
            "series": [],
        },
        "dataset_summary": {
            "platform": platform.as_str(),
            "research_items_scanned": 0,
            "mapped_competitor_items": 0,
            "mapped_user_items": 0,
            "data_quality_tier": "low",
        },
    })
}

#[derive(Clone)]
pub struct BlueprintService {
    pool: PgPool,
    config: Arc<AppConfig>,
    llm: LlmClient,
}

impl BlueprintService {
    pub fn new(pool: PgPool, config: Arc<AppConfig>, llm: LlmClient) -> Self {
        Self { pool, config, llm }
    }

    /// Stable SHA1 over (platform, sorted competitor ids, and for ig/tiktok
    /// the sorted research item ids).
    pub async fn compute_competitor_signature(&self, user_id: &str, platform: Platform) -> Result<String> {
        let mut competitor_ids: Vec<String> = sqlx::query_scalar(
            "SELECT external_id FROM competitors WHERE user_id = $1 AND platform = $2 ORDER BY external_id ASC",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;
        competitor_ids.sort();

        let mut dataset = json!({
            "platform": platform.as_str(),
            "competitors": competitor_ids,
        });
        if matches!(platform, Platform::Instagram | Platform::Tiktok) {
            let mut item_ids: Vec<String> = sqlx::query_scalar(
                "SELECT id FROM research_items WHERE user_id = $1 AND platform = $2 ORDER BY id ASC",
            )
            .bind(user_id)
            .bind(platform.as_str())
            .fetch_all(&self.pool)
            .await?;
            item_ids.sort();
            dataset["research_item_ids"] = json!(item_ids);
        }

        let canonical = serde_json::to_string(&dataset)
            .map_err(|err| crate::error::AppError::internal(anyhow::anyhow!(err)))?;
        let mut hasher = Sha1::new();
        hasher.update(canonical.as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        Ok(format!("{}:{}", platform.as_str(), hex))
    }

    async fn collect_competitor_videos(
        &self,
        user_id: &str,
        platform: Platform,
        competitors: &[Competitor],
    ) -> Result<(Vec<CompetitorVideo>, usize, usize)> {
        let items = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE user_id = $1 AND platform = $2",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;
        let scanned = items.len();

        let handles: Vec<String> = competitors
            .iter()
            .filter_map(|competitor| competitor.display_name.as_deref())
            .map(|name| name.trim().trim_start_matches('@').to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        let mut videos = Vec::new();
        let mut mapped_user = 0usize;
        for item in &items {
            let handle = item
                .creator_handle
                .as_deref()
                .unwrap_or_default()
                .trim_start_matches('@')
                .to_lowercase();
            let is_competitor = !handle.is_empty() && handles.contains(&handle);
            if !is_competitor {
                mapped_user += 1;
                continue;
            }
            let metrics = item.metrics();
            let transcript = item.media_meta_str("transcript_text").unwrap_or_default();
            let transcript_source = item
                .media_meta_str("transcript_source")
                .unwrap_or_else(|| {
                    if transcript.is_empty() {
                        "none".to_string()
                    } else {
                        "caption_fallback".to_string()
                    }
                });
            videos.push(CompetitorVideo {
                channel: item
                    .creator_display_name
                    .clone()
                    .or_else(|| item.creator_handle.clone())
                    .unwrap_or_else(|| "Competitor".to_string()),
                title: item.title.clone().unwrap_or_default(),
                transcript: if transcript.is_empty() {
                    item.caption.clone().unwrap_or_default()
                } else {
                    transcript
                },
                views: metrics.views,
                likes: metrics.likes,
                comment_count: metrics.comments,
                duration_seconds: item
                    .media_meta_json
                    .get("duration_seconds")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0),
                published_at: item.published_at,
                transcript_source,
            });
        }

        // YouTube competitors can be enriched with live uploads when the
        // platform-data client is configured.
        if platform == Platform::Youtube {
            if let Ok(api_key) = self.config.providers.require_youtube_api_key() {
                let client = YouTubeClient::with_api_key(api_key);
                for competitor in competitors {
                    match client.get_channel_videos(&competitor.external_id, 50).await {
                        Ok(channel_videos) => {
                            let ids: Vec<String> =
                                channel_videos.iter().map(|video| video.id.clone()).collect();
                            let details = client.get_video_details(&ids).await.unwrap_or_default();
                            for video in channel_videos {
                                let detail = details.get(&video.id).cloned().unwrap_or_default();
                                videos.push(CompetitorVideo {
                                    channel: competitor
                                        .display_name
                                        .clone()
                                        .unwrap_or_else(|| "Competitor".to_string()),
                                    title: video.title,
                                    transcript: video.description.chars().take(3000).collect(),
                                    views: detail.view_count,
                                    likes: detail.like_count,
                                    comment_count: detail.comment_count,
                                    duration_seconds: detail.duration_seconds,
                                    published_at: video.published_at.as_deref().and_then(|ts| {
                                        DateTime::parse_from_rfc3339(ts)
                                            .map(|dt| dt.with_timezone(&Utc))
                                            .ok()
                                    }),
                                    transcript_source: "description".to_string(),
                                });
                            }
                        }
                        Err(err) => {
                            tracing::warn!(
                                competitor = %competitor.external_id,
                                error = %err,
                                "competitor channel fetch failed"
                            );
                        }
                    }
                }
            }
        }

        Ok((videos, scanned, mapped_user))
    }

    /// Build a fresh blueprint for (user, platform).
    pub async fn generate(&self, user_id: &str, platform: Platform) -> Result<Value> {
        let competitors = sqlx::query_as::<_, Competitor>(
            "SELECT * FROM competitors WHERE user_id = $1 AND platform = $2",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;

        if competitors.is_empty() {
            let mut payload = fallback_blueprint("Add competitors to generate a blueprint.", platform);
            payload["gap_analysis"] = json!(["Add competitors to generate a blueprint."]);
            return Ok(payload);
        }

        let (videos, scanned, mapped_user) = self
            .collect_competitor_videos(user_id, platform, &competitors)
            .await?;
        let now = Utc::now();

        let hook_intelligence = build_hook_intelligence(&videos);
        let winner_signals = build_winner_pattern_signals(&videos, now);
        let framework_playbook = build_framework_playbook(&videos);
        let repurpose_plan =
            build_repurpose_plan(&hook_intelligence, &winner_signals, &framework_playbook);
        let velocity_actions = build_velocity_actions(&winner_signals);
        let transcript_quality = build_transcript_quality(&videos);
        let series_intelligence = build_series_intelligence(&videos);

        let content_pillars: Vec<String> = winner_signals["top_topics_by_velocity"]
            .as_array()
            .map(|topics| {
                topics
                    .iter()
                    .take(3)
                    .filter_map(|topic| topic["topic"].as_str().map(str::to_string))
                    .collect()
            })
            .filter(|pillars: &Vec<String>| !pillars.is_empty())
            .unwrap_or_else(|| {
                vec![
                    "Audience Pain Points".to_string(),
                    "How-To Experiments".to_string(),
                    "Workflow Breakdowns".to_string(),
                ]
            });

        let data_quality_tier = if videos.len() >= 20 {
            "high"
        } else if videos.len() >= 5 {
            "medium"
        } else {
            "low"
        };

        let mut deterministic = json!({
            "gap_analysis": [
                "Competitors are compounding on specific topics with stronger views/day velocity.",
                "Top competitor videos deliver proof quickly, then move into framework steps.",
                "Winning channels reuse hook structures and CTA styles with minimal variation.",
            ],
            "content_pillars": content_pillars,
            "video_ideas": [
                {
                    "title": "Why Most Creators Miss This Growth Lever",
                    "concept": "Authority hook + quick proof + 3-step framework mapped from top-velocity competitor videos.",
                },
                {
                    "title": "I Tested 3 Content Systems for 30 Days",
                    "concept": "Experiment format with clear receipts, then reusable workflow checklist.",
                },
                {
                    "title": "The Framework We Use to Keep Retention High",
                    "concept": "Teach the framework directly, then close with a comment prompt CTA.",
                },
            ],
            "hook_intelligence": hook_intelligence,
            "winner_pattern_signals": winner_signals,
            "framework_playbook": framework_playbook,
            "repurpose_plan": repurpose_plan,
            "transcript_quality": transcript_quality,
            "velocity_actions": velocity_actions,
            "series_intelligence": series_intelligence,
            "dataset_summary": {
                "platform": platform.as_str(),
                "research_items_scanned": scanned,
                "mapped_competitor_items": videos.len(),
                "mapped_user_items": mapped_user,
                "data_quality_tier": data_quality_tier,
            },
        });

        // AI pass refines the narrative fields; the deterministic payload
        // backs every field it leaves out or malforms.
        if self.llm.is_live() {
            let prompt = format!(
                "Analyze these competitor video stats and return JSON with keys gap_analysis (string array), content_pillars (string array), video_ideas (array of {{title, concept}}).\nCompetitors: {}",
                serde_json::to_string(&winner_signals).unwrap_or_default()
            );
            match self
                .llm
                .chat_json("gpt-4o", json!([{ "role": "user", "content": prompt }]), None)
                .await
            {
                Ok(parsed) => {
                    if let Some(rows) = parsed["gap_analysis"].as_array().filter(|rows| !rows.is_empty()) {
                        deterministic["gap_analysis"] = json!(rows
                            .iter()
                            .filter_map(|row| row.as_str())
                            .collect::<Vec<_>>());
                    }
                    if let Some(rows) = parsed["content_pillars"].as_array().filter(|rows| !rows.is_empty()) {
                        deterministic["content_pillars"] = json!(rows
                            .iter()
                            .filter_map(|row| row.as_str())
                            .collect::<Vec<_>>());
                    }
                    if let Some(rows) = parsed["video_ideas"].as_array() {
                        let ideas: Vec<Value> = rows
                            .iter()
                            .filter(|row| {
                                row["title"].as_str().map(|s| !s.trim().is_empty()).unwrap_or(false)
                                    && row["concept"].as_str().map(|s| !s.trim().is_empty()).unwrap_or(false)
                            })
                            .cloned()
                            .collect();
                        if !ideas.is_empty() {
                            deterministic["video_ideas"] = json!(ideas);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "blueprint AI refinement skipped");
                }
            }
        }

        Ok(deterministic)
    }

    /// Cache lookup: fresh iff within TTL, signature matches, and the
    /// cached payload's platform equals the requested one.
    pub async fn get_or_refresh(&self, user_id: &str, platform: Platform) -> Result<Value> {
        let snapshot = sqlx::query_as::<_, BlueprintSnapshot>(
            "SELECT * FROM blueprint_snapshots WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        let signature = self.compute_competitor_signature(user_id, platform).await?;
        let ttl = Duration::minutes(self.config.blueprint_cache_ttl_minutes.max(1));
        let now = Utc::now();

        if let Some(snapshot) = &snapshot {
            let cached_platform = snapshot.payload_json["dataset_summary"]["platform"]
                .as_str()
                .unwrap_or_default();
            let fresh = now - snapshot.generated_at <= ttl
                && snapshot.competitor_signature == signature
                && cached_platform == platform.as_str();
            if fresh && snapshot.payload_json.is_object() {
                return Ok(snapshot.payload_json.clone());
            }
        }

        match self.generate(user_id, platform).await {
            Ok(fresh_payload) => {
                self.persist_snapshot(user_id, &fresh_payload, &signature, None)
                    .await?;
                Ok(fresh_payload)
            }
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "blueprint refresh failed");
                if let Some(snapshot) = snapshot {
                    let _ = sqlx::query(
                        "UPDATE blueprint_snapshots SET last_error = $2 WHERE user_id = $1",
                    )
                    .bind(user_id)
                    .bind(err.detail())
                    .execute(&self.pool)
                    .await;
                    if snapshot.payload_json.is_object() {
                        return Ok(snapshot.payload_json);
                    }
                }
                let fallback = fallback_blueprint(
                    "Blueprint live refresh failed; using deterministic fallback.",
                    platform,
                );
                self.persist_snapshot(user_id, &fallback, &signature, Some(&err.detail()))
                    .await?;
                Ok(fallback)
            }
        }
    }

    async fn persist_snapshot(
        &self,
        user_id: &str,
        payload: &Value,
        signature: &str,
        last_error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blueprint_snapshots (id, user_id, payload_json, competitor_signature, generated_at, last_error)
            VALUES ($1, $2, $3, $4, now(), $5)
            ON CONFLICT (user_id) DO UPDATE SET
                payload_json = EXCLUDED.payload_json,
                competitor_signature = EXCLUDED.competitor_signature,
                generated_at = now(),
                last_error = EXCLUDED.last_error
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(payload)
        .bind(signature)
        .bind(last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_patterns_classify_titles() {
        assert_eq!(detect_hook_pattern("Why your shorts die at 3 seconds"), "Question Hook");
        assert_eq!(detect_hook_pattern("How to grow without burnout"), "How-To Hook");
        assert_eq!(detect_hook_pattern("5 ways to fix retention"), "Numbered Promise");
        assert_eq!(detect_hook_pattern("Shorts vs Reels for reach"), "Comparison Hook");
        assert_eq!(detect_hook_pattern("Stop making this hook mistake"), "Mistake/Warning Hook");
        assert_eq!(detect_hook_pattern("The secret nobody tells creators"), "Secret Reveal Hook");
        assert_eq!(
            detect_hook_pattern("I tried daily posting for 30 days"),
            "Challenge/Experiment Hook"
        );
        assert_eq!(detect_hook_pattern("My growth play"), "Direct Outcome Hook");
    }

    #[test]
    fn pearson_degenerate_cases_are_zero() {
        assert_eq!(pearson_correlation(&[1.0], &[2.0]), 0.0);
        assert_eq!(pearson_correlation(&[1.0, 1.0], &[2.0, 3.0]), 0.0);
        let xs = [1.0, 2.0, 3.0];
        let ys = [2.0, 4.0, 6.0];
        assert!((pearson_correlation(&xs, &ys) - 1.0).abs() < 1e-9);
    }

    fn video(channel: &str, title: &str, views: i64, duration: i64) -> CompetitorVideo {
        CompetitorVideo {
            channel: channel.to_string(),
            title: title.to_string(),
            transcript: "step one proof results framework".to_string(),
            views,
            likes: views / 10,
            comment_count: views / 100,
            duration_seconds: duration,
            published_at: Some(Utc::now() - Duration::days(10)),
            transcript_source: "caption_fallback".to_string(),
        }
    }

    #[test]
    fn winner_signals_rank_by_velocity() {
        let videos = vec![
            video("A", "How to grow fast", 100_000, 45),
            video("B", "5 ways to fix hooks", 10_000, 120),
        ];
        let signals = build_winner_pattern_signals(&videos, Utc::now());
        assert_eq!(signals["sample_size"], 2);
        let top_videos = signals["top_videos_by_velocity"].as_array().unwrap();
        assert_eq!(top_videos[0]["channel"], "A");
    }

    #[test]
    fn framework_playbook_reports_adoption_ratios() {
        let videos = vec![
            video("A", "I grew 100k subs", 1000, 30),
            video("B", "Plain title", 1000, 30),
        ];
        let playbook = build_framework_playbook(&videos);
        let adoption = playbook["stage_adoption"].as_object().unwrap();
        assert!(adoption.contains_key("authority_hook"));
        assert!(adoption["fast_proof"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn hook_intelligence_splits_by_format() {
        let videos = vec![
            video("A", "How to grow fast", 1000, 45),
            video("A", "Why hooks die", 2000, 300),
        ];
        let intelligence = build_hook_intelligence(&videos);
        assert_eq!(
            intelligence["format_breakdown"]["short_form"]["video_count"],
            1
        );
        assert_eq!(
            intelligence["format_breakdown"]["long_form"]["video_count"],
            1
        );
        assert!(!intelligence["recommended_hooks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn fallback_blueprint_has_deterministic_shape() {
        let payload = fallback_blueprint("", Platform::Tiktok);
        for key in [
            "gap_analysis",
            "content_pillars",
            "video_ideas",
            "hook_intelligence",
            "winner_pattern_signals",
            "framework_playbook",
            "repurpose_plan",
            "transcript_quality",
            "velocity_actions",
            "series_intelligence",
            "dataset_summary",
        ] {
            assert!(payload.get(key).is_some(), "missing {key}");
        }
        assert_eq!(payload["dataset_summary"]["platform"], "tiktok");
    }
}
