//! Repost packaging: deterministic platform-family packages synthesized
//! from a winning research item.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{FeedRepostPackage, Platform, ResearchItem, REPOST_ALLOWED_STATUSES};

use super::discovery::{extract_hashtags, extract_topic_keywords, project_item};
use super::{FeedService, TelemetryDetails};

pub const REPOST_DEFAULT_TARGETS: [Platform; 3] =
    [Platform::Youtube, Platform::Instagram, Platform::Tiktok];

pub fn repost_duration_target(platform: Platform) -> i64 {
    match platform {
        Platform::Youtube => 34,
        Platform::Instagram => 28,
        Platform::Tiktok => 24,
    }
}

pub fn repost_hook_deadline(platform: Platform) -> i64 {
    match platform {
        Platform::Youtube => 3,
        Platform::Instagram | Platform::Tiktok => 2,
    }
}

fn platform_cta(platform: Platform) -> &'static str {
    match platform {
        Platform::Youtube => "Comment 'PLAN' and I'll share the exact checklist.",
        Platform::Instagram => "Save this Reel and share it with your content partner.",
        Platform::Tiktok => "Follow for part 2 where I break down the full posting workflow.",
    }
}

fn default_hashtags(platform: Platform) -> [&'static str; 3] {
    match platform {
        Platform::Youtube => ["shorts", "creatorgrowth", "contentstrategy"],
        Platform::Instagram => ["reels", "contenttips", "creatorbusiness"],
        Platform::Tiktok => ["tiktoktips", "viralhooks", "creatorjourney"],
    }
}

/// Build the deterministic package payload for one source item.
pub fn build_repost_package_payload(
    item: &ResearchItem,
    target_platforms: &[Platform],
    objective: &str,
    tone: &str,
) -> serde_json::Value {
    let now = Utc::now();
    let payload = project_item(item, now);
    let metrics = payload.metrics;
    let transcript_text = item.media_meta_str("transcript_text").unwrap_or_default();
    let source_text = [
        item.title.as_deref().unwrap_or_default(),
        item.caption.as_deref().unwrap_or_default(),
        transcript_text.as_str(),
    ]
    .join(" ");
    let keywords = extract_topic_keywords(&source_text, 4);
    let primary_topic = keywords
        .first()
        .cloned()
        .unwrap_or_else(|| "content growth".to_string());
    let proof_views = metrics.views.max(1000);
    let proof_phrase = format!("{} views", group_thousands(proof_views));
    let engagement_rate = payload.engagement_rate;

    let hooks = serde_json::json!([
        {
            "style": "outcome_proof",
            "line": format!("I tested this {primary_topic} structure and it drove {proof_phrase}."),
        },
        {
            "style": "curiosity_gap",
            "line": format!("Most creators miss this {primary_topic} move, and it quietly kills retention."),
        },
        {
            "style": "contrarian_take",
            "line": format!("Stop over-editing {primary_topic} videos. This simpler format performs better."),
        },
    ]);
    let first_hook_line = hooks[0]["line"].as_str().unwrap_or_default().to_string();

    let caption_hashtags = extract_hashtags(item.caption.as_deref().unwrap_or_default());
    let mut platform_packages = serde_json::Map::new();
    for platform in target_platforms {
        let mut hashtags: Vec<String> = caption_hashtags.clone();
        for tag in default_hashtags(*platform) {
            hashtags.push(tag.to_string());
        }
        let mut seen = std::collections::HashSet::new();
        let hashtags: Vec<String> = hashtags
            .into_iter()
            .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
            .take(6)
            .collect();
        let hashtag_line = hashtags
            .iter()
            .map(|tag| format!("#{tag}"))
            .collect::<Vec<_>>()
            .join(" ");
        let cta = platform_cta(*platform);

        platform_packages.insert(
            platform.as_str().to_string(),
            serde_json::json!({
                "duration_target_s": repost_duration_target(*platform),
                "hook_deadline_s": repost_hook_deadline(*platform),
                "first_frame_text": first_hook_line.chars().take(80).collect::<String>(),
                "caption": format!(
                    "{first_hook_line} Step 1: Start with the proof. Step 2: Show one tactical move. Step 3: End with a single CTA. {cta} {hashtag_line}"
                ).trim().to_string(),
                "cta_line": cta,
                "hashtags": hashtags.iter().map(|tag| format!("#{tag}")).collect::<Vec<_>>(),
                "edit_directives": [
                    "Open with motion + headline text in the first second.",
                    "Add one pattern interrupt every 2-3 seconds.",
                    "Place strongest proof visual before the halfway point.",
                ],
            }),
        );
    }

    let mut checklist = vec![
        "Use one hook line only; avoid stacking multiple intros.".to_string(),
        "Show a measurable proof moment within first 3 seconds.".to_string(),
        "Keep body to 2-3 concrete steps with no filler.".to_string(),
        "Use one CTA intent (save/share/comment/follow), not multiple.".to_string(),
        "Export platform-native aspect ratio and verify subtitles.".to_string(),
    ];
    if !transcript_text.is_empty() {
        checklist.push("Keep top transcript phrase as on-screen text anchor.".to_string());
    }

    let score_estimate = ((payload.trending_score * 0.6 + engagement_rate * 100.0 * 0.4)
        .clamp(0.0, 100.0)
        * 10.0)
        .round()
        / 10.0;

    serde_json::json!({
        "objective": objective,
        "tone": tone,
        "source_snapshot": {
            "item_id": &item.id,
            "platform": &item.platform,
            "title": &item.title,
            "caption": &item.caption,
            "creator_handle": &item.creator_handle,
            "metrics": metrics,
            "engagement_rate": engagement_rate,
        },
        "topic_keywords": keywords,
        "core_angle": format!(
            "Reuse the winning {primary_topic} proof-first structure with tighter pacing and one CTA."
        ),
        "hook_variants": hooks,
        "platform_packages": platform_packages,
        "execution_checklist": checklist,
        "estimated_score": score_estimate,
        "generated_at": now.to_rfc3339(),
    })
}

fn group_thousands(value: i64) -> String {
    let digits = value.to_string();
    let mut grouped = String::new();
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[derive(Debug, Clone, Serialize)]
pub struct RepostPackagePayload {
    pub package_id: String,
    pub source_item_id: String,
    pub status: String,
    pub target_platforms: Vec<String>,
    pub package: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

impl RepostPackagePayload {
    fn from_row(row: &FeedRepostPackage) -> Self {
        Self {
            package_id: row.id.clone(),
            source_item_id: row.source_item_id.clone(),
            status: row.status.clone(),
            target_platforms: row
                .target_platforms_json
                .as_array()
                .map(|rows| {
                    rows.iter()
                        .filter_map(|p| p.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            package: row.package_json.clone(),
            created_at: row.created_at.to_rfc3339(),
            updated_at: row.updated_at.to_rfc3339(),
        }
    }
}

fn normalize_targets(raw: Option<&[String]>) -> Vec<Platform> {
    let Some(raw) = raw else {
        return REPOST_DEFAULT_TARGETS.to_vec();
    };
    let mut targets = Vec::new();
    for value in raw {
        if let Ok(Some(platform)) = Platform::parse_optional(Some(value)) {
            if !targets.contains(&platform) {
                targets.push(platform);
            }
        }
    }
    if targets.is_empty() {
        REPOST_DEFAULT_TARGETS.to_vec()
    } else {
        targets
    }
}

impl FeedService {
    /// Stage 2 of the loop: synthesize and persist a repost package.
    pub async fn create_repost_package(
        &self,
        user_id: &str,
        source_item_id: &str,
        target_platforms: Option<&[String]>,
        objective: Option<&str>,
        tone: Option<&str>,
    ) -> Result<RepostPackagePayload> {
        self.assert_research_enabled()?;
        let item = self.resolve_source_item(user_id, source_item_id).await?;

        let targets = normalize_targets(target_platforms);
        let objective = objective
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or("maximize_reach");
        let tone = tone.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("direct");
        let package_payload = build_repost_package_payload(&item, &targets, objective, tone);

        let row = sqlx::query_as::<_, FeedRepostPackage>(
            r#"
            INSERT INTO feed_repost_packages (id, user_id, source_item_id, status, target_platforms_json, package_json)
            VALUES ($1, $2, $3, 'draft', $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(&item.id)
        .bind(serde_json::json!(targets
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()))
        .bind(&package_payload)
        .fetch_one(self.pool())
        .await?;

        self.telemetry()
            .record(
                user_id,
                "feed_repost_package_created",
                "ok",
                TelemetryDetails {
                    platform: Some(item.platform.clone()),
                    source_item_id: Some(item.id.clone()),
                    details: Some(serde_json::json!({
                        "target_platform_count": targets.len(),
                        "objective": objective.chars().take(80).collect::<String>(),
                    })),
                },
            )
            .await;
        Ok(RepostPackagePayload::from_row(&row))
    }

    pub async fn list_repost_packages(
        &self,
        user_id: &str,
        source_item_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<RepostPackagePayload>> {
        self.assert_research_enabled()?;
        let rows = match source_item_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(source_item_id) => {
                sqlx::query_as::<_, FeedRepostPackage>(
                    "SELECT * FROM feed_repost_packages WHERE user_id = $1 AND source_item_id = $2 ORDER BY created_at DESC LIMIT $3",
                )
                .bind(user_id)
                .bind(source_item_id)
                .bind(limit.clamp(1, 100))
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, FeedRepostPackage>(
                    "SELECT * FROM feed_repost_packages WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
                )
                .bind(user_id)
                .bind(limit.clamp(1, 100))
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows.iter().map(RepostPackagePayload::from_row).collect())
    }

    pub async fn get_repost_package(
        &self,
        user_id: &str,
        package_id: &str,
    ) -> Result<RepostPackagePayload> {
        self.assert_research_enabled()?;
        let row = sqlx::query_as::<_, FeedRepostPackage>(
            "SELECT * FROM feed_repost_packages WHERE id = $1 AND user_id = $2",
        )
        .bind(package_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::not_found("Feed repost package"))?;
        Ok(RepostPackagePayload::from_row(&row))
    }

    /// Status transitions are free within the allowed set.
    pub async fn update_repost_package_status(
        &self,
        user_id: &str,
        package_id: &str,
        status: &str,
    ) -> Result<RepostPackagePayload> {
        self.assert_research_enabled()?;
        let next_status = status.trim().to_lowercase();
        if !REPOST_ALLOWED_STATUSES.contains(&next_status.as_str()) {
            return Err(AppError::bad_request(
                "status must be one of draft, scheduled, published, archived.",
            ));
        }

        let row = sqlx::query_as::<_, FeedRepostPackage>(
            "SELECT * FROM feed_repost_packages WHERE id = $1 AND user_id = $2",
        )
        .bind(package_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| AppError::not_found("Feed repost package"))?;

        let mut package = match &row.package_json {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        package.insert("status".into(), serde_json::json!(next_status));
        package.insert(
            "status_updated_at".into(),
            serde_json::json!(Utc::now().to_rfc3339()),
        );

        let row = sqlx::query_as::<_, FeedRepostPackage>(
            "UPDATE feed_repost_packages SET status = $2, package_json = $3, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(&row.id)
        .bind(&next_status)
        .bind(serde_json::Value::Object(package))
        .fetch_one(self.pool())
        .await?;

        self.telemetry()
            .record(
                user_id,
                "feed_repost_package_status",
                &next_status,
                TelemetryDetails {
                    platform: None,
                    source_item_id: Some(row.source_item_id.clone()),
                    details: Some(serde_json::json!({ "package_id": row.id.clone() })),
                },
            )
            .await;
        Ok(RepostPackagePayload::from_row(&row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item() -> ResearchItem {
        let now = Utc::now();
        ResearchItem {
            id: "item-1".to_string(),
            user_id: "u".to_string(),
            collection_id: None,
            platform: "instagram".to_string(),
            source_type: "manual_url".to_string(),
            url: Some("https://instagram.com/reel/X".to_string()),
            external_id: Some("X".to_string()),
            creator_handle: Some("@maker".to_string()),
            creator_display_name: Some("Maker".to_string()),
            title: Some("Retention hooks playbook".to_string()),
            caption: Some("My #hooks system for creators".to_string()),
            metrics_json: serde_json::json!({
                "views": 47_000, "likes": 3_000, "comments": 240, "shares": 150, "saves": 300
            }),
            media_meta_json: serde_json::json!({"transcript_text": "full transcript"}),
            published_at: Some(now - Duration::hours(10)),
            created_at: now - Duration::hours(10),
        }
    }

    #[test]
    fn package_carries_three_hook_styles() {
        let payload = build_repost_package_payload(
            &item(),
            &REPOST_DEFAULT_TARGETS,
            "maximize_reach",
            "direct",
        );
        let hooks = payload["hook_variants"].as_array().unwrap();
        assert_eq!(hooks.len(), 3);
        let styles: Vec<&str> = hooks
            .iter()
            .map(|hook| hook["style"].as_str().unwrap())
            .collect();
        assert_eq!(styles, vec!["outcome_proof", "curiosity_gap", "contrarian_take"]);
    }

    #[test]
    fn platform_packages_use_spec_duration_and_deadlines() {
        let payload = build_repost_package_payload(
            &item(),
            &REPOST_DEFAULT_TARGETS,
            "maximize_reach",
            "direct",
        );
        let packages = payload["platform_packages"].as_object().unwrap();
        assert_eq!(packages["youtube"]["duration_target_s"], 34);
        assert_eq!(packages["instagram"]["duration_target_s"], 28);
        assert_eq!(packages["tiktok"]["duration_target_s"], 24);
        assert_eq!(packages["youtube"]["hook_deadline_s"], 3);
        assert_eq!(packages["instagram"]["hook_deadline_s"], 2);
        assert_eq!(packages["tiktok"]["hook_deadline_s"], 2);
    }

    #[test]
    fn transcript_presence_adds_checklist_anchor() {
        let payload = build_repost_package_payload(
            &item(),
            &[Platform::Youtube],
            "maximize_reach",
            "direct",
        );
        let checklist = payload["execution_checklist"].as_array().unwrap();
        assert_eq!(checklist.len(), 6);
        assert!(checklist
            .last()
            .unwrap()
            .as_str()
            .unwrap()
            .contains("transcript"));
    }

    #[test]
    fn estimated_score_is_bounded() {
        let payload = build_repost_package_payload(
            &item(),
            &[Platform::Tiktok],
            "maximize_reach",
            "direct",
        );
        let score = payload["estimated_score"].as_f64().unwrap();
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(47_000), "47,000");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
