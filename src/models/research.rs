use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Canonical cross-platform content record. Mutated only by ingestion and
/// by stage transitions writing into `media_meta_json`; identity immutable.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResearchItem {
    pub id: String,
    pub user_id: String,
    pub collection_id: Option<String>,
    pub platform: String,
    pub source_type: String,
    pub url: Option<String>,
    pub external_id: Option<String>,
    pub creator_handle: Option<String>,
    pub creator_display_name: Option<String>,
    pub title: Option<String>,
    pub caption: Option<String>,
    pub metrics_json: serde_json::Value,
    pub media_meta_json: serde_json::Value,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ResearchItem {
    pub fn metrics(&self) -> ItemMetrics {
        ItemMetrics::from_value(&self.metrics_json)
    }

    /// `media_meta` is an open mapping; callers merge, never replace.
    pub fn media_meta(&self) -> serde_json::Map<String, serde_json::Value> {
        match &self.media_meta_json {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        }
    }

    pub fn media_meta_str(&self, key: &str) -> Option<String> {
        self.media_meta_json
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Normalized engagement metrics carried on every item.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ItemMetrics {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub saves: i64,
}

impl ItemMetrics {
    pub fn from_value(value: &serde_json::Value) -> Self {
        let field = |key: &str| -> i64 {
            value
                .get(key)
                .and_then(|v| {
                    v.as_i64()
                        .or_else(|| v.as_f64().map(|f| f as i64))
                        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()).map(|f| f as i64))
                })
                .unwrap_or(0)
                .max(0)
        };
        Self {
            views: field("views"),
            likes: field("likes"),
            comments: field("comments"),
            shares: field("shares"),
            saves: field("saves"),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "views": self.views,
            "likes": self.likes,
            "comments": self.comments,
            "shares": self.shares,
            "saves": self.saves,
        })
    }
}

/// Named grouping of research items. Each user owns a system
/// "Default Collection"; an item belongs to at most one collection.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResearchCollection {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub platform: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_coerce_from_mixed_json() {
        let value = serde_json::json!({
            "views": "12000",
            "likes": 800.0,
            "comments": 90,
            "shares": null,
        });
        let metrics = ItemMetrics::from_value(&value);
        assert_eq!(metrics.views, 12_000);
        assert_eq!(metrics.likes, 800);
        assert_eq!(metrics.comments, 90);
        assert_eq!(metrics.shares, 0);
        assert_eq!(metrics.saves, 0);
    }
}
