//! Thin YouTube Data API v3 client.
//!
//! Only the capabilities the core consumes are exposed: video details for
//! research enrichment, channel uploads for competitor benchmarks, and the
//! authenticated channel for OAuth session sync.

use serde_json::Value;
use std::collections::HashMap;

use crate::error::{AppError, Result};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Clone, Default)]
pub struct VideoDetails {
    pub title: String,
    pub description: String,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct ChannelVideo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub title: Option<String>,
    pub handle: Option<String>,
    pub subscriber_count: Option<String>,
    pub thumbnail_url: Option<String>,
}

#[derive(Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl YouTubeClient {
    pub fn with_api_key(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: Some(api_key.to_string()),
        }
    }

    /// OAuth-only client: good for `mine=true` lookups, rejects key-based
    /// endpoints.
    pub fn unauthenticated() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: None,
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AppError::ServiceUnavailable("YouTube API key not configured.".into()))
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| AppError::ServiceUnavailable(format!("YouTube API unreachable: {err}")))?;
        if !response.status().is_success() {
            return Err(AppError::ServiceUnavailable(format!(
                "YouTube API error: {}",
                response.status()
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|err| AppError::ServiceUnavailable(format!("YouTube API bad payload: {err}")))
    }

    /// Fetch statistics + snippet + duration for up to 50 video ids.
    pub async fn get_video_details(&self, video_ids: &[String]) -> Result<HashMap<String, VideoDetails>> {
        if video_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = video_ids
            .iter()
            .take(50)
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{API_BASE}/videos?part=snippet,statistics,contentDetails&id={}&key={}",
            urlencoding::encode(&ids),
            self.api_key()?
        );
        let payload = self.get_json(&url).await?;

        let mut details = HashMap::new();
        for item in payload["items"].as_array().cloned().unwrap_or_default() {
            let Some(id) = item["id"].as_str() else {
                continue;
            };
            let snippet = &item["snippet"];
            let stats = &item["statistics"];
            details.insert(
                id.to_string(),
                VideoDetails {
                    title: snippet["title"].as_str().unwrap_or_default().to_string(),
                    description: snippet["description"].as_str().unwrap_or_default().to_string(),
                    view_count: stat_count(stats, "viewCount"),
                    like_count: stat_count(stats, "likeCount"),
                    comment_count: stat_count(stats, "commentCount"),
                    thumbnail_url: snippet["thumbnails"]["high"]["url"]
                        .as_str()
                        .or_else(|| snippet["thumbnails"]["default"]["url"].as_str())
                        .map(|s| s.to_string()),
                    duration_seconds: parse_iso8601_duration(
                        item["contentDetails"]["duration"].as_str().unwrap_or_default(),
                    ),
                },
            );
        }
        Ok(details)
    }

    /// List recent uploads for a channel (search endpoint, newest first).
    pub async fn get_channel_videos(&self, channel_id: &str, max_results: u32) -> Result<Vec<ChannelVideo>> {
        let url = format!(
            "{API_BASE}/search?part=snippet&channelId={}&order=date&type=video&maxResults={}&key={}",
            urlencoding::encode(channel_id),
            max_results.min(50),
            self.api_key()?
        );
        let payload = self.get_json(&url).await?;

        let mut videos = Vec::new();
        for item in payload["items"].as_array().cloned().unwrap_or_default() {
            let Some(video_id) = item["id"]["videoId"].as_str() else {
                continue;
            };
            let snippet = &item["snippet"];
            videos.push(ChannelVideo {
                id: video_id.to_string(),
                title: snippet["title"].as_str().unwrap_or_default().to_string(),
                description: snippet["description"].as_str().unwrap_or_default().to_string(),
                published_at: snippet["publishedAt"].as_str().map(|s| s.to_string()),
            });
        }
        Ok(videos)
    }

    /// Resolve the authenticated user's channel with an OAuth access token.
    pub async fn get_my_channel_info(&self, access_token: &str) -> Result<ChannelInfo> {
        let url = format!("{API_BASE}/channels?part=snippet,statistics&mine=true");
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| AppError::ServiceUnavailable(format!("YouTube API unreachable: {err}")))?;
        if !response.status().is_success() {
            return Err(AppError::Unauthenticated(
                "YouTube OAuth token was rejected.".to_string(),
            ));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| AppError::ServiceUnavailable(format!("YouTube API bad payload: {err}")))?;

        let item = payload["items"]
            .as_array()
            .and_then(|items| items.first())
            .cloned()
            .ok_or_else(|| AppError::not_found("YouTube channel"))?;

        Ok(ChannelInfo {
            channel_id: item["id"].as_str().unwrap_or_default().to_string(),
            title: item["snippet"]["title"].as_str().map(|s| s.to_string()),
            handle: item["snippet"]["customUrl"].as_str().map(|s| s.to_string()),
            subscriber_count: item["statistics"]["subscriberCount"]
                .as_str()
                .map(|s| s.to_string()),
            thumbnail_url: item["snippet"]["thumbnails"]["default"]["url"]
                .as_str()
                .map(|s| s.to_string()),
        })
    }
}

fn stat_count(stats: &Value, key: &str) -> i64 {
    stats[key]
        .as_str()
        .and_then(|s| s.parse::<i64>().ok())
        .or_else(|| stats[key].as_i64())
        .unwrap_or(0)
}

/// Parse ISO-8601 durations like PT1H2M30S into whole seconds.
pub fn parse_iso8601_duration(value: &str) -> i64 {
    let mut total: i64 = 0;
    let mut number = String::new();
    let mut in_time = false;
    for ch in value.chars() {
        match ch {
            'P' => {}
            'T' => in_time = true,
            '0'..='9' => number.push(ch),
            'H' if in_time => {
                total += number.parse::<i64>().unwrap_or(0) * 3600;
                number.clear();
            }
            'M' if in_time => {
                total += number.parse::<i64>().unwrap_or(0) * 60;
                number.clear();
            }
            'S' if in_time => {
                total += number.parse::<i64>().unwrap_or(0);
                number.clear();
            }
            'D' => {
                total += number.parse::<i64>().unwrap_or(0) * 86_400;
                number.clear();
            }
            _ => number.clear(),
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso8601_durations() {
        assert_eq!(parse_iso8601_duration("PT45S"), 45);
        assert_eq!(parse_iso8601_duration("PT1M30S"), 90);
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), 3723);
        assert_eq!(parse_iso8601_duration("P1DT1S"), 86_401);
        assert_eq!(parse_iso8601_duration(""), 0);
    }
}
