//! Closed wire enums shared across the API surface.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Supported social video platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Instagram,
    Tiktok,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Youtube, Platform::Instagram, Platform::Tiktok];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }

    /// Parse a platform, accepting the UI aliases the product surfaces.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        let text = value.trim().to_lowercase();
        match text.as_str() {
            "youtube" | "youtube_shorts" | "youtube_long" | "shorts" => Ok(Platform::Youtube),
            "instagram" | "instagram_reels" | "reels" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::Tiktok),
            _ => Err(AppError::bad_request(
                "platform must be youtube, instagram, or tiktok",
            )),
        }
    }

    /// Optional parse: empty input is None, invalid input is an error.
    pub fn parse_optional(value: Option<&str>) -> Result<Option<Self>, AppError> {
        match value.map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => Platform::parse(text).map(Some),
        }
    }

    pub fn parse_or_default(value: Option<&str>) -> Result<Self, AppError> {
        Ok(Platform::parse_optional(value)?.unwrap_or(Platform::Youtube))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::parse(s)
    }
}

/// Feed discovery match modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    Profile,
    Hashtag,
    Keyword,
    Audio,
}

impl DiscoveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMode::Profile => "profile",
            DiscoveryMode::Hashtag => "hashtag",
            DiscoveryMode::Keyword => "keyword",
            DiscoveryMode::Audio => "audio",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_lowercase().as_str() {
            "profile" => Ok(DiscoveryMode::Profile),
            "hashtag" => Ok(DiscoveryMode::Hashtag),
            "keyword" => Ok(DiscoveryMode::Keyword),
            "audio" => Ok(DiscoveryMode::Audio),
            _ => Err(AppError::bad_request(
                "mode must be profile, hashtag, keyword, or audio",
            )),
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discovery/search timeframe windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "all")]
    All,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Day => "24h",
            Timeframe::Week => "7d",
            Timeframe::Month => "30d",
            Timeframe::Quarter => "90d",
            Timeframe::All => "all",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_lowercase().as_str() {
            "24h" => Ok(Timeframe::Day),
            "7d" => Ok(Timeframe::Week),
            "30d" => Ok(Timeframe::Month),
            "90d" => Ok(Timeframe::Quarter),
            "all" => Ok(Timeframe::All),
            _ => Err(AppError::bad_request(
                "timeframe must be one of 24h, 7d, 30d, 90d, all",
            )),
        }
    }

    pub fn parse_or(value: Option<&str>, default: Timeframe) -> Result<Self, AppError> {
        match value.map(str::trim) {
            None | Some("") => Ok(default),
            Some(text) => Timeframe::parse(text),
        }
    }

    /// `all` disables cutoff filtering.
    pub fn cutoff(&self, now: chrono::DateTime<chrono::Utc>) -> Option<chrono::DateTime<chrono::Utc>> {
        let window = match self {
            Timeframe::Day => chrono::Duration::days(1),
            Timeframe::Week => chrono::Duration::days(7),
            Timeframe::Month => chrono::Duration::days(30),
            Timeframe::Quarter => chrono::Duration::days(90),
            Timeframe::All => return None,
        };
        Some(now - window)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction for search endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn parse_or(value: Option<&str>, default: SortDirection) -> Result<Self, AppError> {
        match value.map(|v| v.trim().to_lowercase()) {
            None => Ok(default),
            Some(text) if text.is_empty() => Ok(default),
            Some(text) if text == "asc" => Ok(SortDirection::Asc),
            Some(text) if text == "desc" => Ok(SortDirection::Desc),
            Some(_) => Err(AppError::bad_request("sort_direction must be asc or desc")),
        }
    }

    pub fn is_descending(&self) -> bool {
        matches!(self, SortDirection::Desc)
    }
}

/// Export file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(AppError::bad_request("format must be csv or json")),
        }
    }
}

/// Content format classification by duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatType {
    ShortForm,
    LongForm,
    Unknown,
}

pub const SHORT_FORM_MAX_SECONDS: i64 = 60;

impl FormatType {
    pub fn from_duration(duration_seconds: i64) -> Self {
        if duration_seconds <= 0 {
            FormatType::Unknown
        } else if duration_seconds <= SHORT_FORM_MAX_SECONDS {
            FormatType::ShortForm
        } else {
            FormatType::LongForm
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatType::ShortForm => "short_form",
            FormatType::LongForm => "long_form",
            FormatType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_aliases_resolve() {
        assert_eq!(Platform::parse("Shorts").unwrap(), Platform::Youtube);
        assert_eq!(Platform::parse("reels").unwrap(), Platform::Instagram);
        assert!(Platform::parse("vimeo").is_err());
    }

    #[test]
    fn timeframe_all_disables_cutoff() {
        assert!(Timeframe::All.cutoff(chrono::Utc::now()).is_none());
        assert!(Timeframe::Week.cutoff(chrono::Utc::now()).is_some());
    }

    #[test]
    fn format_type_boundaries() {
        assert_eq!(FormatType::from_duration(0), FormatType::Unknown);
        assert_eq!(FormatType::from_duration(60), FormatType::ShortForm);
        assert_eq!(FormatType::from_duration(61), FormatType::LongForm);
    }
}
