use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Persisted batch of generated script variants.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScriptVariantBatch {
    pub id: String,
    pub user_id: String,
    pub source_item_id: Option<String>,
    pub platform: String,
    pub topic: String,
    pub request_json: serde_json::Value,
    pub variants_json: serde_json::Value,
    pub selected_variant_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A rescored edited script.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DraftSnapshot {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub source_item_id: Option<String>,
    pub variant_id: Option<String>,
    pub script_text: String,
    pub baseline_score: Option<f64>,
    pub rescored_score: f64,
    pub delta_score: Option<f64>,
    pub detector_rankings_json: serde_json::Value,
    pub next_actions_json: serde_json::Value,
    pub line_level_edits_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Variant generation strategies. Exactly these three, always.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleKey {
    VariantA,
    VariantB,
    VariantC,
}

impl StyleKey {
    pub const ALL: [StyleKey; 3] = [StyleKey::VariantA, StyleKey::VariantB, StyleKey::VariantC];

    pub fn as_str(&self) -> &'static str {
        match self {
            StyleKey::VariantA => "variant_a",
            StyleKey::VariantB => "variant_b",
            StyleKey::VariantC => "variant_c",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StyleKey::VariantA => "Outcome + Proof",
            StyleKey::VariantB => "Curiosity Gap",
            StyleKey::VariantC => "Contrarian Take",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "variant_a" => Some(StyleKey::VariantA),
            "variant_b" => Some(StyleKey::VariantB),
            "variant_c" => Some(StyleKey::VariantC),
            _ => None,
        }
    }
}

impl fmt::Display for StyleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook/setup/value/cta structure of a generated script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantStructure {
    pub hook: String,
    pub setup: String,
    pub value: String,
    pub cta: String,
}

/// Rule-based detector keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKey {
    TimeToValue,
    OpenLoops,
    DeadZones,
    PatternInterrupts,
    CtaStyle,
}

impl DetectorKey {
    pub const ALL: [DetectorKey; 5] = [
        DetectorKey::TimeToValue,
        DetectorKey::OpenLoops,
        DetectorKey::DeadZones,
        DetectorKey::PatternInterrupts,
        DetectorKey::CtaStyle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKey::TimeToValue => "time_to_value",
            DetectorKey::OpenLoops => "open_loops",
            DetectorKey::DeadZones => "dead_zones",
            DetectorKey::PatternInterrupts => "pattern_interrupts",
            DetectorKey::CtaStyle => "cta_style",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DetectorKey::TimeToValue => "Time to Value",
            DetectorKey::OpenLoops => "Open Loops",
            DetectorKey::DeadZones => "Dead Zones",
            DetectorKey::PatternInterrupts => "Pattern Interrupts",
            DetectorKey::CtaStyle => "CTA Style",
        }
    }

    /// Weight in the detector-weighted platform score.
    pub fn weight(&self) -> f64 {
        match self {
            DetectorKey::TimeToValue => 0.32,
            DetectorKey::OpenLoops => 0.16,
            DetectorKey::DeadZones => 0.22,
            DetectorKey::PatternInterrupts => 0.20,
            DetectorKey::CtaStyle => 0.10,
        }
    }

    pub fn target_score(&self) -> f64 {
        match self {
            DetectorKey::OpenLoops => 75.0,
            DetectorKey::PatternInterrupts => 78.0,
            _ => 85.0,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "time_to_value" => Some(DetectorKey::TimeToValue),
            "open_loops" => Some(DetectorKey::OpenLoops),
            "dead_zones" => Some(DetectorKey::DeadZones),
            "pattern_interrupts" => Some(DetectorKey::PatternInterrupts),
            "cta_style" => Some(DetectorKey::CtaStyle),
            _ => None,
        }
    }
}

impl fmt::Display for DetectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one detector over a transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorResult {
    pub detector_key: DetectorKey,
    pub label: String,
    pub score: f64,
    pub target_score: f64,
    pub gap: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    pub evidence: Vec<String>,
    pub edits: Vec<String>,
}

/// Detector ranked against the others by (gap desc, weight desc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorRanking {
    pub detector_key: DetectorKey,
    pub label: String,
    pub score: f64,
    pub target_score: f64,
    pub gap: f64,
    pub weight: f64,
    pub priority: String,
    pub estimated_lift_points: f64,
    pub evidence: Vec<String>,
    pub edits: Vec<String>,
}

/// Prescribed next action reshaped from a top detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextAction {
    pub title: String,
    pub detector_key: DetectorKey,
    pub priority: String,
    pub why: String,
    pub expected_lift_points: f64,
    pub execution_steps: Vec<String>,
}

/// One line-level rewrite suggestion (rescore only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineLevelEdit {
    pub detector_key: DetectorKey,
    pub detector_label: String,
    pub priority: String,
    /// 1-indexed
    pub line_number: usize,
    pub original_line: String,
    pub suggested_line: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedDiff {
    pub before: Option<f64>,
    pub after: f64,
    pub delta: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorDiff {
    pub detector_key: DetectorKey,
    pub before_score: Option<f64>,
    pub after_score: f64,
    pub delta: Option<f64>,
}

/// Rescore delta report against a baseline evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementDiff {
    pub combined: CombinedDiff,
    pub detectors: Vec<DetectorDiff>,
}
