//! Three-variant script generation: AI-first with deterministic fallbacks
//! per style.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{Platform, StyleKey, VariantStructure};
use crate::services::multimodal::LlmClient;

pub const DEFAULT_GENERATION_MODE: &str = "ai_first_fallback";
const VARIANT_MODEL: &str = "gpt-4o";

/// Inputs shared by all three variant generations.
#[derive(Debug, Clone)]
pub struct VariantBrief {
    pub topic: String,
    pub audience: String,
    pub objective: String,
    pub tone: String,
    pub platform: Platform,
    pub duration_s: i64,
    pub hook_style: Option<String>,
    pub cta_style: Option<String>,
    pub pacing_density: Option<String>,
    pub source_context: Option<Value>,
}

/// One generated script before scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedVariant {
    pub style_key: StyleKey,
    pub label: String,
    pub rationale: String,
    pub script_text: String,
    pub structure: VariantStructure,
}

/// How the batch was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMeta {
    pub mode: String,
    pub provider: String,
    pub model: String,
    pub used_fallback: bool,
    pub fallback_reason: Option<String>,
}

fn platform_cta(platform: Platform) -> &'static str {
    match platform {
        Platform::Youtube => "Comment 'PLAN' and I will post the exact template.",
        Platform::Instagram => "Save this and send it to one creator who needs it.",
        Platform::Tiktok => "Follow for part two and comment your niche.",
    }
}

fn tone_prefix(tone: &str) -> &'static str {
    match tone.trim().to_lowercase().as_str() {
        "bold" => "Straight truth:",
        "expert" => "Data-backed insight:",
        _ => "Quick take:",
    }
}

/// Deterministic template for one style. These are the scripts users see
/// whenever the provider is missing or returns a malformed variant.
pub fn fallback_variant(style_key: StyleKey, brief: &VariantBrief) -> GeneratedVariant {
    let cta = platform_cta(brief.platform).to_string();
    let prefix = tone_prefix(&brief.tone);
    let topic = &brief.topic;
    let audience = &brief.audience;
    let objective = &brief.objective;
    let duration = brief.duration_s;

    let (hook, setup, value_lines, rationale) = match style_key {
        StyleKey::VariantA => (
            format!("{prefix} I used this {topic} play and saw measurable lift."),
            format!("In {duration} seconds, I will show the 3-step framework for {audience}."),
            vec![
                "Step 1: Lead with outcome + proof in the first sentence.".to_string(),
                "Step 2: Cut dead space and add a pattern interrupt before every likely drop."
                    .to_string(),
                format!("Step 3: Close with one CTA tied to {objective}."),
            ],
            "Best for direct authority and fast proof.",
        ),
        StyleKey::VariantB => (
            format!("Most creators miss this {topic} signal and lose reach in the first 3 seconds."),
            "Stay to the end because I will show the exact fix and where to place it.".to_string(),
            vec![
                "Open loop: call out the hidden mistake before giving the fix.".to_string(),
                "Deliver one concrete proof point and one copyable line.".to_string(),
                format!("Then use a single CTA that supports {objective}."),
            ],
            "Best for curiosity-driven retention and completion.",
        ),
        StyleKey::VariantC => (
            format!("Stop copying viral formats blindly; your {topic} strategy needs this switch."),
            "Contrarian claim: shorter setup, earlier payoff, and fewer CTA asks outperform more editing tricks."
                .to_string(),
            vec![
                format!("For {audience}, run this sequence: claim -> proof -> 2 steps -> CTA."),
                "Use one strong visual interrupt where most viewers drop.".to_string(),
                format!("Measure success by {objective}, not by vanity spikes."),
            ],
            "Best for differentiated positioning and share triggers.",
        ),
    };

    let mut lines = vec![hook.clone(), setup.clone()];
    lines.extend(value_lines.iter().cloned());
    lines.push(cta.clone());

    GeneratedVariant {
        style_key,
        label: style_key.label().to_string(),
        rationale: rationale.to_string(),
        script_text: lines.join("\n"),
        structure: VariantStructure {
            hook,
            setup,
            value: value_lines.join(" "),
            cta,
        },
    }
}

fn style_instructions(style_key: StyleKey) -> &'static str {
    match style_key {
        StyleKey::VariantA => "Outcome+Proof: lead with concrete claim + evidence quickly.",
        StyleKey::VariantB => "Curiosity Gap: open loop in first 2 lines, then close the loop with proof.",
        StyleKey::VariantC => "Contrarian Take: challenge common advice and present a clear alternative.",
    }
}

fn variant_prompt(brief: &VariantBrief) -> String {
    format!(
        r#"Generate EXACTLY 3 social video scripts in JSON only.
Topic: {topic}
Audience: {audience}
Objective: {objective}
Platform: {platform}
Duration seconds: {duration}
Tone: {tone}
Hook style override: {hook_style}
CTA style override: {cta_style}
Pacing density override: {pacing}
Source context: {context}
Variant strategy constraints:
- variant_a: {a}
- variant_b: {b}
- variant_c: {c}
Return schema:
{{
  "variants": [
    {{
      "style_key": "variant_a|variant_b|variant_c",
      "hook": "string",
      "setup": "string",
      "value": "string",
      "cta": "string",
      "script_text": "string",
      "rationale": "string"
    }}
  ]
}}
Rules: distinct strategies, no markdown, no extra keys outside schema."#,
        topic = brief.topic,
        audience = brief.audience,
        objective = brief.objective,
        platform = brief.platform,
        duration = brief.duration_s,
        tone = brief.tone,
        hook_style = brief.hook_style.as_deref().unwrap_or("none"),
        cta_style = brief.cta_style.as_deref().unwrap_or("none"),
        pacing = brief.pacing_density.as_deref().unwrap_or("none"),
        context = brief
            .source_context
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "{}".to_string()),
        a = style_instructions(StyleKey::VariantA),
        b = style_instructions(StyleKey::VariantB),
        c = style_instructions(StyleKey::VariantC),
    )
}

fn non_empty(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Merge a raw AI variant with its style fallback field-by-field.
fn variant_from_ai(style_key: StyleKey, raw: &Value, fallback: &GeneratedVariant) -> GeneratedVariant {
    let hook = non_empty(raw, "hook").unwrap_or_else(|| fallback.structure.hook.clone());
    let setup = non_empty(raw, "setup").unwrap_or_else(|| fallback.structure.setup.clone());
    let value = non_empty(raw, "value").unwrap_or_else(|| fallback.structure.value.clone());
    let cta = non_empty(raw, "cta").unwrap_or_else(|| fallback.structure.cta.clone());
    let mut script_text = non_empty(raw, "script_text")
        .unwrap_or_else(|| [&hook, &setup, &value, &cta].map(|s| s.as_str()).join("\n"));
    if script_text.len() < 20 {
        script_text = fallback.script_text.clone();
    }

    GeneratedVariant {
        style_key,
        label: fallback.label.clone(),
        rationale: non_empty(raw, "rationale").unwrap_or_else(|| fallback.rationale.clone()),
        script_text,
        structure: VariantStructure {
            hook,
            setup,
            value,
            cta,
        },
    }
}

fn all_fallbacks(brief: &VariantBrief) -> Vec<GeneratedVariant> {
    StyleKey::ALL
        .iter()
        .map(|style| fallback_variant(*style, brief))
        .collect()
}

/// AI-first generation with per-style fallback substitution. Never fails:
/// provider errors collapse to the full deterministic set.
pub async fn generate_raw_variants(
    client: &LlmClient,
    brief: &VariantBrief,
) -> (Vec<GeneratedVariant>, GenerationMeta) {
    let fallbacks = all_fallbacks(brief);

    if !client.is_live() {
        return (
            fallbacks,
            GenerationMeta {
                mode: DEFAULT_GENERATION_MODE.to_string(),
                provider: "deterministic".to_string(),
                model: "deterministic-v1".to_string(),
                used_fallback: true,
                fallback_reason: Some("provider key missing or unavailable".to_string()),
            },
        );
    }

    let messages = json!([{"role": "user", "content": variant_prompt(brief)}]);
    match client.chat_json(VARIANT_MODEL, messages, None).await {
        Ok(parsed) => {
            let raw_variants = parsed
                .get("variants")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            let mut variants = Vec::with_capacity(3);
            let mut fallback_reasons = Vec::new();
            for (idx, style) in StyleKey::ALL.iter().enumerate() {
                let raw = raw_variants.iter().find(|item| {
                    item.get("style_key")
                        .and_then(|v| v.as_str())
                        .and_then(StyleKey::parse)
                        == Some(*style)
                });
                match raw {
                    Some(raw) => variants.push(variant_from_ai(*style, raw, &fallbacks[idx])),
                    None => {
                        fallback_reasons.push(format!("missing_{}", style));
                        variants.push(fallbacks[idx].clone());
                    }
                }
            }

            let used_fallback = !fallback_reasons.is_empty();
            (
                variants,
                GenerationMeta {
                    mode: DEFAULT_GENERATION_MODE.to_string(),
                    provider: "openai".to_string(),
                    model: VARIANT_MODEL.to_string(),
                    used_fallback,
                    fallback_reason: used_fallback.then(|| fallback_reasons.join(", ")),
                },
            )
        }
        Err(err) => {
            tracing::warn!(error = %err, "variant AI generation fell back");
            (
                fallbacks,
                GenerationMeta {
                    mode: DEFAULT_GENERATION_MODE.to_string(),
                    provider: "deterministic".to_string(),
                    model: "deterministic-v1".to_string(),
                    used_fallback: true,
                    fallback_reason: Some(format!("provider_error: {err}")),
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief() -> VariantBrief {
        VariantBrief {
            topic: "AI News hooks".to_string(),
            audience: "solo creators".to_string(),
            objective: "higher retention and shares".to_string(),
            tone: "bold".to_string(),
            platform: Platform::Youtube,
            duration_s: 40,
            hook_style: None,
            cta_style: None,
            pacing_density: None,
            source_context: None,
        }
    }

    #[test]
    fn fallback_variants_are_distinct_per_style() {
        let brief = brief();
        let a = fallback_variant(StyleKey::VariantA, &brief);
        let b = fallback_variant(StyleKey::VariantB, &brief);
        let c = fallback_variant(StyleKey::VariantC, &brief);
        assert_ne!(a.script_text, b.script_text);
        assert_ne!(b.script_text, c.script_text);
        assert!(a.script_text.len() >= 20);
        assert!(a.script_text.contains("Step 1"));
        assert!(c.structure.hook.contains("Stop copying"));
    }

    #[test]
    fn ai_variant_falls_back_field_by_field() {
        let brief = brief();
        let fallback = fallback_variant(StyleKey::VariantA, &brief);
        let raw = json!({
            "style_key": "variant_a",
            "hook": "A custom hook with numbers: 312% lift.",
            "script_text": "tiny"
        });
        let merged = variant_from_ai(StyleKey::VariantA, &raw, &fallback);
        assert_eq!(merged.structure.hook, "A custom hook with numbers: 312% lift.");
        assert_eq!(merged.structure.setup, fallback.structure.setup);
        // script_text below 20 chars reverts to the fallback script
        assert_eq!(merged.script_text, fallback.script_text);
    }
}
