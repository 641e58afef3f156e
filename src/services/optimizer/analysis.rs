//! Simulated multimodal analysis for script-only evaluation.

use crate::models::{AuditResult, AuditSection, Platform};

use super::transcript::{clip100, round2, split_lines, word_count};

const HOOK_CURIOSITY_TOKENS: [&str; 7] = ["how", "why", "secret", "mistake", "stop", "boost", "grow"];
const HOOK_PROOF_TOKENS: [&str; 5] = ["i tested", "i grew", "we tried", "proof", "results"];
const CTA_DIRECT_TOKENS: [&str; 5] = ["comment", "save", "share", "follow", "subscribe"];
const CTA_INDIRECT_TOKENS: [&str; 3] = ["link", "bio", "description"];

pub fn score_hook_quality(first_line: &str) -> f64 {
    let line = first_line.to_lowercase();
    let mut score = 58.0;
    if HOOK_CURIOSITY_TOKENS.iter().any(|token| line.contains(token)) {
        score += 12.0;
    }
    if HOOK_PROOF_TOKENS.iter().any(|token| line.contains(token)) {
        score += 14.0;
    }
    if line.chars().any(|ch| ch.is_ascii_digit()) {
        score += 6.0;
    }
    clip100(score)
}

pub fn score_body_quality(lines: &[String], duration_s: i64) -> f64 {
    let line_count = lines.len().max(1) as f64;
    let info_density =
        lines.iter().map(|line| word_count(line) as f64).sum::<f64>() / line_count;
    let cadence = lines.len() as f64 / (duration_s as f64 / 15.0).max(1.0);
    clip100(50.0 + (info_density / 2.5).min(22.0) + (cadence * 8.0).min(18.0))
}

pub fn score_cta_quality(script_text: &str) -> f64 {
    let lower = script_text.to_lowercase();
    if CTA_DIRECT_TOKENS.iter().any(|token| lower.contains(token)) {
        82.0
    } else if CTA_INDIRECT_TOKENS.iter().any(|token| lower.contains(token)) {
        74.0
    } else {
        42.0
    }
}

/// Build the simulated analysis a real multimodal pass would have produced
/// for this script.
pub fn build_video_analysis(script_text: &str, duration_s: i64, platform: Platform) -> AuditResult {
    let lines = split_lines(script_text);
    let first_line = lines.first().cloned().unwrap_or_else(|| script_text.to_string());
    let hook_score = score_hook_quality(&first_line);
    let body_score = score_body_quality(&lines, duration_s);
    let cta_score = score_cta_quality(script_text);

    let overall_score_100 = hook_score * 0.45 + body_score * 0.35 + cta_score * 0.20;

    AuditResult {
        video_id: "script_simulation".to_string(),
        overall_score: round2(overall_score_100 / 10.0),
        summary: format!(
            "Script-only simulation for {}. Rescore improves as hook clarity, pacing cadence, and CTA specificity improve.",
            platform
        ),
        sections: vec![
            AuditSection {
                name: "Hook".to_string(),
                score: round2(hook_score / 10.0),
                feedback: Vec::new(),
            },
            AuditSection {
                name: "Body/Pacing".to_string(),
                score: round2(body_score / 10.0),
                feedback: Vec::new(),
            },
            AuditSection {
                name: "CTA".to_string(),
                score: round2(cta_score / 10.0),
                feedback: Vec::new(),
            },
        ],
        timestamp_feedback: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_score_awards_curiosity_proof_and_digits() {
        assert_eq!(score_hook_quality("A plain opener"), 58.0);
        assert_eq!(score_hook_quality("how to win"), 70.0);
        assert_eq!(score_hook_quality("I tested how to win"), 84.0);
        assert_eq!(score_hook_quality("I tested how 3 creators win"), 90.0);
    }

    #[test]
    fn cta_tiers() {
        assert_eq!(score_cta_quality("please comment below"), 82.0);
        assert_eq!(score_cta_quality("link in bio"), 74.0);
        assert_eq!(score_cta_quality("that is all"), 42.0);
    }

    #[test]
    fn analysis_sections_are_three_fixed_names() {
        let analysis = build_video_analysis("Hook.\nBody.\nComment now.", 30, Platform::Youtube);
        let names: Vec<&str> = analysis.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Hook", "Body/Pacing", "CTA"]);
        assert!(analysis.overall_score > 0.0 && analysis.overall_score <= 10.0);
    }
}
