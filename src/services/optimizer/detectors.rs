//! Explicit script detectors.
//!
//! Each detector scores one standalone retention signal in [0, 100] against
//! its target and carries evidence strings plus prewritten edit moves.

use crate::models::{DetectorKey, DetectorResult, FormatType};

use super::transcript::{clip, clip100, round1, SyntheticTranscript};

const VALUE_TOKENS: [&str; 14] = [
    "grew", "grow", "proof", "results", "result", "tested", "secret", "mistake", "step", "how",
    "why", "save", "boost", "win",
];
const OPEN_LOOP_PHRASES: [&str; 6] = [
    "in a second",
    "by the end",
    "stick around",
    "coming up",
    "wait for it",
    "in a few seconds",
];
const DEAD_ZONE_GAP_SECONDS: f64 = 6.0;
const CTA_INTENTS: [(&str, &[&str]); 6] = [
    ("comment", &["comment"]),
    ("save", &["save", "bookmark"]),
    ("share", &["share", "send this"]),
    ("follow", &["follow"]),
    ("subscribe", &["subscribe"]),
    ("link", &["link in bio", "link below", "description"]),
];

fn detector(
    key: DetectorKey,
    score: f64,
    count: Option<i64>,
    evidence: Vec<String>,
    edits: Vec<String>,
) -> DetectorResult {
    let score = round1(clip100(score));
    let target = key.target_score();
    DetectorResult {
        detector_key: key,
        label: key.label().to_string(),
        score,
        target_score: target,
        gap: round1((target - score).max(0.0)),
        count,
        evidence,
        edits,
    }
}

/// Seconds until a claim/outcome word first appears; penalized linearly.
fn detect_time_to_value(transcript: &SyntheticTranscript) -> DetectorResult {
    let onset = transcript.segments.iter().find_map(|segment| {
        let lower = segment.text.to_lowercase();
        VALUE_TOKENS
            .iter()
            .any(|token| lower.split_whitespace().any(|word| {
                word.trim_matches(|c: char| !c.is_alphanumeric()) == *token
            }) || lower.contains(token))
            .then_some(segment.start)
    });

    match onset {
        Some(start) => {
            let score = clip(100.0 - (start - 1.0).max(0.0) * 12.0, 10.0, 100.0);
            detector(
                DetectorKey::TimeToValue,
                score,
                None,
                vec![format!(
                    "First claim/outcome word lands at {:.1}s into the script.",
                    start
                )],
                vec![
                    "Move the measurable outcome into the first sentence.".to_string(),
                    "Attach the proof point to the same line as the claim.".to_string(),
                ],
            )
        }
        None => detector(
            DetectorKey::TimeToValue,
            10.0,
            None,
            vec!["No claim/outcome word found anywhere in the script.".to_string()],
            vec![
                "Open with a concrete result (numbers beat adjectives).".to_string(),
                "State what the viewer gets before any setup.".to_string(),
            ],
        ),
    }
}

/// Teaser-phrase count in the body; score rises with count, capped.
fn detect_open_loops(transcript: &SyntheticTranscript) -> DetectorResult {
    let lower = transcript.text.to_lowercase();
    let count = OPEN_LOOP_PHRASES
        .iter()
        .map(|phrase| lower.matches(phrase).count())
        .sum::<usize>() as i64;

    let score = clip(40.0 + count as f64 * 18.0, 40.0, 95.0);
    let evidence = if count > 0 {
        vec![format!("{} open-loop teaser phrase(s) detected.", count)]
    } else {
        vec!["No open-loop teaser found before the payoff.".to_string()]
    };
    detector(
        DetectorKey::OpenLoops,
        score,
        Some(count),
        evidence,
        vec![
            "Tease the payoff early: 'in a second I will show the exact line'.".to_string(),
            "Close every loop you open before the CTA.".to_string(),
        ],
    )
}

/// Silent windows >= 6 s between segment ends; count inversely penalized.
fn detect_dead_zones(transcript: &SyntheticTranscript, duration_s: i64) -> DetectorResult {
    let mut count = 0i64;
    let mut longest_gap = 0.0f64;
    for window in transcript.segments.windows(2) {
        let gap = window[1].start - window[0].end;
        if gap >= DEAD_ZONE_GAP_SECONDS {
            count += 1;
            longest_gap = longest_gap.max(gap);
        }
    }
    // A single segment stretched over a long runtime is its own dead zone.
    for segment in &transcript.segments {
        let span = segment.end - segment.start;
        if span >= DEAD_ZONE_GAP_SECONDS * 2.0 && duration_s > 0 {
            count += 1;
            longest_gap = longest_gap.max(span);
        }
    }

    let score = clip(92.0 - count as f64 * 16.0, 20.0, 92.0);
    let evidence = if count > 0 {
        vec![format!(
            "{} content window(s) run {:.0}s+ without a new beat (longest {:.1}s).",
            count, DEAD_ZONE_GAP_SECONDS, longest_gap
        )]
    } else {
        vec!["No dead zones: every beat lands within 6s of the previous one.".to_string()]
    };
    detector(
        DetectorKey::DeadZones,
        score,
        Some(count),
        evidence,
        vec![
            "Split long lines into two shorter beats.".to_string(),
            "Attach a visual cue to every beat so nothing idles.".to_string(),
        ],
    )
}

/// Transition/emphasis markers relative to the ideal cadence for the format.
fn detect_pattern_interrupts(
    transcript: &SyntheticTranscript,
    duration_s: i64,
    format_type: FormatType,
) -> DetectorResult {
    let lower = transcript.text.to_lowercase();
    let but_count = lower
        .split_whitespace()
        .filter(|word| word.trim_matches(|c: char| !c.is_alphanumeric()) == "but")
        .count();
    let question_count = transcript
        .segments
        .iter()
        .filter(|segment| segment.text.contains('?'))
        .count();
    let step_count = lower.matches("step").count()
        + ["first", "second", "third"]
            .iter()
            .map(|word| lower.matches(word).count())
            .sum::<usize>()
        + transcript
            .segments
            .iter()
            .filter(|segment| {
                segment
                    .text
                    .trim_start()
                    .chars()
                    .next()
                    .map(|ch| ch.is_ascii_digit())
                    .unwrap_or(false)
            })
            .count();
    let count = (but_count + question_count + step_count) as i64;

    let cadence_seconds = match format_type {
        FormatType::ShortForm | FormatType::Unknown => 10.0,
        FormatType::LongForm => 25.0,
    };
    let ideal = (duration_s.max(1) as f64 / cadence_seconds).max(1.0);
    let ratio = count as f64 / ideal;
    let score = clip(45.0 + 50.0 * ratio.min(1.0) - 8.0 * (ratio - 1.6).max(0.0), 25.0, 95.0);

    detector(
        DetectorKey::PatternInterrupts,
        score,
        Some(count),
        vec![format!(
            "{} interrupt marker(s) vs an ideal of ~{:.0} for this length.",
            count,
            ideal.ceil()
        )],
        vec![
            "Add a contrast beat ('but here is the catch') near likely drops.".to_string(),
            "Number the steps so each one resets attention.".to_string(),
        ],
    )
}

/// Presence AND uniqueness of a single CTA intent at the tail.
fn detect_cta_style(transcript: &SyntheticTranscript) -> DetectorResult {
    let tail_window = transcript.segments.len().saturating_sub(2);
    let tail_text = transcript.segments[tail_window..]
        .iter()
        .map(|segment| segment.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let full_text = transcript.text.to_lowercase();

    let intent_hits = |haystack: &str| -> Vec<&'static str> {
        CTA_INTENTS
            .iter()
            .filter(|(_, tokens)| tokens.iter().any(|token| haystack.contains(token)))
            .map(|(intent, _)| *intent)
            .collect()
    };
    let tail_intents = intent_hits(&tail_text);
    let all_intents = intent_hits(&full_text);

    let (score, evidence) = match (tail_intents.len(), all_intents.len()) {
        (1, 1) => (
            88.0,
            format!("Single '{}' CTA intent at the tail.", tail_intents[0]),
        ),
        (1, _) => (
            72.0,
            "Tail CTA is clear but extra CTA intents appear earlier in the script.".to_string(),
        ),
        (0, 0) => (35.0, "No CTA intent found in the script.".to_string()),
        (0, _) => (
            58.0,
            "CTA intent exists but is buried before the tail.".to_string(),
        ),
        (_, _) => (
            55.0,
            format!("{} competing CTA intents at the tail.", tail_intents.len()),
        ),
    };

    detector(
        DetectorKey::CtaStyle,
        score,
        Some(all_intents.len() as i64),
        vec![evidence],
        vec![
            "Keep exactly one CTA intent and place it in the final line.".to_string(),
            "Tie the CTA to the promise made in the hook.".to_string(),
        ],
    )
}

/// Run all five detectors over a transcript + analysis pair.
pub fn extract_detectors(
    transcript: &SyntheticTranscript,
    duration_s: i64,
) -> Vec<DetectorResult> {
    let format_type = FormatType::from_duration(duration_s);
    vec![
        detect_time_to_value(transcript),
        detect_open_loops(transcript),
        detect_dead_zones(transcript, duration_s),
        detect_pattern_interrupts(transcript, duration_s, format_type),
        detect_cta_style(transcript),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::optimizer::transcript::build_transcript;

    fn transcript_for(script: &str, duration: i64) -> SyntheticTranscript {
        build_transcript(script, duration)
    }

    #[test]
    fn all_five_detectors_report() {
        let transcript = transcript_for(
            "I grew from zero to 100k.\nIn a second I will show the proof.\nHere are the 3 steps.\nComment if you want part 2.",
            30,
        );
        let detectors = extract_detectors(&transcript, 30);
        assert_eq!(detectors.len(), 5);
        let keys: Vec<DetectorKey> = detectors.iter().map(|d| d.detector_key).collect();
        assert!(keys.contains(&DetectorKey::TimeToValue));
        assert!(keys.contains(&DetectorKey::OpenLoops));
        assert!(keys.contains(&DetectorKey::DeadZones));
        assert!(keys.contains(&DetectorKey::PatternInterrupts));
        assert!(keys.contains(&DetectorKey::CtaStyle));
    }

    #[test]
    fn open_loops_counts_teasers() {
        let transcript = transcript_for(
            "Big claim first.\nIn a second I will show the fix.\nStick around for the template.\nComment PLAN.",
            30,
        );
        let detectors = extract_detectors(&transcript, 30);
        let open_loops = detectors
            .iter()
            .find(|d| d.detector_key == DetectorKey::OpenLoops)
            .unwrap();
        assert!(open_loops.count.unwrap() >= 2);
        assert!(open_loops.score > 70.0);
    }

    #[test]
    fn early_value_scores_high() {
        let early = transcript_for("I grew 100k followers fast.\nMore detail.\nComment now.", 30);
        let detectors = extract_detectors(&early, 30);
        let ttv = detectors
            .iter()
            .find(|d| d.detector_key == DetectorKey::TimeToValue)
            .unwrap();
        assert!(ttv.score >= 90.0);
        assert!(ttv.gap <= 0.1 || ttv.gap < ttv.target_score);
    }

    #[test]
    fn missing_cta_scores_low() {
        let transcript = transcript_for("A claim with proof.\nSome body.\nA quiet ending.", 30);
        let detectors = extract_detectors(&transcript, 30);
        let cta = detectors
            .iter()
            .find(|d| d.detector_key == DetectorKey::CtaStyle)
            .unwrap();
        assert!(cta.score <= 40.0);
        assert!(cta.gap > 0.0);
    }

    #[test]
    fn detector_scores_are_bounded() {
        let transcript = transcript_for("word", 900);
        for d in extract_detectors(&transcript, 900) {
            assert!((0.0..=100.0).contains(&d.score));
            assert!(d.gap >= 0.0);
        }
    }
}
