//! Synthetic transcript construction from a raw script.
//!
//! The script is split into lines (newline-preferred, sentence-split
//! fallback) and `duration_s` is distributed across them proportional to
//! token count with a 1.5 s per-segment floor.

use serde::{Deserialize, Serialize};

pub const MIN_SEGMENT_SECONDS: f64 = 1.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticTranscript {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .count()
}

/// Split a script into content lines. Single-line scripts fall back to a
/// sentence split on `.?!`.
pub fn split_lines(script_text: &str) -> Vec<String> {
    let rows: Vec<String> = script_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if rows.len() > 1 || (rows.len() == 1 && !script_text.trim().is_empty() && script_text.contains('\n')) {
        return rows;
    }
    if !rows.is_empty() && rows.len() == 1 {
        let sentences: Vec<String> = split_sentences(&rows[0]);
        if sentences.len() > 1 {
            return sentences;
        }
        return rows;
    }
    split_sentences(script_text)
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Build the synthetic transcript for a script over `duration_s` seconds.
pub fn build_transcript(script_text: &str, duration_s: i64) -> SyntheticTranscript {
    let mut lines = split_lines(script_text);
    if lines.is_empty() {
        lines = vec![
            "Start with your strongest claim.".to_string(),
            "Deliver one proof point.".to_string(),
            "Close with one CTA.".to_string(),
        ];
    }

    let duration = duration_s.max(1) as f64;
    let weights: Vec<f64> = lines
        .iter()
        .map(|line| word_count(line).max(1) as f64)
        .collect();
    let total_weight: f64 = weights.iter().sum::<f64>().max(1.0);

    let mut segments = Vec::with_capacity(lines.len());
    let mut cursor = 0.0f64;
    let last_idx = lines.len() - 1;
    for (idx, line) in lines.iter().enumerate() {
        let weight = weights[idx] / total_weight;
        let mut end = if idx == last_idx {
            duration
        } else {
            (cursor + (duration * weight).max(MIN_SEGMENT_SECONDS)).min(duration)
        };
        if end <= cursor {
            end = (cursor + MIN_SEGMENT_SECONDS).min(duration);
        }
        segments.push(TranscriptSegment {
            start: round2(cursor),
            end: round2(end),
            text: line.clone(),
        });
        cursor = end;
    }
    if let Some(last) = segments.last_mut() {
        last.end = duration;
    }

    SyntheticTranscript {
        text: lines.join(" "),
        segments,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn clip(value: f64, low: f64, high: f64) -> f64 {
    value.clamp(low, high)
}

pub fn clip100(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiline_scripts_split_on_newlines() {
        let lines = split_lines("Hook line.\nBody line.\nCTA line.");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Hook line.");
    }

    #[test]
    fn single_line_scripts_split_on_sentences() {
        let lines = split_lines("First claim. Then proof! Finally a question?");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "Finally a question?");
    }

    #[test]
    fn transcript_spans_full_duration() {
        let transcript = build_transcript("One.\nTwo.\nThree.", 30);
        assert_eq!(transcript.segments.len(), 3);
        assert_eq!(transcript.segments[0].start, 0.0);
        assert_eq!(transcript.segments.last().unwrap().end, 30.0);
        for window in transcript.segments.windows(2) {
            assert!(window[1].start >= window[0].start);
        }
    }

    #[test]
    fn empty_script_gets_placeholder_lines() {
        let transcript = build_transcript("", 30);
        assert_eq!(transcript.segments.len(), 3);
    }

    #[test]
    fn segments_respect_min_duration() {
        let transcript = build_transcript("a\nbbbbb bbbbb bbbbb bbbbb bbbbb\nc", 30);
        for segment in &transcript.segments {
            assert!(segment.end - segment.start >= 1.0);
        }
    }
}
