//! Multimodal LLM provider client and deterministic fallbacks.

use base64::Engine as _;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use crate::config::ProviderConfig;
use crate::error::{AppError, Result};
use crate::models::{AuditResult, AuditSection, TimestampFeedback};
use crate::services::optimizer::transcript::{SyntheticTranscript, TranscriptSegment};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const ANALYSIS_MODEL: &str = "gpt-4o";
const MAX_ANALYSIS_FRAMES: usize = 10;
const TRANSCRIPT_PROMPT_CHAR_LIMIT: usize = 10_000;

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_config(providers: &ProviderConfig) -> Self {
        let api_key = providers
            .openai_key_usable()
            .then(|| providers.openai_api_key.trim().to_string());
        Self {
            http: reqwest::Client::new(),
            api_key,
        }
    }

    /// True when a real provider key is configured (placeholders excluded).
    pub fn is_live(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AppError::ServiceUnavailable("LLM provider not configured.".into()))
    }

    /// JSON-mode chat completion; returns the parsed content object.
    pub async fn chat_json(
        &self,
        model: &str,
        messages: Value,
        max_tokens: Option<u32>,
    ) -> Result<Value> {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "response_format": {"type": "json_object"},
        });
        if let Some(max_tokens) = max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .http
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(self.api_key()?)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::ServiceUnavailable(format!("LLM provider unreachable: {err}")))?;
        if !response.status().is_success() {
            return Err(AppError::ServiceUnavailable(format!(
                "LLM provider error: {}",
                response.status()
            )));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| AppError::ServiceUnavailable(format!("LLM bad payload: {err}")))?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("{}");
        serde_json::from_str(content)
            .map_err(|err| AppError::ServiceUnavailable(format!("LLM returned non-JSON: {err}")))
    }

    /// Verbose-JSON transcription with segment timestamps.
    pub async fn transcribe(&self, audio_path: &Path) -> Result<SyntheticTranscript> {
        let bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.mp3".to_string());
        let form = reqwest::multipart::Form::new()
            .text("model", "whisper-1")
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment")
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let response = self
            .http
            .post(TRANSCRIPTIONS_URL)
            .bearer_auth(self.api_key()?)
            .multipart(form)
            .send()
            .await
            .map_err(|err| AppError::ServiceUnavailable(format!("Transcription unreachable: {err}")))?;
        if !response.status().is_success() {
            return Err(AppError::ServiceUnavailable(format!(
                "Transcription error: {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| AppError::ServiceUnavailable(format!("Transcription bad payload: {err}")))?;
        let segments = payload["segments"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| TranscriptSegment {
                        start: row["start"].as_f64().unwrap_or(0.0),
                        end: row["end"].as_f64().unwrap_or(0.0),
                        text: row["text"].as_str().unwrap_or_default().trim().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(SyntheticTranscript {
            text: payload["text"].as_str().unwrap_or_default().to_string(),
            segments,
        })
    }
}

fn encode_image(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Uniformly sample at most 10 frames (stride = count / 10).
pub fn sample_frames(frames: &[PathBuf]) -> Vec<PathBuf> {
    if frames.len() <= MAX_ANALYSIS_FRAMES {
        return frames.to_vec();
    }
    let step = frames.len() / MAX_ANALYSIS_FRAMES;
    frames
        .iter()
        .step_by(step.max(1))
        .take(MAX_ANALYSIS_FRAMES)
        .cloned()
        .collect()
}

/// Render the transcript as `[MM:SS] text` lines, truncated to the prompt
/// budget.
pub fn format_transcript_for_prompt(transcript: &SyntheticTranscript) -> String {
    let mut text = String::new();
    if transcript.segments.is_empty() {
        text = transcript.text.clone();
    } else {
        for segment in &transcript.segments {
            let start = segment.start.max(0.0) as i64;
            text.push_str(&format!(
                "[{:02}:{:02}] {}\n",
                start / 60,
                start % 60,
                segment.text
            ));
        }
    }
    if text.len() > TRANSCRIPT_PROMPT_CHAR_LIMIT {
        let mut cut = TRANSCRIPT_PROMPT_CHAR_LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...(truncated)");
    }
    text
}

const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an expert video strategist and editor.
Analyze the provided video frames and transcript to give actionable feedback.

Focus on:
1. The "Hook" (0-30s): Is it visually engaging? Does the audio match?
2. Pacing: Are there visual changes? Is the speech engaging?
3. Retention Killers: Identify boring visual sections or confusing audio.

Return the analysis as a strict JSON object matching this schema:
{
  "video_id": "string",
  "overall_score": 0-10,
  "summary": "string",
  "sections": [
    {"name": "Intro", "score": 0-10, "feedback": ["string"]}
  ],
  "timestamp_feedback": [
    {
      "timestamp": "MM:SS",
      "category": "Hook|Pacing|Visuals|Audio",
      "observation": "string",
      "impact": "Positive|Negative|Neutral",
      "suggestion": "string"
    }
  ]
}"#;

/// Deterministic fallback analysis: scores vary with transcript length so
/// tests remain stable without a provider.
pub fn fallback_analysis(video_id: &str, transcript_text: &str) -> AuditResult {
    let transcript_length = transcript_text.len();
    let intro_score: f64 = if transcript_length > 40 { 7.0 } else { 6.0 };
    let content_score: f64 = if transcript_length > 120 { 8.0 } else { 7.0 };

    AuditResult {
        video_id: video_id.to_string(),
        overall_score: ((intro_score + content_score) / 2.0).round(),
        summary: "Local fallback analysis: visuals are clear, but stronger pacing and hook clarity would improve retention.".to_string(),
        sections: vec![
            AuditSection {
                name: "Intro".to_string(),
                score: intro_score,
                feedback: vec![
                    "Hook is understandable but could be sharper in first 3 seconds.".to_string(),
                ],
            },
            AuditSection {
                name: "Content".to_string(),
                score: content_score,
                feedback: vec![
                    "Narration is clear; add faster visual changes to keep momentum.".to_string(),
                ],
            },
        ],
        timestamp_feedback: vec![TimestampFeedback {
            timestamp: "00:05".to_string(),
            category: "Visuals".to_string(),
            observation: "Scene remains static for too long.".to_string(),
            impact: "Negative".to_string(),
            suggestion: Some(
                "Add a cutaway/B-roll insert by 00:05 to re-capture attention.".to_string(),
            ),
        }],
    }
}

/// Run the multimodal analysis over sampled frames + transcript. Provider
/// absence produces the deterministic fallback instead of an error.
pub async fn analyze_content(
    client: &LlmClient,
    frames: &[PathBuf],
    transcript: &SyntheticTranscript,
    video_id: &str,
    video_title: &str,
) -> Result<AuditResult> {
    let transcript_text = format_transcript_for_prompt(transcript);

    if !client.is_live() {
        tracing::warn!("using fallback multimodal analysis: provider key missing");
        return Ok(fallback_analysis(video_id, &transcript_text));
    }

    let selected = sample_frames(frames);
    let mut user_parts = vec![json!({
        "type": "text",
        "text": format!(
            "Analyze this video:\nTitle: {}\n\nTranscript:\n{}\n\nVisual keyframes (sampled):",
            video_title, transcript_text
        ),
    })];
    for frame in &selected {
        let encoded = encode_image(frame)?;
        user_parts.push(json!({
            "type": "image_url",
            "image_url": {"url": format!("data:image/jpeg;base64,{}", encoded)},
        }));
    }

    let messages = json!([
        {"role": "system", "content": ANALYSIS_SYSTEM_PROMPT},
        {"role": "user", "content": user_parts},
    ]);

    let mut parsed = client.chat_json(ANALYSIS_MODEL, messages, Some(2000)).await?;
    parsed["video_id"] = json!(video_id);
    serde_json::from_value::<AuditResult>(parsed)
        .map_err(|err| AppError::ServiceUnavailable(format!("LLM analysis schema mismatch: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_at_most_ten_frames_uniformly() {
        let frames: Vec<PathBuf> = (0..47).map(|i| PathBuf::from(format!("f{i:04}.jpg"))).collect();
        let sampled = sample_frames(&frames);
        assert_eq!(sampled.len(), 10);
        assert_eq!(sampled[0], frames[0]);
        // stride = 47 / 10 = 4
        assert_eq!(sampled[1], frames[4]);
    }

    #[test]
    fn fallback_analysis_varies_with_transcript_length() {
        let short = fallback_analysis("v", "short");
        let long = fallback_analysis("v", &"word ".repeat(60));
        assert!(long.overall_score >= short.overall_score);
        assert_eq!(short.sections.len(), 2);
        assert_eq!(short.timestamp_feedback.len(), 1);
    }

    #[test]
    fn transcript_prompt_uses_mm_ss_stamps() {
        let transcript = SyntheticTranscript {
            text: "a b".into(),
            segments: vec![
                TranscriptSegment { start: 0.0, end: 5.0, text: "a".into() },
                TranscriptSegment { start: 65.0, end: 70.0, text: "b".into() },
            ],
        };
        let formatted = format_transcript_for_prompt(&transcript);
        assert!(formatted.contains("[00:00] a"));
        assert!(formatted.contains("[01:05] b"));
    }

    #[test]
    fn transcript_prompt_truncates_to_budget() {
        let transcript = SyntheticTranscript {
            text: "x".repeat(20_000),
            segments: vec![],
        };
        let formatted = format_transcript_for_prompt(&transcript);
        assert!(formatted.len() <= TRANSCRIPT_PROMPT_CHAR_LIMIT + 20);
        assert!(formatted.ends_with("...(truncated)"));
    }
}
