//! Audio extraction + transcription.

use std::path::Path;
use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::services::optimizer::transcript::{SyntheticTranscript, TranscriptSegment};

use super::llm::LlmClient;

/// Extract the audio track as low-bitrate mono mp3 (keeps the provider's
/// payload limits comfortable).
pub async fn extract_audio(video_path: &Path, output_path: &Path) -> Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(video_path)
        .arg("-vn")
        .arg("-ac")
        .arg("1")
        .arg("-b:a")
        .arg("32k")
        .arg("-f")
        .arg("mp3")
        .arg(output_path)
        .arg("-loglevel")
        .arg("error")
        .output()
        .await
        .map_err(|err| AppError::ServiceUnavailable(format!("ffmpeg unavailable: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::internal(anyhow::anyhow!(
            "ffmpeg audio extraction failed: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

/// Deterministic transcript substituted when the provider key is missing
/// or a placeholder, so downstream stages stay testable.
pub fn mock_transcription() -> SyntheticTranscript {
    SyntheticTranscript {
        text: "This is a mock transcription of the video audio. The video seems to be about a zoo trip."
            .to_string(),
        segments: vec![
            TranscriptSegment {
                start: 0.0,
                end: 5.0,
                text: "Alright, so here we are in front of the elephants.".to_string(),
            },
            TranscriptSegment {
                start: 5.0,
                end: 10.0,
                text: "The cool thing about these guys is that they have really, really long trunks."
                    .to_string(),
            },
            TranscriptSegment {
                start: 10.0,
                end: 15.0,
                text: "And that's, that's cool.".to_string(),
            },
            TranscriptSegment {
                start: 15.0,
                end: 20.0,
                text: "And that's pretty much all there is to say.".to_string(),
            },
        ],
    }
}

/// Transcribe an audio file with the configured provider, falling back to
/// the deterministic mock when no usable key exists.
pub async fn transcribe_audio(client: &LlmClient, audio_path: &Path) -> Result<SyntheticTranscript> {
    if !client.is_live() {
        tracing::warn!("using mock transcription: provider key missing or placeholder");
        return Ok(mock_transcription());
    }
    client.transcribe(audio_path).await
}
