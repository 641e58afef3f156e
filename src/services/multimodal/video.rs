//! External video tooling: yt-dlp downloads, ffmpeg frame extraction, and
//! ffprobe duration probing. All calls shell out and therefore run on
//! blocking-friendly paths (tokio child processes).

use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::error::{AppError, Result};

/// Download a video with yt-dlp, forcing a container-native mp4 output
/// path. Returns the actual file path; when the tool renames the output,
/// the file is located by prefix match.
pub async fn download_video(url: &str, output_path: &Path) -> Result<PathBuf> {
    let output = Command::new("yt-dlp")
        .arg("--format")
        .arg("worstvideo[ext=mp4]+bestaudio[ext=m4a]/worst[ext=mp4]/worst")
        .arg("--output")
        .arg(output_path)
        .arg("--quiet")
        .arg("--no-warnings")
        .arg("--force-overwrites")
        .arg(url)
        .output()
        .await
        .map_err(|err| AppError::ServiceUnavailable(format!("yt-dlp unavailable: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::internal(anyhow::anyhow!(
            "yt-dlp failed for {url}: {}",
            stderr.trim()
        )));
    }

    if output_path.exists() {
        return Ok(output_path.to_path_buf());
    }

    // yt-dlp may append its own extension despite the template.
    if let Some(found) = find_by_prefix(output_path).await? {
        return Ok(found);
    }
    Err(AppError::internal(anyhow::anyhow!(
        "Video not found after download"
    )))
}

async fn find_by_prefix(output_path: &Path) -> Result<Option<PathBuf>> {
    let Some(parent) = output_path.parent() else {
        return Ok(None);
    };
    let stem = output_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    if stem.is_empty() || !parent.exists() {
        return Ok(None);
    }

    let mut entries = tokio::fs::read_dir(parent).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(&stem) {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Extract frames at one frame every `interval_s` seconds into
/// `output_dir/frame_%04d.jpg`. Returns the sorted frame paths.
pub async fn extract_frames(
    video_path: &Path,
    output_dir: &Path,
    interval_s: u32,
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(output_dir).await?;
    let pattern = output_dir.join("frame_%04d.jpg");

    let output = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(video_path)
        .arg("-vf")
        .arg(format!("fps=1/{}", interval_s.max(1)))
        .arg(&pattern)
        .arg("-loglevel")
        .arg("error")
        .output()
        .await
        .map_err(|err| AppError::ServiceUnavailable(format!("ffmpeg unavailable: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::internal(anyhow::anyhow!(
            "ffmpeg frame extraction failed: {}",
            stderr.trim()
        )));
    }

    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("frame_") && name.ends_with(".jpg") {
            frames.push(entry.path());
        }
    }
    frames.sort();
    Ok(frames)
}

/// Probe the container for a whole-second duration. Probe failures return
/// 0 rather than failing the caller's job.
pub async fn get_video_duration_seconds(video_path: &Path) -> i64 {
    let result = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(video_path)
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .map(|secs| secs.round().max(0.0) as i64)
            .unwrap_or(0),
        Ok(output) => {
            tracing::warn!(
                path = %video_path.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "ffprobe failed, defaulting duration to 0"
            );
            0
        }
        Err(err) => {
            tracing::warn!(path = %video_path.display(), error = %err, "ffprobe unavailable");
            0
        }
    }
}
