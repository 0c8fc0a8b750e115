//! ffprobe-based metadata extraction.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format
//! -show_streams` and keeps only what an asset record needs: duration and
//! the first video stream's dimensions.

use std::path::Path;

use serde::{Deserialize, Serialize};
use vs_core::Error;

use crate::command::ToolCommand;
use crate::tools::ToolConfig;

/// Basic metadata of a video file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
}

impl VideoMetadata {
    /// `WIDTHxHEIGHT`, as stored on the asset.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Probe `path` with the given ffprobe.
pub async fn probe_video(ffprobe: &ToolConfig, path: &Path) -> vs_core::Result<VideoMetadata> {
    let output = ToolCommand::new(ffprobe.path.clone())
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path.to_string_lossy())
        .timeout(ffprobe.timeout)
        .execute()
        .await?;

    parse_ffprobe_json(&output.stdout)
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Parse ffprobe's JSON output.
///
/// Fails with [`Error::Probe`] when there is no video stream with non-zero
/// dimensions. A missing duration yields `0.0`.
pub fn parse_ffprobe_json(json: &str) -> vs_core::Result<VideoMetadata> {
    let out: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let video = out
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::Probe("no video stream".into()))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(Error::Probe("video stream has no dimensions".into())),
    };

    let duration_secs = out
        .format
        .and_then(|f| f.duration)
        .or_else(|| video.duration.clone())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    Ok(VideoMetadata {
        duration_secs,
        width,
        height,
    })
}
