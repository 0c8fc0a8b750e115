//! Single-frame capture with ffmpeg.

use std::path::Path;

use vs_core::Error;

use crate::command::ToolCommand;
use crate::tools::ToolConfig;

/// Where and at what size to grab a still.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSpec {
    /// Seek offset in seconds.
    pub offset_secs: f64,
    pub width: u32,
    pub height: u32,
}

impl FrameSpec {
    fn ffmpeg_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-ss".into(),
            format!("{}", self.offset_secs),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-frames:v".into(),
            "1".into(),
            "-vf".into(),
            format!("scale={}:{}", self.width, self.height),
            "-q:v".into(),
            "2".into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

/// Write one scaled frame of `input` to `output` (JPEG, by extension).
///
/// An exit code of zero is not enough: ffmpeg happily exits 0 without
/// writing anything when the seek lands past the end, so an absent or empty
/// output is also an error (and any partial file is removed).
pub async fn extract_frame(
    ffmpeg: &ToolConfig,
    input: &Path,
    output: &Path,
    spec: FrameSpec,
) -> vs_core::Result<()> {
    let result = ToolCommand::new(ffmpeg.path.clone())
        .args(spec.ffmpeg_args(input, output))
        .timeout(ffmpeg.timeout)
        .execute()
        .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(output).await;
        return Err(e);
    }

    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => {
            let _ = tokio::fs::remove_file(output).await;
            Err(Error::tool("ffmpeg", "no frame was written"))
        }
    }
}
