//! The seam between derivative generation and the external tools.

use std::path::Path;

use async_trait::async_trait;

use crate::frame::{self, FrameSpec};
use crate::probe::{self, VideoMetadata};
use crate::tools::ToolRegistry;

/// Media operations the derivative pipeline depends on.
///
/// Every method may fail; callers are expected to fall back rather than
/// propagate.
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Read duration and resolution of a video.
    async fn probe(&self, video: &Path) -> vs_core::Result<VideoMetadata>;

    /// Capture one scaled frame of `video` into `output`.
    async fn extract_frame(&self, video: &Path, output: &Path, spec: FrameSpec)
        -> vs_core::Result<()>;
}

/// [`MediaTools`] backed by the ffmpeg/ffprobe binaries found at startup.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    registry: ToolRegistry,
}

impl FfmpegTools {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

#[async_trait]
impl MediaTools for FfmpegTools {
    async fn probe(&self, video: &Path) -> vs_core::Result<VideoMetadata> {
        let ffprobe = self.registry.require("ffprobe")?;
        probe::probe_video(ffprobe, video).await
    }

    async fn extract_frame(
        &self,
        video: &Path,
        output: &Path,
        spec: FrameSpec,
    ) -> vs_core::Result<()> {
        let ffmpeg = self.registry.require("ffmpeg")?;
        frame::extract_frame(ffmpeg, video, output, spec).await
    }
}
