//! Derivative generation: one thumbnail per asset plus best-effort metadata.
//!
//! The thumbnail is produced by the first [`ThumbnailStrategy`] that
//! succeeds, in order supplied, extracted, placeholder. Strategies are only
//! attempted when every earlier one has failed. The placeholder cannot fail
//! for tool reasons, so a thumbnail exists unless the disk itself is failing.

mod placeholder;

use std::path::Path;
use std::sync::Arc;

use vs_av::{FrameSpec, MediaTools, VideoMetadata};
use vs_core::config::DerivativeConfig;
use vs_core::{ArtifactKind, Error, Result, ThumbnailSource};

use crate::storage::{AssetStorage, TempUpload};

pub use placeholder::render_placeholder;

/// A caller-provided thumbnail waiting in the temp dir.
#[derive(Debug)]
pub struct SuppliedThumbnail {
    pub upload: TempUpload,
    /// Canonical lowercase image extension.
    pub ext: &'static str,
}

/// One way of obtaining a thumbnail.
#[derive(Debug)]
pub enum ThumbnailStrategy {
    Supplied(SuppliedThumbnail),
    Extracted,
    Placeholder,
}

impl ThumbnailStrategy {
    /// The ordered fallback chain for an upload.
    pub fn chain(supplied: Option<SuppliedThumbnail>) -> Vec<ThumbnailStrategy> {
        let mut chain = Vec::with_capacity(3);
        if let Some(s) = supplied {
            chain.push(ThumbnailStrategy::Supplied(s));
        }
        chain.push(ThumbnailStrategy::Extracted);
        chain.push(ThumbnailStrategy::Placeholder);
        chain
    }

    fn source(&self) -> ThumbnailSource {
        match self {
            Self::Supplied(_) => ThumbnailSource::Supplied,
            Self::Extracted => ThumbnailSource::Extracted,
            Self::Placeholder => ThumbnailSource::Placeholder,
        }
    }
}

/// A thumbnail that now exists on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    /// Relative to the asset root.
    pub relative_path: String,
    pub source: ThumbnailSource,
}

#[derive(Clone)]
pub struct DerivativeGenerator {
    tools: Arc<dyn MediaTools>,
    storage: Arc<AssetStorage>,
    config: DerivativeConfig,
}

impl DerivativeGenerator {
    pub fn new(
        tools: Arc<dyn MediaTools>,
        storage: Arc<AssetStorage>,
        config: DerivativeConfig,
    ) -> Self {
        Self {
            tools,
            storage,
            config,
        }
    }

    /// Run the fallback chain for a stored video whose file stem is `base`.
    pub async fn generate_thumbnail(
        &self,
        video_path: &Path,
        base: &str,
        supplied: Option<SuppliedThumbnail>,
    ) -> Result<Thumbnail> {
        let mut last_err = None;

        for strategy in ThumbnailStrategy::chain(supplied) {
            let source = strategy.source();
            let attempt = match strategy {
                ThumbnailStrategy::Supplied(s) => self.store_supplied(s, base),
                ThumbnailStrategy::Extracted => self.extract(video_path, base).await,
                ThumbnailStrategy::Placeholder => self.placeholder(base).await,
            };

            match attempt {
                Ok(thumbnail) => {
                    tracing::debug!(base, source = %source, path = %thumbnail.relative_path, "Thumbnail generated");
                    return Ok(thumbnail);
                }
                Err(e) => {
                    tracing::info!(base, source = %source, error = %e, "Thumbnail strategy failed; falling back");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Internal("no thumbnail strategy ran".into())))
    }

    /// Capture a frame with ffmpeg into `thumbnails/<base>.jpg`.
    pub async fn extract(&self, video_path: &Path, base: &str) -> Result<Thumbnail> {
        let relative_path = AssetStorage::relative_path(ArtifactKind::Thumbnail, base, "jpg");
        let output = self.storage.absolute(&relative_path);
        let spec = FrameSpec {
            offset_secs: self.config.frame_offset_secs,
            width: self.config.thumbnail_width,
            height: self.config.thumbnail_height,
        };

        self.tools.extract_frame(video_path, &output, spec).await?;

        Ok(Thumbnail {
            relative_path,
            source: ThumbnailSource::Extracted,
        })
    }

    /// Render the synthesized fallback into `thumbnails/<base>.png`.
    pub async fn placeholder(&self, base: &str) -> Result<Thumbnail> {
        let relative_path = AssetStorage::relative_path(ArtifactKind::Thumbnail, base, "png");
        let output = self.storage.absolute(&relative_path);
        let (width, height) = (self.config.thumbnail_width, self.config.thumbnail_height);

        tokio::task::spawn_blocking(move || placeholder::write_placeholder(&output, width, height))
            .await
            .map_err(|e| Error::Internal(format!("placeholder task panicked: {e}")))??;

        Ok(Thumbnail {
            relative_path,
            source: ThumbnailSource::Placeholder,
        })
    }

    fn store_supplied(&self, supplied: SuppliedThumbnail, base: &str) -> Result<Thumbnail> {
        let stored = self
            .storage
            .persist(supplied.upload, ArtifactKind::Thumbnail, base, supplied.ext)?;
        Ok(Thumbnail {
            relative_path: stored.relative_path,
            source: ThumbnailSource::Supplied,
        })
    }

    /// Probe duration and resolution; `None` when probing fails.
    pub async fn probe(&self, video_path: &Path) -> Option<VideoMetadata> {
        match self.tools.probe(video_path).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::info!(path = %video_path.display(), error = %e, "Probe failed; keeping defaults");
                None
            }
        }
    }

    /// Resolution recorded when nothing better is known.
    pub fn default_resolution(&self) -> &str {
        &self.config.default_resolution
    }
}

/// The base name (file stem) of a stored video path.
pub fn base_name(storage_path: &str) -> Option<&str> {
    Path::new(storage_path).file_stem().and_then(|s| s.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Tool double: extraction writes a small file when `working`, otherwise
    /// everything fails.
    struct FakeTools {
        working: bool,
        extract_calls: AtomicUsize,
    }

    impl FakeTools {
        fn new(working: bool) -> Arc<Self> {
            Arc::new(Self {
                working,
                extract_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MediaTools for FakeTools {
        async fn probe(&self, _video: &Path) -> Result<VideoMetadata> {
            if self.working {
                Ok(VideoMetadata {
                    duration_secs: 9.5,
                    width: 640,
                    height: 360,
                })
            } else {
                Err(Error::tool("ffprobe", "not installed"))
            }
        }

        async fn extract_frame(&self, _video: &Path, output: &Path, _spec: FrameSpec) -> Result<()> {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            if self.working {
                std::fs::write(output, b"\xff\xd8jpeg")?;
                Ok(())
            } else {
                Err(Error::tool("ffmpeg", "not installed"))
            }
        }
    }

    fn generator(tools: Arc<FakeTools>) -> (tempfile::TempDir, Arc<AssetStorage>, DerivativeGenerator) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("assets");
        let storage = Arc::new(AssetStorage::open(&root, &root.join("tmp")).unwrap());
        let gen = DerivativeGenerator::new(tools, storage.clone(), DerivativeConfig::default());
        (dir, storage, gen)
    }

    #[test]
    fn chain_order() {
        let kinds: Vec<ThumbnailSource> =
            ThumbnailStrategy::chain(None).iter().map(|s| s.source()).collect();
        assert_eq!(kinds, vec![ThumbnailSource::Extracted, ThumbnailSource::Placeholder]);
    }

    #[tokio::test]
    async fn supplied_wins_without_touching_tools() {
        let tools = FakeTools::new(true);
        let (_dir, storage, gen) = generator(tools.clone());

        let mut upload = storage.temp_upload().unwrap();
        upload
            .write_stream(futures::stream::iter([Ok::<_, std::io::Error>(&b"png"[..])]), 100, "thumb")
            .await
            .unwrap();

        let thumb = gen
            .generate_thumbnail(Path::new("v.mp4"), "1-aaaaaaaaaaaa", Some(SuppliedThumbnail { upload, ext: "png" }))
            .await
            .unwrap();
        assert_eq!(thumb.source, ThumbnailSource::Supplied);
        assert_eq!(thumb.relative_path, "thumbnails/1-aaaaaaaaaaaa.png");
        assert_eq!(std::fs::read(storage.absolute(&thumb.relative_path)).unwrap(), b"png");
        assert_eq!(tools.extract_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn extraction_used_when_tools_work() {
        let (_dir, storage, gen) = generator(FakeTools::new(true));
        let thumb = gen
            .generate_thumbnail(Path::new("v.mp4"), "2-bbbbbbbbbbbb", None)
            .await
            .unwrap();
        assert_eq!(thumb.source, ThumbnailSource::Extracted);
        assert_eq!(thumb.relative_path, "thumbnails/2-bbbbbbbbbbbb.jpg");
        assert!(storage.absolute(&thumb.relative_path).exists());
    }

    #[tokio::test]
    async fn placeholder_when_tools_missing() {
        let (_dir, storage, gen) = generator(FakeTools::new(false));
        let thumb = gen
            .generate_thumbnail(Path::new("v.mp4"), "3-cccccccccccc", None)
            .await
            .unwrap();
        assert_eq!(thumb.source, ThumbnailSource::Placeholder);
        assert_eq!(thumb.relative_path, "thumbnails/3-cccccccccccc.png");

        let img = image::open(storage.absolute(&thumb.relative_path)).unwrap();
        assert_eq!((img.width(), img.height()), (320, 180));
    }

    #[tokio::test]
    async fn same_inputs_same_output() {
        let (_dir, storage, gen) = generator(FakeTools::new(false));
        let a = gen.generate_thumbnail(Path::new("v.mp4"), "4-dddddddddddd", None).await.unwrap();
        let first = std::fs::read(storage.absolute(&a.relative_path)).unwrap();
        let b = gen.generate_thumbnail(Path::new("v.mp4"), "4-dddddddddddd", None).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(first, std::fs::read(storage.absolute(&b.relative_path)).unwrap());
    }

    #[tokio::test]
    async fn probe_failure_is_none() {
        let (_dir, _storage, gen) = generator(FakeTools::new(false));
        assert!(gen.probe(Path::new("v.mp4")).await.is_none());
        assert_eq!(gen.default_resolution(), "1280x720");
    }

    #[test]
    fn base_name_is_stem() {
        assert_eq!(base_name("videos/1-abc.mp4"), Some("1-abc"));
    }
}
