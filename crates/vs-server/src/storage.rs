//! On-disk asset layout.
//!
//! ```text
//! <asset_root>/
//!   videos/<epoch-millis>-<token>.<ext>
//!   thumbnails/<epoch-millis>-<token>.<img-ext>
//! ```
//!
//! Uploads are first streamed into a [`TempUpload`] under the temp dir. The
//! temp file is deleted when the guard drops, so every early return on the
//! ingestion path cleans up after itself; [`AssetStorage::persist`] renames
//! it into place.

use std::path::{Path, PathBuf};

use rand::RngCore;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use vs_core::{ArtifactKind, Error, Result};

/// A file that has been moved into the asset root.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Path relative to the asset root, with `/` separators.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    /// Actual on-disk size after the move.
    pub size_bytes: u64,
}

#[derive(Debug)]
pub struct AssetStorage {
    root: PathBuf,
    canonical_root: PathBuf,
    temp_dir: PathBuf,
}

impl AssetStorage {
    /// Create the directory layout (if missing) and resolve the root.
    pub fn open(root: &Path, temp_dir: &Path) -> Result<Self> {
        for kind in [ArtifactKind::Video, ArtifactKind::Thumbnail] {
            std::fs::create_dir_all(root.join(kind.dir_name()))?;
        }
        std::fs::create_dir_all(temp_dir)?;
        let canonical_root = root.canonicalize()?;

        Ok(Self {
            root: root.to_path_buf(),
            canonical_root,
            temp_dir: temp_dir.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root with symlinks resolved, used for containment checks.
    pub fn canonical_root(&self) -> &Path {
        &self.canonical_root
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Collision-resistant base name: `<epoch-millis>-<12 hex chars>`.
    pub fn generate_base_name() -> String {
        let mut token = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut token);
        format!("{}-{}", chrono::Utc::now().timestamp_millis(), hex::encode(token))
    }

    /// Relative path of an artifact, e.g. `thumbnails/<base>.png`.
    pub fn relative_path(kind: ArtifactKind, base: &str, ext: &str) -> String {
        format!("{}/{base}.{ext}", kind.dir_name())
    }

    /// Absolute path of a stored relative path.
    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Create an empty temp file for an incoming upload.
    pub fn temp_upload(&self) -> Result<TempUpload> {
        let file = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(&self.temp_dir)?;
        Ok(TempUpload { file, size: 0 })
    }

    /// Move a finished upload to `<kind>/<base>.<ext>` and stat it.
    pub fn persist(
        &self,
        upload: TempUpload,
        kind: ArtifactKind,
        base: &str,
        ext: &str,
    ) -> Result<StoredFile> {
        let relative_path = Self::relative_path(kind, base, ext);
        let absolute_path = self.absolute(&relative_path);

        // On failure the PersistError still owns the temp file; dropping it
        // removes the file.
        upload
            .file
            .persist(&absolute_path)
            .map_err(|e| Error::Io { source: e.error })?;

        let size_bytes = match std::fs::metadata(&absolute_path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                let _ = std::fs::remove_file(&absolute_path);
                return Err(e.into());
            }
        };

        Ok(StoredFile {
            relative_path,
            absolute_path,
            size_bytes,
        })
    }

    /// Best-effort removal of a stored artifact.
    pub fn remove(&self, relative: &str) {
        let path = self.absolute(relative);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove stored file");
            }
        }
    }
}

/// An in-flight upload. Removed from disk on drop unless persisted.
#[derive(Debug)]
pub struct TempUpload {
    file: NamedTempFile,
    size: u64,
}

impl TempUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Stream chunks into the file, enforcing `limit`.
    ///
    /// Fails with [`Error::PayloadTooLarge`] as soon as the running total
    /// exceeds `limit`; nothing past that point is written.
    pub async fn write_stream<S, B, E>(&mut self, chunks: S, limit: u64, what: &str) -> Result<()>
    where
        S: futures::Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        use futures::StreamExt;

        let mut chunks = std::pin::pin!(chunks);
        let mut out = tokio::fs::File::from_std(self.file.as_file().try_clone()?);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| Error::Validation(format!("failed to read {what}: {e}")))?;
            let bytes = chunk.as_ref();
            self.size += bytes.len() as u64;
            if self.size > limit {
                return Err(Error::PayloadTooLarge(format!(
                    "{what} exceeds the maximum size of {limit} bytes"
                )));
            }
            out.write_all(bytes).await?;
        }
        out.flush().await?;
        out.sync_all().await?;
        Ok(())
    }
}
