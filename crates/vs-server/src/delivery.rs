//! Static asset delivery: path containment, content type and byte ranges.
//!
//! Files are streamed through `ReaderStream` in 64 KiB chunks for both full
//! and partial responses, so memory stays bounded regardless of file size.
//! A client disconnect drops the body stream, which stops the disk reads.

use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use vs_core::{ArtifactKind, Error, MediaType, Result};

const CHUNK_SIZE: usize = 64 * 1024;
const CACHE_CONTROL: &str = "public, max-age=31536000";

// ---------------------------------------------------------------------------
// Range parsing
// ---------------------------------------------------------------------------

/// A single byte range as written in a `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=<start>-` or `bytes=<start>-<end>`
    From { start: u64, end: Option<u64> },
    /// `bytes=-<n>`: the last `n` bytes.
    Suffix(u64),
}

/// Parse a `Range` header value.
///
/// Returns `None` for anything other than a single well-formed `bytes`
/// range (including multi-range requests); callers then serve the full file.
pub fn parse_range_header(value: &str) -> Option<RangeSpec> {
    let spec = value.trim().strip_prefix("bytes=")?.trim();
    if spec.contains(',') {
        return None;
    }
    let (start_str, end_str) = spec.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        return end_str.parse().ok().map(RangeSpec::Suffix);
    }

    let start = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(end_str.parse().ok()?)
    };
    Some(RangeSpec::From { start, end })
}

impl RangeSpec {
    /// Resolve against a file size to an inclusive `(start, end)`.
    ///
    /// `None` means the range is unsatisfiable.
    pub fn resolve(self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        match self {
            RangeSpec::From { start, end } => {
                let end = end.unwrap_or(size - 1).min(size - 1);
                (start < size && start <= end).then_some((start, end))
            }
            RangeSpec::Suffix(0) => None,
            RangeSpec::Suffix(n) => Some((size.saturating_sub(n), size - 1)),
        }
    }
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Normalize a request path lexically.
///
/// Fails with [`Error::Forbidden`] for absolute paths, drive prefixes, or a
/// `..` that would climb above the root.
pub fn normalize_relative(requested: &str) -> Result<PathBuf> {
    if requested.contains('\0') {
        return Err(Error::Forbidden("invalid path".into()));
    }

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(requested).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(Error::Forbidden("path escapes the asset root".into()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::Forbidden("absolute paths are not allowed".into()));
            }
        }
    }
    Ok(parts.iter().collect())
}

/// Map a request path to a regular file inside `canonical_root`.
///
/// Lexical escapes and symlinks resolving outside the root are 403; missing
/// files, directories and anything outside the artifact directories (such as
/// in-flight uploads under `tmp/`) are 404.
pub async fn resolve_asset_path(canonical_root: &Path, requested: &str) -> Result<PathBuf> {
    let relative = normalize_relative(requested)?;
    if relative.as_os_str().is_empty() {
        return Err(Error::not_found("asset", requested));
    }

    let candidate = canonical_root.join(&relative);
    let resolved = match tokio::fs::canonicalize(&candidate).await {
        Ok(p) => p,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found("asset", requested));
        }
        Err(e) => return Err(e.into()),
    };

    let inner = resolved
        .strip_prefix(canonical_root)
        .map_err(|_| Error::Forbidden("path escapes the asset root".into()))?;
    if !in_artifact_dir(inner) {
        return Err(Error::not_found("asset", requested));
    }

    let meta = tokio::fs::metadata(&resolved)
        .await
        .map_err(|_| Error::not_found("asset", requested))?;
    if !meta.is_file() {
        return Err(Error::not_found("asset", requested));
    }

    Ok(resolved)
}

/// Whether a root-relative path lies under `videos/` or `thumbnails/`.
fn in_artifact_dir(relative: &Path) -> bool {
    let Some(Component::Normal(first)) = relative.components().next() else {
        return false;
    };
    [ArtifactKind::Video, ArtifactKind::Thumbnail]
        .iter()
        .any(|kind| first == kind.dir_name())
}

// ---------------------------------------------------------------------------
// Serving
// ---------------------------------------------------------------------------

/// Stream `path` as a response, honouring `Range` for video types.
pub async fn serve_file(path: &Path, range_header: Option<&str>) -> Result<Response> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|_| Error::not_found("asset", path.display()))?;
    let size = file.metadata().await?.len();

    let media = MediaType::from_path(path);
    let content_type = MediaType::mime_for_path(path);
    let ranged = media.is_some_and(|m| m.is_video());

    let range = if ranged {
        range_header.and_then(parse_range_header)
    } else {
        None
    };

    let mut response = match range {
        Some(spec) => match spec.resolve(size) {
            Some((start, end)) => {
                let length = end - start + 1;
                file.seek(std::io::SeekFrom::Start(start)).await?;
                let body = Body::from_stream(ReaderStream::with_capacity(
                    file.take(length),
                    CHUNK_SIZE,
                ));
                (
                    StatusCode::PARTIAL_CONTENT,
                    [
                        (header::CONTENT_TYPE, content_type.to_string()),
                        (header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}")),
                        (header::CONTENT_LENGTH, length.to_string()),
                    ],
                    body,
                )
                    .into_response()
            }
            None => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{size}"))],
                Body::empty(),
            )
                .into_response(),
        },
        None => {
            let body = Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE));
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_LENGTH, size.to_string()),
                ],
                body,
            )
                .into_response()
        }
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    Ok(response)
}
