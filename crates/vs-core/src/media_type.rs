//! Static extension-to-MIME table.
//!
//! Both ingestion (allow-lists) and delivery (`Content-Type`) consult
//! [`MEDIA_TYPES`], so the two never disagree about what a file is.

use std::path::Path;

/// Coarse class of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Image,
}

/// One row of the lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaType {
    pub extension: &'static str,
    pub mime: &'static str,
    pub kind: MediaKind,
}

/// MIME served for anything not in the table.
pub const DEFAULT_MIME: &str = "application/octet-stream";

pub static MEDIA_TYPES: &[MediaType] = &[
    MediaType { extension: "mp4", mime: "video/mp4", kind: MediaKind::Video },
    MediaType { extension: "m4v", mime: "video/x-m4v", kind: MediaKind::Video },
    MediaType { extension: "webm", mime: "video/webm", kind: MediaKind::Video },
    MediaType { extension: "ogv", mime: "video/ogg", kind: MediaKind::Video },
    MediaType { extension: "ogg", mime: "video/ogg", kind: MediaKind::Video },
    MediaType { extension: "mov", mime: "video/quicktime", kind: MediaKind::Video },
    MediaType { extension: "avi", mime: "video/x-msvideo", kind: MediaKind::Video },
    MediaType { extension: "mkv", mime: "video/x-matroska", kind: MediaKind::Video },
    MediaType { extension: "jpg", mime: "image/jpeg", kind: MediaKind::Image },
    MediaType { extension: "jpeg", mime: "image/jpeg", kind: MediaKind::Image },
    MediaType { extension: "png", mime: "image/png", kind: MediaKind::Image },
    MediaType { extension: "webp", mime: "image/webp", kind: MediaKind::Image },
    MediaType { extension: "gif", mime: "image/gif", kind: MediaKind::Image },
];

impl MediaType {
    /// Look up by extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Option<&'static MediaType> {
        MEDIA_TYPES
            .iter()
            .find(|m| m.extension.eq_ignore_ascii_case(ext))
    }

    /// Look up by a file path's extension.
    pub fn from_path(path: impl AsRef<Path>) -> Option<&'static MediaType> {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// MIME type for a path, defaulting to [`DEFAULT_MIME`].
    pub fn mime_for_path(path: impl AsRef<Path>) -> &'static str {
        Self::from_path(path).map(|m| m.mime).unwrap_or(DEFAULT_MIME)
    }

    /// Whether `mime` (parameters ignored) names a type of the given kind in
    /// the table.
    pub fn is_known_mime(mime: &str, kind: MediaKind) -> bool {
        let essence = mime.split(';').next().unwrap_or("").trim();
        MEDIA_TYPES
            .iter()
            .any(|m| m.kind == kind && m.mime.eq_ignore_ascii_case(essence))
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

/// Validate an uploaded file's name and declared content type against the
/// allow-list for `kind`. Returns the canonical lowercase extension.
///
/// The extension must be listed. A declared content type, if any, must be a
/// listed MIME of the same kind or the generic `application/octet-stream`.
pub fn check_upload(
    file_name: &str,
    content_type: Option<&str>,
    kind: MediaKind,
) -> Option<&'static str> {
    let media = MediaType::from_path(file_name).filter(|m| m.kind == kind)?;
    match content_type {
        None => Some(media.extension),
        Some(ct) if ct.trim().eq_ignore_ascii_case(DEFAULT_MIME) => Some(media.extension),
        Some(ct) if MediaType::is_known_mime(ct, kind) => Some(media.extension),
        Some(_) => None,
    }
}
