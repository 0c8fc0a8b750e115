//! Asset-domain types: lifecycle status, processing journal, privacy, and
//! thumbnail provenance.
//!
//! Enums implement `Display` and `FromStr` with the exact strings persisted in
//! the database, so query code never hand-writes status literals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

// ---------------------------------------------------------------------------
// AssetStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an asset.
///
/// Transitions are monotonic: `Processing -> Ready` or `Processing -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetStatus {
    Processing,
    Ready,
    Failed,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }

    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }

    /// Whether moving from `self` to `next` respects the state machine.
    pub fn can_transition_to(&self, next: AssetStatus) -> bool {
        matches!(
            (self, next),
            (Self::Processing, Self::Ready) | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(Self::Processing),
            "READY" => Ok(Self::Ready),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::Validation(format!("unknown asset status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Privacy
// ---------------------------------------------------------------------------

/// Visibility of an asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privacy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "unlisted" => Ok(Self::Unlisted),
            "private" => Ok(Self::Private),
            other => Err(Error::Validation(format!(
                "privacy must be one of public, unlisted, private (got '{other}')"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ThumbnailSource
// ---------------------------------------------------------------------------

/// Which branch of the thumbnail fallback chain produced the current
/// derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailSource {
    Supplied,
    Extracted,
    Placeholder,
}

impl ThumbnailSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supplied => "supplied",
            Self::Extracted => "extracted",
            Self::Placeholder => "placeholder",
        }
    }

    /// A real image (caller-provided or a captured frame) rather than the
    /// synthesized fallback.
    pub fn is_real(&self) -> bool {
        !matches!(self, Self::Placeholder)
    }
}

impl fmt::Display for ThumbnailSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThumbnailSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "supplied" => Ok(Self::Supplied),
            "extracted" => Ok(Self::Extracted),
            "placeholder" => Ok(Self::Placeholder),
            other => Err(Error::Validation(format!("unknown thumbnail source '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactKind
// ---------------------------------------------------------------------------

/// Partition of the asset root a stored file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Raw uploaded video bytes.
    Video,
    /// Derivative thumbnail image.
    Thumbnail,
}

impl ArtifactKind {
    /// Directory name under the asset root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Video => "videos",
            Self::Thumbnail => "thumbnails",
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessingJournal
// ---------------------------------------------------------------------------

/// Journal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Processing,
    Completed,
}

/// Small structured record tracking the asynchronous finalization step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJournal {
    pub status: JournalStatus,
    /// 0..=100
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingJournal {
    /// Journal attached to a freshly ingested asset.
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            status: JournalStatus::Processing,
            progress: 0,
            started_at: now,
            completed_at: None,
        }
    }

    /// Close the journal, keeping the original start time.
    pub fn complete(&self, now: DateTime<Utc>) -> Self {
        Self {
            status: JournalStatus::Completed,
            progress: 100,
            started_at: self.started_at,
            completed_at: Some(now),
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Internal(format!("failed to encode processing journal: {e}")))
    }

    pub fn from_json(s: &str) -> crate::Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| Error::Internal(format!("failed to decode processing journal: {e}")))
    }
}
