//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row` selected with the owning query module's `COLS`.

use std::str::FromStr;

use rusqlite::types::Type;
use vs_core::{
    AssetId, AssetStatus, ChannelId, JobId, Privacy, ProcessingJournal, SessionId,
    ThumbnailSource, UserId,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_err(idx, e))?;
    Ok(T::from(uuid))
}

/// Parse a text column through the type's `FromStr`.
fn parse_text<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion_err(idx, e))
}

fn parse_opt_text<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: Option<String> = row.get(idx)?;
    s.map(|v| v.parse().map_err(|e| conversion_err(idx, e)))
        .transpose()
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub created_at: String,
}

impl User {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            username: row.get(1)?,
            created_at: row.get(2)?,
        })
    }
}

// ---------------------------------------------------------------------------
// AuthToken
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AuthToken {
    pub id: SessionId,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: String,
}

impl AuthToken {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            token: row.get(2)?,
            expires_at: row.get(3)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: ChannelId,
    pub user_id: UserId,
    pub name: String,
    pub asset_count: i64,
    pub created_at: String,
}

impl Channel {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            user_id: parse_id(row, 1)?,
            name: row.get(2)?,
            asset_count: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A stored video and its derived metadata.
///
/// Paths are relative to the configured asset root.
#[derive(Debug, Clone)]
pub struct Asset {
    pub id: AssetId,
    pub channel_id: ChannelId,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub privacy: Privacy,
    pub storage_path: String,
    pub thumbnail_path: Option<String>,
    pub thumbnail_source: Option<ThumbnailSource>,
    pub duration_secs: f64,
    pub resolution: String,
    pub size_bytes: i64,
    pub status: AssetStatus,
    pub processing_journal: ProcessingJournal,
    pub created_at: String,
    pub published_at: Option<String>,
}

impl Asset {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let tags: String = row.get(5)?;
        let journal: String = row.get(14)?;
        Ok(Self {
            id: parse_id(row, 0)?,
            channel_id: parse_id(row, 1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            tags: serde_json::from_str(&tags).map_err(|e| conversion_err(5, e))?,
            privacy: parse_text(row, 6)?,
            storage_path: row.get(7)?,
            thumbnail_path: row.get(8)?,
            thumbnail_source: parse_opt_text(row, 9)?,
            duration_secs: row.get(10)?,
            resolution: row.get(11)?,
            size_bytes: row.get(12)?,
            status: parse_text(row, 13)?,
            processing_journal: serde_json::from_str(&journal)
                .map_err(|e| conversion_err(14, e))?,
            created_at: row.get(15)?,
            published_at: row.get(16)?,
        })
    }
}

// ---------------------------------------------------------------------------
// FinalizeJob
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FinalizeJob {
    pub id: JobId,
    pub asset_id: AssetId,
    /// queued | processing | completed | failed
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_after: String,
    pub locked_by: Option<String>,
    pub locked_at: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl FinalizeJob {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            asset_id: parse_id(row, 1)?,
            status: row.get(2)?,
            attempts: row.get(3)?,
            max_attempts: row.get(4)?,
            run_after: row.get(5)?,
            locked_by: row.get(6)?,
            locked_at: row.get(7)?,
            error: row.get(8)?,
            created_at: row.get(9)?,
            completed_at: row.get(10)?,
        })
    }

    /// Whether this claim is the last one allowed.
    pub fn is_last_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}
