//! Channel operations.

use rusqlite::Connection;
use vs_core::{ChannelId, Error, Result, UserId};

use crate::models::Channel;

const COLS: &str = "id, user_id, name, asset_count, created_at";

/// Create a channel owned by `user_id`. A user owns at most one channel.
pub fn create_channel(conn: &Connection, user_id: UserId, name: &str) -> Result<Channel> {
    let id = ChannelId::new();
    let now = crate::now();

    conn.execute(
        "INSERT INTO channels (id, user_id, name, asset_count, created_at)
         VALUES (?1, ?2, ?3, 0, ?4)",
        rusqlite::params![id.to_string(), user_id.to_string(), name, &now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Validation(format!("user {user_id} already owns a channel"))
        }
        other => Error::database(other.to_string()),
    })?;

    Ok(Channel {
        id,
        user_id,
        name: name.to_string(),
        asset_count: 0,
        created_at: now,
    })
}

/// Get a channel by ID.
pub fn get_channel(conn: &Connection, id: ChannelId) -> Result<Option<Channel>> {
    let q = format!("SELECT {COLS} FROM channels WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], Channel::from_row) {
        Ok(c) => Ok(Some(c)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get the channel owned by a user, if any.
pub fn get_channel_for_user(conn: &Connection, user_id: UserId) -> Result<Option<Channel>> {
    let q = format!("SELECT {COLS} FROM channels WHERE user_id = ?1");
    match conn.query_row(&q, [user_id.to_string()], Channel::from_row) {
        Ok(c) => Ok(Some(c)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Bump the channel's asset counter by one.
pub fn increment_asset_count(conn: &Connection, id: ChannelId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE channels SET asset_count = asset_count + 1 WHERE id = ?1",
            [id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
