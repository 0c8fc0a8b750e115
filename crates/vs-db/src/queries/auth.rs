//! Bearer token operations.

use chrono::{Duration, Utc};
use rand::RngCore;
use rusqlite::Connection;
use vs_core::{Error, Result, SessionId, UserId};

use crate::models::AuthToken;

const COLS: &str = "id, user_id, token, expires_at";

/// One hundred years.
const MAX_TTL_HOURS: u64 = 24 * 365 * 100;

/// Generate a fresh opaque token (32 random bytes, hex-encoded).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Create a new auth token.
pub fn create_token(
    conn: &Connection,
    user_id: UserId,
    token: &str,
    expires_at: &str,
) -> Result<AuthToken> {
    let id = SessionId::new();

    conn.execute(
        "INSERT INTO auth_tokens (id, user_id, token, expires_at) VALUES (?1,?2,?3,?4)",
        rusqlite::params![id.to_string(), user_id.to_string(), token, expires_at],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(AuthToken {
        id,
        user_id,
        token: token.to_string(),
        expires_at: expires_at.to_string(),
    })
}

/// Generate and store a token valid for `ttl_hours`.
pub fn issue_token(conn: &Connection, user_id: UserId, ttl_hours: u64) -> Result<AuthToken> {
    let hours = ttl_hours.min(MAX_TTL_HOURS) as i64;
    let expires_at = Utc::now() + Duration::hours(hours);
    create_token(conn, user_id, &generate_token(), &crate::timestamp(expires_at))
}

/// Look up a token by its value, regardless of expiry.
pub fn get_token(conn: &Connection, token: &str) -> Result<Option<AuthToken>> {
    let q = format!("SELECT {COLS} FROM auth_tokens WHERE token = ?1");
    match conn.query_row(&q, [token], AuthToken::from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Look up a token that has not yet expired at `now`.
pub fn get_valid_token(conn: &Connection, token: &str, now: &str) -> Result<Option<AuthToken>> {
    let q = format!("SELECT {COLS} FROM auth_tokens WHERE token = ?1 AND expires_at > ?2");
    match conn.query_row(&q, [token, now], AuthToken::from_row) {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Delete all tokens whose `expires_at` is in the past.
pub fn delete_expired_tokens(conn: &Connection, now: &str) -> Result<usize> {
    conn.execute("DELETE FROM auth_tokens WHERE expires_at <= ?1", [now])
        .map_err(|e| Error::database(e.to_string()))
}
