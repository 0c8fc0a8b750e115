//! User CRUD operations.

use rusqlite::Connection;
use vs_core::{Error, Result, UserId};

use crate::models::User;

const COLS: &str = "id, username, created_at";

/// Create a new user.
pub fn create_user(conn: &Connection, username: &str) -> Result<User> {
    let id = UserId::new();
    let now = crate::now();

    conn.execute(
        "INSERT INTO users (id, username, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![id.to_string(), username, &now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Validation(format!("username '{username}' is already taken"))
        }
        other => Error::database(other.to_string()),
    })?;

    Ok(User {
        id,
        username: username.to_string(),
        created_at: now,
    })
}

/// Get a user by ID.
pub fn get_user(conn: &Connection, id: UserId) -> Result<Option<User>> {
    let q = format!("SELECT {COLS} FROM users WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], User::from_row) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Get a user by username.
pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    let q = format!("SELECT {COLS} FROM users WHERE username = ?1");
    match conn.query_row(&q, [username], User::from_row) {
        Ok(u) => Ok(Some(u)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}
