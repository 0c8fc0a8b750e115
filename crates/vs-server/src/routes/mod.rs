//! Route handlers for the HTTP API.

pub mod assets;
pub mod files;
pub mod health;
pub mod upload;
