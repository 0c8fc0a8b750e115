//! Database query modules.

pub mod assets;
pub mod auth;
pub mod channels;
pub mod finalize_jobs;
pub mod users;
