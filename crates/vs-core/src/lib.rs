//! vs-core: shared types, IDs, errors, configuration, and the asset domain.
//!
//! This crate is the foundational dependency for all other vs-* crates,
//! providing type-safe identifiers, a unified error type, asset lifecycle
//! types, the extension-to-MIME lookup table, and application configuration.

pub mod asset;
pub mod config;
pub mod error;
pub mod ids;
pub mod media_type;

// Re-export the most commonly used items at the crate root.
pub use asset::*;
pub use error::{Error, Result};
pub use ids::*;
pub use media_type::{MediaKind, MediaType};
