//! # vs-av
//!
//! External media tool management for vidstash.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe, honouring configured overrides.
//! - **Command execution** ([`ToolCommand`]) -- async builder with a timeout
//!   that kills the child process when it expires.
//! - **Probing** ([`probe`]) -- duration and resolution from ffprobe JSON.
//! - **Frame capture** ([`frame`]) -- single scaled still via ffmpeg.
//! - **The [`MediaTools`] seam** -- what the derivative pipeline calls, with
//!   [`FfmpegTools`] as the production implementation.

pub mod command;
pub mod frame;
pub mod media_tools;
pub mod probe;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use frame::FrameSpec;
pub use media_tools::{FfmpegTools, MediaTools};
pub use probe::VideoMetadata;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
