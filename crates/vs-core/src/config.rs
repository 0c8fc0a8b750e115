//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for server, auth, storage, ingest limits, derivative
//! generation, the finalize worker pool and external tools. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

const MIB: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub derivatives: DerivativeConfig,
    pub worker: WorkerConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.auth.enabled && self.auth.api_key.is_none() {
            warnings.push(
                "auth is enabled but no api_key is set; only issued tokens will be accepted".into(),
            );
        }

        if self.ingest.max_video_bytes == 0 {
            warnings.push("ingest.max_video_bytes is 0; every upload will be rejected".into());
        }
        if self.ingest.max_title_chars == 0 {
            warnings.push("ingest.max_title_chars is 0; every upload will be rejected".into());
        }

        if self.derivatives.thumbnail_width == 0 || self.derivatives.thumbnail_height == 0 {
            warnings.push("derivatives thumbnail dimensions must be non-zero".into());
        }
        if parse_resolution(&self.derivatives.default_resolution).is_none() {
            warnings.push(format!(
                "derivatives.default_resolution '{}' is not of the form WIDTHxHEIGHT",
                self.derivatives.default_resolution
            ));
        }
        if self.derivatives.tool_timeout_secs == 0 {
            warnings.push("derivatives.tool_timeout_secs is 0; treated as 1".into());
        }

        if self.worker.concurrency == 0 {
            warnings.push("worker.concurrency is 0; treated as 1".into());
        }
        if self.worker.max_attempts == 0 {
            warnings.push("worker.max_attempts is 0; treated as 1".into());
        }

        if let Some(temp) = &self.storage.temp_dir {
            if !temp.starts_with(&self.storage.asset_root) {
                warnings.push(format!(
                    "storage.temp_dir {} is outside asset_root; moves may fall back to copying",
                    temp.display()
                ));
            }
        }

        warnings
    }
}

/// Parse a `WIDTHxHEIGHT` resolution string.
pub fn parse_resolution(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once('x')?;
    let w = w.trim().parse().ok()?;
    let h = h.trim().parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("./data/vidstash.db"),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub token_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            token_ttl_hours: 24 * 30,
        }
    }
}

/// On-disk layout of stored assets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding `videos/` and `thumbnails/`.
    pub asset_root: PathBuf,
    /// Where in-flight uploads are written. Defaults to `<asset_root>/tmp`.
    pub temp_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.asset_root.join("tmp"))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("./data/assets"),
            temp_dir: None,
        }
    }
}

/// Upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_video_bytes: u64,
    pub max_thumbnail_bytes: u64,
    pub max_title_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_video_bytes: 500 * MIB,
            max_thumbnail_bytes: 5 * MIB,
            max_title_chars: 100,
        }
    }
}

/// Thumbnail and metadata derivation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivativeConfig {
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    /// Seek offset for frame extraction, in seconds.
    pub frame_offset_secs: f64,
    pub tool_timeout_secs: u64,
    /// Resolution recorded when probing fails.
    pub default_resolution: String,
}

impl Default for DerivativeConfig {
    fn default() -> Self {
        Self {
            thumbnail_width: 320,
            thumbnail_height: 180,
            frame_offset_secs: 1.0,
            tool_timeout_secs: 30,
            default_resolution: "1280x720".into(),
        }
    }
}

/// Finalize worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval_secs: u64,
    pub finalize_delay_secs: u64,
    pub max_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval_secs: 2,
            finalize_delay_secs: 5,
            max_attempts: 3,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}
