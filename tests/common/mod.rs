//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a temporary asset
//! root, a fake [`MediaTools`] and a full [`AppContext`]. The `with_server*`
//! constructors start Axum on a random port for HTTP-level testing. The
//! finalize worker pool is not started; tests drive it with
//! [`vs_server::finalizer::drain_due_jobs`].

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vs_av::{FrameSpec, MediaTools, VideoMetadata};
use vs_core::config::Config;
use vs_core::{ArtifactKind, Privacy, UserId};
use vs_db::models::{Asset, Channel, FinalizeJob};
use vs_db::pool::{init_memory_pool, init_pool, DbPool};
use vs_db::queries::assets::NewAsset;
use vs_server::context::AppContext;
use vs_server::router::build_router;
use vs_server::storage::AssetStorage;

/// Stand-in for ffmpeg/ffprobe.
///
/// When `working`, frame capture writes a real JPEG of the requested size
/// and probing reports a 12.5 s 1920x1080 video. Otherwise every call fails
/// the way a missing binary would.
pub struct FakeTools {
    working: bool,
    extract_delay: Duration,
    pub extract_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
    extracts_in_flight: AtomicUsize,
    max_extracts_in_flight: AtomicUsize,
}

impl FakeTools {
    pub fn new(working: bool) -> Self {
        Self {
            working,
            extract_delay: Duration::ZERO,
            extract_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
            extracts_in_flight: AtomicUsize::new(0),
            max_extracts_in_flight: AtomicUsize::new(0),
        }
    }

    /// Frame capture takes `delay` before succeeding or failing.
    pub fn slow(working: bool, delay: Duration) -> Self {
        Self {
            extract_delay: delay,
            ..Self::new(working)
        }
    }

    pub fn extracts(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    /// Highest number of frame captures that ever ran at the same time.
    pub fn max_concurrent_extracts(&self) -> usize {
        self.max_extracts_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaTools for FakeTools {
    async fn probe(&self, _video: &Path) -> vs_core::Result<VideoMetadata> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.working {
            Ok(VideoMetadata {
                duration_secs: 12.5,
                width: 1920,
                height: 1080,
            })
        } else {
            Err(vs_core::Error::tool("ffprobe", "tool not found"))
        }
    }

    async fn extract_frame(
        &self,
        _video: &Path,
        output: &Path,
        spec: FrameSpec,
    ) -> vs_core::Result<()> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.extracts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_extracts_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.extract_delay.is_zero() {
            tokio::time::sleep(self.extract_delay).await;
        }
        self.extracts_in_flight.fetch_sub(1, Ordering::SeqCst);

        if !self.working {
            return Err(vs_core::Error::tool("ffmpeg", "tool not found"));
        }
        image::RgbImage::from_pixel(spec.width, spec.height, image::Rgb([10, 200, 30]))
            .save_with_format(output, image::ImageFormat::Jpeg)
            .map_err(|e| vs_core::Error::tool("ffmpeg", e.to_string()))
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database and a temporary asset root.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub tools: Arc<FakeTools>,
    _dir: tempfile::TempDir,
}

impl TestHarness {
    /// Config used by every harness: finalize jobs are due immediately.
    pub fn test_config() -> Config {
        let mut config = Config::default();
        config.worker.finalize_delay_secs = 0;
        config.worker.poll_interval_secs = 1;
        config
    }

    /// Default configuration, media tools unavailable.
    pub fn new() -> Self {
        Self::with_config(Self::test_config())
    }

    /// Custom configuration, media tools unavailable.
    pub fn with_config(config: Config) -> Self {
        Self::build(config, FakeTools::new(false), false)
    }

    /// Default configuration with working media tools.
    pub fn with_working_tools() -> Self {
        Self::build(Self::test_config(), FakeTools::new(true), false)
    }

    /// Default configuration backed by a WAL database file, for tests with
    /// concurrent writers.
    pub fn with_file_db() -> Self {
        Self::build(Self::test_config(), FakeTools::new(false), true)
    }

    /// WAL database file and the given tools, for tests that run the worker
    /// pool next to HTTP requests.
    pub fn with_tools(config: Config, tools: FakeTools) -> Self {
        Self::build(config, tools, true)
    }

    fn build(mut config: Config, tools: FakeTools, file_db: bool) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        config.storage.asset_root = dir.path().join("assets");
        config.storage.temp_dir = None;

        let db = if file_db {
            config.server.db_path = dir.path().join("vidstash.db");
            init_pool(&config.server.db_path).expect("failed to create file pool")
        } else {
            init_memory_pool().expect("failed to create in-memory pool")
        };
        let storage = AssetStorage::open(
            &config.storage.asset_root,
            &config.storage.resolved_temp_dir(),
        )
        .expect("failed to open asset storage");
        let tools = Arc::new(tools);

        let ctx = AppContext::new(db.clone(), config, storage, tools.clone());

        Self {
            ctx,
            db,
            tools,
            _dir: dir,
        }
    }

    /// Start an Axum server on a random port.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().serve().await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        Self::with_config(config).serve().await
    }

    /// Start an Axum server for this harness on a random port.
    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = build_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> vs_db::pool::PooledConnection {
        vs_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    pub fn storage(&self) -> &AssetStorage {
        &self.ctx.storage
    }

    /// Number of entries left in the upload temp dir.
    pub fn temp_entries(&self) -> usize {
        std::fs::read_dir(self.storage().temp_dir())
            .expect("temp dir missing")
            .count()
    }

    /// Number of files under `<asset_root>/<dir>`.
    pub fn stored_files(&self, dir: &str) -> usize {
        std::fs::read_dir(self.storage().root().join(dir))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn asset_count(&self) -> i64 {
        vs_db::queries::assets::count_assets(&self.conn()).expect("count assets")
    }

    pub fn anonymous_channel(&self) -> Channel {
        vs_db::queries::channels::get_channel_for_user(&self.conn(), UserId::ANONYMOUS)
            .expect("channel query")
            .expect("anonymous channel is seeded")
    }

    /// Create a user (optionally with a channel) and return a bearer token.
    pub fn create_user(&self, username: &str, with_channel: bool) -> (UserId, String) {
        let conn = self.conn();
        let user = vs_db::queries::users::create_user(&conn, username).expect("create user");
        if with_channel {
            vs_db::queries::channels::create_channel(&conn, user.id, &format!("{username} channel"))
                .expect("create channel");
        }
        let token = vs_db::queries::auth::issue_token(&conn, user.id, 1).expect("issue token");
        (user.id, token.token)
    }

    /// Write a video straight into storage and create its row and due job,
    /// bypassing HTTP. No thumbnail is recorded.
    pub fn insert_asset(&self, bytes: &[u8], max_attempts: u32) -> (Asset, FinalizeJob) {
        let base = AssetStorage::generate_base_name();
        let relative = AssetStorage::relative_path(ArtifactKind::Video, &base, "mp4");
        std::fs::write(self.storage().absolute(&relative), bytes).expect("write video");

        let channel = self.anonymous_channel();
        let new = NewAsset {
            channel_id: channel.id,
            title: "Direct insert",
            description: "",
            category: None,
            tags: &[],
            privacy: Privacy::Public,
            storage_path: &relative,
            size_bytes: bytes.len() as i64,
            resolution: "1280x720",
        };
        vs_db::queries::assets::create_asset_with_job(&self.conn(), &new, &vs_db::now(), max_attempts)
            .expect("create asset")
    }

    pub fn asset(&self, id: vs_core::AssetId) -> Asset {
        vs_db::queries::assets::get_asset(&self.conn(), id)
            .expect("asset query")
            .expect("asset exists")
    }

    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.storage().absolute(relative)
    }
}

/// Deterministic payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Multipart form with a video part and a title.
pub fn video_form(
    bytes: Vec<u8>,
    file_name: &str,
    mime: &str,
    title: &str,
) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str(mime)
        .expect("valid mime");
    reqwest::multipart::Form::new()
        .part("video", part)
        .text("title", title.to_string())
}

/// Upload `bytes` as `clip.mp4` and return the JSON body of the 201.
pub async fn upload_ok(addr: SocketAddr, bytes: Vec<u8>, title: &str) -> serde_json::Value {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/assets"))
        .multipart(video_form(bytes, "clip.mp4", "video/mp4", title))
        .send()
        .await
        .expect("upload request");
    assert_eq!(resp.status(), 201);
    resp.json().await.expect("upload json")
}
