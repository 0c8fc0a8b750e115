//! vs-server: HTTP API, asset delivery and the finalize worker pool.
//!
//! This crate ties together all other vs-* crates into a running server
//! application. It provides:
//!
//! - Axum-based HTTP API for ingestion and asset status
//! - Byte-range delivery of stored videos and thumbnails
//! - Durable finalize workers that complete assets after ingestion
//! - Graceful shutdown via signal handling

pub mod context;
pub mod delivery;
pub mod derivatives;
pub mod error;
pub mod finalizer;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod storage;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vs_av::{FfmpegTools, ToolRegistry};
use vs_core::config::Config;

use crate::context::AppContext;
use crate::storage::AssetStorage;

/// Open the database, discover tools and prepare the asset root.
///
/// Jobs left `processing` by a previous process are re-queued here.
pub fn build_context(config: Config) -> vs_core::Result<AppContext> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    let db = vs_db::pool::init_pool(db_path)?;
    if existed {
        tracing::info!("Database opened (existing) at {}", db_path.display());
    } else {
        tracing::info!("Database created (new) at {}", db_path.display());
    }

    {
        let conn = vs_db::pool::get_conn(&db)?;
        let reset = vs_db::queries::finalize_jobs::reset_orphaned_jobs(&conn)?;
        if reset > 0 {
            tracing::info!(jobs = reset, "Re-queued interrupted finalize jobs");
        }
        let released = vs_db::queries::finalize_jobs::release_held_jobs(&conn, &vs_db::now())?;
        if released > 0 {
            tracing::info!(jobs = released, "Released finalize jobs held by an interrupted upload");
        }
        let expired = vs_db::queries::auth::delete_expired_tokens(&conn, &vs_db::now())?;
        if expired > 0 {
            tracing::debug!(tokens = expired, "Removed expired auth tokens");
        }
    }

    let timeout = Duration::from_secs(config.derivatives.tool_timeout_secs.max(1));
    let registry = ToolRegistry::discover(&config.tools, timeout);
    for info in registry.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}; thumbnails fall back to placeholders", info.name);
        }
    }

    let storage = AssetStorage::open(
        &config.storage.asset_root,
        &config.storage.resolved_temp_dir(),
    )?;
    tracing::info!("Asset root at {}", storage.canonical_root().display());

    Ok(AppContext::new(
        db,
        config,
        storage,
        Arc::new(FfmpegTools::new(registry)),
    ))
}

/// Start the vidstash server.
///
/// Builds the [`AppContext`], spawns the finalize worker pool and serves HTTP
/// until a shutdown signal is received.
pub async fn start(config: Config) -> vs_core::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| vs_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = build_context(config)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| vs_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    let cancel = CancellationToken::new();
    serve(ctx, listener, cancel).await
}

/// Serve HTTP on `listener` alongside the worker pool until `cancel` fires
/// or a shutdown signal arrives.
pub async fn serve(
    ctx: AppContext,
    listener: tokio::net::TcpListener,
    cancel: CancellationToken,
) -> vs_core::Result<()> {
    let workers = tokio::spawn(finalizer::run_worker_pool(ctx.clone(), cancel.clone()));

    let app = router::build_router(ctx);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    // Signal the workers to stop and wait for in-flight jobs.
    cancel.cancel();
    if let Err(e) = workers.await {
        tracing::error!("Worker pool task failed: {e}");
    }

    served.map_err(|e| vs_core::Error::Internal(format!("Server error: {e}")))?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_context_prepares_storage_and_db() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.db_path = dir.path().join("db/vidstash.db");
        config.storage.asset_root = dir.path().join("assets");
        config.tools.ffmpeg_path = Some(dir.path().join("no-ffmpeg"));
        config.tools.ffprobe_path = Some(dir.path().join("no-ffprobe"));

        let held = {
            let db = vs_db::pool::init_pool(&config.server.db_path).unwrap();
            let conn = vs_db::pool::get_conn(&db).unwrap();
            let job = vs_db::queries::finalize_jobs::create_job(
                &conn,
                vs_core::AssetId::new(),
                vs_db::queries::finalize_jobs::HELD,
                3,
            )
            .unwrap();
            job.id
        };

        let ctx = build_context(config).unwrap();
        assert!(dir.path().join("db/vidstash.db").exists());
        let conn = vs_db::pool::get_conn(&ctx.db).unwrap();
        let job = vs_db::queries::finalize_jobs::get_job(&conn, held).unwrap().unwrap();
        assert!(job.run_after <= vs_db::now());
        assert!(ctx.storage.root().join("videos").is_dir());
        assert!(ctx.storage.temp_dir().is_dir());
    }
}
