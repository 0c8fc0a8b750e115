//! Finalize worker pool.
//!
//! A fixed number of workers poll the `finalize_jobs` table and claim due
//! jobs atomically. Finalizing an asset retries frame extraction at most once
//! when only a placeholder exists, refreshes probed metadata, closes the
//! processing journal and moves the asset to `READY`. Database or filesystem
//! failures re-queue the job with exponential backoff; once the attempts are
//! used up the job fails and the asset becomes `FAILED`.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vs_core::{Error, Result};
use vs_db::models::FinalizeJob;
use vs_db::queries::{assets, finalize_jobs};

use crate::context::AppContext;
use crate::derivatives::base_name;

/// Upper bound on the retry delay.
const MAX_BACKOFF_SECS: u64 = 300;

/// What a successful job run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Asset moved to `READY`.
    Finalized,
    /// The asset row no longer exists.
    AssetMissing,
    /// A previous delivery already finished the asset.
    AlreadyTerminal,
}

/// Start `worker.concurrency` workers and wait for all of them to stop.
///
/// Runs until the cancellation token is triggered.
pub async fn run_worker_pool(ctx: AppContext, cancel: CancellationToken) {
    let workers = ctx.config.worker.concurrency.max(1);
    tracing::info!(workers, "Finalize worker pool started");

    let mut set = JoinSet::new();
    for n in 0..workers {
        set.spawn(run_worker(ctx.clone(), cancel.clone(), format!("finalizer-{n}")));
    }

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Finalize worker panicked: {e}");
        }
    }

    tracing::info!("Finalize worker pool stopped");
}

async fn run_worker(ctx: AppContext, cancel: CancellationToken, worker_id: String) {
    let poll = Duration::from_secs(ctx.config.worker.poll_interval_secs.max(1));

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match process_next_job(&ctx, &worker_id).await {
            // Processed a job; immediately check for the next one.
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => tracing::error!(worker = %worker_id, "Finalize worker error: {e}"),
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = cancel.cancelled() => break,
        }
    }

    tracing::debug!(worker = %worker_id, "Finalize worker stopped");
}

/// Claim and run one due job.
///
/// Returns `Ok(true)` if a job was claimed, `Ok(false)` if none were due.
pub async fn process_next_job(ctx: &AppContext, worker_id: &str) -> Result<bool> {
    let job = {
        let conn = vs_db::pool::get_conn(&ctx.db)?;
        finalize_jobs::dequeue_due(&conn, worker_id, &vs_db::now())?
    };
    let Some(job) = job else {
        return Ok(false);
    };

    tracing::info!(
        job_id = %job.id,
        asset_id = %job.asset_id,
        attempt = job.attempts,
        worker = worker_id,
        "Finalizing asset"
    );

    match finalize_asset(ctx, &job).await {
        Ok(outcome) => {
            let conn = vs_db::pool::get_conn(&ctx.db)?;
            finalize_jobs::complete_job(&conn, job.id)?;
            tracing::info!(job_id = %job.id, asset_id = %job.asset_id, ?outcome, "Finalize job completed");
        }
        Err(e) => record_failure(ctx, &job, &e)?,
    }

    Ok(true)
}

/// Run every job that is currently due; returns how many were claimed.
pub async fn drain_due_jobs(ctx: &AppContext) -> Result<usize> {
    let mut n = 0;
    while process_next_job(ctx, "drain").await? {
        n += 1;
    }
    Ok(n)
}

/// Finalize the asset behind `job`.
pub async fn finalize_asset(ctx: &AppContext, job: &FinalizeJob) -> Result<Outcome> {
    let asset = {
        let conn = vs_db::pool::get_conn(&ctx.db)?;
        assets::get_asset(&conn, job.asset_id)?
    };
    let Some(asset) = asset else {
        tracing::info!(asset_id = %job.asset_id, "Asset vanished before finalization");
        return Ok(Outcome::AssetMissing);
    };
    if asset.status.is_terminal() {
        return Ok(Outcome::AlreadyTerminal);
    }

    let derivatives = ctx.derivatives();
    let video_path = ctx.storage.absolute(&asset.storage_path);
    let base = base_name(&asset.storage_path)
        .ok_or_else(|| Error::Internal(format!("bad storage path {}", asset.storage_path)))?;

    let thumbnail_on_disk = asset
        .thumbnail_path
        .as_deref()
        .is_some_and(|p| ctx.storage.absolute(p).is_file());
    let has_real_thumbnail =
        thumbnail_on_disk && asset.thumbnail_source.is_some_and(|s| s.is_real());

    if !has_real_thumbnail {
        let thumb = match derivatives.extract(&video_path, base).await {
            Ok(thumb) => Some(thumb),
            Err(e) => {
                tracing::info!(asset_id = %asset.id, error = %e, "Extraction retry failed; keeping placeholder");
                if thumbnail_on_disk {
                    None
                } else {
                    Some(derivatives.placeholder(base).await?)
                }
            }
        };
        if let Some(thumb) = thumb {
            let conn = vs_db::pool::get_conn(&ctx.db)?;
            let saved = assets::set_thumbnail(&conn, asset.id, &thumb.relative_path, thumb.source)?;
            // An extracted frame supersedes the stale placeholder file.
            if let Some(old) = asset.thumbnail_path.as_deref() {
                if saved && old != thumb.relative_path {
                    ctx.storage.remove(old);
                }
            }
        }
    }

    if let Some(meta) = derivatives.probe(&video_path).await {
        let conn = vs_db::pool::get_conn(&ctx.db)?;
        assets::set_media_info(&conn, asset.id, meta.duration_secs, &meta.resolution())?;
    }

    let now = chrono::Utc::now();
    let journal = asset.processing_journal.complete(now);
    let conn = vs_db::pool::get_conn(&ctx.db)?;
    if assets::mark_ready(&conn, asset.id, &journal, &vs_db::timestamp(now))? {
        return Ok(Outcome::Finalized);
    }

    match assets::get_asset(&conn, asset.id)? {
        None => Ok(Outcome::AssetMissing),
        Some(current) if current.status.is_terminal() => Ok(Outcome::AlreadyTerminal),
        Some(_) => Err(Error::Internal(format!(
            "asset {} could not be marked ready",
            asset.id
        ))),
    }
}

fn record_failure(ctx: &AppContext, job: &FinalizeJob, error: &Error) -> Result<()> {
    let conn = vs_db::pool::get_conn(&ctx.db)?;
    let message = error.to_string();

    if job.is_last_attempt() {
        finalize_jobs::fail_job(&conn, job.id, &message)?;
        let failed = assets::mark_failed(&conn, job.asset_id)?;
        tracing::error!(
            job_id = %job.id,
            asset_id = %job.asset_id,
            attempts = job.attempts,
            asset_failed = failed,
            error = %message,
            "Finalize job failed permanently"
        );
    } else {
        let delay = backoff_secs(job.attempts);
        let run_after =
            vs_db::timestamp(chrono::Utc::now() + chrono::Duration::seconds(delay as i64));
        finalize_jobs::retry_later(&conn, job.id, &message, &run_after)?;
        tracing::warn!(
            job_id = %job.id,
            asset_id = %job.asset_id,
            attempt = job.attempts,
            retry_in_secs = delay,
            error = %message,
            "Finalize job failed; will retry"
        );
    }

    Ok(())
}

/// Exponential backoff: 2^attempts seconds, capped.
pub fn backoff_secs(attempts: i32) -> u64 {
    let exp = attempts.clamp(0, 16) as u32;
    2u64.pow(exp).min(MAX_BACKOFF_SECS)
}
