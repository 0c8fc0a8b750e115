//! Integration tests for the finalize worker.

mod common;

use std::time::Duration;

use common::{payload, TestHarness};
use tokio_util::sync::CancellationToken;
use vs_core::{AssetId, AssetStatus, JournalStatus, ThumbnailSource};
use vs_db::queries::{assets, finalize_jobs};
use vs_server::finalizer::{self, Outcome};

const FUTURE: &str = "2999-01-01T00:00:00.000Z";

/// Replace the thumbnails directory with a plain file so nothing can be
/// written there.
fn break_thumbnail_dir(h: &TestHarness) {
    let dir = h.storage().root().join("thumbnails");
    std::fs::remove_dir_all(&dir).unwrap();
    std::fs::write(&dir, b"not a directory").unwrap();
}

#[tokio::test]
async fn renders_placeholder_when_none_exists() {
    let h = TestHarness::new();
    let (asset, job) = h.insert_asset(&payload(1000), 3);
    assert!(asset.thumbnail_path.is_none());

    assert_eq!(finalizer::drain_due_jobs(&h.ctx).await.unwrap(), 1);

    let ready = h.asset(asset.id);
    assert_eq!(ready.status, AssetStatus::Ready);
    assert_eq!(ready.thumbnail_source, Some(ThumbnailSource::Placeholder));
    let img = image::open(h.absolute(ready.thumbnail_path.as_deref().unwrap())).unwrap();
    assert_eq!((img.width(), img.height()), (320, 180));
    assert_eq!(ready.processing_journal.status, JournalStatus::Completed);
    assert_eq!(ready.processing_journal.started_at, asset.processing_journal.started_at);
    assert!(ready.published_at.is_some());
    assert_eq!(h.tools.extracts(), 1);

    let job = finalize_jobs::get_job(&h.conn(), job.id).unwrap().unwrap();
    assert_eq!(job.status, "completed");
    assert_eq!(job.attempts, 1);
}

#[tokio::test]
async fn retry_extraction_replaces_placeholder() {
    let h = TestHarness::with_working_tools();
    let (asset, _) = h.insert_asset(&payload(1000), 3);
    let placeholder = h.ctx.derivatives().placeholder("stale").await.unwrap();
    assets::set_thumbnail(&h.conn(), asset.id, &placeholder.relative_path, placeholder.source)
        .unwrap();

    finalizer::drain_due_jobs(&h.ctx).await.unwrap();

    let ready = h.asset(asset.id);
    assert_eq!(ready.status, AssetStatus::Ready);
    assert_eq!(ready.thumbnail_source, Some(ThumbnailSource::Extracted));
    assert!(ready.thumbnail_path.as_deref().unwrap().ends_with(".jpg"));
    assert!(h.absolute(ready.thumbnail_path.as_deref().unwrap()).is_file());
    assert!(!h.absolute(&placeholder.relative_path).exists());
    assert_eq!(h.stored_files("thumbnails"), 1);
    assert_eq!(ready.resolution, "1920x1080");
    assert_eq!(ready.duration_secs, 12.5);
    assert_eq!(h.tools.extracts(), 1);
}

#[tokio::test]
async fn missing_asset_completes_job() {
    let h = TestHarness::new();
    let job = finalize_jobs::create_job(&h.conn(), AssetId::new(), &vs_db::now(), 3).unwrap();

    assert_eq!(finalizer::drain_due_jobs(&h.ctx).await.unwrap(), 1);
    let job = finalize_jobs::get_job(&h.conn(), job.id).unwrap().unwrap();
    assert_eq!(job.status, "completed");
}

#[tokio::test]
async fn redelivery_leaves_terminal_asset_alone() {
    let h = TestHarness::new();
    let (asset, job) = h.insert_asset(&payload(100), 3);
    finalizer::drain_due_jobs(&h.ctx).await.unwrap();
    let first = h.asset(asset.id);

    let outcome = finalizer::finalize_asset(&h.ctx, &job).await.unwrap();
    assert_eq!(outcome, Outcome::AlreadyTerminal);

    let again = h.asset(asset.id);
    assert_eq!(again.status, AssetStatus::Ready);
    assert_eq!(again.published_at, first.published_at);
    assert_eq!(again.processing_journal, first.processing_journal);
}

#[tokio::test]
async fn jobs_wait_until_due() {
    let h = TestHarness::new();
    let (asset, _) = h.insert_asset(&payload(100), 3);
    // Push the job into the future.
    let conn = h.conn();
    let job = finalize_jobs::dequeue_due(&conn, "test", &vs_db::now()).unwrap().unwrap();
    finalize_jobs::retry_later(&conn, job.id, "later", FUTURE).unwrap();
    drop(conn);

    assert_eq!(finalizer::drain_due_jobs(&h.ctx).await.unwrap(), 0);
    assert_eq!(h.asset(asset.id).status, AssetStatus::Processing);
}

#[tokio::test]
async fn failure_is_retried_with_backoff() {
    let h = TestHarness::new();
    let (asset, job) = h.insert_asset(&payload(100), 3);
    break_thumbnail_dir(&h);

    assert_eq!(finalizer::drain_due_jobs(&h.ctx).await.unwrap(), 1);

    let job = finalize_jobs::get_job(&h.conn(), job.id).unwrap().unwrap();
    assert_eq!(job.status, "queued");
    assert_eq!(job.attempts, 1);
    assert!(job.error.is_some());
    assert!(job.run_after > vs_db::now());
    assert_eq!(h.asset(asset.id).status, AssetStatus::Processing);
}

#[tokio::test]
async fn last_attempt_fails_asset() {
    let h = TestHarness::new();
    let (asset, job) = h.insert_asset(&payload(100), 1);
    break_thumbnail_dir(&h);

    finalizer::drain_due_jobs(&h.ctx).await.unwrap();

    let job = finalize_jobs::get_job(&h.conn(), job.id).unwrap().unwrap();
    assert_eq!(job.status, "failed");
    let failed = h.asset(asset.id);
    assert_eq!(failed.status, AssetStatus::Failed);
    assert_eq!(failed.processing_journal.status, JournalStatus::Processing);

    // A failed asset is never revived.
    let again = finalize_jobs::create_job(&h.conn(), asset.id, &vs_db::now(), 1).unwrap();
    finalizer::drain_due_jobs(&h.ctx).await.unwrap();
    assert_eq!(h.asset(asset.id).status, AssetStatus::Failed);
    let again = finalize_jobs::get_job(&h.conn(), again.id).unwrap().unwrap();
    assert_eq!(again.status, "completed");
}

#[tokio::test]
async fn interrupted_job_is_requeued_and_finished() {
    let h = TestHarness::new();
    let (asset, job) = h.insert_asset(&payload(100), 3);

    // Claimed by a worker that then died.
    let conn = h.conn();
    finalize_jobs::dequeue_due(&conn, "crashed", &vs_db::now()).unwrap().unwrap();
    assert_eq!(finalize_jobs::reset_orphaned_jobs(&conn).unwrap(), 1);
    drop(conn);

    assert_eq!(finalizer::drain_due_jobs(&h.ctx).await.unwrap(), 1);
    assert_eq!(h.asset(asset.id).status, AssetStatus::Ready);
    let job = finalize_jobs::get_job(&h.conn(), job.id).unwrap().unwrap();
    assert_eq!(job.attempts, 1);
}

#[tokio::test]
async fn worker_pool_finalizes_and_stops() {
    let h = TestHarness::with_file_db();
    let ids: Vec<AssetId> = (0..3).map(|_| h.insert_asset(&payload(64), 3).0.id).collect();

    let cancel = CancellationToken::new();
    let pool = tokio::spawn(finalizer::run_worker_pool(h.ctx.clone(), cancel.clone()));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if ids.iter().all(|id| h.asset(*id).status == AssetStatus::Ready) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "assets not finalized in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), pool)
        .await
        .expect("worker pool did not stop")
        .unwrap();
}
