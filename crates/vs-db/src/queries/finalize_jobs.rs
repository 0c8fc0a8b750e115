//! Durable finalize job queue.
//!
//! Jobs move `queued -> processing -> completed | failed`. A `processing` job
//! may go back to `queued` through [`retry_later`] or, after a crash,
//! [`reset_orphaned_jobs`].

use rusqlite::Connection;
use vs_core::{AssetId, Error, JobId, Result};

use crate::models::FinalizeJob;

/// `run_after` of a job that is enqueued but must not run yet.
///
/// Ingestion holds the job while it generates derivatives inline and then
/// [`schedule`]s it. Held jobs left behind by a crash are freed by
/// [`release_held_jobs`] on startup.
pub const HELD: &str = "9999-12-31T23:59:59.999Z";

const COLS: &str = "id, asset_id, status, attempts, max_attempts, run_after,
    locked_by, locked_at, error, created_at, completed_at";

/// Enqueue a finalize job for an asset, due at `run_after`.
pub fn create_job(
    conn: &Connection,
    asset_id: AssetId,
    run_after: &str,
    max_attempts: u32,
) -> Result<FinalizeJob> {
    let id = JobId::new();
    let now = crate::now();
    let max_attempts = max_attempts.max(1) as i32;

    conn.execute(
        "INSERT INTO finalize_jobs (id, asset_id, status, attempts, max_attempts, run_after, created_at)
         VALUES (?1, ?2, 'queued', 0, ?3, ?4, ?5)",
        rusqlite::params![id.to_string(), asset_id.to_string(), max_attempts, run_after, &now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(FinalizeJob {
        id,
        asset_id,
        status: "queued".to_string(),
        attempts: 0,
        max_attempts,
        run_after: run_after.to_string(),
        locked_by: None,
        locked_at: None,
        error: None,
        created_at: now,
        completed_at: None,
    })
}

/// Get a job by ID.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<FinalizeJob>> {
    let q = format!("SELECT {COLS} FROM finalize_jobs WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], FinalizeJob::from_row) {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// All jobs recorded for an asset, oldest first.
pub fn jobs_for_asset(conn: &Connection, asset_id: AssetId) -> Result<Vec<FinalizeJob>> {
    let q = format!("SELECT {COLS} FROM finalize_jobs WHERE asset_id = ?1 ORDER BY created_at ASC");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([asset_id.to_string()], FinalizeJob::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Atomically claim the oldest queued job whose `run_after <= now`.
///
/// Sets `status='processing'`, the lock columns, and increments `attempts`.
pub fn dequeue_due(conn: &Connection, worker: &str, now: &str) -> Result<Option<FinalizeJob>> {
    let q = format!(
        "UPDATE finalize_jobs
         SET status='processing', locked_by=?1, locked_at=?2, attempts=attempts+1
         WHERE id = (
             SELECT id FROM finalize_jobs
             WHERE status='queued' AND run_after <= ?2
             ORDER BY run_after ASC, created_at ASC LIMIT 1
         )
         RETURNING {COLS}"
    );

    match conn.query_row(&q, rusqlite::params![worker, now], FinalizeJob::from_row) {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Mark a job as completed.
pub fn complete_job(conn: &Connection, id: JobId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE finalize_jobs SET status='completed', error=NULL, locked_by=NULL,
                locked_at=NULL, completed_at=?1
             WHERE id=?2",
            rusqlite::params![crate::now(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a job as permanently failed.
pub fn fail_job(conn: &Connection, id: JobId, error: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE finalize_jobs SET status='failed', error=?1, locked_by=NULL,
                locked_at=NULL, completed_at=?2
             WHERE id=?3",
            rusqlite::params![error, crate::now(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Put a claimed job back in the queue, due again at `run_after`.
pub fn retry_later(conn: &Connection, id: JobId, error: &str, run_after: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE finalize_jobs SET status='queued', error=?1, run_after=?2,
                locked_by=NULL, locked_at=NULL
             WHERE id=?3 AND status='processing'",
            rusqlite::params![error, run_after, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Make a queued job due at `run_after`.
pub fn schedule(conn: &Connection, id: JobId, run_after: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE finalize_jobs SET run_after=?1 WHERE id=?2 AND status='queued'",
            rusqlite::params![run_after, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Make every still-held job due at `now`. Returns the number released.
pub fn release_held_jobs(conn: &Connection, now: &str) -> Result<usize> {
    conn.execute(
        "UPDATE finalize_jobs SET run_after=?1 WHERE status='queued' AND run_after=?2",
        rusqlite::params![now, HELD],
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Re-queue jobs left `processing` by a previous process.
///
/// The interrupted attempt is not counted. Returns the number of jobs reset.
pub fn reset_orphaned_jobs(conn: &Connection) -> Result<usize> {
    conn.execute(
        "UPDATE finalize_jobs SET status='queued', locked_by=NULL, locked_at=NULL,
            attempts=MAX(attempts - 1, 0)
         WHERE status='processing'",
        [],
    )
    .map_err(|e| Error::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;

    const PAST: &str = "2000-01-01T00:00:00.000Z";
    const FUTURE: &str = "2999-01-01T00:00:00.000Z";

    #[test]
    fn only_due_jobs_are_claimed() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let later = create_job(&conn, AssetId::new(), FUTURE, 3).unwrap();
        let due = create_job(&conn, AssetId::new(), PAST, 3).unwrap();

        let now = crate::now();
        let claimed = dequeue_due(&conn, "w1", &now).unwrap().unwrap();
        assert_eq!(claimed.id, due.id);
        assert_eq!(claimed.status, "processing");
        assert_eq!(claimed.attempts, 1);
        assert_eq!(claimed.locked_by.as_deref(), Some("w1"));

        assert!(dequeue_due(&conn, "w2", &now).unwrap().is_none());
        assert_eq!(get_job(&conn, later.id).unwrap().unwrap().status, "queued");
    }

    #[test]
    fn held_job_waits_for_schedule() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let job = create_job(&conn, AssetId::new(), HELD, 3).unwrap();
        let now = crate::now();
        assert!(dequeue_due(&conn, "w1", &now).unwrap().is_none());

        assert!(schedule(&conn, job.id, PAST).unwrap());
        let claimed = dequeue_due(&conn, "w1", &now).unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        // Only queued jobs can be rescheduled.
        assert!(!schedule(&conn, job.id, FUTURE).unwrap());
    }

    #[test]
    fn held_jobs_are_released() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let held = create_job(&conn, AssetId::new(), HELD, 3).unwrap();
        let later = create_job(&conn, AssetId::new(), FUTURE, 3).unwrap();
        let now = crate::now();

        assert_eq!(release_held_jobs(&conn, &now).unwrap(), 1);
        assert_eq!(get_job(&conn, held.id).unwrap().unwrap().run_after, now);
        assert_eq!(get_job(&conn, later.id).unwrap().unwrap().run_after, FUTURE);
    }

    #[test]
    fn claimed_job_is_not_claimed_twice() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        create_job(&conn, AssetId::new(), PAST, 3).unwrap();
        let now = crate::now();
        assert!(dequeue_due(&conn, "w1", &now).unwrap().is_some());
        assert!(dequeue_due(&conn, "w2", &now).unwrap().is_none());
    }

    #[test]
    fn retry_then_complete() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let job = create_job(&conn, AssetId::new(), PAST, 3).unwrap();
        let now = crate::now();

        let claimed = dequeue_due(&conn, "w1", &now).unwrap().unwrap();
        assert!(retry_later(&conn, claimed.id, "disk full", PAST).unwrap());
        let requeued = get_job(&conn, job.id).unwrap().unwrap();
        assert_eq!(requeued.status, "queued");
        assert_eq!(requeued.error.as_deref(), Some("disk full"));

        let again = dequeue_due(&conn, "w1", &now).unwrap().unwrap();
        assert_eq!(again.attempts, 2);
        assert!(complete_job(&conn, again.id).unwrap());
        let done = get_job(&conn, job.id).unwrap().unwrap();
        assert_eq!(done.status, "completed");
        assert!(done.completed_at.is_some());
        assert!(done.error.is_none());
    }

    #[test]
    fn last_attempt_and_fail() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        create_job(&conn, AssetId::new(), PAST, 1).unwrap();
        let claimed = dequeue_due(&conn, "w1", &crate::now()).unwrap().unwrap();
        assert!(claimed.is_last_attempt());

        assert!(fail_job(&conn, claimed.id, "gave up").unwrap());
        let failed = get_job(&conn, claimed.id).unwrap().unwrap();
        assert_eq!(failed.status, "failed");
        // Not claimable anymore
        assert!(!retry_later(&conn, claimed.id, "x", PAST).unwrap());
    }

    #[test]
    fn orphans_are_requeued() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let asset_id = AssetId::new();
        create_job(&conn, asset_id, PAST, 3).unwrap();
        dequeue_due(&conn, "crashed", &crate::now()).unwrap().unwrap();

        assert_eq!(reset_orphaned_jobs(&conn).unwrap(), 1);
        let jobs = jobs_for_asset(&conn, asset_id).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, "queued");
        assert_eq!(jobs[0].attempts, 0);
        assert!(jobs[0].locked_by.is_none());
    }
}
