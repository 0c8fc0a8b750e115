//! Asset persistence.
//!
//! Status transitions are guarded with `WHERE status = 'PROCESSING'`, so a
//! terminal asset is never moved again no matter how often a finalize job is
//! redelivered. `storage_path` is written once at insert and never updated.

use rusqlite::Connection;
use vs_core::{
    AssetId, AssetStatus, ChannelId, Error, Privacy, ProcessingJournal, Result, ThumbnailSource,
};

use crate::models::{Asset, FinalizeJob};
use crate::queries::{channels, finalize_jobs};

const COLS: &str = "id, channel_id, title, description, category, tags, privacy,
    storage_path, thumbnail_path, thumbnail_source, duration_secs, resolution,
    size_bytes, status, processing_journal, created_at, published_at";

/// Fields supplied by ingestion for a new asset.
#[derive(Debug, Clone)]
pub struct NewAsset<'a> {
    pub channel_id: ChannelId,
    pub title: &'a str,
    pub description: &'a str,
    pub category: Option<&'a str>,
    pub tags: &'a [String],
    pub privacy: Privacy,
    pub storage_path: &'a str,
    pub size_bytes: i64,
    pub resolution: &'a str,
}

/// Insert an asset in `PROCESSING`, bump its channel's counter and enqueue
/// its finalize job, all in one transaction.
pub fn create_asset_with_job(
    conn: &Connection,
    new: &NewAsset<'_>,
    run_after: &str,
    max_attempts: u32,
) -> Result<(Asset, FinalizeJob)> {
    let id = AssetId::new();
    let now = chrono::Utc::now();
    let created_at = crate::timestamp(now);
    let journal = ProcessingJournal::started(now);
    let tags_json =
        serde_json::to_string(new.tags).map_err(|e| Error::Internal(e.to_string()))?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    tx.execute(
        "INSERT INTO assets (id, channel_id, title, description, category, tags, privacy,
            storage_path, duration_secs, resolution, size_bytes, status,
            processing_journal, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?11, ?12, ?13)",
        rusqlite::params![
            id.to_string(),
            new.channel_id.to_string(),
            new.title,
            new.description,
            new.category,
            tags_json,
            new.privacy.as_str(),
            new.storage_path,
            new.resolution,
            new.size_bytes,
            AssetStatus::Processing.as_str(),
            journal.to_json()?,
            &created_at,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    if !channels::increment_asset_count(&tx, new.channel_id)? {
        return Err(Error::not_found("channel", new.channel_id));
    }

    let job = finalize_jobs::create_job(&tx, id, run_after, max_attempts)?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    let asset = Asset {
        id,
        channel_id: new.channel_id,
        title: new.title.to_string(),
        description: new.description.to_string(),
        category: new.category.map(String::from),
        tags: new.tags.to_vec(),
        privacy: new.privacy,
        storage_path: new.storage_path.to_string(),
        thumbnail_path: None,
        thumbnail_source: None,
        duration_secs: 0.0,
        resolution: new.resolution.to_string(),
        size_bytes: new.size_bytes,
        status: AssetStatus::Processing,
        processing_journal: journal,
        created_at,
        published_at: None,
    };
    Ok((asset, job))
}

/// Get an asset by ID.
pub fn get_asset(conn: &Connection, id: AssetId) -> Result<Option<Asset>> {
    let q = format!("SELECT {COLS} FROM assets WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], Asset::from_row) {
        Ok(a) => Ok(Some(a)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List a channel's assets, newest first.
pub fn list_channel_assets(conn: &Connection, channel_id: ChannelId) -> Result<Vec<Asset>> {
    let q = format!("SELECT {COLS} FROM assets WHERE channel_id = ?1 ORDER BY created_at DESC");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([channel_id.to_string()], Asset::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Total number of asset records.
pub fn count_assets(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))
        .map_err(|e| Error::database(e.to_string()))
}

/// Record the current thumbnail derivative.
pub fn set_thumbnail(
    conn: &Connection,
    id: AssetId,
    path: &str,
    source: ThumbnailSource,
) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE assets SET thumbnail_path = ?1, thumbnail_source = ?2
             WHERE id = ?3 AND status = 'PROCESSING'",
            rusqlite::params![path, source.as_str(), id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Overwrite probed duration and resolution.
///
/// Only called with a successful probe result; failed probes leave the
/// stored values alone.
pub fn set_media_info(
    conn: &Connection,
    id: AssetId,
    duration_secs: f64,
    resolution: &str,
) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE assets SET duration_secs = ?1, resolution = ?2
             WHERE id = ?3 AND status = 'PROCESSING'",
            rusqlite::params![duration_secs, resolution, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Transition `PROCESSING -> READY`, closing the journal.
///
/// Refuses (returns `false`) when the asset has no thumbnail or is already
/// terminal.
pub fn mark_ready(
    conn: &Connection,
    id: AssetId,
    journal: &ProcessingJournal,
    published_at: &str,
) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE assets SET status = 'READY', processing_journal = ?1, published_at = ?2
             WHERE id = ?3 AND status = 'PROCESSING' AND thumbnail_path IS NOT NULL",
            rusqlite::params![journal.to_json()?, published_at, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Transition `PROCESSING -> FAILED`.
pub fn mark_failed(conn: &Connection, id: AssetId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE assets SET status = 'FAILED' WHERE id = ?1 AND status = 'PROCESSING'",
            [id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::{channels, finalize_jobs, users};
    use vs_core::JournalStatus;

    fn setup(conn: &Connection) -> ChannelId {
        let user = users::create_user(conn, "uploader").unwrap();
        channels::create_channel(conn, user.id, "Uploads").unwrap().id
    }

    fn new_asset<'a>(channel_id: ChannelId, path: &'a str, tags: &'a [String]) -> NewAsset<'a> {
        NewAsset {
            channel_id,
            title: "My clip",
            description: "",
            category: Some("music"),
            tags,
            privacy: Privacy::Unlisted,
            storage_path: path,
            size_bytes: 10_000,
            resolution: "1280x720",
        }
    }

    #[test]
    fn create_is_atomic_with_counter_and_job() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let channel_id = setup(&conn);
        let tags = vec!["cats".to_string(), "funny".to_string()];

        let (asset, job) = create_asset_with_job(
            &conn,
            &new_asset(channel_id, "videos/1-abc.mp4", &tags),
            "2000-01-01T00:00:00.000Z",
            3,
        )
        .unwrap();

        assert_eq!(asset.status, AssetStatus::Processing);
        assert_eq!(job.asset_id, asset.id);

        let stored = get_asset(&conn, asset.id).unwrap().unwrap();
        assert_eq!(stored.tags, tags);
        assert_eq!(stored.privacy, Privacy::Unlisted);
        assert_eq!(stored.size_bytes, 10_000);
        assert_eq!(stored.processing_journal.status, JournalStatus::Processing);
        assert_eq!(stored.processing_journal.progress, 0);
        assert_eq!(
            channels::get_channel(&conn, channel_id).unwrap().unwrap().asset_count,
            1
        );
        assert_eq!(finalize_jobs::jobs_for_asset(&conn, asset.id).unwrap().len(), 1);
    }

    #[test]
    fn failed_insert_leaves_no_trace() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let channel_id = setup(&conn);

        create_asset_with_job(&conn, &new_asset(channel_id, "videos/dup.mp4", &[]), "x", 3)
            .unwrap();
        // Same storage path violates UNIQUE.
        assert!(create_asset_with_job(&conn, &new_asset(channel_id, "videos/dup.mp4", &[]), "x", 3)
            .is_err());

        assert_eq!(count_assets(&conn).unwrap(), 1);
        assert_eq!(
            channels::get_channel(&conn, channel_id).unwrap().unwrap().asset_count,
            1
        );
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let res = create_asset_with_job(
            &conn,
            &new_asset(ChannelId::new(), "videos/x.mp4", &[]),
            "x",
            3,
        );
        assert!(res.is_err());
        assert_eq!(count_assets(&conn).unwrap(), 0);
    }

    #[test]
    fn ready_requires_thumbnail() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let channel_id = setup(&conn);
        let (asset, _) =
            create_asset_with_job(&conn, &new_asset(channel_id, "videos/a.mp4", &[]), "x", 3)
                .unwrap();

        let journal = asset.processing_journal.complete(chrono::Utc::now());
        assert!(!mark_ready(&conn, asset.id, &journal, &crate::now()).unwrap());

        assert!(set_thumbnail(&conn, asset.id, "thumbnails/a.png", ThumbnailSource::Placeholder)
            .unwrap());
        assert!(mark_ready(&conn, asset.id, &journal, &crate::now()).unwrap());

        let stored = get_asset(&conn, asset.id).unwrap().unwrap();
        assert_eq!(stored.status, AssetStatus::Ready);
        assert!(stored.published_at.is_some());
        assert_eq!(stored.processing_journal.progress, 100);
        assert_eq!(stored.thumbnail_source, Some(ThumbnailSource::Placeholder));
    }

    #[test]
    fn terminal_status_is_sticky() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let channel_id = setup(&conn);
        let (asset, _) =
            create_asset_with_job(&conn, &new_asset(channel_id, "videos/b.mp4", &[]), "x", 3)
                .unwrap();

        assert!(mark_failed(&conn, asset.id).unwrap());
        assert!(!mark_failed(&conn, asset.id).unwrap());
        assert!(!set_thumbnail(&conn, asset.id, "thumbnails/b.png", ThumbnailSource::Placeholder)
            .unwrap());
        assert!(!set_media_info(&conn, asset.id, 12.0, "640x360").unwrap());

        let stored = get_asset(&conn, asset.id).unwrap().unwrap();
        assert_eq!(stored.status, AssetStatus::Failed);
        assert_eq!(stored.resolution, "1280x720");
    }

    #[test]
    fn media_info_overwrites_while_processing() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let channel_id = setup(&conn);
        let (asset, _) =
            create_asset_with_job(&conn, &new_asset(channel_id, "videos/c.mp4", &[]), "x", 3)
                .unwrap();
        assert!(set_media_info(&conn, asset.id, 42.5, "1920x1080").unwrap());
        let stored = get_asset(&conn, asset.id).unwrap().unwrap();
        assert_eq!(stored.duration_secs, 42.5);
        assert_eq!(stored.resolution, "1920x1080");
        assert_eq!(list_channel_assets(&conn, channel_id).unwrap().len(), 1);
    }
}
