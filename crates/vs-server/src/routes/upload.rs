//! Video ingestion.
//!
//! The multipart body is streamed field by field. File parts go straight to
//! temp files with their size ceilings enforced while streaming, so an
//! oversized upload is rejected before anything is persisted. Only after
//! every field has been read and validated is the video moved into place and
//! the asset row created.

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use vs_core::config::IngestConfig;
use vs_core::media_type::check_upload;
use vs_core::{ArtifactKind, Error, MediaKind, Privacy, Result, UserId};
use vs_db::models::{Asset, FinalizeJob};
use vs_db::queries::assets::NewAsset;
use vs_db::queries::finalize_jobs;

use crate::context::AppContext;
use crate::derivatives::SuppliedThumbnail;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;
use crate::routes::assets::{AssetSummary, UploadResponse};
use crate::storage::{AssetStorage, StoredFile, TempUpload};

pub const MAX_DESCRIPTION_CHARS: usize = 5000;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_CHARS: usize = 30;
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;
const MAX_FINALIZE_DELAY_SECS: u64 = 86_400 * 365;

/// Shape of the multipart form, for the OpenAPI document.
#[allow(dead_code)]
#[derive(serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    video: Vec<u8>,
    title: String,
    description: Option<String>,
    category: Option<String>,
    privacy: Option<Privacy>,
    /// Comma-separated.
    tags: Option<String>,
    #[schema(value_type = Option<String>, format = Binary)]
    custom_thumbnail: Option<Vec<u8>>,
}

struct IncomingVideo {
    upload: TempUpload,
    ext: &'static str,
}

#[derive(Default)]
struct RawForm {
    video: Option<IncomingVideo>,
    thumbnail: Option<SuppliedThumbnail>,
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    privacy: Option<String>,
    tags: Option<String>,
}

/// Validated text metadata of an upload.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetMetadata {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub privacy: Privacy,
    pub tags: Vec<String>,
}

impl AssetMetadata {
    pub fn validate(
        title: Option<&str>,
        description: Option<&str>,
        category: Option<&str>,
        privacy: Option<&str>,
        tags: Option<&str>,
        max_title_chars: usize,
    ) -> Result<Self> {
        let title = title.map(str::trim).unwrap_or_default();
        if title.is_empty() {
            return Err(Error::Validation("title is required".into()));
        }
        if title.chars().count() > max_title_chars {
            return Err(Error::Validation(format!(
                "title must be at most {max_title_chars} characters"
            )));
        }

        let description = description.map(str::trim).unwrap_or_default();
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(Error::Validation(format!(
                "description must be at most {MAX_DESCRIPTION_CHARS} characters"
            )));
        }

        let privacy = match privacy.map(str::trim) {
            None | Some("") => Privacy::default(),
            Some(p) => p.parse()?,
        };

        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
            category: category
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from),
            privacy,
            tags: parse_tags(tags.unwrap_or_default())?,
        })
    }
}

/// Split a comma-separated tag list: trimmed, lower-cased, empties dropped,
/// duplicates collapsed.
pub fn parse_tags(raw: &str) -> Result<Vec<String>> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(|t| t.trim().to_lowercase()) {
        if tag.is_empty() || tags.contains(&tag) {
            continue;
        }
        if tag.chars().count() > MAX_TAG_CHARS {
            return Err(Error::Validation(format!(
                "tags must be at most {MAX_TAG_CHARS} characters"
            )));
        }
        tags.push(tag);
    }
    if tags.len() > MAX_TAGS {
        return Err(Error::Validation(format!("at most {MAX_TAGS} tags are allowed")));
    }
    Ok(tags)
}

/// POST /api/assets
#[utoipa::path(
    post,
    path = "/api/assets",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Asset created", body = UploadResponse),
        (status = 400, description = "Invalid form"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Caller has no channel"),
        (status = 413, description = "Upload too large")
    )
)]
pub async fn upload_asset(
    State(ctx): State<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Extension(user_id): Extension<UserId>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<(StatusCode, Json<UploadResponse>), AppError> {
    let result = match multipart {
        Ok(multipart) => ingest(&ctx, user_id, multipart).await,
        Err(rejection) => Err(Error::Validation(rejection.body_text())),
    };

    result
        .map(|resp| (StatusCode::CREATED, Json(resp)))
        .map_err(|e| AppError::new(e).with_request_id(request_id))
}

async fn ingest(ctx: &AppContext, user_id: UserId, multipart: Multipart) -> Result<UploadResponse> {
    let channel = {
        let conn = vs_db::pool::get_conn(&ctx.db)?;
        vs_db::queries::channels::get_channel_for_user(&conn, user_id)?
            .ok_or_else(|| Error::not_found("channel for user", user_id))?
    };

    let form = read_form(&ctx.storage, &ctx.config.ingest, multipart).await?;
    let video = form
        .video
        .ok_or_else(|| Error::Validation("video file is required".into()))?;
    let metadata = AssetMetadata::validate(
        form.title.as_deref(),
        form.description.as_deref(),
        form.category.as_deref(),
        form.privacy.as_deref(),
        form.tags.as_deref(),
        ctx.config.ingest.max_title_chars,
    )?;

    let base = AssetStorage::generate_base_name();
    let stored = ctx
        .storage
        .persist(video.upload, ArtifactKind::Video, &base, video.ext)?;

    let new = NewAsset {
        channel_id: channel.id,
        title: &metadata.title,
        description: &metadata.description,
        category: metadata.category.as_deref(),
        tags: &metadata.tags,
        privacy: metadata.privacy,
        storage_path: &stored.relative_path,
        size_bytes: i64::try_from(stored.size_bytes).unwrap_or(i64::MAX),
        resolution: &ctx.config.derivatives.default_resolution,
    };
    // The job stays held until the inline derivative pass below is done, so
    // a worker never runs against the same asset concurrently.
    let created = vs_db::pool::get_conn(&ctx.db).and_then(|conn| {
        vs_db::queries::assets::create_asset_with_job(
            &conn,
            &new,
            finalize_jobs::HELD,
            ctx.config.worker.max_attempts,
        )
    });
    let (asset, job) = match created {
        Ok(created) => created,
        Err(e) => {
            ctx.storage.remove(&stored.relative_path);
            return Err(e);
        }
    };

    tracing::info!(
        asset_id = %asset.id,
        job_id = %job.id,
        channel_id = %channel.id,
        size_bytes = stored.size_bytes,
        path = %stored.relative_path,
        "Asset ingested"
    );

    // Spawned so a client disconnect cannot leave the job held.
    let task_ctx = ctx.clone();
    let supplied = form.thumbnail;
    let asset = tokio::spawn(async move {
        let asset = attach_derivatives(&task_ctx, asset, &stored, &base, supplied).await;
        schedule_finalize(&task_ctx, &job);
        asset
    })
    .await
    .map_err(|e| Error::Internal(format!("derivative task failed: {e}")))?;

    Ok(UploadResponse {
        asset: AssetSummary::from_model(&asset, &channel),
    })
}

/// Release the held finalize job, due after the configured delay.
fn schedule_finalize(ctx: &AppContext, job: &FinalizeJob) {
    let delay = ctx.config.worker.finalize_delay_secs.min(MAX_FINALIZE_DELAY_SECS) as i64;
    let run_after = vs_db::timestamp(chrono::Utc::now() + chrono::Duration::seconds(delay));
    let scheduled = vs_db::pool::get_conn(&ctx.db)
        .and_then(|conn| finalize_jobs::schedule(&conn, job.id, &run_after));
    match scheduled {
        Ok(true) => tracing::debug!(job_id = %job.id, run_after = %run_after, "Finalize job scheduled"),
        Ok(false) => tracing::warn!(job_id = %job.id, "Finalize job was no longer queued"),
        Err(e) => tracing::error!(
            job_id = %job.id,
            error = %e,
            "Failed to schedule finalize job; it is released on next start"
        ),
    }
}

/// Best-effort thumbnail and metadata for a freshly created asset. Failures
/// are logged and left for the finalize worker.
async fn attach_derivatives(
    ctx: &AppContext,
    mut asset: Asset,
    stored: &StoredFile,
    base: &str,
    supplied: Option<SuppliedThumbnail>,
) -> Asset {
    let derivatives = ctx.derivatives();

    match derivatives
        .generate_thumbnail(&stored.absolute_path, base, supplied)
        .await
    {
        Ok(thumb) => {
            let saved = vs_db::pool::get_conn(&ctx.db).and_then(|conn| {
                vs_db::queries::assets::set_thumbnail(&conn, asset.id, &thumb.relative_path, thumb.source)
            });
            match saved {
                Ok(true) => {
                    asset.thumbnail_path = Some(thumb.relative_path);
                    asset.thumbnail_source = Some(thumb.source);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(asset_id = %asset.id, error = %e, "Failed to record thumbnail"),
            }
        }
        Err(e) => tracing::warn!(asset_id = %asset.id, error = %e, "Thumbnail generation failed"),
    }

    if let Some(meta) = derivatives.probe(&stored.absolute_path).await {
        let resolution = meta.resolution();
        let saved = vs_db::pool::get_conn(&ctx.db).and_then(|conn| {
            vs_db::queries::assets::set_media_info(&conn, asset.id, meta.duration_secs, &resolution)
        });
        match saved {
            Ok(true) => {
                asset.duration_secs = meta.duration_secs;
                asset.resolution = resolution;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(asset_id = %asset.id, error = %e, "Failed to record media info"),
        }
    }

    asset
}

fn multipart_err(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(e.body_text())
    } else {
        Error::Validation(e.body_text())
    }
}

async fn read_form(
    storage: &AssetStorage,
    limits: &IngestConfig,
    mut multipart: Multipart,
) -> Result<RawForm> {
    let mut form = RawForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => {
                if form.video.is_some() {
                    return Err(Error::Validation("only one video may be uploaded".into()));
                }
                let file_name = field.file_name().unwrap_or_default().to_string();
                let ext = check_upload(&file_name, field.content_type(), MediaKind::Video)
                    .ok_or_else(|| {
                        Error::Validation(format!("unsupported video file '{file_name}'"))
                    })?;
                let mut upload = storage.temp_upload()?;
                upload.write_stream(field, limits.max_video_bytes, "video").await?;
                form.video = Some(IncomingVideo { upload, ext });
            }
            "customThumbnail" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                if file_name.is_empty() {
                    continue;
                }
                if form.thumbnail.is_some() {
                    return Err(Error::Validation("only one thumbnail may be uploaded".into()));
                }
                let ext = check_upload(&file_name, field.content_type(), MediaKind::Image)
                    .ok_or_else(|| {
                        Error::Validation(format!("unsupported thumbnail file '{file_name}'"))
                    })?;
                let mut upload = storage.temp_upload()?;
                upload
                    .write_stream(field, limits.max_thumbnail_bytes, "thumbnail")
                    .await?;
                if upload.size() > 0 {
                    form.thumbnail = Some(SuppliedThumbnail { upload, ext });
                }
            }
            "title" => form.title = Some(read_text(field, "title").await?),
            "description" => form.description = Some(read_text(field, "description").await?),
            "category" => form.category = Some(read_text(field, "category").await?),
            "privacy" => form.privacy = Some(read_text(field, "privacy").await?),
            "tags" => form.tags = Some(read_text(field, "tags").await?),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

async fn read_text(mut field: Field<'_>, name: &str) -> Result<String> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_err)? {
        if buf.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(Error::Validation(format!("{name} is too long")));
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf).map_err(|_| Error::Validation(format!("{name} must be valid UTF-8")))
}
