//! Asset record responses and the status endpoint.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;
use vs_core::{AssetId, AssetStatus, Privacy, ProcessingJournal, ThumbnailSource};
use vs_db::models::{Asset, Channel};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::MaybeUser;
use crate::middleware::request_id::RequestId;

/// Owning channel as embedded in asset responses.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ChannelSummary {
    pub id: String,
    pub name: String,
}

impl ChannelSummary {
    pub fn from_model(channel: &Channel) -> Self {
        Self {
            id: channel.id.to_string(),
            name: channel.name.clone(),
        }
    }
}

/// Asset as returned by the upload endpoint.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: AssetStatus,
    pub created_at: String,
    pub channel: ChannelSummary,
    /// Relative to the asset root; served under `/assets/`.
    pub thumbnail_path: Option<String>,
    pub privacy: Privacy,
    pub tags: Vec<String>,
}

impl AssetSummary {
    pub fn from_model(asset: &Asset, channel: &Channel) -> Self {
        Self {
            id: asset.id.to_string(),
            title: asset.title.clone(),
            description: asset.description.clone(),
            status: asset.status,
            created_at: asset.created_at.clone(),
            channel: ChannelSummary::from_model(channel),
            thumbnail_path: asset.thumbnail_path.clone(),
            privacy: asset.privacy,
            tags: asset.tags.clone(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub asset: AssetSummary,
}

/// Full asset record, used for polling finalization.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssetDetail {
    pub id: String,
    pub channel: ChannelSummary,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub privacy: Privacy,
    pub status: AssetStatus,
    pub storage_path: String,
    pub video_url: String,
    pub thumbnail_path: Option<String>,
    pub thumbnail_url: Option<String>,
    pub thumbnail_source: Option<ThumbnailSource>,
    pub duration_secs: f64,
    pub resolution: String,
    pub size_bytes: i64,
    pub processing_journal: ProcessingJournal,
    pub created_at: String,
    pub published_at: Option<String>,
}

impl AssetDetail {
    pub fn from_model(asset: &Asset, channel: &Channel) -> Self {
        Self {
            id: asset.id.to_string(),
            channel: ChannelSummary::from_model(channel),
            title: asset.title.clone(),
            description: asset.description.clone(),
            category: asset.category.clone(),
            tags: asset.tags.clone(),
            privacy: asset.privacy,
            status: asset.status,
            storage_path: asset.storage_path.clone(),
            video_url: delivery_url(&asset.storage_path),
            thumbnail_path: asset.thumbnail_path.clone(),
            thumbnail_url: asset.thumbnail_path.as_deref().map(delivery_url),
            thumbnail_source: asset.thumbnail_source,
            duration_secs: asset.duration_secs,
            resolution: asset.resolution.clone(),
            size_bytes: asset.size_bytes,
            processing_journal: asset.processing_journal.clone(),
            created_at: asset.created_at.clone(),
            published_at: asset.published_at.clone(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AssetDetailResponse {
    pub asset: AssetDetail,
}

/// URL under which a stored relative path is delivered.
pub fn delivery_url(relative: &str) -> String {
    format!("/assets/{relative}")
}

/// GET /api/assets/:id
#[utoipa::path(
    get,
    path = "/api/assets/{id}",
    params(("id" = String, Path, description = "Asset ID")),
    responses(
        (status = 200, description = "Asset record", body = AssetDetailResponse),
        (status = 404, description = "Asset not found or not visible")
    )
)]
pub async fn get_asset(
    State(ctx): State<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Path(id): Path<String>,
) -> Result<Json<AssetDetailResponse>, AppError> {
    load_visible(&ctx, &id, user)
        .map(|asset| Json(AssetDetailResponse { asset }))
        .map_err(|e| AppError::new(e).with_request_id(request_id))
}

fn load_visible(
    ctx: &AppContext,
    id: &str,
    user: Option<vs_core::UserId>,
) -> vs_core::Result<AssetDetail> {
    let asset_id: AssetId = id
        .parse()
        .map_err(|_| vs_core::Error::not_found("asset", id))?;

    let conn = vs_db::pool::get_conn(&ctx.db)?;
    let asset = vs_db::queries::assets::get_asset(&conn, asset_id)?
        .ok_or_else(|| vs_core::Error::not_found("asset", id))?;
    let channel = vs_db::queries::channels::get_channel(&conn, asset.channel_id)?
        .ok_or_else(|| vs_core::Error::not_found("channel", asset.channel_id))?;

    if asset.privacy == Privacy::Private && user != Some(channel.user_id) {
        return Err(vs_core::Error::not_found("asset", id));
    }

    Ok(AssetDetail::from_model(&asset, &channel))
}
