//! Static delivery of stored videos and thumbnails.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::Extension;

use crate::context::AppContext;
use crate::delivery;
use crate::error::AppError;
use crate::middleware::auth::MaybeUser;
use crate::middleware::request_id::RequestId;

/// GET /assets/*path
#[utoipa::path(
    get,
    path = "/assets/{path}",
    params(("path" = String, Path, description = "Path relative to the asset root")),
    responses(
        (status = 200, description = "Full file"),
        (status = 206, description = "Requested byte range of a video"),
        (status = 403, description = "Path escapes the asset root"),
        (status = 404, description = "No such file"),
        (status = 416, description = "Range not satisfiable")
    )
)]
pub async fn serve_asset(
    State(ctx): State<AppContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Extension(MaybeUser(user)): Extension<MaybeUser>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    tracing::debug!(
        path = %path,
        user = ?user.map(|u| u.to_string()),
        range = ?range,
        "Asset requested"
    );

    let result = async {
        let resolved = delivery::resolve_asset_path(ctx.storage.canonical_root(), &path).await?;
        delivery::serve_file(&resolved, range).await
    }
    .await;

    result.map_err(|e| AppError::new(e).with_request_id(request_id))
}
