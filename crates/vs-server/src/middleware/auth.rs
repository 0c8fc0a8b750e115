//! Authentication middleware.
//!
//! Uploads require a bearer token (or the configured API key). Reads of
//! assets and delivery accept an optional identity, which only widens what a
//! caller may see. With auth disabled every caller is the anonymous user.

use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use vs_core::config::AuthConfig;
use vs_core::UserId;
use vs_db::pool::DbPool;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;

/// Identity attached by [`optional_auth_middleware`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MaybeUser(pub Option<UserId>);

/// Resolve a caller from the `Authorization` header value.
///
/// Returns `None` when auth is enabled and no valid credential was given.
pub fn validate_auth_header(
    auth_config: &AuthConfig,
    db: &DbPool,
    authorization: Option<&str>,
) -> Option<UserId> {
    if !auth_config.enabled {
        return Some(UserId::ANONYMOUS);
    }

    let token = authorization?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }

    if auth_config.api_key.as_deref() == Some(token) {
        return Some(UserId::ANONYMOUS);
    }

    let conn = match vs_db::pool::get_conn(db) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(error = %e, "Token lookup skipped: no database connection");
            return None;
        }
    };
    match vs_db::queries::auth::get_valid_token(&conn, token, &vs_db::now()) {
        Ok(found) => found.map(|t| t.user_id),
        Err(e) => {
            tracing::warn!(error = %e, "Token lookup failed");
            None
        }
    }
}

fn authorization(request: &Request<axum::body::Body>) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Authentication middleware for protected routes.
///
/// On success, inserts the resolved [`UserId`] into request extensions.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let auth = authorization(&request);

    match validate_auth_header(&ctx.config.auth, &ctx.db, auth.as_deref()) {
        Some(user_id) => {
            request.extensions_mut().insert(user_id);
            Ok(next.run(request).await)
        }
        None => {
            let mut err = AppError::new(vs_core::Error::Unauthorized(
                "a valid bearer token is required".into(),
            ));
            if let Some(RequestId(id)) = request.extensions().get::<RequestId>() {
                err = err.with_request_id(id.clone());
            }
            Err(err.into_response())
        }
    }
}

/// Attach a [`MaybeUser`] without rejecting anonymous callers.
pub async fn optional_auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let auth = authorization(&request);
    let user = validate_auth_header(&ctx.config.auth, &ctx.db, auth.as_deref());
    request.extensions_mut().insert(MaybeUser(user));
    next.run(request).await
}
