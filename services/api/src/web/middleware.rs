//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use crate::web::state::AppState;

/// The authenticated user's id, inserted into request extensions by
/// `require_auth`.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub String);

/// The user's id if a valid session cookie was presented, inserted by
/// `optional_auth`. Routes behind it serve anonymous callers too.
#[derive(Clone, Debug)]
pub struct MaybeUser(pub Option<String>);

fn session_id_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
}

/// Middleware that validates the auth session cookie and extracts the user id.
///
/// If valid, inserts `CurrentUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let session_id =
        session_id_from_headers(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    let user_id = state
        .db
        .validate_auth_session(session_id)
        .await
        .map_err(|e| {
            error!("Failed to validate auth session: {:?}", e);
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(CurrentUser(user_id));
    Ok(next.run(req).await)
}

/// Middleware that attaches the user id when a valid session is present,
/// but never rejects the request. An expired or bogus cookie is treated
/// the same as no cookie.
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let user_id = match session_id_from_headers(req.headers()) {
        Some(session_id) => state.db.validate_auth_session(session_id).await.ok(),
        None => None,
    };

    req.extensions_mut().insert(MaybeUser(user_id));
    next.run(req).await
}
