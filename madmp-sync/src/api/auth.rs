//! Bearer token check
//!
//! Every route except `/health` requires `Authorization: Bearer <token>` when
//! `dmp_tool.token` is configured. Without a token the API is open.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::ApiError;
use crate::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.dmp_tool.token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    let rejection = match provided {
        Some(token) if token == expected => None,
        Some(_) => Some("invalid token"),
        None => Some("missing bearer token"),
    };

    match rejection {
        None => Ok(next.run(request).await),
        Some(reason) => {
            warn!(path = %request.uri().path(), reason, "Rejected unauthenticated request");
            Err(ApiError::Unauthorized(reason.to_string()))
        }
    }
}
