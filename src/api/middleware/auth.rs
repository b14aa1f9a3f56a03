//! Bearer token authentication for operator routes
//!
//! Agent routes don't go through this layer; they authenticate with the
//! `apiKey` in the request body.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::api::error::ApiError;

pub async fn auth_middleware(
    State(expected_token): State<String>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_string()))?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::Unauthorized("invalid Authorization format (expected: Bearer <token>)".to_string())
    })?;

    if token != expected_token {
        return Err(ApiError::Unauthorized("invalid token".to_string()));
    }

    Ok(next.run(request).await)
}
