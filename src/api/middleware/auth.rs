//! Bearer token authentication middleware
//!
//! Resolves the presented token to a [`Caller`] and stores it in the request
//! extensions, where handlers pick it up with `Extension<Caller>`.
//! Browsers cannot set headers on a WebSocket upgrade, so a `token` query
//! parameter is accepted as well.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::state::ApiState;
use crate::identity::Caller;

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = match request.headers().get(header::AUTHORIZATION) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AuthError::InvalidFormat)?
            .to_string(),
        None => query_token(request.uri().query()).ok_or(AuthError::MissingToken)?,
    };

    let caller: Caller = state
        .resolver
        .resolve(&token)
        .ok_or(AuthError::InvalidToken)?;

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

fn query_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// Authentication errors
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing Authorization header"),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization format (expected: Bearer <token>)",
            ),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
        };

        (status, message).into_response()
    }
}
