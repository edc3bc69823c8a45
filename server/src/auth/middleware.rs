//! Authentication middleware.
//!
//! Bearer token extraction. When the server has an `API_TOKEN` configured,
//! requests must present exactly that token; otherwise access is open.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Authenticated caller extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The presented bearer token, or "anonymous" when access is open
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        match (&state.config.api_token, presented) {
            (None, Some(token)) => Ok(AuthUser {
                token: token.to_string(),
            }),
            (None, None) => Ok(AuthUser {
                token: "anonymous".to_string(),
            }),
            (Some(expected), Some(token)) if token == expected => Ok(AuthUser {
                token: token.to_string(),
            }),
            (Some(_), _) => {
                tracing::debug!(uri = %parts.uri, "Rejected request with missing or wrong token");
                Err(AppError::Unauthorized)
            }
        }
    }
}
