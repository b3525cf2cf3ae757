//! `ApiKey` extractor. The internal surface is caller-to-service only, so
//! a single shared key in the `X-API-Key` header guards every job route.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use avatarhub_core::AppError;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the shared internal API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Proof that the request presented the configured internal API key.
#[derive(Debug, Clone, Copy)]
pub struct ApiKey;

impl FromRequestParts<AppState> for ApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing API key"))?;

        let expected = state.config.server.api_key.as_str();
        if expected.is_empty() || presented != expected {
            return Err(AppError::unauthorized("Invalid API key").into());
        }

        Ok(ApiKey)
    }
}
