//! Shared-token authentication for service-to-service calls.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// Proof that the caller presented the configured API token as
/// `Authorization: Bearer <token>`.
///
/// Always succeeds when no token is configured.
#[derive(Debug, Clone, Copy)]
pub struct ServiceAuth;

impl FromRequestParts<AppState> for ServiceAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.api_token.as_deref() else {
            return Ok(ServiceAuth);
        };

        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        if token != expected {
            tracing::warn!("Rejected request with invalid API token");
            return Err(AppError::Unauthorized);
        }
        Ok(ServiceAuth)
    }
}
