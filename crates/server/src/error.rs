//! Error types shared across the service.
//!
//! `AuthError` is the only error that reaches an HTTP response. Every other
//! layer converts into it, and internal failures lose their detail on the
//! way out.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Failure inside a challenge, token, lockout or user store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    InvalidClient(String),
    #[error("{0}")]
    UnauthorizedClient(String),
    #[error("{0}")]
    UnsupportedGrantType(String),
    #[error("{0}")]
    InvalidGrant(String),
    /// Missing, unknown, expired or revoked bearer token
    #[error("{0}")]
    Unauthorized(String),
    #[error("token requires '{0}' scope")]
    InsufficientScope(String),
    #[error("too many failed attempts, retry in {} seconds", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// OAuth2 error code placed in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::InvalidClient(_) => "invalid_client",
            AuthError::UnauthorizedClient(_) => "unauthorized_client",
            AuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            AuthError::InvalidGrant(_) => "invalid_grant",
            AuthError::Unauthorized(_) => "invalid_token",
            AuthError::InsufficientScope(_) => "insufficient_scope",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::Internal(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidRequest(_)
            | AuthError::UnauthorizedClient(_)
            | AuthError::UnsupportedGrantType(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidClient(_)
            | AuthError::InvalidGrant(_)
            | AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this failure counts toward the per-client lockout: bad user
    /// credentials, codes or verifiers, and a wrong client secret.
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, AuthError::InvalidGrant(_) | AuthError::InvalidClient(_))
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. `invalid_grant`)
    pub error: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            AuthError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error while handling auth request");
                None
            }
            other => Some(other.to_string()),
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: self.code().to_string(),
                detail,
            }),
        )
            .into_response();

        let headers = response.headers_mut();
        match &self {
            AuthError::Unauthorized(_) => {
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(r#"Bearer error="invalid_token""#),
                );
            }
            AuthError::InsufficientScope(_) => {
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(r#"Bearer error="insufficient_scope""#),
                );
            }
            AuthError::RateLimited { retry_after } => {
                if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string())
                {
                    headers.insert(header::RETRY_AFTER, value);
                }
            }
            _ => {}
        }
        response
    }
}
