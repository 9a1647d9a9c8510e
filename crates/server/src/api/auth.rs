//! Bearer token extractor for protected routes.

use crate::AppResources;
use crate::error::AuthError;
use crate::oauth2::Principal;
use crate::oauth2::validator::bearer_token;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Axum extractor that validates `Authorization: Bearer <token>`.
///
/// Rejects with 401 when the header is missing or the token is unknown,
/// revoked or expired. Scope checks are left to the handler.
///
/// # Example
///
/// ```ignore
/// async fn handler(BearerAuth(principal): BearerAuth) -> Result<String, AuthError> {
///     principal.require_scope(Scope::Sales)?;
///     Ok(format!("Hello, {}", principal.subject))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BearerAuth(pub Principal);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = parts
            .extensions
            .get::<AppResources>()
            .cloned()
            .ok_or_else(|| AuthError::Internal("AppResources not found in extensions".into()))?;

        let token = bearer_token(&parts.headers)?;
        let principal = resources.auth.validate(token).await?;
        Ok(BearerAuth(principal))
    }
}
