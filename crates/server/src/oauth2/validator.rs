//! Bearer token validation and scope checks.

use crate::error::AuthError;
use crate::oauth2::types::{ClientId, Scope, ScopeSet};
use crate::store::TokenStore;
use axum::http::{HeaderMap, header};
use std::sync::Arc;
use time::OffsetDateTime;

/// Who a validated access token speaks for.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub subject: String,
    pub client_id: ClientId,
    pub scopes: ScopeSet,
    pub lineage_id: String,
    pub expires_at: OffsetDateTime,
}

impl Principal {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(scope)
    }

    pub fn require_scope(&self, scope: Scope) -> Result<(), AuthError> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(AuthError::InsufficientScope(scope.to_string()))
        }
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AuthError::Unauthorized("Missing Authorization header".into()))?
        .to_str()
        .map_err(|_| AuthError::Unauthorized("Invalid Authorization header".into()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AuthError::Unauthorized("Expected Bearer authorization".into()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::Unauthorized("Expected Bearer authorization".into()));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Unauthorized("Empty bearer token".into()));
    }
    Ok(token)
}

/// Tokens of the retired signed-token scheme have three dot-separated parts.
fn looks_like_jwt(token: &str) -> bool {
    token.matches('.').count() == 2
}

#[derive(Clone)]
pub struct TokenValidator {
    tokens: Arc<dyn TokenStore>,
}

impl TokenValidator {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self { tokens }
    }

    pub async fn validate(&self, token: &str) -> Result<Principal, AuthError> {
        self.validate_at(token, OffsetDateTime::now_utc()).await
    }

    /// Resolve `token` as it would be judged at `now`.
    pub async fn validate_at(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Principal, AuthError> {
        if looks_like_jwt(token) {
            tracing::debug!("rejected JWT-shaped bearer token");
            return Err(AuthError::Unauthorized("Unknown access token".into()));
        }
        let access = self
            .tokens
            .find_access(token)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("Unknown access token".into()))?;

        if access.revoked {
            return Err(AuthError::Unauthorized("Access token revoked".into()));
        }
        if access.is_expired_at(now) {
            return Err(AuthError::Unauthorized("Access token expired".into()));
        }

        Ok(Principal {
            subject: access.subject,
            client_id: access.client_id,
            scopes: access.scope,
            lineage_id: access.lineage_id,
            expires_at: access.expires_at,
        })
    }
}
