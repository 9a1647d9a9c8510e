//! Refresh rotation and token revocation.
//!
//! Every pair minted from one grant shares a lineage. Rotation keeps the
//! lineage; logout, refresh-token revocation and refresh-token reuse end it.

use crate::error::AuthError;
use crate::oauth2::clients::clamp_scope;
use crate::oauth2::model::TokenPair;
use crate::oauth2::types::{ClientId, ScopeSet};
use crate::oauth2::validator::Principal;
use crate::settings::PolicyHandle;
use crate::store::TokenStore;
use std::sync::Arc;
use time::OffsetDateTime;

/// RFC 7009 `token_type_hint` values. Anything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw {
            Some("access_token") => Some(Self::AccessToken),
            Some("refresh_token") => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct RevocationManager {
    tokens: Arc<dyn TokenStore>,
    policy: PolicyHandle,
}

impl RevocationManager {
    pub fn new(tokens: Arc<dyn TokenStore>, policy: PolicyHandle) -> Self {
        Self { tokens, policy }
    }

    /// Redeem a refresh token for a new pair in the same lineage.
    ///
    /// When `client_id` is given the token must belong to it. A requested
    /// scope can only narrow the current one.
    #[tracing::instrument(skip(self, refresh_token), fields(client_id = ?client_id))]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client_id: Option<&ClientId>,
        scope: Option<&ScopeSet>,
    ) -> Result<TokenPair, AuthError> {
        let now = OffsetDateTime::now_utc();
        let Some(current) = self.tokens.find_refresh(refresh_token).await? else {
            return Err(AuthError::InvalidGrant("Unknown refresh token".into()));
        };

        if current.revoked {
            let revoked = self.tokens.revoke_lineage(&current.lineage_id).await?;
            tracing::warn!(
                client_id = %current.client_id,
                lineage_id = %current.lineage_id,
                revoked,
                "refresh token reused, lineage revoked"
            );
            return Err(AuthError::InvalidGrant(
                "Refresh token has already been used".into(),
            ));
        }
        if client_id.is_some_and(|id| *id != current.client_id) {
            return Err(AuthError::InvalidGrant(
                "Refresh token was issued to another client".into(),
            ));
        }
        if current.is_expired_at(now) {
            return Err(AuthError::InvalidGrant("Refresh token expired".into()));
        }

        // Exactly one concurrent caller gets past this point
        let Some(consumed) = self.tokens.consume_refresh(refresh_token).await? else {
            return Err(AuthError::InvalidGrant(
                "Refresh token has already been used".into(),
            ));
        };

        self.tokens.revoke_access(&consumed.access_token).await?;

        let policy = self.policy.current().await;
        let pair = TokenPair::mint(
            &consumed.subject,
            &consumed.client_id,
            &clamp_scope(scope, &consumed.scope),
            &consumed.lineage_id,
            (policy.access_token_lifetime, policy.refresh_token_lifetime),
            now,
        )?;
        self.tokens.insert_pair(&pair).await?;
        tracing::info!(
            client_id = %pair.access.client_id,
            lineage_id = %pair.access.lineage_id,
            "rotated refresh token"
        );
        Ok(pair)
    }

    /// Revoke an access or refresh token. Unknown tokens are not an error.
    ///
    /// Revoking a refresh token ends its whole lineage; revoking an access
    /// token leaves the refresh token usable.
    #[tracing::instrument(skip(self, token))]
    pub async fn revoke(&self, token: &str, hint: Option<TokenTypeHint>) -> Result<(), AuthError> {
        let refresh_first = hint == Some(TokenTypeHint::RefreshToken);
        if refresh_first && self.revoke_refresh(token).await? {
            return Ok(());
        }
        if self.tokens.revoke_access(token).await? {
            tracing::debug!("revoked access token");
            return Ok(());
        }
        if !refresh_first && self.revoke_refresh(token).await? {
            return Ok(());
        }
        tracing::debug!("revocation requested for unknown token");
        Ok(())
    }

    async fn revoke_refresh(&self, token: &str) -> Result<bool, AuthError> {
        let Some(refresh) = self.tokens.find_refresh(token).await? else {
            return Ok(false);
        };
        let revoked = self.tokens.revoke_lineage(&refresh.lineage_id).await?;
        tracing::debug!(lineage_id = %refresh.lineage_id, revoked, "revoked refresh token lineage");
        Ok(true)
    }

    /// End the caller's session: every token in its lineage.
    #[tracing::instrument(skip(self, principal), fields(subject = %principal.subject))]
    pub async fn logout(&self, principal: &Principal) -> Result<u64, AuthError> {
        let revoked = self.tokens.revoke_lineage(&principal.lineage_id).await?;
        tracing::info!(client_id = %principal.client_id, revoked, "logged out");
        Ok(revoked)
    }
}
