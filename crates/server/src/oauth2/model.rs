//! Records owned by the challenge and token stores.

use crate::error::AuthError;
use crate::oauth2::types::{ChallengeMethod, ClientId, ScopeSet};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

/// Generate an opaque random token.
///
/// 32 bytes of OS randomness, base64url without padding: 43 characters with
/// no internal structure.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).expect("Failed to generate random bytes");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// `now + lifetime`, or `Internal` when the result leaves the date range.
pub fn expiry_after(
    now: OffsetDateTime,
    lifetime: Duration,
) -> Result<OffsetDateTime, AuthError> {
    time::Duration::try_from(lifetime)
        .ok()
        .and_then(|lifetime| now.checked_add(lifetime))
        .ok_or_else(|| {
            AuthError::Internal(format!("lifetime of {}s is out of range", lifetime.as_secs()))
        })
}

/// A recorded PKCE challenge awaiting exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkceChallenge {
    pub challenge_id: String,
    pub code_challenge: String,
    pub code_challenge_method: ChallengeMethod,
    pub state: String,
    /// Client the challenge was issued for, if the request named one
    pub client_id: Option<ClientId>,
    /// Scope requested at issuance, used when the token request omits one
    pub scope: Option<ScopeSet>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl PkceChallenge {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub subject: String,
    pub client_id: ClientId,
    pub scope: ScopeSet,
    /// Shared by every pair descended from the same grant
    pub lineage_id: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub revoked: bool,
}

impl AccessToken {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token: String,
    /// Access token minted alongside this refresh token
    pub access_token: String,
    pub subject: String,
    pub client_id: ClientId,
    pub scope: ScopeSet,
    pub lineage_id: String,
    pub issued_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub revoked: bool,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Access and refresh token minted together.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access: AccessToken,
    pub refresh: RefreshToken,
}

impl TokenPair {
    /// Mint a fresh pair for `subject` in `lineage_id`.
    pub fn mint(
        subject: &str,
        client_id: &ClientId,
        scope: &ScopeSet,
        lineage_id: &str,
        lifetimes: (Duration, Duration),
        now: OffsetDateTime,
    ) -> Result<Self, AuthError> {
        let (access_lifetime, refresh_lifetime) = lifetimes;
        let access = AccessToken {
            token: generate_token(),
            subject: subject.to_string(),
            client_id: client_id.clone(),
            scope: scope.clone(),
            lineage_id: lineage_id.to_string(),
            issued_at: now,
            expires_at: expiry_after(now, access_lifetime)?,
            revoked: false,
        };
        let refresh = RefreshToken {
            token: generate_token(),
            access_token: access.token.clone(),
            subject: subject.to_string(),
            client_id: client_id.clone(),
            scope: scope.clone(),
            lineage_id: lineage_id.to_string(),
            issued_at: now,
            expires_at: expiry_after(now, refresh_lifetime)?,
            revoked: false,
        };
        Ok(Self { access, refresh })
    }
}

/// Identifier shared by all pairs descending from one grant.
pub fn new_lineage_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The identity a grant resolves to before tokens are minted.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub subject: String,
    /// Upper bound on what tokens for this identity may carry
    pub scopes: ScopeSet,
}

/// A user able to authenticate with the password grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub scopes: ScopeSet,
    pub disabled: bool,
}
