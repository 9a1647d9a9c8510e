//! The auth core as one cloneable handle.

use crate::config::{AppConfig, UserConfig};
use crate::error::{AuthError, StoreError};
use crate::oauth2::challenge::{ChallengeIssuer, ChallengeRequest, ChallengeResponse};
use crate::oauth2::clients::ClientRegistry;
use crate::oauth2::grant::{BasicCredentials, TokenGrantProcessor, TokenRequest};
use crate::oauth2::lockout::FailureGuard;
use crate::oauth2::model::TokenPair;
use crate::oauth2::revocation::{RevocationManager, TokenTypeHint};
use crate::oauth2::types::{ClientId, GrantType, ScopeSet};
use crate::oauth2::validator::{Principal, TokenValidator};
use crate::settings::{AuthPolicy, PolicyHandle};
use crate::store::{
    ChallengeStore, DbChallengeStore, DbTokenStore, DbUserDirectory, LockoutStore,
    MemoryChallengeStore, MemoryLockoutStore, MemoryTokenStore, MemoryUserDirectory, TokenStore,
    UserDirectory,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use time::OffsetDateTime;

/// The four storage seams the auth core runs on.
#[derive(Clone)]
pub struct AuthStores {
    pub challenges: Arc<dyn ChallengeStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub lockout: Arc<dyn LockoutStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl AuthStores {
    pub fn memory(users: &[UserConfig]) -> Self {
        Self {
            challenges: Arc::new(MemoryChallengeStore::new()),
            tokens: Arc::new(MemoryTokenStore::new()),
            lockout: Arc::new(MemoryLockoutStore::new()),
            users: Arc::new(MemoryUserDirectory::from_config(users)),
        }
    }

    /// Challenges, tokens and users in the database; lockout counters stay
    /// in memory.
    pub fn database(db: Arc<DatabaseConnection>) -> Self {
        Self {
            challenges: Arc::new(DbChallengeStore::new(db.clone())),
            tokens: Arc::new(DbTokenStore::new(db.clone())),
            lockout: Arc::new(MemoryLockoutStore::new()),
            users: Arc::new(DbUserDirectory::new(db)),
        }
    }
}

/// Rows removed by one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub challenges: u64,
    pub tokens: u64,
    pub lockout_counters: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.challenges + self.tokens + self.lockout_counters
    }
}

/// JSON body of `POST /auth/refresh`.
#[derive(Debug, Clone, serde::Deserialize, utoipa::ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
    /// When present the token must belong to this client
    #[serde(default)]
    pub client_id: Option<String>,
    /// Optional narrower scope
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Clone)]
pub struct AuthService {
    issuer_url: Arc<str>,
    clients: ClientRegistry,
    policy: PolicyHandle,
    stores: AuthStores,
    guard: FailureGuard,
    challenges: ChallengeIssuer,
    grants: TokenGrantProcessor,
    validator: TokenValidator,
    revocation: RevocationManager,
}

impl AuthService {
    pub fn new(
        issuer_url: &str,
        clients: ClientRegistry,
        policy: PolicyHandle,
        stores: AuthStores,
    ) -> Self {
        let guard = FailureGuard::new(stores.lockout.clone());
        let revocation = RevocationManager::new(stores.tokens.clone(), policy.clone());
        let challenges =
            ChallengeIssuer::new(stores.challenges.clone(), clients.clone(), policy.clone());
        let grants = TokenGrantProcessor::new(
            stores.challenges.clone(),
            stores.tokens.clone(),
            stores.users.clone(),
            clients.clone(),
            guard.clone(),
            policy.clone(),
            revocation.clone(),
        );
        Self {
            issuer_url: Arc::from(issuer_url.trim_end_matches('/')),
            validator: TokenValidator::new(stores.tokens.clone()),
            clients,
            policy,
            stores,
            guard,
            challenges,
            grants,
            revocation,
        }
    }

    pub fn from_config(config: &AppConfig, stores: AuthStores) -> Self {
        Self::new(
            &config.oauth2.issuer_url,
            ClientRegistry::from_config(&config.clients),
            PolicyHandle::new(AuthPolicy::from_config(config)),
            stores,
        )
    }

    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    pub async fn issue_challenge(
        &self,
        request: ChallengeRequest,
    ) -> Result<ChallengeResponse, AuthError> {
        self.challenges.issue(request).await
    }

    pub async fn grant(
        &self,
        request: TokenRequest,
        basic: Option<BasicCredentials>,
    ) -> Result<TokenPair, AuthError> {
        self.grants.grant(request, basic).await
    }

    /// Rotate a refresh token outside the token endpoint.
    ///
    /// A named client is checked and subject to lockout like any grant.
    pub async fn refresh(&self, request: RefreshRequest) -> Result<TokenPair, AuthError> {
        let scope = request.scope.as_deref().map(ScopeSet::parse_lossy);
        let Some(raw) = request.client_id.as_deref() else {
            return self
                .revocation
                .refresh(&request.refresh_token, None, scope.as_ref())
                .await;
        };

        let client = self.clients.lookup(raw)?;
        client.authorize_grant(GrantType::RefreshToken)?;
        let client_id: ClientId = client.client_id.clone();
        let policy = self.policy.current().await;
        self.guard.reserve(&client_id, &policy).await?;
        let outcome = self
            .revocation
            .refresh(&request.refresh_token, Some(&client_id), scope.as_ref())
            .await;
        self.guard.settle(&client_id, &policy, &outcome).await?;
        outcome
    }

    pub async fn revoke(&self, token: &str, hint: Option<&str>) -> Result<(), AuthError> {
        self.revocation
            .revoke(token, TokenTypeHint::parse(hint))
            .await
    }

    pub async fn logout(&self, principal: &Principal) -> Result<u64, AuthError> {
        self.revocation.logout(principal).await
    }

    pub async fn validate(&self, token: &str) -> Result<Principal, AuthError> {
        self.validator.validate(token).await
    }

    pub async fn validate_at(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Principal, AuthError> {
        self.validator.validate_at(token, now).await
    }

    /// Drop everything that expired at `now`.
    pub async fn purge_expired(&self, now: OffsetDateTime) -> Result<SweepReport, StoreError> {
        Ok(SweepReport {
            challenges: self.stores.challenges.purge_expired(now).await?,
            tokens: self.stores.tokens.purge_expired(now).await?,
            lockout_counters: self.guard.purge_expired().await?,
        })
    }
}
