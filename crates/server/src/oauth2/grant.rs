//! Token endpoint grant handling.

use crate::error::AuthError;
use crate::oauth2::clients::{ClientRegistration, ClientRegistry, clamp_scope};
use crate::oauth2::lockout::FailureGuard;
use crate::oauth2::model::{Identity, TokenPair, new_lineage_id};
use crate::oauth2::password::verify_password_blocking;
use crate::oauth2::pkce;
use crate::oauth2::revocation::RevocationManager;
use crate::oauth2::types::{GrantType, ScopeSet};
use crate::settings::{AuthPolicy, PolicyHandle};
use crate::store::{ChallengeStore, TokenStore, UserDirectory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Form body of `POST /auth/token`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// `password`, `authorization_code` or `refresh_token`
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    /// Confidential clients only; HTTP Basic takes precedence
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// The `challenge_id` returned by `/auth/challenge`
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    /// Space-separated scopes; clamped to what the client may hold
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

impl TokenResponse {
    pub fn from_pair(pair: &TokenPair) -> Self {
        let expires_in = (pair.access.expires_at - pair.access.issued_at)
            .whole_seconds()
            .max(0) as u64;
        Self {
            access_token: pair.access.token.clone(),
            token_type: "Bearer".to_string(),
            expires_in,
            refresh_token: Some(pair.refresh.token.clone()),
            scope: pair.access.scope.to_string(),
        }
    }
}

/// Client credentials presented outside the form body.
#[derive(Debug, Clone)]
pub struct BasicCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone)]
pub struct TokenGrantProcessor {
    challenges: Arc<dyn ChallengeStore>,
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserDirectory>,
    clients: ClientRegistry,
    guard: FailureGuard,
    policy: PolicyHandle,
    revocation: RevocationManager,
}

impl TokenGrantProcessor {
    pub fn new(
        challenges: Arc<dyn ChallengeStore>,
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn UserDirectory>,
        clients: ClientRegistry,
        guard: FailureGuard,
        policy: PolicyHandle,
        revocation: RevocationManager,
    ) -> Self {
        Self {
            challenges,
            tokens,
            users,
            clients,
            guard,
            policy,
            revocation,
        }
    }

    /// Run one token request to completion.
    #[tracing::instrument(
        skip(self, request, basic),
        fields(grant_type = ?request.grant_type, client_id = tracing::field::Empty)
    )]
    pub async fn grant(
        &self,
        request: TokenRequest,
        basic: Option<BasicCredentials>,
    ) -> Result<TokenPair, AuthError> {
        let grant_type = request
            .grant_type
            .as_deref()
            .ok_or_else(|| AuthError::InvalidRequest("grant_type is required".into()))?
            .parse::<GrantType>()
            .map_err(AuthError::UnsupportedGrantType)?;

        let (client_id, client_secret) = match basic {
            Some(basic) => (Some(basic.client_id), Some(basic.client_secret)),
            None => (request.client_id.clone(), request.client_secret.clone()),
        };
        let client_id =
            client_id.ok_or_else(|| AuthError::InvalidRequest("client_id is required".into()))?;
        let client = self.clients.lookup(&client_id)?;
        tracing::Span::current().record("client_id", client.client_id.as_str());

        // Lockout applies before the secret is checked, so a locked client
        // gets 429 even with the wrong secret.
        let policy = self.policy.current().await;
        self.guard.reserve(&client.client_id, &policy).await?;
        let outcome = self
            .evaluate(client, client_secret.as_deref(), grant_type, &request, &policy)
            .await;
        self.guard
            .settle(&client.client_id, &policy, &outcome)
            .await?;
        outcome
    }

    async fn evaluate(
        &self,
        client: &ClientRegistration,
        client_secret: Option<&str>,
        grant_type: GrantType,
        request: &TokenRequest,
        policy: &AuthPolicy,
    ) -> Result<TokenPair, AuthError> {
        client.authenticate(client_secret)?;
        client.authorize_grant(grant_type)?;
        match grant_type {
            GrantType::Password => self.password_grant(client, request, policy).await,
            GrantType::AuthorizationCode => {
                self.authorization_code_grant(client, request, policy).await
            }
            GrantType::RefreshToken => {
                let refresh_token = request.refresh_token.as_deref().ok_or_else(|| {
                    AuthError::InvalidRequest("refresh_token is required".into())
                })?;
                let scope = request.scope.as_deref().map(ScopeSet::parse_lossy);
                self.revocation
                    .refresh(refresh_token, Some(&client.client_id), scope.as_ref())
                    .await
            }
        }
    }

    async fn password_grant(
        &self,
        client: &ClientRegistration,
        request: &TokenRequest,
        policy: &AuthPolicy,
    ) -> Result<TokenPair, AuthError> {
        let (Some(username), Some(password)) = (&request.username, &request.password) else {
            return Err(AuthError::InvalidRequest(
                "username and password are required".into(),
            ));
        };

        let invalid = || AuthError::InvalidGrant("Invalid username or password".into());
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or_else(invalid)?;
        if user.disabled {
            tracing::info!(user_id = %user.id, "password grant for disabled user");
            return Err(invalid());
        }
        if !verify_password_blocking(password.clone(), user.password_hash.clone()).await? {
            return Err(invalid());
        }

        let identity = Identity {
            subject: user.id,
            scopes: client.scopes.intersection(&user.scopes),
        };
        let requested = request.scope.as_deref().map(ScopeSet::parse_lossy);
        self.issue(client, identity, requested.as_ref(), policy).await
    }

    async fn authorization_code_grant(
        &self,
        client: &ClientRegistration,
        request: &TokenRequest,
        policy: &AuthPolicy,
    ) -> Result<TokenPair, AuthError> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| AuthError::InvalidRequest("code is required".into()))?;
        let verifier = request
            .code_verifier
            .as_deref()
            .ok_or_else(|| AuthError::InvalidRequest("code_verifier is required".into()))?;
        if !pkce::is_valid_verifier(verifier) {
            return Err(AuthError::InvalidRequest(
                "code_verifier must be 43-128 unreserved characters".into(),
            ));
        }

        let challenge = self
            .challenges
            .get(code)
            .await?
            .ok_or_else(|| AuthError::InvalidGrant("Unknown or already used code".into()))?;

        if challenge.is_expired_at(OffsetDateTime::now_utc()) {
            self.challenges.consume(code).await?;
            return Err(AuthError::InvalidGrant("Code expired".into()));
        }
        if challenge
            .client_id
            .as_ref()
            .is_some_and(|bound| *bound != client.client_id)
        {
            return Err(AuthError::InvalidGrant(
                "Code was issued to another client".into(),
            ));
        }
        if !pkce::verify_s256(verifier, &challenge.code_challenge) {
            tracing::warn!(client_id = %client.client_id, "PKCE verification failed");
            return Err(AuthError::InvalidGrant(
                "code_verifier does not match code_challenge".into(),
            ));
        }

        let challenge = self
            .challenges
            .consume(code)
            .await?
            .ok_or_else(|| AuthError::InvalidGrant("Unknown or already used code".into()))?;

        let identity = Identity {
            subject: format!("client:{}", client.client_id),
            scopes: client.scopes.clone(),
        };
        let requested = request
            .scope
            .as_deref()
            .map(ScopeSet::parse_lossy)
            .or(challenge.scope);
        self.issue(client, identity, requested.as_ref(), policy).await
    }

    async fn issue(
        &self,
        client: &ClientRegistration,
        identity: Identity,
        requested: Option<&ScopeSet>,
        policy: &AuthPolicy,
    ) -> Result<TokenPair, AuthError> {
        let scope = clamp_scope(requested, &identity.scopes);
        let pair = TokenPair::mint(
            &identity.subject,
            &client.client_id,
            &scope,
            &new_lineage_id(),
            (policy.access_token_lifetime, policy.refresh_token_lifetime),
            OffsetDateTime::now_utc(),
        )?;
        self.tokens.insert_pair(&pair).await?;
        tracing::info!(
            client_id = %client.client_id,
            subject = %identity.subject,
            scope = %scope,
            "issued token pair"
        );
        Ok(pair)
    }
}
