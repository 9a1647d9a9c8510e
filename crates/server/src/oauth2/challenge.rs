//! PKCE challenge issuance.
//!
//! The client keeps the verifier and sends only `code_challenge`. The record
//! stored here is later redeemed once by the authorization_code grant, with
//! `challenge_id` playing the role of the authorization code.

use crate::error::AuthError;
use crate::oauth2::clients::ClientRegistry;
use crate::oauth2::model::{PkceChallenge, expiry_after, generate_token};
use crate::oauth2::pkce;
use crate::oauth2::types::{ChallengeMethod, ScopeSet};
use crate::settings::PolicyHandle;
use crate::store::ChallengeStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use utoipa::ToSchema;

const MAX_STATE_LEN: usize = 512;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    /// base64url(SHA-256(code_verifier)), 43 characters
    pub code_challenge: String,
    /// Only `S256` is accepted; defaults to it when omitted
    #[serde(default)]
    pub code_challenge_method: Option<String>,
    /// Echoed back unchanged; generated when omitted
    #[serde(default)]
    pub state: Option<String>,
    /// Bind the challenge to a registered client
    #[serde(default)]
    pub client_id: Option<String>,
    /// Space-separated scopes to request at exchange time
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChallengeResponse {
    /// Redeem this as `code` on the token endpoint
    pub challenge_id: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub state: String,
    /// Seconds until the challenge expires
    pub expires_in: u64,
}

#[derive(Clone)]
pub struct ChallengeIssuer {
    store: Arc<dyn ChallengeStore>,
    clients: ClientRegistry,
    policy: PolicyHandle,
}

impl ChallengeIssuer {
    pub fn new(
        store: Arc<dyn ChallengeStore>,
        clients: ClientRegistry,
        policy: PolicyHandle,
    ) -> Self {
        Self {
            store,
            clients,
            policy,
        }
    }

    #[tracing::instrument(skip(self, request), fields(client_id = ?request.client_id))]
    pub async fn issue(&self, request: ChallengeRequest) -> Result<ChallengeResponse, AuthError> {
        let method = match request.code_challenge_method.as_deref() {
            None | Some("") => ChallengeMethod::S256,
            Some(raw) => raw.parse::<ChallengeMethod>().map_err(AuthError::InvalidRequest)?,
        };
        if !pkce::is_valid_challenge(&request.code_challenge) {
            return Err(AuthError::InvalidRequest(
                "code_challenge must be 43 base64url characters".into(),
            ));
        }

        let state = match request.state {
            Some(state) if state.len() > MAX_STATE_LEN => {
                return Err(AuthError::InvalidRequest("state is too long".into()));
            }
            Some(state) if !state.is_empty() => state,
            _ => generate_token(),
        };

        let client_id = match request.client_id.as_deref() {
            Some(raw) => Some(self.clients.lookup(raw)?.client_id.clone()),
            None => None,
        };

        let ttl = self.policy.current().await.challenge_ttl;
        let now = OffsetDateTime::now_utc();
        let challenge = PkceChallenge {
            challenge_id: generate_token(),
            code_challenge: request.code_challenge,
            code_challenge_method: method,
            state,
            client_id,
            scope: request.scope.as_deref().map(ScopeSet::parse_lossy),
            created_at: now,
            expires_at: expiry_after(now, ttl)?,
        };

        let response = ChallengeResponse {
            challenge_id: challenge.challenge_id.clone(),
            code_challenge: challenge.code_challenge.clone(),
            code_challenge_method: method.as_str().to_string(),
            state: challenge.state.clone(),
            expires_in: ttl.as_secs(),
        };
        self.store.insert(challenge).await?;
        tracing::debug!("issued PKCE challenge");
        Ok(response)
    }
}
