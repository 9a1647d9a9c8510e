//! Registered clients and client authentication.

use crate::config::ClientConfig;
use crate::error::AuthError;
use crate::oauth2::types::{ClientId, GrantType, ScopeSet};
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;

#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub client_id: ClientId,
    pub name: String,
    secret: Option<String>,
    pub grant_types: Vec<GrantType>,
    pub scopes: ScopeSet,
    pub pkce_required: bool,
}

impl ClientRegistration {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            name: config.name.clone(),
            secret: config.secret.clone(),
            grant_types: config.grant_types.clone(),
            scopes: config.scopes.iter().copied().collect(),
            pkce_required: config.pkce_required,
        }
    }

    pub fn is_confidential(&self) -> bool {
        self.secret.is_some()
    }

    pub fn allows_grant(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Public clients always pass. Confidential clients must present the
    /// exact secret; the comparison does not short-circuit on content.
    pub fn verify_secret(&self, provided: Option<&str>) -> bool {
        match (&self.secret, provided) {
            (None, _) => true,
            (Some(stored), Some(provided)) => {
                stored.as_bytes().ct_eq(provided.as_bytes()).into()
            }
            (Some(_), None) => false,
        }
    }

    /// `InvalidClient` unless `provided` matches the registered secret.
    pub fn authenticate(&self, provided: Option<&str>) -> Result<(), AuthError> {
        if self.verify_secret(provided) {
            return Ok(());
        }
        tracing::debug!(client_id = %self.client_id, "client secret mismatch");
        Err(AuthError::InvalidClient(
            "client authentication failed".into(),
        ))
    }

    /// Check that this client may use `grant_type` at all.
    pub fn authorize_grant(&self, grant_type: GrantType) -> Result<(), AuthError> {
        if !self.allows_grant(grant_type) {
            return Err(AuthError::UnauthorizedClient(format!(
                "client is not allowed to use the {grant_type} grant"
            )));
        }
        if grant_type == GrantType::Password && self.pkce_required {
            return Err(AuthError::UnauthorizedClient(
                "client requires PKCE and may not use the password grant".into(),
            ));
        }
        Ok(())
    }
}

/// Narrow a requested scope to what is allowed.
///
/// No request, or a request sharing nothing with `allowed`, yields the whole
/// allowed set. Requests are never rejected for asking too much.
pub fn clamp_scope(requested: Option<&ScopeSet>, allowed: &ScopeSet) -> ScopeSet {
    match requested {
        Some(requested) if !requested.is_empty() => {
            let granted = requested.intersection(allowed);
            if granted.is_empty() {
                allowed.clone()
            } else {
                granted
            }
        }
        _ => allowed.clone(),
    }
}

/// Read-only view of the clients loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<HashMap<ClientId, ClientRegistration>>,
}

impl ClientRegistry {
    pub fn from_config(clients: &[ClientConfig]) -> Self {
        Self {
            clients: Arc::new(
                clients
                    .iter()
                    .map(|c| (c.client_id.clone(), ClientRegistration::from_config(c)))
                    .collect(),
            ),
        }
    }

    pub fn get(&self, client_id: &ClientId) -> Option<&ClientRegistration> {
        self.clients.get(client_id)
    }

    /// Look up a client by the raw identifier from a request.
    pub fn lookup(&self, raw: &str) -> Result<&ClientRegistration, AuthError> {
        let client_id = raw
            .parse::<ClientId>()
            .map_err(|_| AuthError::InvalidClient("unknown client".into()))?;
        self.get(&client_id)
            .ok_or_else(|| AuthError::InvalidClient("unknown client".into()))
    }

    /// Look up a client and check its secret.
    pub fn authenticate(
        &self,
        raw: &str,
        secret: Option<&str>,
    ) -> Result<&ClientRegistration, AuthError> {
        let client = self.lookup(raw)?;
        client.authenticate(secret)?;
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
