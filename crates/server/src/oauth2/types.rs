//! Closed vocabularies validated once at the HTTP boundary.
//!
//! Grant types, scopes and client identifiers arrive as free-form strings in
//! form and JSON bodies. They are parsed into the types below before any
//! service logic runs, so the rest of the crate never sees an unchecked value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// OAuth2 grant types understood by the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Direct username/password exchange kept as a bridge for legacy clients
    Password,
    /// Challenge-bound code exchange, always verified with PKCE
    AuthorizationCode,
    /// Rotation of a refresh token into a new token pair
    RefreshToken,
}

impl GrantType {
    pub const ALL: [GrantType; 3] = [
        GrantType::Password,
        GrantType::AuthorizationCode,
        GrantType::RefreshToken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Password => "password",
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password" => Ok(GrantType::Password),
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(format!("unsupported grant type '{other}'")),
        }
    }
}

/// PKCE transformation applied to the verifier.
///
/// Only `S256` exists here; `plain` is recognised solely to reject it with a
/// clear message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ChallengeMethod {
    S256,
}

impl ChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        "S256"
    }
}

impl FromStr for ChallengeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(ChallengeMethod::S256),
            "plain" => Err("code_challenge_method 'plain' is not supported".to_string()),
            other => Err(format!("unknown code_challenge_method '{other}'")),
        }
    }
}

/// Access scopes recognised by the CRM routers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Read,
    Write,
    Admin,
    Sales,
    Marketing,
    Support,
    Compliance,
}

impl Scope {
    pub const ALL: [Scope; 7] = [
        Scope::Read,
        Scope::Write,
        Scope::Admin,
        Scope::Sales,
        Scope::Marketing,
        Scope::Support,
        Scope::Compliance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Read => "read",
            Scope::Write => "write",
            Scope::Admin => "admin",
            Scope::Sales => "sales",
            Scope::Marketing => "marketing",
            Scope::Support => "support",
            Scope::Compliance => "compliance",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .iter()
            .find(|scope| scope.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown scope '{s}'"))
    }
}

/// An ordered set of scopes, rendered as the space-separated OAuth2 form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<Scope>);

impl ScopeSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse a space-separated scope string, silently dropping names outside
    /// the known vocabulary. Requests are clamped, never rejected, so an
    /// unknown name behaves exactly like a scope the client may not have.
    pub fn parse_lossy(raw: &str) -> Self {
        Self(
            raw.split_whitespace()
                .filter_map(|s| s.parse::<Scope>().ok())
                .collect(),
        )
    }

    pub fn contains(&self, scope: Scope) -> bool {
        self.0.contains(&scope)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_subset(&self, other: &ScopeSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn intersection(&self, other: &ScopeSet) -> ScopeSet {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope.as_str())?;
            first = false;
        }
        Ok(())
    }
}

/// Identifier of a registered client.
///
/// Limited to 1..=64 characters of `[A-Za-z0-9_.-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() || value.len() > 64 {
            return Err("client_id must be between 1 and 64 characters".to_string());
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err("client_id contains invalid characters".to_string());
        }
        Ok(Self(value))
    }
}

impl FromStr for ClientId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClientId::try_from(s.to_string())
    }
}

impl From<ClientId> for String {
    fn from(value: ClientId) -> Self {
        value.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_type_parses_known_values_only() {
        assert_eq!(
            "authorization_code".parse::<GrantType>(),
            Ok(GrantType::AuthorizationCode)
        );
        assert_eq!("password".parse::<GrantType>(), Ok(GrantType::Password));
        assert!("client_credentials".parse::<GrantType>().is_err());
        assert!("".parse::<GrantType>().is_err());
    }

    #[test]
    fn plain_challenge_method_is_rejected() {
        assert_eq!("S256".parse::<ChallengeMethod>(), Ok(ChallengeMethod::S256));
        let err = "plain".parse::<ChallengeMethod>().unwrap_err();
        assert!(err.contains("plain"));
    }

    #[test]
    fn scope_set_drops_unknown_names_and_orders_output() {
        let scopes = ScopeSet::parse_lossy("write superuser read  read");
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes.to_string(), "read write");
    }

    #[test]
    fn scope_set_intersection() {
        let requested = ScopeSet::parse_lossy("read write admin");
        let allowed = ScopeSet::parse_lossy("read write");
        let granted = requested.intersection(&allowed);
        assert!(!granted.contains(Scope::Admin));
        assert!(granted.is_subset(&allowed));
    }

    #[test]
    fn client_id_validation() {
        assert!("crm_web_app".parse::<ClientId>().is_ok());
        assert!("crm-mobile.v2".parse::<ClientId>().is_ok());
        assert!("".parse::<ClientId>().is_err());
        assert!("bad id".parse::<ClientId>().is_err());
        assert!("x".repeat(65).parse::<ClientId>().is_err());
    }
}
