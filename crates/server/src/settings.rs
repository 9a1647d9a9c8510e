//! Effective auth policy and its remote override.
//!
//! Lifetimes and lockout thresholds start from the static configuration. When
//! `superadmin.base_url` is set, the super-admin module can override them at
//! runtime; any failure to reach it falls back to the static values.

use crate::config::{
    AppConfig, LockoutConfig, MAX_DURATION_SECS, OAuth2Config, SuperadminConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Path of the settings document below `superadmin.base_url`.
pub const SETTINGS_PATH: &str = "/api/superadmin/settings/auth";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("settings endpoint answered {0}")]
    Status(reqwest::StatusCode),
}

/// Values the grant processor and lockout guard read on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    pub challenge_ttl: Duration,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub max_failures: u32,
    pub failure_window: Duration,
    pub cooldown: Duration,
}

/// Seconds as a duration, capped at `MAX_DURATION_SECS`.
fn capped_secs(secs: u64) -> Duration {
    Duration::from_secs(secs.min(MAX_DURATION_SECS))
}

impl AuthPolicy {
    pub fn from_parts(oauth2: &OAuth2Config, lockout: &LockoutConfig) -> Self {
        Self {
            challenge_ttl: capped_secs(oauth2.challenge_ttl_secs),
            access_token_lifetime: capped_secs(oauth2.access_token_lifetime_secs),
            refresh_token_lifetime: capped_secs(oauth2.refresh_token_lifetime_secs),
            max_failures: lockout.max_failures,
            failure_window: capped_secs(lockout.window_secs),
            cooldown: capped_secs(lockout.cooldown_secs),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::from_parts(&config.oauth2, &config.lockout)
    }

    /// Apply an override on top of this policy. Zero values are ignored and
    /// durations are capped at `MAX_DURATION_SECS`.
    pub fn with_override(&self, update: &AuthPolicyOverride) -> Self {
        let secs = |value: Option<u64>, current: Duration| {
            value
                .filter(|v| *v > 0)
                .map(capped_secs)
                .unwrap_or(current)
        };
        Self {
            challenge_ttl: secs(update.challenge_ttl_secs, self.challenge_ttl),
            access_token_lifetime: secs(
                update.access_token_lifetime_secs,
                self.access_token_lifetime,
            ),
            refresh_token_lifetime: secs(
                update.refresh_token_lifetime_secs,
                self.refresh_token_lifetime,
            ),
            max_failures: update
                .max_failures
                .filter(|v| *v > 0)
                .unwrap_or(self.max_failures),
            failure_window: secs(update.window_secs, self.failure_window),
            cooldown: secs(update.cooldown_secs, self.cooldown),
        }
    }
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self::from_parts(&OAuth2Config::default(), &LockoutConfig::default())
    }
}

/// Document served by the super-admin module. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPolicyOverride {
    #[serde(default)]
    pub challenge_ttl_secs: Option<u64>,
    #[serde(default)]
    pub access_token_lifetime_secs: Option<u64>,
    #[serde(default)]
    pub refresh_token_lifetime_secs: Option<u64>,
    #[serde(default)]
    pub max_failures: Option<u32>,
    #[serde(default)]
    pub window_secs: Option<u64>,
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
}

/// Shared, swappable view of the effective policy.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    base: Arc<AuthPolicy>,
    current: Arc<RwLock<AuthPolicy>>,
}

impl PolicyHandle {
    pub fn new(base: AuthPolicy) -> Self {
        Self {
            current: Arc::new(RwLock::new(base.clone())),
            base: Arc::new(base),
        }
    }

    pub async fn current(&self) -> AuthPolicy {
        self.current.read().await.clone()
    }

    /// The static policy from configuration.
    pub fn base(&self) -> &AuthPolicy {
        &self.base
    }

    /// Replace the effective policy with the static one plus `update`.
    pub async fn apply(&self, update: &AuthPolicyOverride) -> AuthPolicy {
        let next = self.base.with_override(update);
        *self.current.write().await = next.clone();
        next
    }

    pub async fn reset(&self) {
        *self.current.write().await = (*self.base).clone();
    }
}

/// HTTP client for the super-admin settings document.
#[derive(Debug, Clone)]
pub struct SettingsClient {
    http: reqwest::Client,
    endpoint: String,
}

impl SettingsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SettingsError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), SETTINGS_PATH),
        })
    }

    /// `None` when no remote source is configured.
    pub fn from_config(config: &SuperadminConfig) -> Result<Option<Self>, SettingsError> {
        config
            .base_url
            .as_deref()
            .map(|base| Self::new(base, Duration::from_millis(config.timeout_ms)))
            .transpose()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn fetch(&self) -> Result<AuthPolicyOverride, SettingsError> {
        let response = self.http.get(&self.endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SettingsError::Status(status));
        }
        Ok(response.json::<AuthPolicyOverride>().await?)
    }

    /// Fetch and apply the remote policy. Returns whether the remote values
    /// are now in effect.
    pub async fn refresh(&self, policy: &PolicyHandle) -> bool {
        match self.fetch().await {
            Ok(update) => {
                let effective = policy.apply(&update).await;
                tracing::debug!(?effective, "applied remote auth policy");
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "super-admin settings unavailable, using static auth policy"
                );
                policy.reset().await;
                false
            }
        }
    }
}

/// Periodically re-fetch the remote policy. The first fetch is left to the
/// caller so startup can wait for it.
pub fn spawn_refresh_task(
    client: SettingsClient,
    policy: PolicyHandle,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            client.refresh(&policy).await;
        }
    })
}
