use crate::oauth2::types::{ClientId, GrantType, Scope};
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// Upper bound for every configured duration, in seconds (366 days).
pub const MAX_DURATION_SECS: u64 = 366 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Where challenges, tokens and users are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps; users come from the `users` config section
    #[default]
    Memory,
    /// sea-orm tables created by the `migration` crate
    Database,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2Config {
    /// Base URL advertised as `issuer` in the discovery document
    #[serde(default = "default_issuer_url")]
    pub issuer_url: String,
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_secs: u64,
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime_secs: u64,
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime_secs: u64,
    /// How often expired challenges, tokens and counters are purged
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            issuer_url: default_issuer_url(),
            challenge_ttl_secs: default_challenge_ttl(),
            access_token_lifetime_secs: default_access_token_lifetime(),
            refresh_token_lifetime_secs: default_refresh_token_lifetime(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Brute-force lockout on the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_failure_window")]
    pub window_secs: u64,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            window_secs: default_failure_window(),
            cooldown_secs: default_cooldown(),
        }
    }
}

/// Remote policy source. Without a `base_url` the static values above are final.
#[derive(Debug, Clone, Deserialize)]
pub struct SuperadminConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_superadmin_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_superadmin_refresh")]
    pub refresh_interval_secs: u64,
}

impl Default for SuperadminConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_superadmin_timeout(),
            refresh_interval_secs: default_superadmin_refresh(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub client_id: ClientId,
    pub name: String,
    /// Present only for confidential clients
    #[serde(default)]
    pub secret: Option<String>,
    pub grant_types: Vec<GrantType>,
    pub scopes: Vec<Scope>,
    /// When set the client may not use the password grant
    #[serde(default = "default_true")]
    pub pkce_required: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// Stable subject identifier; defaults to the username
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
    /// Argon2id PHC string, see `crm-auth hash-password`
    pub password_hash: String,
    #[serde(default)]
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub storage: StorageBackend,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub oauth2: OAuth2Config,
    #[serde(default)]
    pub lockout: LockoutConfig,
    #[serde(default)]
    pub superadmin: SuperadminConfig,
    pub clients: Vec<ClientConfig>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_true() -> bool {
    true
}
fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_database_url() -> String {
    "sqlite::memory:".to_string()
}
fn default_issuer_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_challenge_ttl() -> u64 {
    600
}
fn default_access_token_lifetime() -> u64 {
    900
}
fn default_refresh_token_lifetime() -> u64 {
    86400 * 7
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_max_failures() -> u32 {
    5
}
fn default_failure_window() -> u64 {
    300
}
fn default_cooldown() -> u64 {
    300
}
fn default_superadmin_timeout() -> u64 {
    2000
}
fn default_superadmin_refresh() -> u64 {
    300
}

impl AppConfig {
    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clients.is_empty() {
            return Err(ConfigError::Validation(
                "at least one client must be registered".into(),
            ));
        }
        let mut seen = HashSet::new();
        for client in &self.clients {
            if !seen.insert(client.client_id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate client_id '{}'",
                    client.client_id
                )));
            }
            if client.grant_types.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "client '{}' has no grant types",
                    client.client_id
                )));
            }
        }
        if self.oauth2.challenge_ttl_secs == 0
            || self.oauth2.access_token_lifetime_secs == 0
            || self.oauth2.refresh_token_lifetime_secs == 0
        {
            return Err(ConfigError::Validation(
                "oauth2 lifetimes must be > 0".into(),
            ));
        }
        let durations = [
            ("oauth2.challenge_ttl_secs", self.oauth2.challenge_ttl_secs),
            ("oauth2.access_token_lifetime_secs", self.oauth2.access_token_lifetime_secs),
            ("oauth2.refresh_token_lifetime_secs", self.oauth2.refresh_token_lifetime_secs),
            ("lockout.window_secs", self.lockout.window_secs),
            ("lockout.cooldown_secs", self.lockout.cooldown_secs),
            ("oauth2.sweep_interval_secs", self.oauth2.sweep_interval_secs),
            ("superadmin.refresh_interval_secs", self.superadmin.refresh_interval_secs),
        ];
        if let Some((key, _)) = durations.iter().find(|(_, secs)| *secs > MAX_DURATION_SECS) {
            return Err(ConfigError::Validation(format!(
                "{key} must be at most {MAX_DURATION_SECS}"
            )));
        }
        if self.oauth2.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "oauth2.sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.lockout.max_failures == 0 {
            return Err(ConfigError::Validation(
                "lockout.max_failures must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// The file path can be changed with `CRM_AUTH_CONFIG`. Any variable matching
/// the key path separated by double underscores (e.g. `LOCKOUT__MAX_FAILURES`)
/// overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = std::env::var("CRM_AUTH_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    load_config_from(&path)
}

pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}
