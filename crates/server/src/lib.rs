//! Authentication core of the CRM backend.
//!
//! Issues PKCE-bound OAuth2 tokens, validates them for the CRM routers and
//! handles refresh rotation and revocation.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::oauth2::AuthService;

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod oauth2;
pub mod settings;
pub mod store;
pub mod sweeper;

#[derive(Clone)]
pub struct AppResources {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
}
