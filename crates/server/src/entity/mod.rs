//! sea-orm entities for the `database` storage backend.

pub mod auth_user;
pub mod oauth_access_token;
pub mod oauth_refresh_token;
pub mod pkce_challenge;
