//! OAuth2 authorization core.
//!
//! Issues PKCE challenges, exchanges grants for opaque bearer tokens,
//! validates those tokens for the CRM routers and manages their rotation and
//! revocation.
//!
//! ## Supported Flows
//!
//! - Authorization Code with PKCE (S256 only)
//! - Resource Owner Password, for clients not bound to PKCE
//! - Refresh Token with rotation and reuse detection
//!
//! ## Endpoints
//!
//! - `POST /auth/challenge` - Record a PKCE challenge
//! - `POST /auth/token` - Token endpoint
//! - `POST /auth/refresh` - Refresh rotation
//! - `POST /auth/revoke` - Token revocation
//! - `POST /auth/logout` - Revoke the caller's session
//! - `GET /auth/userinfo` - Identity behind a token
//! - `GET /auth/.well-known/oauth-authorization-server` - Discovery

pub mod challenge;
pub mod clients;
pub mod endpoints;
pub mod grant;
pub mod lockout;
pub mod model;
pub mod password;
pub mod pkce;
pub mod revocation;
pub mod service;
pub mod types;
pub mod validator;

pub use clients::{ClientRegistration, ClientRegistry};
pub use endpoints::router;
pub use password::{hash_password, verify_password};
pub use service::{AuthService, AuthStores};
pub use validator::Principal;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
