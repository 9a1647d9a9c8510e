//! OAuth2 HTTP endpoints.
//!
//! - Challenge issuance
//! - Token endpoint (password, authorization_code, refresh_token)
//! - Refresh rotation, revocation and logout
//! - UserInfo and the RFC 8414 discovery document

use crate::api::auth::BearerAuth;
use crate::error::{AuthError, ErrorBody};
use crate::oauth2::OAUTH2_TAG;
use crate::oauth2::challenge::{ChallengeRequest, ChallengeResponse};
use crate::oauth2::grant::{BasicCredentials, TokenRequest, TokenResponse};
use crate::oauth2::service::{AuthService, RefreshRequest};
use crate::oauth2::types::{GrantType, Scope};
use axum::{
    Form, Json,
    extract::{
        State,
        rejection::{FormRejection, JsonRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OAuth2 router.
pub fn router(service: AuthService) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(challenge))
        .routes(routes!(token))
        .routes(routes!(refresh))
        .routes(routes!(revoke))
        .routes(routes!(logout))
        .routes(routes!(userinfo))
        .routes(routes!(authorization_server_metadata))
        .with_state(service)
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: String,
    pub client_id: String,
    pub scope: String,
    /// Access token expiry as a Unix timestamp
    pub exp: i64,
}

/// RFC 8414 authorization server metadata.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub challenge_endpoint: String,
    pub token_endpoint: String,
    pub refresh_endpoint: String,
    pub revocation_endpoint: String,
    pub userinfo_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

fn no_store(body: TokenResponse) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-store"), (header::PRAGMA, "no-cache")],
        Json(body),
    )
}

// =============================================================================
// Endpoints
// =============================================================================

/// Issue a PKCE challenge.
#[tracing::instrument(skip(service, payload))]
#[utoipa::path(
    post,
    path = "/challenge",
    tag = OAUTH2_TAG,
    operation_id = "Issue PKCE Challenge",
    summary = "Record a PKCE code challenge",
    description = "Records the S256 `code_challenge` derived by the client from its secret `code_verifier`. \
                   The returned `challenge_id` is redeemed once as `code` on the token endpoint together \
                   with the verifier.\n\n\
                   `code_challenge_method` defaults to `S256`; `plain` is rejected.",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Challenge recorded", body = ChallengeResponse),
        (status = 400, description = "Malformed challenge or unsupported method", body = ErrorBody),
        (status = 401, description = "Unknown client_id", body = ErrorBody),
    )
)]
pub async fn challenge(
    State(service): State<AuthService>,
    payload: Result<Json<ChallengeRequest>, JsonRejection>,
) -> Result<Json<ChallengeResponse>, AuthError> {
    let Json(request) = payload.map_err(|e| AuthError::InvalidRequest(e.body_text()))?;
    Ok(Json(service.issue_challenge(request).await?))
}

/// OAuth2 token endpoint.
#[tracing::instrument(skip(service, headers, payload))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange a grant for tokens",
    description = "Issues an opaque access token and refresh token.\n\n\
                   **Supported grant types:**\n\
                   - `authorization_code`: `code` is the `challenge_id`, `code_verifier` the PKCE verifier\n\
                   - `password`: `username` and `password`, for clients that do not require PKCE\n\
                   - `refresh_token`: rotate a refresh token\n\n\
                   **Client authentication:** HTTP Basic or `client_id`/`client_secret` in the body. \
                   Public clients send only `client_id`.\n\n\
                   Repeated `invalid_grant` or `invalid_client` failures lock the client out \
                   with `429`.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Malformed request, unsupported grant or client not allowed", body = ErrorBody),
        (status = 401, description = "Invalid client or grant", body = ErrorBody),
        (status = 429, description = "Client locked out after repeated failures", body = ErrorBody),
    )
)]
pub async fn token(
    State(service): State<AuthService>,
    headers: HeaderMap,
    payload: Result<Form<TokenRequest>, FormRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let Form(request) = payload.map_err(|e| AuthError::InvalidRequest(e.body_text()))?;
    let pair = service
        .grant(request, basic_credentials(&headers))
        .await?;
    Ok(no_store(TokenResponse::from_pair(&pair)))
}

/// Rotate a refresh token.
#[tracing::instrument(skip(service, payload))]
#[utoipa::path(
    post,
    path = "/refresh",
    tag = OAUTH2_TAG,
    operation_id = "Refresh Token",
    summary = "Rotate a refresh token",
    description = "Redeems a refresh token once and returns a new token pair. The previous access token \
                   is revoked. Presenting a refresh token that was already used revokes every token \
                   descended from the same grant.",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 400, description = "Malformed request", body = ErrorBody),
        (status = 401, description = "Unknown, used, expired or foreign refresh token", body = ErrorBody),
        (status = 429, description = "Client locked out", body = ErrorBody),
    )
)]
pub async fn refresh(
    State(service): State<AuthService>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthError> {
    let Json(request) = payload.map_err(|e| AuthError::InvalidRequest(e.body_text()))?;
    let pair = service.refresh(request).await?;
    Ok(no_store(TokenResponse::from_pair(&pair)))
}

/// Token revocation endpoint (RFC 7009).
#[tracing::instrument(skip(service, payload))]
#[utoipa::path(
    post,
    path = "/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Token",
    summary = "Revoke an access or refresh token",
    description = "Implements RFC 7009. Returns 200 even if the token is unknown or already revoked. \
                   Revoking a refresh token also revokes every token of its lineage.",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token revocation request"
    ),
    responses(
        (status = 200, description = "Token revoked (or was already invalid)"),
        (status = 400, description = "Missing token parameter", body = ErrorBody),
    )
)]
pub async fn revoke(
    State(service): State<AuthService>,
    payload: Result<Form<RevokeRequest>, FormRejection>,
) -> Result<StatusCode, AuthError> {
    let Form(request) = payload.map_err(|e| AuthError::InvalidRequest(e.body_text()))?;
    service
        .revoke(&request.token, request.token_type_hint.as_deref())
        .await?;
    Ok(StatusCode::OK)
}

/// Revoke the caller's session.
#[tracing::instrument(skip(service, auth))]
#[utoipa::path(
    post,
    path = "/logout",
    tag = OAUTH2_TAG,
    operation_id = "Logout",
    summary = "Revoke every token of the caller's session",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
    ),
    security(("Bearer" = []))
)]
pub async fn logout(
    State(service): State<AuthService>,
    auth: BearerAuth,
) -> Result<StatusCode, AuthError> {
    service.logout(&auth.0).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Describe the token presented.
#[tracing::instrument(skip(auth))]
#[utoipa::path(
    get,
    path = "/userinfo",
    tag = OAUTH2_TAG,
    operation_id = "UserInfo",
    summary = "Identity behind the bearer token",
    responses(
        (status = 200, description = "Token identity", body = UserInfoResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
    ),
    security(("Bearer" = []))
)]
pub async fn userinfo(auth: BearerAuth) -> Json<UserInfoResponse> {
    let principal = auth.0;
    Json(UserInfoResponse {
        sub: principal.subject,
        client_id: principal.client_id.to_string(),
        scope: principal.scopes.to_string(),
        exp: principal.expires_at.unix_timestamp(),
    })
}

/// Authorization server discovery document.
#[tracing::instrument(skip(service))]
#[utoipa::path(
    get,
    path = "/.well-known/oauth-authorization-server",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Discovery",
    summary = "Authorization server metadata (RFC 8414)",
    responses(
        (status = 200, description = "Server metadata", body = AuthorizationServerMetadata),
    )
)]
pub async fn authorization_server_metadata(
    State(service): State<AuthService>,
) -> Json<AuthorizationServerMetadata> {
    let base = service.issuer_url();
    Json(AuthorizationServerMetadata {
        issuer: base.to_string(),
        challenge_endpoint: format!("{base}/auth/challenge"),
        token_endpoint: format!("{base}/auth/token"),
        refresh_endpoint: format!("{base}/auth/refresh"),
        revocation_endpoint: format!("{base}/auth/revoke"),
        userinfo_endpoint: format!("{base}/auth/userinfo"),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: GrantType::ALL.iter().map(|g| g.to_string()).collect(),
        scopes_supported: Scope::ALL.iter().map(|s| s.to_string()).collect(),
        token_endpoint_auth_methods_supported: vec![
            "client_secret_basic".to_string(),
            "client_secret_post".to_string(),
            "none".to_string(),
        ],
        code_challenge_methods_supported: vec!["S256".to_string()],
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

fn basic_credentials(headers: &HeaderMap) -> Option<BasicCredentials> {
    let encoded = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))?;
    let decoded =
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded.trim()).ok()?;
    let creds = String::from_utf8(decoded).ok()?;
    let (id, secret) = creds.split_once(':')?;
    Some(BasicCredentials {
        client_id: id.to_string(),
        client_secret: secret.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_basic_credentials() {
        let mut headers = HeaderMap::new();
        assert!(basic_credentials(&headers).is_none());

        // "crm_service:s3cret"
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic Y3JtX3NlcnZpY2U6czNjcmV0"),
        );
        let creds = basic_credentials(&headers).unwrap();
        assert_eq!(creds.client_id, "crm_service");
        assert_eq!(creds.client_secret, "s3cret");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(basic_credentials(&headers).is_none());
    }
}
