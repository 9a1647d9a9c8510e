//! Demo routes standing in for the CRM module routers.
//!
//! They consume the auth core exactly like a real router would: a
//! [`BearerAuth`] extractor plus a scope check.

use crate::api::auth::BearerAuth;
use crate::error::{AuthError, ErrorBody};
use crate::oauth2::types::Scope;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const CRM_TAG: &str = "CRM";

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(me))
        .routes(routes!(superadmin))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub subject: String,
    pub client_id: String,
    pub scopes: Vec<Scope>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuperadminResponse {
    pub subject: String,
    pub status: String,
}

/// Identity of the caller.
#[tracing::instrument(skip(auth))]
#[utoipa::path(
    get,
    path = "/me",
    tag = CRM_TAG,
    operation_id = "Current Principal",
    summary = "Who the bearer token belongs to",
    responses(
        (status = 200, description = "Token identity", body = MeResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
    ),
    security(("Bearer" = []))
)]
pub async fn me(auth: BearerAuth) -> axum::Json<MeResponse> {
    let principal = auth.0;
    axum::Json(MeResponse {
        subject: principal.subject,
        client_id: principal.client_id.to_string(),
        scopes: principal.scopes.iter().collect(),
    })
}

/// Super-admin area; requires the `admin` scope.
#[tracing::instrument(skip(auth))]
#[utoipa::path(
    get,
    path = "/superadmin",
    tag = CRM_TAG,
    operation_id = "Superadmin Overview",
    summary = "Super-admin landing route",
    responses(
        (status = 200, description = "Access granted", body = SuperadminResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorBody),
        (status = 403, description = "Token lacks the admin scope", body = ErrorBody),
    ),
    security(("Bearer" = ["admin"]))
)]
pub async fn superadmin(auth: BearerAuth) -> Result<axum::Json<SuperadminResponse>, AuthError> {
    auth.0.require_scope(Scope::Admin)?;
    Ok(axum::Json(SuperadminResponse {
        subject: auth.0.subject,
        status: "ok".to_string(),
    }))
}
