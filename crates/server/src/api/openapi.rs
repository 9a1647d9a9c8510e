//! OpenAPI/Utoipa configuration.

use crate::api::{health::MISC_TAG, protected::CRM_TAG};
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        let bearer = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .description(Some(
                "Opaque access token obtained from `/auth/token` or `/auth/refresh`.",
            ))
            .build();
        components.add_security_scheme("Bearer", SecurityScheme::Http(bearer));

        let oauth2 = OAuth2::new([utoipa::openapi::security::Flow::Password(
            utoipa::openapi::security::Password::new(
                "/auth/token",
                Scopes::from_iter([
                    ("read", "Read CRM records"),
                    ("write", "Create and modify CRM records"),
                    ("admin", "Super-admin area"),
                    ("sales", "Sales module"),
                    ("marketing", "Marketing module"),
                    ("support", "Support module"),
                    ("compliance", "Compliance module"),
                ]),
            ),
        )]);
        components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "CRM Auth API",
        version = "1.0.0",
        description = "OAuth2 token issuance and validation for the CRM backend."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 authentication endpoints"),
        (name = CRM_TAG, description = "Protected CRM routes")
    )
)]
pub struct ApiDoc;
