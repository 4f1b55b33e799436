use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::features::accidents::{
    dtos as accidents_dtos, handlers as accidents_handlers, models as accidents_models,
};
use crate::features::dispatch::{handlers as dispatch_handlers, services as dispatch_services};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Accidents
        accidents_handlers::report_accident,
        accidents_handlers::list_accidents,
        accidents_handlers::get_accident,
        accidents_handlers::update_accident_status,
        accidents_handlers::classify_accident,
        // Dispatch
        dispatch_handlers::list_zones,
        dispatch_handlers::dispatch_socket,
    ),
    components(
        schemas(
            // Shared
            Meta,
            // Accidents
            accidents_models::AccidentStatus,
            accidents_models::DecisionSource,
            accidents_models::DispatchState,
            accidents_models::LocationSource,
            accidents_models::ImageFormat,
            accidents_models::AccidentLocation,
            accidents_models::AccidentImage,
            accidents_dtos::CreateAccidentDto,
            accidents_dtos::AccidentLocationDto,
            accidents_dtos::AccidentImageDto,
            accidents_dtos::AccidentCreatedDto,
            accidents_dtos::AccidentResponseDto,
            accidents_dtos::UpdateAccidentStatusDto,
            accidents_dtos::ClassificationResultDto,
            ApiResponse<accidents_dtos::AccidentCreatedDto>,
            ApiResponse<accidents_dtos::AccidentResponseDto>,
            ApiResponse<Vec<accidents_dtos::AccidentResponseDto>>,
            ApiResponse<accidents_dtos::ClassificationResultDto>,
            // Dispatch
            dispatch_services::PresenceSnapshot,
            dispatch_services::ZonePresence,
            ApiResponse<dispatch_services::PresenceSnapshot>,
        )
    ),
    tags(
        (name = "accidents", description = "Accident intake and verification"),
        (name = "dispatch", description = "Ambulance dispatch channel and presence"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Accident Dispatch API",
        version = "0.1.0",
        description = "API documentation for accident reporting and ambulance dispatch",
    )
)]
pub struct ApiDoc;

/// Adds Bearer JWT security scheme to OpenAPI spec
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/accident/report",
            "/api/v1/accident/accidents",
            "/api/v1/accident/accidents/{id}",
            "/api/v1/accident/accidents/{id}/status",
            "/api/v1/accident/accidents/{id}/classify",
            "/api/v1/dispatch/zones",
            "/ws/dispatch",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
