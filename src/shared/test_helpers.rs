#[cfg(test)]
use crate::features::accidents::models::{
    AccidentImage, AccidentLocation, AccidentReport, AccidentStatus, CreateAccident,
    DecisionSource, ImageFormat, LocationSource,
};
#[cfg(test)]
use crate::features::auth::model::AuthenticatedUser;

#[cfg(test)]
use axum::{extract::Request, middleware::Next, response::Response, Router};
#[cfg(test)]
use fake::{
    faker::lorem::en::Sentence,
    faker::number::en::NumberWithFormat,
    Fake,
};

#[cfg(test)]
#[allow(dead_code)]
pub fn create_admin_user() -> AuthenticatedUser {
    AuthenticatedUser {
        sub: "test-admin".to_string(),
        roles: vec!["admin".to_string()],
    }
}

#[cfg(test)]
#[allow(dead_code)]
pub fn create_driver_user(sub: &str) -> AuthenticatedUser {
    AuthenticatedUser {
        sub: sub.to_string(),
        roles: vec!["driver".to_string()],
    }
}

#[cfg(test)]
#[allow(dead_code)]
async fn inject_admin_middleware(mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(create_admin_user());
    next.run(request).await
}

#[cfg(test)]
#[allow(dead_code)]
pub fn with_admin_auth(router: Router) -> Router {
    router.layer(axum::middleware::from_fn(inject_admin_middleware))
}

/// Injects a fixed user into every request
#[cfg(test)]
#[allow(dead_code)]
pub fn with_user_auth(router: Router, user: AuthenticatedUser) -> Router {
    router.layer(axum::middleware::from_fn(
        move |mut request: Request, next: Next| {
            let user = user.clone();
            async move {
                request.extensions_mut().insert(user);
                next.run(request).await
            }
        },
    ))
}

/// Intake data with a realistic description and `images` photos
#[cfg(test)]
#[allow(dead_code)]
pub fn sample_accident(zone_id: &str, images: usize) -> CreateAccident {
    let phone: String = NumberWithFormat("+62 8##-####-####").fake();
    let description: String = Sentence(4..10).fake();

    CreateAccident {
        phone_number: phone,
        description: Some(description),
        location: AccidentLocation {
            latitude: (-7.0..-6.0).fake(),
            longitude: (106.0..107.0).fake(),
            source: LocationSource::Gps,
            zone_id: zone_id.to_string(),
        },
        images: (0..images)
            .map(|i| AccidentImage {
                url: format!("https://cdn.example.org/reports/{}.jpg", i),
                public_id: format!("reports/{}", i),
                format: Some(ImageFormat::Jpg),
            })
            .collect(),
        reported_by: None,
    }
}

/// A verified, unclaimed report in the given zone
#[cfg(test)]
#[allow(dead_code)]
pub fn sample_report(zone_id: &str) -> AccidentReport {
    let data = sample_accident(zone_id, 1);
    let now = chrono::Utc::now();

    AccidentReport {
        id: uuid::Uuid::now_v7(),
        phone_number: data.phone_number,
        description: data.description,
        location: data.location,
        images: data.images,
        status: AccidentStatus::Verified,
        ml_confidence: None,
        decision_source: Some(DecisionSource::Manual),
        decided_by: Some("test-admin".to_string()),
        decided_at: Some(now),
        reported_by: None,
        assigned_to: None,
        assigned_at: None,
        classification_attempts: 0,
        created_at: now,
        updated_at: now,
    }
}
