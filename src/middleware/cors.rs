use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// The attempt UI is served from other origins and authenticates with bearer tokens only.
pub fn attempt_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(Any)
}
