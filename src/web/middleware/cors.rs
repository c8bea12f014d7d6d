//! CORS middleware configuration.

use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

/// Create a CORS layer from the configured origins.
///
/// The API is read-mostly and carries no credentials, so an empty or
/// unusable origin list allows any origin.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(origin) => Some(origin),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    if parsed_origins.is_empty() {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers(Any)
            .allow_origin(Any)
    } else {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([CONTENT_TYPE, ACCEPT])
            .allow_origin(parsed_origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN};
    use axum::{routing::get, Router};
    use axum_test::TestServer;

    fn server(origins: &[String]) -> TestServer {
        let router = Router::new()
            .route("/health", get(|| async { "ok" }))
            .layer(create_cors_layer(origins));
        TestServer::new(router).unwrap()
    }

    #[tokio::test]
    async fn test_any_origin_without_config() {
        let response = server(&[])
            .get("/health")
            .add_header(ORIGIN, HeaderValue::from_static("http://elsewhere.example"))
            .await;
        assert_eq!(response.header(ACCESS_CONTROL_ALLOW_ORIGIN), "*");
    }

    #[tokio::test]
    async fn test_configured_origin_only() {
        let origins = vec![
            "http://localhost:5173".to_string(),
            "not a header\nvalue".to_string(),
        ];
        let server = server(&origins);

        let allowed = server
            .get("/health")
            .add_header(ORIGIN, HeaderValue::from_static("http://localhost:5173"))
            .await;
        assert_eq!(
            allowed.header(ACCESS_CONTROL_ALLOW_ORIGIN),
            "http://localhost:5173"
        );

        let other = server
            .get("/health")
            .add_header(ORIGIN, HeaderValue::from_static("http://elsewhere.example"))
            .await;
        assert!(other.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
