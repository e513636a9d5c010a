//! Router configuration.
//!
//! This module creates the main Axum router that combines the SP endpoints
//! with health checks.

use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use sp_protocol_saml::endpoints::{sp_router, SpState};

/// Creates the main application router.
pub fn create_router(state: SpState, acs_path: &str) -> Router {
    let sp = sp_router(acs_path).with_state(state);

    let health = Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check));

    Router::new()
        .merge(sp)
        .merge(health)
        .route("/", get(root))
        .layer(TraceLayer::new_for_http())
}

/// Root endpoint handler.
async fn root() -> Json<ServerInfo> {
    Json(ServerInfo {
        name: "SAML Artifact SP".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

/// Server information response.
#[derive(Serialize)]
pub struct ServerInfo {
    name: String,
    version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP",
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    })
}

async fn liveness_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP",
        version: None,
    })
}

// Keys are loaded before the listener binds, so a running server is ready.
async fn readiness_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP",
        version: None,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use sp_crypto::{DecryptionKey, SigningKey};
    use sp_protocol_saml::credentials::StaticCredentials;
    use sp_protocol_saml::pipeline::{ArtifactConsumer, ArtifactConsumerConfig};
    use sp_protocol_saml::session::InMemorySessionStore;
    use sp_protocol_saml::signature::SigningCredential;
    use tower::ServiceExt;

    use super::*;

    fn app(acs_path: &str) -> Router {
        let credentials = Arc::new(StaticCredentials::new(
            SigningCredential::new(SigningKey::generate().unwrap(), None),
            DecryptionKey::generate().unwrap(),
            SigningKey::generate().unwrap().verification_key().unwrap(),
        ));
        let consumer = ArtifactConsumer::new(
            ArtifactConsumerConfig::new("https://sp", "https://idp", "http://127.0.0.1:9/ars"),
            credentials,
            Arc::new(InMemorySessionStore::new()),
        )
        .unwrap();
        let state = SpState::new(consumer, "https://idp.example.com/sso");
        create_router(state, acs_path)
    }

    #[tokio::test]
    async fn health_reports_up() {
        let response = app("/saml/acs")
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "UP");
    }

    #[tokio::test]
    async fn liveness_and_readiness_respond() {
        for path in ["/health/live", "/health/ready"] {
            let response = app("/saml/acs")
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{path}");
        }
    }

    #[tokio::test]
    async fn acs_is_mounted_at_configured_path() {
        let response = app("/sp/consume")
            .oneshot(Request::get("/sp/consume").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app("/sp/consume")
            .oneshot(Request::get("/saml/acs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn login_redirects_to_idp() {
        let response = app("/saml/acs")
            .oneshot(Request::get("/saml/login?goto=/app").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://idp.example.com/sso"
        );
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains("Secure"));
    }
}
