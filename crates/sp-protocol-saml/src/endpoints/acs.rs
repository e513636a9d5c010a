//! Assertion Consumer Service for the artifact binding.
//!
//! The IdP redirects the browser here with `?SAMLart=...`. The handler runs
//! the [`ArtifactConsumer`](crate::pipeline::ArtifactConsumer) pipeline and
//! answers with a redirect to the stored goto URL, or an error page. A
//! successful login always issues a new session cookie.

use axum::{
    extract::{Query, State},
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;

use super::cookie::{extract_session_cookie, new_session_id, set_session_cookie};
use super::state::SpState;
use crate::error::ArtifactError;

/// Query parameters of the ACS endpoint.
#[derive(Debug, Deserialize)]
pub struct AcsParams {
    /// The artifact.
    #[serde(rename = "SAMLart")]
    pub saml_art: Option<String>,

    /// Relay state; not used by this SP.
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// GET handler for the ACS endpoint.
pub async fn acs(
    State(state): State<SpState>,
    headers: HeaderMap,
    Query(params): Query<AcsParams>,
) -> Response {
    let session_id = extract_session_cookie(&headers).unwrap_or_else(new_session_id);

    let outcome = state
        .consumer
        .consume(params.saml_art.as_deref(), &session_id)
        .await;

    match outcome {
        // The pipeline checked the target already; this cannot fail for a
        // store-backed login.
        Ok(login) => match HeaderValue::from_str(&login.redirect_url) {
            Ok(location) => {
                let mut response_headers = HeaderMap::new();
                response_headers.insert(LOCATION, location);
                set_session_cookie(&mut response_headers, &login.session_id, state.secure_cookies);
                (StatusCode::FOUND, response_headers).into_response()
            }
            Err(_) => error_page(StatusCode::INTERNAL_SERVER_ERROR),
        },
        Err(err) => error_response(&err),
    }
}

/// Renders a pipeline error for the browser. Details stay in the logs.
pub fn error_response(err: &ArtifactError) -> Response {
    error_page(StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
}

fn error_page(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Login failed</title></head>
<body>
<h1>Login failed</h1>
<p>{} {reason}</p>
</body>
</html>"#,
        status.as_u16()
    );
    (status, Html(html)).into_response()
}
