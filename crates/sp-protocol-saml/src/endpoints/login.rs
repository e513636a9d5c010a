//! Login entry point.
//!
//! Remembers where the user wanted to go and sends the browser to the IdP.
//! Only targets the redirect policy accepts are remembered; the others
//! leave the default redirect in charge.
//! Building an `AuthnRequest` is left to the IdP's SSO URL configuration.

use axum::{
    extract::{Query, State},
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::acs::error_response;
use super::cookie::{extract_session_cookie, new_session_id, set_session_cookie};
use super::state::SpState;
use crate::error::ArtifactError;
use crate::session::GOTO_URL;

/// Query parameters of the login endpoint.
#[derive(Debug, Deserialize)]
pub struct LoginParams {
    /// URL to return to after authentication.
    pub goto: Option<String>,
}

/// GET handler for the login endpoint.
pub async fn login(
    State(state): State<SpState>,
    headers: HeaderMap,
    Query(params): Query<LoginParams>,
) -> Response {
    let (session_id, is_new) = match extract_session_cookie(&headers) {
        Some(id) => (id, false),
        None => (new_session_id(), true),
    };

    if let Some(goto) = params.goto.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
        if state.consumer.config().is_allowed_redirect(goto) {
            if let Err(err) = state.consumer.sessions().set(&session_id, GOTO_URL, goto).await {
                return error_response(&ArtifactError::from(err));
            }
            debug!(%goto, "stored goto URL");
        } else {
            warn!(%goto, security = true, "goto URL outside the allowed origins dropped");
        }
    }

    let Ok(location) = HeaderValue::from_str(&state.idp_sso_url) else {
        return error_response(&ArtifactError::Configuration("invalid IdP SSO URL".into()));
    };
    let mut response_headers = HeaderMap::new();
    response_headers.insert(LOCATION, location);
    if is_new {
        set_session_cookie(&mut response_headers, &session_id, state.secure_cookies);
    }
    (StatusCode::FOUND, response_headers).into_response()
}
