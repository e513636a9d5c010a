//! Browser session cookie.
//!
//! The cookie only carries an opaque session id; everything else lives in
//! the [`SessionStore`](crate::session::SessionStore). `SameSite=Lax` is
//! required so the cookie survives the top-level redirect back from the IdP.

use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use sp_crypto::generate_session_id;

/// Cookie name for SP sessions.
pub const SESSION_COOKIE_NAME: &str = "SP_SESSION";

/// Creates a fresh session id.
#[must_use]
pub fn new_session_id() -> String {
    generate_session_id()
}

/// Builds the `Set-Cookie` value for `session_id`.
#[must_use]
pub fn create_session_cookie(session_id: &str, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("{SESSION_COOKIE_NAME}={session_id}; HttpOnly{secure_flag}; SameSite=Lax; Path=/")
}

/// Adds the session cookie to response headers.
pub fn set_session_cookie(headers: &mut HeaderMap, session_id: &str, secure: bool) {
    if let Ok(value) = HeaderValue::from_str(&create_session_cookie(session_id, secure)) {
        headers.append(SET_COOKIE, value);
    }
}

/// Extracts the session id from request cookies.
///
/// Values that could not have been issued by [`new_session_id`] are
/// ignored.
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|part| part.trim().strip_prefix(SESSION_COOKIE_NAME)?.strip_prefix('='))
        .map(str::trim)
        .find(|value| is_session_id(value))
        .map(str::to_string)
}

fn is_session_id(value: &str) -> bool {
    (16..=128).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_alphanumeric())
}
