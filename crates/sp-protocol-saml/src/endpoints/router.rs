//! SP router configuration.

use axum::{routing::get, Router};

use super::acs::acs;
use super::login::login;
use super::state::SpState;

/// Default path of the Assertion Consumer Service.
pub const DEFAULT_ACS_PATH: &str = "/saml/acs";

/// Path of the login entry point.
pub const LOGIN_PATH: &str = "/saml/login";

/// Creates the SP router.
///
/// | Method | Path                    | Handler | Description                     |
/// |--------|-------------------------|---------|---------------------------------|
/// | GET    | `acs_path`              | `acs`   | Artifact binding ACS            |
/// | GET    | `/saml/login?goto=...`  | `login` | Store goto URL, redirect to IdP |
pub fn sp_router(acs_path: &str) -> Router<SpState> {
    Router::new()
        .route(acs_path, get(acs))
        .route(LOGIN_PATH, get(login))
}
