//! SP endpoint handlers.
//!
//! This module provides Axum HTTP handlers for the SP side of the artifact
//! binding:
//!
//! - **ACS Endpoint** - receives the artifact and runs the pipeline
//! - **Login Endpoint** - stores the goto URL and redirects to the IdP
//!
//! # Example
//!
//! ```rust,ignore
//! use sp_protocol_saml::endpoints::{sp_router, SpState, DEFAULT_ACS_PATH};
//!
//! let app = Router::new()
//!     .merge(sp_router(DEFAULT_ACS_PATH))
//!     .with_state(SpState::new(consumer, idp_sso_url));
//! ```

mod acs;
mod cookie;
mod login;
mod router;
mod state;

pub use acs::*;
pub use cookie::*;
pub use login::*;
pub use router::*;
pub use state::*;
