//! SAML 2.0 types and data structures.
//!
//! This module contains the protocol messages exchanged over the artifact
//! binding and the assertion content they deliver.

mod artifact;
mod artifact_resolve;
mod artifact_response;
mod assertion;
mod constants;
pub mod ids;
mod status;

pub use artifact::*;
pub use artifact_resolve::*;
pub use artifact_response::*;
pub use assertion::*;
pub use constants::*;
pub use status::*;
