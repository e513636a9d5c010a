//! SAML 2.0 Service Provider for the Artifact Binding.
//!
//! This crate consumes SAML artifacts on behalf of a service provider:
//!
//! - **Artifact resolution** - Build, sign and send `ArtifactResolve` over SOAP
//! - **XML encryption** - Decrypt the `EncryptedAssertion` in the response
//! - **XML signature** - Verify the assertion against the IdP's key
//! - **Session establishment** - Mark the browser session authenticated
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`types`] - Core SAML types and data structures
//! - [`xml`] - Namespace-aware XML tree for building and inspecting messages
//! - [`signature`] - XML signature signing and validation
//! - [`encryption`] - XML encryption of assertions
//! - [`soap`] - SOAP 1.1 envelope and client
//! - [`credentials`] - Key material injection
//! - [`session`] - Browser session storage
//! - [`pipeline`] - The artifact consumer tying the stages together
//! - [`endpoints`] - Axum HTTP handlers for the SP endpoints
//! - [`error`] - Error types for artifact resolution
//!
//! Canonicalization, XML-DSig and XML Encryption are computed by the
//! bergshamra crates; this crate decides which documents and algorithms
//! reach them.
//!
//! # Example
//!
//! ```rust,ignore
//! use sp_protocol_saml::endpoints::{sp_router, SpState, DEFAULT_ACS_PATH};
//! use sp_protocol_saml::pipeline::{ArtifactConsumer, ArtifactConsumerConfig};
//!
//! let config = ArtifactConsumerConfig::new(sp_entity_id, idp_entity_id, ars_url);
//! let consumer = ArtifactConsumer::new(config, credentials, sessions)?;
//! let app = Router::new()
//!     .merge(sp_router(DEFAULT_ACS_PATH))
//!     .with_state(SpState::new(consumer, idp_sso_url));
//! ```
//!
//! # SAML Specifications
//!
//! This implementation follows these specifications:
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)
//! - [XML Encryption](https://www.w3.org/TR/xmlenc-core1/)
//! - [Exclusive XML Canonicalization](https://www.w3.org/TR/xml-exc-c14n/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credentials;
pub mod encryption;
pub mod endpoints;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod signature;
pub mod soap;
pub mod types;
pub mod xml;
mod xmlsec;

pub use error::{ArtifactError, ArtifactResult};
pub use types::*;
