//! # sp-crypto
//!
//! Cryptographic operations for the artifact-binding service provider,
//! built on aws-lc-rs.
//!
//! ## Contents
//!
//! - [`random`] - identifier generation from the thread-local CSPRNG
//! - [`hash`] - message digests used by XML-DSig references
//! - [`signature`] - signing keys and trusted verification keys
//! - [`transport`] - RSA key pairs for XML encryption key transport
//!
//! XML signatures and XML encryption are computed by the protocol crate;
//! keys cross that boundary as PKCS#8 and `SubjectPublicKeyInfo` DER.
//!
//! ## Legacy algorithms
//!
//! SAML deployments still rely on SHA-1 digests. They are exposed here for
//! interoperability; callers decide whether to accept them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod hash;
pub mod random;
pub mod signature;
pub mod transport;

pub use error::{CryptoError, CryptoResult};
pub use hash::{digest, DigestAlgorithm};
pub use random::{generate_saml_id, generate_session_id, random_alphanumeric, random_bytes};
pub use signature::{KeyKind, SignatureAlgorithm, SigningKey, VerificationKey};
pub use transport::{DecryptionKey, EncryptionKey};
