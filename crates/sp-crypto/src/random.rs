//! Cryptographically secure random generation.
//!
//! This module provides secure random generation for:
//! - SAML protocol message identifiers
//! - Browser session identifiers
//! - Artifact message handles
//!
//! All functions draw from the thread-local generator, which is seeded from
//! the operating system and safe to call from any number of tasks at once.

use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;

/// Number of random bytes in a SAML message identifier (160 bits).
pub const SAML_ID_BYTES: usize = 20;

/// Generates a cryptographically secure random byte array.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates a cryptographically secure random alphanumeric string.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates a SAML message identifier.
///
/// The identifier is `_` followed by 40 lowercase hex characters. The leading
/// underscore keeps it a valid `xs:ID` (an NCName cannot start with a digit).
///
/// # Security
///
/// 160 bits of entropy, above the 128 bits SAML core recommends.
#[must_use]
pub fn generate_saml_id() -> String {
    let bytes = random_bytes(SAML_ID_BYTES);
    let mut id = String::with_capacity(1 + SAML_ID_BYTES * 2);
    id.push('_');
    for b in bytes {
        id.push_str(&format!("{b:02x}"));
    }
    id
}

/// Generates a browser session identifier.
///
/// 32 alphanumeric characters, roughly 190 bits of entropy.
#[must_use]
pub fn generate_session_id() -> String {
    random_alphanumeric(32)
}
