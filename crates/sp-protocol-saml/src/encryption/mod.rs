//! XML Encryption for SAML assertions.
//!
//! Assertions are delivered as `saml:EncryptedAssertion` holding an
//! `xenc:EncryptedData` whose content key is wrapped with the SP's RSA key
//! in an `xenc:EncryptedKey`. The ciphers run in bergshamra-enc; this
//! module decides which algorithms reach it.
//!
//! | Role          | Accepted algorithms                                  |
//! |---------------|------------------------------------------------------|
//! | Key transport | `rsa-oaep-mgf1p`, `xmlenc11#rsa-oaep` (SHA-1/SHA-256) |
//! | Content       | `aes128-cbc`, `aes256-cbc`, `aes128-gcm`, `aes256-gcm` |
//!
//! `rsa-1_5` key transport is refused.

mod decrypter;
mod encrypter;

pub use decrypter::*;
pub use encrypter::*;

use crate::types::encryption_algorithms;

/// Content encryption algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCipher {
    /// AES-128 in CBC mode.
    Aes128Cbc,
    /// AES-256 in CBC mode.
    Aes256Cbc,
    /// AES-128 in GCM mode.
    Aes128Gcm,
    /// AES-256 in GCM mode.
    Aes256Gcm,
}

impl ContentCipher {
    /// Returns the `EncryptionMethod` URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Aes128Cbc => encryption_algorithms::AES128_CBC,
            Self::Aes256Cbc => encryption_algorithms::AES256_CBC,
            Self::Aes128Gcm => encryption_algorithms::AES128_GCM,
            Self::Aes256Gcm => encryption_algorithms::AES256_GCM,
        }
    }

    /// Parses an `EncryptionMethod` URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [
            Self::Aes128Cbc,
            Self::Aes256Cbc,
            Self::Aes128Gcm,
            Self::Aes256Gcm,
        ]
        .into_iter()
        .find(|c| c.uri() == uri)
    }
}

/// RSA-OAEP key transport variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransport {
    /// `xmlenc#rsa-oaep-mgf1p`: SHA-1 digest and MGF1-SHA1.
    RsaOaepMgf1p,
    /// `xmlenc11#rsa-oaep`. Encrypted with SHA-256 and MGF1-SHA256;
    /// matching SHA-1 parameters are also accepted on decryption.
    RsaOaep,
}

impl KeyTransport {
    /// Returns the `EncryptionMethod` URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaOaepMgf1p => encryption_algorithms::RSA_OAEP_MGF1P,
            Self::RsaOaep => encryption_algorithms::RSA_OAEP,
        }
    }
}
