//! RSA keys for XML encryption key transport.
//!
//! The SP holds the private half and unwraps the content key of every
//! `EncryptedAssertion` addressed to it. Both halves are handed to the XML
//! encryption layer as DER; the padding schemes live there.

use aws_lc_rs::{
    encoding::{AsDer, Pkcs8V1Der, PublicKeyX509Der},
    rsa::{KeySize, PrivateDecryptingKey, PublicEncryptingKey},
};

use crate::error::{CryptoError, CryptoResult};

/// Private key that unwraps content-encryption keys.
pub struct DecryptionKey {
    key: PrivateDecryptingKey,
    public: EncryptionKey,
}

impl DecryptionKey {
    /// Loads a PKCS#8 encoded RSA private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed.
    pub fn from_pkcs8(der: &[u8]) -> CryptoResult<Self> {
        let key = PrivateDecryptingKey::from_pkcs8(der)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid PKCS#8 RSA key: {e}")))?;
        Self::from_private(key)
    }

    /// Generates a fresh 2048-bit key.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> CryptoResult<Self> {
        let key = PrivateDecryptingKey::generate(KeySize::Rsa2048)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Self::from_private(key)
    }

    fn from_private(key: PrivateDecryptingKey) -> CryptoResult<Self> {
        let der: PublicKeyX509Der<'static> = key
            .public_key()
            .as_der()
            .map_err(|_| CryptoError::InvalidKey("RSA public key does not encode".into()))?;
        Ok(Self {
            key,
            public: EncryptionKey {
                spki_der: der.as_ref().to_vec(),
            },
        })
    }

    /// Returns the public half.
    #[must_use]
    pub fn encryption_key(&self) -> EncryptionKey {
        self.public.clone()
    }

    /// Returns the private key as PKCS#8 v1 DER.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be serialised.
    pub fn to_pkcs8_der(&self) -> CryptoResult<Vec<u8>> {
        let der: Pkcs8V1Der<'static> = self
            .key
            .as_der()
            .map_err(|_| CryptoError::InvalidKey("RSA key does not encode as PKCS#8".into()))?;
        Ok(der.as_ref().to_vec())
    }
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey").finish_non_exhaustive()
    }
}

/// Public key that wraps content-encryption keys.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    spki_der: Vec<u8>,
}

impl EncryptionKey {
    /// Loads a DER `SubjectPublicKeyInfo` RSA public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed.
    pub fn from_spki_der(der: &[u8]) -> CryptoResult<Self> {
        PublicEncryptingKey::from_der(der)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA public key: {e}")))?;
        Ok(Self {
            spki_der: der.to_vec(),
        })
    }

    /// Returns the `SubjectPublicKeyInfo` DER encoding.
    #[must_use]
    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("spki_len", &self.spki_der.len())
            .finish()
    }
}
