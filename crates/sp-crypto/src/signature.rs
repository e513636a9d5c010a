//! Signature keys for XML-DSig.
//!
//! Signing is RSA only, which is what SAML metadata advertises for service
//! providers in practice. Trusted IdP keys may also be ECDSA, since identity
//! providers increasingly sign with P-256/P-384.
//!
//! The XML signature itself is computed elsewhere; keys leave this module as
//! PKCS#8 or `SubjectPublicKeyInfo` DER.

use aws_lc_rs::{
    encoding::{AsDer, Pkcs8V1Der, PublicKeyX509Der},
    rsa::KeySize,
    signature::{KeyPair, RsaKeyPair},
};
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;
use x509_parser::x509::SubjectPublicKeyInfo;

use crate::error::{CryptoError, CryptoResult};

/// XML-DSig signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-1 (legacy).
    RsaSha1,
    /// RSA PKCS#1 v1.5 with SHA-256.
    RsaSha256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    RsaSha384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    RsaSha512,
    /// ECDSA P-256 with SHA-256.
    EcdsaSha256,
    /// ECDSA P-384 with SHA-384.
    EcdsaSha384,
}

impl SignatureAlgorithm {
    /// Returns the XML-DSig algorithm URI.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::RsaSha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            Self::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::RsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
            Self::EcdsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256",
            Self::EcdsaSha384 => "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha384",
        }
    }

    /// Parses an XML-DSig algorithm URI.
    #[must_use]
    pub fn from_xml_dsig_uri(uri: &str) -> Option<Self> {
        [
            Self::RsaSha1,
            Self::RsaSha256,
            Self::RsaSha384,
            Self::RsaSha512,
            Self::EcdsaSha256,
            Self::EcdsaSha384,
        ]
        .into_iter()
        .find(|alg| alg.xml_dsig_uri() == uri)
    }

    /// Returns true if this algorithm relies on SHA-1.
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::RsaSha1)
    }

    /// Returns the key kind able to produce this signature.
    #[must_use]
    pub const fn key_kind(self) -> KeyKind {
        match self {
            Self::RsaSha1 | Self::RsaSha256 | Self::RsaSha384 | Self::RsaSha512 => KeyKind::Rsa,
            Self::EcdsaSha256 => KeyKind::EcP256,
            Self::EcdsaSha384 => KeyKind::EcP384,
        }
    }
}

/// Public key families accepted for verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// RSA, 2048 to 8192 bits.
    Rsa,
    /// ECDSA on NIST P-256.
    EcP256,
    /// ECDSA on NIST P-384.
    EcP384,
}

/// RSA private key used to sign outgoing protocol messages.
pub struct SigningKey {
    key_pair: RsaKeyPair,
}

impl SigningKey {
    /// Loads a PKCS#8 encoded RSA private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed.
    pub fn from_pkcs8(der: &[u8]) -> CryptoResult<Self> {
        let key_pair = RsaKeyPair::from_pkcs8(der)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid PKCS#8 RSA key: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Loads a PKCS#1 (`RSA PRIVATE KEY`) encoded private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let key_pair = RsaKeyPair::from_der(der)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid PKCS#1 RSA key: {e}")))?;
        Ok(Self { key_pair })
    }

    /// Generates a fresh 2048-bit key.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> CryptoResult<Self> {
        let key_pair = RsaKeyPair::generate(KeySize::Rsa2048)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self { key_pair })
    }

    /// Returns the private key as PKCS#8 v1 DER, whatever format it was
    /// loaded from.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be serialised.
    pub fn to_pkcs8_der(&self) -> CryptoResult<Vec<u8>> {
        let der: Pkcs8V1Der<'static> = self
            .key_pair
            .as_der()
            .map_err(|_| CryptoError::InvalidKey("RSA key does not encode as PKCS#8".into()))?;
        Ok(der.as_ref().to_vec())
    }

    /// Returns the matching verification key.
    ///
    /// # Errors
    ///
    /// Returns an error if the public key cannot be serialised.
    pub fn verification_key(&self) -> CryptoResult<VerificationKey> {
        let der: PublicKeyX509Der<'static> = self
            .key_pair
            .public_key()
            .as_der()
            .map_err(|_| CryptoError::InvalidKey("RSA public key does not encode".into()))?;
        Ok(VerificationKey {
            kind: KeyKind::Rsa,
            spki_der: der.as_ref().to_vec(),
        })
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("modulus_bits", &(self.key_pair.public_modulus_len() * 8))
            .finish_non_exhaustive()
    }
}

/// Trusted public key that IdP signatures must verify against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey {
    kind: KeyKind,
    spki_der: Vec<u8>,
}

impl VerificationKey {
    /// Extracts the public key from a DER encoded X.509 certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate cannot be parsed or carries an
    /// unsupported key type.
    pub fn from_certificate_der(cert_der: &[u8]) -> CryptoResult<Self> {
        let (_, cert) = X509Certificate::from_der(cert_der)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        Self::from_spki(cert.public_key())
            .map_err(|e| match e {
                CryptoError::InvalidKey(msg) => CryptoError::InvalidCertificate(msg),
                other => other,
            })
    }

    /// Parses a DER `SubjectPublicKeyInfo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be parsed or is neither RSA nor
    /// P-256/P-384.
    pub fn from_spki_der(spki_der: &[u8]) -> CryptoResult<Self> {
        let (_, spki) = SubjectPublicKeyInfo::from_der(spki_der)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::from_spki(&spki)
    }

    fn from_spki(spki: &SubjectPublicKeyInfo<'_>) -> CryptoResult<Self> {
        let kind = match spki
            .parsed()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        {
            PublicKey::RSA(_) => KeyKind::Rsa,
            PublicKey::EC(point) => match point.data().len() {
                65 => KeyKind::EcP256,
                97 => KeyKind::EcP384,
                len => {
                    return Err(CryptoError::UnsupportedAlgorithm(format!(
                        "EC point of {len} bytes"
                    )))
                }
            },
            _ => {
                return Err(CryptoError::UnsupportedAlgorithm(
                    "key is neither RSA nor EC".to_string(),
                ))
            }
        };

        Ok(Self {
            kind,
            spki_der: spki.raw.to_vec(),
        })
    }

    /// Returns the key family.
    #[must_use]
    pub const fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Returns the `SubjectPublicKeyInfo` DER encoding.
    #[must_use]
    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkcs8_export_reloads() {
        let key = SigningKey::generate().unwrap();
        let der = key.to_pkcs8_der().unwrap();

        let reloaded = SigningKey::from_pkcs8(&der).unwrap();
        assert_eq!(
            reloaded.verification_key().unwrap(),
            key.verification_key().unwrap()
        );
    }

    #[test]
    fn verification_key_is_spki() {
        let key = SigningKey::generate().unwrap().verification_key().unwrap();
        assert_eq!(key.kind(), KeyKind::Rsa);

        let reparsed = VerificationKey::from_spki_der(key.spki_der()).unwrap();
        assert_eq!(reparsed, key);
    }

    #[test]
    fn distinct_keys_differ() {
        let a = SigningKey::generate().unwrap().verification_key().unwrap();
        let b = SigningKey::generate().unwrap().verification_key().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn uri_roundtrip() {
        for alg in [
            SignatureAlgorithm::RsaSha1,
            SignatureAlgorithm::RsaSha256,
            SignatureAlgorithm::EcdsaSha384,
        ] {
            assert_eq!(SignatureAlgorithm::from_xml_dsig_uri(alg.xml_dsig_uri()), Some(alg));
        }
        assert_eq!(SignatureAlgorithm::from_xml_dsig_uri("urn:unknown"), None);
        assert!(SignatureAlgorithm::RsaSha1.is_legacy());
        assert_eq!(SignatureAlgorithm::EcdsaSha256.key_kind(), KeyKind::EcP256);
    }

    #[test]
    fn garbage_certificate_is_rejected() {
        let result = VerificationKey::from_certificate_der(b"not a certificate");
        assert!(matches!(result, Err(CryptoError::InvalidCertificate(_))));
    }

    #[test]
    fn garbage_spki_is_rejected() {
        assert!(VerificationKey::from_spki_der(b"\x30\x03\x02\x01\x00").is_err());
    }
}
