//! Key managers for the XML security engine.
//!
//! Canonicalization, XML-DSig and XML encryption run in the bergshamra
//! crates. This module loads our key types into a [`KeysManager`] for each
//! operation and maps engine errors onto [`ArtifactError`].

use bergshamra_core::Error as XmlSecError;
use bergshamra_keys::{loader, Key, KeyData, KeyUsage, KeysManager};
use kryptering::KeyAlgorithm;
use sp_crypto::{DecryptionKey, EncryptionKey, SigningKey, VerificationKey};

use crate::error::{ArtifactError, ArtifactResult};

/// A manager holding only the SP's signing key.
pub(crate) fn signing_keys(key: &SigningKey) -> ArtifactResult<KeysManager> {
    let der = key
        .to_pkcs8_der()
        .map_err(|e| ArtifactError::Signing(e.to_string()))?;
    let data = KeyData::from_pkcs8_der(KeyAlgorithm::Rsa, &der)
        .map_err(|e| ArtifactError::Signing(format!("signing key rejected: {e}")))?;
    Ok(single(Key::new(data, KeyUsage::Sign)))
}

/// A manager holding only the trusted IdP key.
pub(crate) fn verification_keys(key: &VerificationKey) -> ArtifactResult<KeysManager> {
    let key = loader::load_spki_der(key.spki_der())
        .map_err(|e| ArtifactError::Configuration(format!("verification key rejected: {e}")))?;
    Ok(single(key))
}

/// A manager holding only the SP's decryption key.
pub(crate) fn decryption_keys(key: &DecryptionKey) -> ArtifactResult<KeysManager> {
    let der = key
        .to_pkcs8_der()
        .map_err(|e| ArtifactError::Configuration(e.to_string()))?;
    let data = KeyData::from_pkcs8_der(KeyAlgorithm::Rsa, &der)
        .map_err(|e| ArtifactError::Configuration(format!("decryption key rejected: {e}")))?;
    Ok(single(Key::new(data, KeyUsage::Decrypt)))
}

/// A manager holding only the recipient's public key.
pub(crate) fn encryption_keys(key: &EncryptionKey) -> ArtifactResult<KeysManager> {
    let key = loader::load_spki_der(key.spki_der())
        .map_err(|e| ArtifactError::Configuration(format!("encryption key rejected: {e}")))?;
    Ok(single(key))
}

fn single(key: Key) -> KeysManager {
    let mut manager = KeysManager::new();
    manager.add_key(key);
    manager
}

/// Maps a verification failure. Structural attacks stay distinguishable
/// from bad signature values.
pub(crate) fn verify_error(err: XmlSecError) -> ArtifactError {
    match err {
        XmlSecError::XmlStructure(msg) if msg.starts_with("duplicate ID") => {
            ArtifactError::SignatureProfile(msg)
        }
        XmlSecError::UnsupportedAlgorithm(msg) => ArtifactError::SignatureProfile(msg),
        other => ArtifactError::InvalidSignature(other.to_string()),
    }
}

pub(crate) fn sign_error(err: XmlSecError) -> ArtifactError {
    ArtifactError::Signing(err.to_string())
}

/// Decryption failures carry no engine detail past this point.
pub(crate) fn decrypt_error(err: XmlSecError) -> ArtifactError {
    tracing::debug!(error = %err, "XML decryption failed");
    ArtifactError::Decryption("EncryptedData did not decrypt".to_string())
}

pub(crate) fn encrypt_error(err: XmlSecError) -> ArtifactError {
    ArtifactError::Configuration(format!("assertion encryption failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_ids_are_a_profile_violation() {
        let err = verify_error(XmlSecError::XmlStructure("duplicate ID: _a".into()));
        assert!(matches!(err, ArtifactError::SignatureProfile(_)));

        let err = verify_error(XmlSecError::XmlStructure("unexpected element".into()));
        assert!(matches!(err, ArtifactError::InvalidSignature(_)));
    }

    #[test]
    fn every_key_kind_loads() {
        let signing = SigningKey::generate().unwrap();
        let decryption = DecryptionKey::generate().unwrap();

        assert!(signing_keys(&signing).is_ok());
        assert!(verification_keys(&signing.verification_key().unwrap()).is_ok());
        assert!(decryption_keys(&decryption).is_ok());
        assert!(encryption_keys(&decryption.encryption_key()).is_ok());
    }
}
