//! Key material used by the artifact pipeline.
//!
//! Keys are injected through [`CredentialProvider`] rather than read from
//! globals, so a deployment can back them with files, a keystore or a
//! secrets service.

use std::sync::Arc;

use sp_crypto::{DecryptionKey, VerificationKey};

use crate::signature::SigningCredential;

/// Source of the SP's keys and the IdP's trust anchor.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync + 'static {
    /// Returns the key used to sign ArtifactResolve requests.
    async fn signing_credential(&self) -> Result<SigningCredential, CredentialError>;

    /// Returns the key used to unwrap assertion content keys.
    async fn decryption_credential(&self) -> Result<Arc<DecryptionKey>, CredentialError>;

    /// Returns the IdP key that assertion signatures must verify against.
    async fn idp_verification_key(&self) -> Result<VerificationKey, CredentialError>;
}

/// Error type for credential provider operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No credential of this kind is configured.
    #[error("credential not configured: {0}")]
    NotConfigured(String),

    /// The credential exists but cannot be used.
    #[error("invalid credential: {0}")]
    Invalid(String),

    /// The backing store failed.
    #[error("credential store error: {0}")]
    Storage(String),
}

/// Credentials held in memory.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    signing: SigningCredential,
    decryption: Arc<DecryptionKey>,
    idp_key: VerificationKey,
}

impl StaticCredentials {
    /// Creates a provider from already loaded keys.
    #[must_use]
    pub fn new(
        signing: SigningCredential,
        decryption: DecryptionKey,
        idp_key: VerificationKey,
    ) -> Self {
        Self {
            signing,
            decryption: Arc::new(decryption),
            idp_key,
        }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticCredentials {
    async fn signing_credential(&self) -> Result<SigningCredential, CredentialError> {
        Ok(self.signing.clone())
    }

    async fn decryption_credential(&self) -> Result<Arc<DecryptionKey>, CredentialError> {
        Ok(Arc::clone(&self.decryption))
    }

    async fn idp_verification_key(&self) -> Result<VerificationKey, CredentialError> {
        Ok(self.idp_key.clone())
    }
}
