//! SAML artifacts.
//!
//! The artifact is treated as an opaque reference. Artifacts of type
//! `0x0004` can additionally be decoded to find which IdP issued them:
//!
//! ```text
//! TypeCode (2) | EndpointIndex (2) | SourceID (20) | MessageHandle (20)
//! ```
//!
//! where `SourceID` is the SHA-1 of the issuer's entity ID.

use base64::{engine::general_purpose::STANDARD, Engine};
use sp_crypto::{digest, DigestAlgorithm};

use super::ARTIFACT_TYPE_CODE;
use crate::error::{ArtifactError, ArtifactResult};

const TYPE4_LEN: usize = 44;

/// An artifact received from the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact(String);

impl Artifact {
    /// Validates an artifact from the `SAMLart` parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::MalformedRequest`] for an empty or
    /// whitespace-only value.
    pub fn parse(raw: &str) -> ArtifactResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ArtifactError::MalformedRequest(
                "SAMLart parameter is missing or empty".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the artifact as sent.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the artifact as a type `0x0004` artifact, if it is one.
    #[must_use]
    pub fn decode_type4(&self) -> Option<Type4Artifact> {
        let bytes = STANDARD.decode(&self.0).ok()?;
        if bytes.len() != TYPE4_LEN {
            return None;
        }
        if u16::from_be_bytes([bytes[0], bytes[1]]) != ARTIFACT_TYPE_CODE {
            return None;
        }

        let mut source_id = [0u8; 20];
        source_id.copy_from_slice(&bytes[4..24]);
        let mut message_handle = [0u8; 20];
        message_handle.copy_from_slice(&bytes[24..44]);

        Some(Type4Artifact {
            endpoint_index: u16::from_be_bytes([bytes[2], bytes[3]]),
            source_id,
            message_handle,
        })
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded SAML 2.0 type `0x0004` artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type4Artifact {
    /// Index of the IdP's artifact resolution endpoint.
    pub endpoint_index: u16,
    /// SHA-1 of the issuing entity ID.
    pub source_id: [u8; 20],
    /// Random handle identifying the message at the IdP.
    pub message_handle: [u8; 20],
}

impl Type4Artifact {
    /// Creates an artifact for an issuing entity.
    #[must_use]
    pub fn new(endpoint_index: u16, issuer_entity_id: &str, message_handle: [u8; 20]) -> Self {
        Self {
            endpoint_index,
            source_id: source_id_for(issuer_entity_id),
            message_handle,
        }
    }

    /// Returns true if the artifact was issued by `entity_id`.
    #[must_use]
    pub fn is_from(&self, entity_id: &str) -> bool {
        self.source_id == source_id_for(entity_id)
    }

    /// Encodes the artifact for the `SAMLart` parameter.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(TYPE4_LEN);
        bytes.extend_from_slice(&ARTIFACT_TYPE_CODE.to_be_bytes());
        bytes.extend_from_slice(&self.endpoint_index.to_be_bytes());
        bytes.extend_from_slice(&self.source_id);
        bytes.extend_from_slice(&self.message_handle);
        STANDARD.encode(bytes)
    }
}

fn source_id_for(entity_id: &str) -> [u8; 20] {
    let hash = digest(DigestAlgorithm::Sha1, entity_id.as_bytes());
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash);
    out
}
