//! Artifact resolution error types.
//!
//! Every stage of the pipeline returns [`ArtifactResult`]; the first error
//! aborts the exchange. Nothing is retried.

use thiserror::Error;

use crate::xml::XmlError;

/// Result type for artifact resolution.
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Errors raised while resolving an artifact and consuming the assertion.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The inbound request carries no usable artifact.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The ArtifactResolve message could not be signed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The SOAP exchange failed at the network or HTTP level.
    #[error("transport error: {0}")]
    Transport(String),

    /// The IdP answered with something other than a usable ArtifactResponse.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The ArtifactResponse carries no encrypted assertion.
    #[error("missing assertion: {0}")]
    MissingAssertion(String),

    /// The encrypted assertion could not be decrypted.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The assertion carries no signature.
    #[error("assertion is not signed")]
    UnsignedAssertion,

    /// The signature does not have the expected shape.
    #[error("signature profile violation: {0}")]
    SignatureProfile(String),

    /// The signature or the reference digest does not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The assertion is outside its validity window or audience.
    #[error("assertion conditions not met: {0}")]
    AssertionConditions(String),

    /// The session could not be established.
    #[error("session error: {0}")]
    Session(String),

    /// XML parsing error.
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ArtifactError {
    /// Returns a short, stable identifier for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "malformed_request",
            Self::Signing(_) => "signing",
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::MissingAssertion(_) => "missing_assertion",
            Self::Decryption(_) => "decryption",
            Self::UnsignedAssertion => "unsigned_assertion",
            Self::SignatureProfile(_) => "signature_profile",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::AssertionConditions(_) => "assertion_conditions",
            Self::Session(_) => "session",
            Self::Xml(_) => "xml",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Returns true for errors that may indicate tampering or an attack.
    #[must_use]
    pub const fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            Self::Decryption(_)
                | Self::UnsignedAssertion
                | Self::SignatureProfile(_)
                | Self::InvalidSignature(_)
                | Self::AssertionConditions(_)
        )
    }

    /// Returns the HTTP status code shown to the browser.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::MalformedRequest(_) => 400,
            Self::Transport(_) | Self::Protocol(_) | Self::MissingAssertion(_) | Self::Xml(_) => {
                502
            }
            Self::Decryption(_)
            | Self::UnsignedAssertion
            | Self::SignatureProfile(_)
            | Self::InvalidSignature(_)
            | Self::AssertionConditions(_) => 401,
            Self::Signing(_) | Self::Session(_) | Self::Configuration(_) => 500,
        }
    }
}

impl From<base64::DecodeError> for ArtifactError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Protocol(format!("base64 decode error: {err}"))
    }
}

impl From<crate::session::SessionStoreError> for ArtifactError {
    fn from(err: crate::session::SessionStoreError) -> Self {
        Self::Session(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(ArtifactError::MalformedRequest("x".into()).http_status(), 400);
        assert_eq!(ArtifactError::Transport("x".into()).http_status(), 502);
        assert_eq!(ArtifactError::MissingAssertion("x".into()).http_status(), 502);
        assert_eq!(ArtifactError::InvalidSignature("x".into()).http_status(), 401);
        assert_eq!(ArtifactError::UnsignedAssertion.http_status(), 401);
        assert_eq!(ArtifactError::Session("x".into()).http_status(), 500);
    }

    #[test]
    fn security_classification() {
        assert!(ArtifactError::Decryption("x".into()).is_security_relevant());
        assert!(ArtifactError::SignatureProfile("x".into()).is_security_relevant());
        assert!(!ArtifactError::Transport("x".into()).is_security_relevant());
        assert!(!ArtifactError::Protocol("x".into()).is_security_relevant());
    }

    #[test]
    fn xml_errors_are_protocol_class() {
        let err = ArtifactError::from(XmlError::Syntax("unexpected EOF".into()));
        assert_eq!(err.kind(), "xml");
        assert_eq!(err.http_status(), 502);
    }
}
