//! XML Signature validation.
//!
//! Verification runs in three stages, each aborting on failure:
//!
//! 1. presence: no signature is [`ArtifactError::UnsignedAssertion`]
//! 2. profile: see [`SignatureProfileValidator`]
//! 3. cryptography: bergshamra-dsig checks the reference digest and the
//!    `SignatureValue` against the trusted IdP key, and its result must
//!    point back at the element that passed the profile
//!
//! The certificate embedded in `KeyInfo` is never used; it is attacker
//! controlled.

use bergshamra_dsig::{verify, DsigContext, VerifiedReference, VerifyResult};
use sp_crypto::VerificationKey;
use tracing::debug;
use uppsala::{Document, NodeId};

use super::SignatureProfileValidator;
use crate::encryption::DecryptedAssertion;
use crate::error::{ArtifactError, ArtifactResult};
use crate::types::{Assertion, XMLDSIG_NS};
use crate::xml::Element;
use crate::xmlsec;

/// An assertion whose signature has been verified against the IdP key.
///
/// Only [`SignatureVerifier::verify`] constructs this type, so holding one
/// proves the checks ran.
#[derive(Debug, Clone)]
pub struct VerifiedAssertion {
    assertion: Assertion,
}

impl VerifiedAssertion {
    /// Returns the verified assertion.
    #[must_use]
    pub fn assertion(&self) -> &Assertion {
        &self.assertion
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_assertion(self) -> Assertion {
        self.assertion
    }
}

/// Verifies enveloped signatures against a single trusted key.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    trusted_key: VerificationKey,
    profile: SignatureProfileValidator,
}

impl SignatureVerifier {
    /// Creates a verifier trusting `trusted_key`.
    #[must_use]
    pub fn new(trusted_key: VerificationKey) -> Self {
        Self {
            trusted_key,
            profile: SignatureProfileValidator::new(),
        }
    }

    /// Replaces the profile validator.
    #[must_use]
    pub fn with_profile(mut self, profile: SignatureProfileValidator) -> Self {
        self.profile = profile;
        self
    }

    /// Verifies the signature of a decrypted assertion.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::UnsignedAssertion`],
    /// [`ArtifactError::SignatureProfile`] or
    /// [`ArtifactError::InvalidSignature`]; and
    /// [`ArtifactError::Decryption`] if the verified element is not a
    /// readable assertion.
    pub fn verify(&self, decrypted: &DecryptedAssertion) -> ArtifactResult<VerifiedAssertion> {
        let document = decrypted.document();
        self.verify_element(decrypted.xml(), document)?;
        let assertion = Assertion::from_element(document)?;
        debug!(assertion_id = %assertion.id, "assertion signature verified");
        Ok(VerifiedAssertion { assertion })
    }

    /// Verifies the enveloped signature of `signed`, an element parsed out
    /// of the document text `xml`.
    ///
    /// # Errors
    ///
    /// See [`SignatureVerifier::verify`].
    pub fn verify_element(&self, xml: &str, signed: &Element) -> ArtifactResult<()> {
        let profile = self.profile.validate(signed)?;

        let doc = uppsala::parse(xml)
            .map_err(|e| ArtifactError::InvalidSignature(format!("unparseable document: {e}")))?;
        let target = locate(&doc, signed, profile.id)?;
        let signature = doc
            .first_child_element_by_name_ns(target, XMLDSIG_NS, "Signature")
            .ok_or_else(|| violation("signature not found in document"))?;

        // The engine verifies the first signature in document order.
        let first = doc
            .get_elements_by_tag_name_ns(XMLDSIG_NS, "Signature")
            .into_iter()
            .next();
        if first != Some(signature) {
            return Err(violation("another Signature precedes the assertion's"));
        }

        let ctx = DsigContext::new(xmlsec::verification_keys(&self.trusted_key)?);
        let result = verify::verify_document_with_source(&ctx, &doc, Some(xml))
            .map_err(xmlsec::verify_error)?;

        match result {
            VerifyResult::Valid {
                signature_node,
                references,
                ..
            } => {
                if signature_node != signature {
                    return Err(violation("engine verified a different Signature"));
                }
                check_reference(&references, profile.id, target)
            }
            VerifyResult::Invalid { reason } => {
                debug!(%reason, "signature rejected");
                Err(ArtifactError::InvalidSignature(reason))
            }
        }
    }
}

/// Finds the single element named like `signed` that carries `id`.
fn locate(doc: &Document<'_>, signed: &Element, id: &str) -> ArtifactResult<NodeId> {
    let namespace = signed.namespace.as_deref().unwrap_or_default();
    let matches: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|&node| {
            doc.element(node).is_some_and(|e| {
                e.matches_name_ns(namespace, &signed.name) && e.get_attribute("ID") == Some(id)
            })
        })
        .collect();
    match matches.as_slice() {
        [node] => Ok(*node),
        [] => Err(violation(format!("element {id} not found in document"))),
        _ => Err(violation(format!("ID {id} occurs {} times", matches.len()))),
    }
}

fn check_reference(references: &[VerifiedReference], id: &str, target: NodeId) -> ArtifactResult<()> {
    let [reference] = references else {
        return Err(violation(format!("{} references verified", references.len())));
    };
    if reference.uri.strip_prefix('#') != Some(id) || reference.resolved_node != Some(target) {
        return Err(violation(format!(
            "reference {} does not resolve to the signed element",
            reference.uri
        )));
    }
    if !reference.digest_verified {
        return Err(ArtifactError::InvalidSignature(
            "reference digest mismatch".into(),
        ));
    }
    Ok(())
}

fn violation(message: impl Into<String>) -> ArtifactError {
    ArtifactError::SignatureProfile(message.into())
}
