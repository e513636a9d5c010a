//! Structural checks on a signature before any cryptography runs.
//!
//! XML signature wrapping attacks rely on a signature that is valid for
//! *some* element while the application reads another. The checks here pin
//! the signature to the element being consumed:
//!
//! - the element has exactly one `ds:Signature` child
//! - `SignedInfo` has exactly one `Reference`, whose URI is `#` + the
//!   element's `ID`
//! - only the enveloped-signature and Exclusive C14N transforms are used
//! - canonicalization, signature and digest algorithms are recognised
//!
//! Document-wide `ID` uniqueness is enforced by the verifier, which sees
//! the whole document.

use sp_crypto::{DigestAlgorithm, SignatureAlgorithm};

use super::digest_from_uri;
use crate::error::{ArtifactError, ArtifactResult};
use crate::types::{canonicalization_algorithms, transform_algorithms, XMLDSIG_NS};
use crate::xml::Element;

/// A signature that passed the profile checks.
#[derive(Debug)]
pub struct SignatureProfile<'a> {
    /// The `ds:Signature` element.
    pub signature: &'a Element,
    /// `ID` of the signed element.
    pub id: &'a str,
    /// Signature algorithm from `SignatureMethod`.
    pub algorithm: SignatureAlgorithm,
    /// Digest algorithm from the reference.
    pub digest_algorithm: DigestAlgorithm,
}

/// Validates the shape of enveloped signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureProfileValidator {
    allow_sha1: bool,
}

impl SignatureProfileValidator {
    /// Creates a validator that refuses SHA-1.
    #[must_use]
    pub const fn new() -> Self {
        Self { allow_sha1: false }
    }

    /// Allows SHA-1 based signature and digest algorithms.
    #[must_use]
    pub const fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    /// Checks the signature on `signed`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::UnsignedAssertion`] if `signed` has no
    /// `ds:Signature` child, and [`ArtifactError::SignatureProfile`] for any
    /// structural violation.
    pub fn validate<'a>(&self, signed: &'a Element) -> ArtifactResult<SignatureProfile<'a>> {
        let mut signatures = signed.children_named(XMLDSIG_NS, "Signature");
        let signature = signatures.next().ok_or(ArtifactError::UnsignedAssertion)?;
        if signatures.next().is_some() {
            return Err(violation("more than one Signature element"));
        }

        let id = signed
            .attr("ID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| violation("signed element has no ID"))?;

        let signed_info = exactly_one(signature, "SignedInfo")?;

        let c14n = exactly_one(signed_info, "CanonicalizationMethod")?;
        if c14n.attr("Algorithm") != Some(canonicalization_algorithms::EXCLUSIVE_C14N) {
            return Err(violation(format!(
                "canonicalization {} is not exclusive C14N",
                c14n.attr("Algorithm").unwrap_or("(none)")
            )));
        }

        let method = exactly_one(signed_info, "SignatureMethod")?;
        let algorithm_uri = method.attr("Algorithm").unwrap_or_default();
        let algorithm = SignatureAlgorithm::from_xml_dsig_uri(algorithm_uri)
            .ok_or_else(|| violation(format!("unsupported signature method {algorithm_uri}")))?;
        if algorithm.is_legacy() && !self.allow_sha1 {
            return Err(violation("SHA-1 signatures are not allowed"));
        }

        let reference = exactly_one(signed_info, "Reference")?;
        let expected_uri = format!("#{id}");
        if reference.attr("URI") != Some(expected_uri.as_str()) {
            return Err(violation(format!(
                "reference URI {} does not point at {expected_uri}",
                reference.attr("URI").unwrap_or("(none)")
            )));
        }

        check_transforms(reference)?;

        let digest_method = exactly_one(reference, "DigestMethod")?;
        let digest_uri = digest_method.attr("Algorithm").unwrap_or_default();
        let digest_algorithm = digest_from_uri(digest_uri)
            .ok_or_else(|| violation(format!("unsupported digest method {digest_uri}")))?;
        if digest_algorithm.is_legacy() && !self.allow_sha1 {
            return Err(violation("SHA-1 digests are not allowed"));
        }

        exactly_one(reference, "DigestValue")?;
        exactly_one(signature, "SignatureValue")?;

        Ok(SignatureProfile {
            signature,
            id,
            algorithm,
            digest_algorithm,
        })
    }
}

/// Allows at most the enveloped-signature transform followed by exclusive C14N.
fn check_transforms(reference: &Element) -> ArtifactResult<()> {
    let transforms: Vec<&Element> = match reference.child(XMLDSIG_NS, "Transforms") {
        Some(t) => t.children_named(XMLDSIG_NS, "Transform").collect(),
        None => Vec::new(),
    };
    if transforms.len() > 2 {
        return Err(violation(format!("{} transforms", transforms.len())));
    }

    let mut enveloped = false;
    let mut exclusive = false;
    for transform in transforms {
        match transform.attr("Algorithm") {
            Some(transform_algorithms::ENVELOPED_SIGNATURE) if !enveloped => enveloped = true,
            Some(canonicalization_algorithms::EXCLUSIVE_C14N) if !exclusive => exclusive = true,
            other => {
                return Err(violation(format!(
                    "transform {} is not allowed",
                    other.unwrap_or("(none)")
                )))
            }
        }
    }
    if !enveloped {
        return Err(violation("enveloped-signature transform is required"));
    }
    Ok(())
}

fn exactly_one<'a>(parent: &'a Element, name: &str) -> ArtifactResult<&'a Element> {
    let mut found = parent.children_named(XMLDSIG_NS, name);
    match (found.next(), found.next()) {
        (Some(element), None) => Ok(element),
        (None, _) => Err(violation(format!("missing {name}"))),
        (Some(_), Some(_)) => Err(violation(format!("more than one {name}"))),
    }
}

fn violation(message: impl Into<String>) -> ArtifactError {
    ArtifactError::SignatureProfile(message.into())
}
