//! XML Signature creation.
//!
//! Produces enveloped signatures placed directly after the `saml:Issuer`
//! of the signed element, as SAML core requires. The signature skeleton is
//! built here; bergshamra-dsig fills in `DigestValue` and `SignatureValue`.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use bergshamra_dsig::{sign, DsigContext};
use sp_crypto::{DigestAlgorithm, SigningKey};

use super::{digest_uri, paired_digest, SignatureAlgorithm};
use crate::error::{ArtifactError, ArtifactResult};
use crate::types::{canonicalization_algorithms, transform_algorithms, SAML_NS, XMLDSIG_NS};
use crate::xml::{self, Element, Node};
use crate::xmlsec;

/// The SP's signing key and, optionally, its certificate for `KeyInfo`.
#[derive(Debug, Clone)]
pub struct SigningCredential {
    key: Arc<SigningKey>,
    certificate_der: Option<Vec<u8>>,
}

impl SigningCredential {
    /// Creates a credential.
    #[must_use]
    pub fn new(key: SigningKey, certificate_der: Option<Vec<u8>>) -> Self {
        Self {
            key: Arc::new(key),
            certificate_der,
        }
    }

    /// Returns the signing key.
    #[must_use]
    pub fn key(&self) -> &SigningKey {
        &self.key
    }

    /// Returns the DER certificate, if configured.
    #[must_use]
    pub fn certificate_der(&self) -> Option<&[u8]> {
        self.certificate_der.as_deref()
    }
}

/// XML document signer.
#[derive(Debug, Clone)]
pub struct XmlSigner {
    credential: SigningCredential,
    algorithm: SignatureAlgorithm,
    digest: DigestAlgorithm,
}

impl XmlSigner {
    /// Creates a signer using RSA-SHA256 with a SHA-256 reference digest.
    #[must_use]
    pub fn new(credential: SigningCredential) -> Self {
        Self {
            credential,
            algorithm: SignatureAlgorithm::RsaSha256,
            digest: DigestAlgorithm::Sha256,
        }
    }

    /// Sets the signature algorithm; the digest follows it.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self.digest = paired_digest(algorithm);
        self
    }

    /// Returns the configured signature algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Signs the element whose `ID` is `reference_id`.
    ///
    /// Returns the whole document with the `ds:Signature` inserted. The
    /// reference digest covers the exclusive-canonical form of the element
    /// as serialised in the result.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Signing`] if the document cannot be parsed,
    /// the element is missing or already signed, or the key fails.
    pub fn sign(&self, xml: &str, reference_id: &str) -> ArtifactResult<String> {
        let mut root =
            xml::parse(xml).map_err(|e| ArtifactError::Signing(format!("unparseable input: {e}")))?;

        let signature = self.build_signature(reference_id);
        let target = root
            .find_by_id_mut(reference_id)
            .ok_or_else(|| missing(reference_id))?;
        if target.child(XMLDSIG_NS, "Signature").is_some() {
            return Err(ArtifactError::Signing(format!(
                "element {reference_id} is already signed"
            )));
        }
        let position = target
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.is(SAML_NS, "Issuer")))
            .map_or(0, |p| p + 1);
        target.children.insert(position, Node::Element(signature));

        let ctx = DsigContext::new(xmlsec::signing_keys(self.credential.key())?);
        sign::sign(&ctx, &root.to_xml()).map_err(xmlsec::sign_error)
    }

    fn build_signature(&self, reference_id: &str) -> Element {
        let transforms = ds("Transforms")
            .with_child(
                ds("Transform").with_attr("Algorithm", transform_algorithms::ENVELOPED_SIGNATURE),
            )
            .with_child(
                ds("Transform").with_attr("Algorithm", canonicalization_algorithms::EXCLUSIVE_C14N),
            );

        let reference = ds("Reference")
            .with_attr("URI", format!("#{reference_id}"))
            .with_child(transforms)
            .with_child(ds("DigestMethod").with_attr("Algorithm", digest_uri(self.digest)))
            .with_child(ds("DigestValue"));

        let signed_info = ds("SignedInfo")
            .with_child(
                ds("CanonicalizationMethod")
                    .with_attr("Algorithm", canonicalization_algorithms::EXCLUSIVE_C14N),
            )
            .with_child(ds("SignatureMethod").with_attr("Algorithm", self.algorithm.xml_dsig_uri()))
            .with_child(reference);

        let mut signature = ds("Signature")
            .with_ns_decl("ds", XMLDSIG_NS)
            .with_child(signed_info)
            .with_child(ds("SignatureValue"));

        if let Some(cert) = self.credential.certificate_der() {
            signature = signature.with_child(
                ds("KeyInfo").with_child(
                    ds("X509Data").with_child(ds("X509Certificate").with_text(STANDARD.encode(cert))),
                ),
            );
        }
        signature
    }
}

fn ds(name: &str) -> Element {
    Element::new_ns("ds", name, XMLDSIG_NS)
}

fn missing(reference_id: &str) -> ArtifactError {
    ArtifactError::Signing(format!("element with ID '{reference_id}' not found"))
}
