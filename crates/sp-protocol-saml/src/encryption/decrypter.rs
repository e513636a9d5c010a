//! Decryption of `saml:EncryptedAssertion`.

use std::sync::Arc;

use bergshamra_enc::{decrypt, EncContext};
use sp_crypto::DecryptionKey;
use tracing::debug;

use super::{ContentCipher, KeyTransport};
use crate::error::{ArtifactError, ArtifactResult};
use crate::types::{
    digest_algorithms, encryption_algorithms, EncryptedAssertion, SAML_NS, XMLDSIG_NS,
    XMLENC11_NS, XMLENC_NS,
};
use crate::xml::{self, detach, Element, Node};
use crate::xmlsec;

/// A decrypted assertion whose signature has not been checked yet.
///
/// Nothing may be read from it except through
/// [`SignatureVerifier::verify`](crate::signature::SignatureVerifier::verify).
#[derive(Debug, Clone)]
pub struct DecryptedAssertion {
    xml: String,
    assertion: Element,
}

impl DecryptedAssertion {
    /// Parses decrypted text. The assertion is either the root or the
    /// first child of the `EncryptedAssertion` it was decrypted inside.
    pub(crate) fn from_xml(xml: String) -> ArtifactResult<Self> {
        let root = xml::parse(&xml)
            .map_err(|e| failure(format!("decrypted content is not XML: {e}")))?;
        let assertion = if root.is(SAML_NS, "Assertion") {
            root
        } else {
            let content = root
                .elements()
                .find(|e| e.namespace.as_deref() != Some(XMLENC_NS))
                .ok_or_else(|| failure("decrypted content is empty"))?;
            if !content.is(SAML_NS, "Assertion") {
                return Err(failure(format!(
                    "decrypted content is {}, not an Assertion",
                    content.qname()
                )));
            }
            detach(&root, content).ok_or_else(|| failure("assertion outside its container"))?
        };
        Ok(Self { xml, assertion })
    }

    /// Returns the decrypted `saml:Assertion` element.
    #[must_use]
    pub fn document(&self) -> &Element {
        &self.assertion
    }

    /// Returns the decrypted document text the signature is checked on.
    #[must_use]
    pub fn xml(&self) -> &str {
        &self.xml
    }
}

/// Decrypts encrypted assertions with the SP's private key.
#[derive(Debug, Clone)]
pub struct AssertionDecrypter {
    key: Arc<DecryptionKey>,
}

impl AssertionDecrypter {
    /// Creates a decrypter.
    #[must_use]
    pub fn new(key: Arc<DecryptionKey>) -> Self {
        Self { key }
    }

    /// Decrypts `encrypted` into a standalone assertion element.
    ///
    /// The content key is taken from an `xenc:EncryptedKey` inside the
    /// `EncryptedData`'s `ds:KeyInfo`, or from a sibling of `EncryptedData`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Decryption`] for unsupported algorithms,
    /// `rsa-1_5` key transport, a key that does not unwrap, ciphertext that
    /// does not decrypt, or content that is not a `saml:Assertion`.
    pub fn decrypt(&self, encrypted: &EncryptedAssertion) -> ArtifactResult<DecryptedAssertion> {
        let mut container = encrypted.element().clone();
        let (cipher, transport) = normalise(&mut container)?;

        let ctx = EncContext::new(xmlsec::decryption_keys(&self.key)?);
        let plaintext =
            decrypt::decrypt(&ctx, &container.to_xml()).map_err(xmlsec::decrypt_error)?;

        let decrypted = DecryptedAssertion::from_xml(plaintext)?;
        debug!(
            cipher = ?cipher,
            key_transport = ?transport,
            assertion_id = decrypted.document().attr("ID"),
            "assertion decrypted"
        );
        Ok(decrypted)
    }
}

fn failure(message: impl Into<String>) -> ArtifactError {
    ArtifactError::Decryption(message.into())
}

/// Checks the algorithms in `container` and moves a sibling `EncryptedKey`
/// into the `KeyInfo` of `EncryptedData`.
fn normalise(container: &mut Element) -> ArtifactResult<(ContentCipher, KeyTransport)> {
    let sibling_key = container
        .children
        .iter()
        .position(|n| matches!(n, Node::Element(e) if e.is(XMLENC_NS, "EncryptedKey")));
    let sibling_key = sibling_key.map(|i| container.children.remove(i));

    let data = container
        .child_mut(XMLENC_NS, "EncryptedData")
        .ok_or_else(|| failure("EncryptedAssertion has no EncryptedData"))?;

    if let Some(kind) = data.attr("Type") {
        if kind != encryption_algorithms::TYPE_ELEMENT {
            return Err(failure(format!("unsupported EncryptedData Type {kind}")));
        }
    }
    let cipher = content_cipher(data)?;

    let has_key = data
        .child(XMLDSIG_NS, "KeyInfo")
        .is_some_and(|ki| ki.child(XMLENC_NS, "EncryptedKey").is_some());
    if !has_key {
        let sibling_key = sibling_key.ok_or_else(|| failure("no EncryptedKey found"))?;
        if data.child(XMLDSIG_NS, "KeyInfo").is_none() {
            let position = data
                .children
                .iter()
                .position(|n| matches!(n, Node::Element(e) if e.is(XMLENC_NS, "CipherData")))
                .unwrap_or(data.children.len());
            data.children.insert(
                position,
                Node::Element(
                    Element::new_ns("ds", "KeyInfo", XMLDSIG_NS).with_ns_decl("ds", XMLDSIG_NS),
                ),
            );
        }
        if let Some(key_info) = data.child_mut(XMLDSIG_NS, "KeyInfo") {
            key_info.children.push(sibling_key);
        }
    }

    let method = data
        .child(XMLDSIG_NS, "KeyInfo")
        .and_then(|ki| ki.child(XMLENC_NS, "EncryptedKey"))
        .and_then(|k| k.child(XMLENC_NS, "EncryptionMethod"))
        .ok_or_else(|| failure("EncryptedKey has no EncryptionMethod"))?;
    let transport = key_transport(method)?;

    Ok((cipher, transport))
}

fn content_cipher(data: &Element) -> ArtifactResult<ContentCipher> {
    let uri = data
        .child(XMLENC_NS, "EncryptionMethod")
        .and_then(|m| m.attr("Algorithm"))
        .ok_or_else(|| failure("EncryptedData has no EncryptionMethod"))?;
    ContentCipher::from_uri(uri)
        .ok_or_else(|| failure(format!("unsupported content encryption algorithm {uri}")))
}

/// Accepts only OAEP key transport whose digest and MGF1 agree.
fn key_transport(method: &Element) -> ArtifactResult<KeyTransport> {
    let uri = method.attr("Algorithm").unwrap_or_default();

    if method
        .child(XMLENC_NS, "OAEPparams")
        .is_some_and(|p| !p.text().trim().is_empty())
    {
        return Err(failure("OAEP labels are not supported"));
    }

    let sha256 = match method.child(XMLDSIG_NS, "DigestMethod").and_then(|d| d.attr("Algorithm")) {
        None | Some(digest_algorithms::SHA1) => false,
        Some(digest_algorithms::SHA256) => true,
        Some(other) => return Err(failure(format!("unsupported OAEP digest {other}"))),
    };

    match uri {
        encryption_algorithms::RSA_1_5 => Err(failure("rsa-1_5 key transport is refused")),
        encryption_algorithms::RSA_OAEP_MGF1P => {
            // mgf1p fixes MGF1 to SHA-1; the label digest must match it
            if sha256 {
                Err(failure("rsa-oaep-mgf1p with a non-SHA-1 digest is not supported"))
            } else {
                Ok(KeyTransport::RsaOaepMgf1p)
            }
        }
        encryption_algorithms::RSA_OAEP => {
            let mgf_sha256 = match method.child(XMLENC11_NS, "MGF").and_then(|m| m.attr("Algorithm")) {
                None | Some(encryption_algorithms::MGF1_SHA1) => false,
                Some(encryption_algorithms::MGF1_SHA256) => true,
                Some(other) => return Err(failure(format!("unsupported MGF {other}"))),
            };
            if mgf_sha256 == sha256 {
                Ok(KeyTransport::RsaOaep)
            } else {
                Err(failure("mixed OAEP digest and MGF1 digest are not supported"))
            }
        }
        other => Err(failure(format!("unsupported key transport algorithm {other}"))),
    }
}
