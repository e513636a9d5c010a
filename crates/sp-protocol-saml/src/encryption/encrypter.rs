//! Encryption of assertions for a recipient SP.
//!
//! This is the IdP half of the exchange. The SP itself never encrypts; the
//! encrypter backs the test IdP and local tooling.

use bergshamra_enc::{encrypt, EncContext};
use sp_crypto::EncryptionKey;

use super::{ContentCipher, KeyTransport};
use crate::error::{ArtifactError, ArtifactResult};
use crate::types::{
    digest_algorithms, encryption_algorithms, SAML_NS, XMLDSIG_NS, XMLENC11_NS, XMLENC_NS,
};
use crate::xml::{self, Element};
use crate::xmlsec;

/// Produces `saml:EncryptedAssertion` elements.
#[derive(Debug, Clone)]
pub struct AssertionEncrypter {
    recipient: EncryptionKey,
    cipher: ContentCipher,
    key_transport: KeyTransport,
}

impl AssertionEncrypter {
    /// Encrypts for `recipient` with AES-256-GCM and `rsa-oaep-mgf1p`.
    #[must_use]
    pub fn new(recipient: EncryptionKey) -> Self {
        Self {
            recipient,
            cipher: ContentCipher::Aes256Gcm,
            key_transport: KeyTransport::RsaOaepMgf1p,
        }
    }

    /// Sets the content cipher.
    #[must_use]
    pub fn with_cipher(mut self, cipher: ContentCipher) -> Self {
        self.cipher = cipher;
        self
    }

    /// Sets the key transport.
    #[must_use]
    pub fn with_key_transport(mut self, key_transport: KeyTransport) -> Self {
        self.key_transport = key_transport;
        self
    }

    /// Encrypts a serialised assertion and returns the
    /// `saml:EncryptedAssertion` XML.
    ///
    /// `assertion_xml` must declare every prefix it uses.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Configuration`] if the recipient key is
    /// unusable or encryption fails.
    pub fn encrypt(&self, assertion_xml: &str) -> ArtifactResult<String> {
        let ctx = EncContext::new(xmlsec::encryption_keys(&self.recipient)?);
        let encrypted = encrypt::encrypt(&ctx, &self.template().to_xml(), assertion_xml.as_bytes())
            .map_err(xmlsec::encrypt_error)?;
        let encrypted_data = xml::parse(&encrypted).map_err(|e| {
            ArtifactError::Configuration(format!("encrypted output is not XML: {e}"))
        })?;

        Ok(Element::new_ns("saml", "EncryptedAssertion", SAML_NS)
            .with_ns_decl("saml", SAML_NS)
            .with_child(encrypted_data)
            .to_xml())
    }

    /// `EncryptedData` with empty cipher values for the engine to fill.
    fn template(&self) -> Element {
        let encrypted_key = xenc("EncryptedKey")
            .with_child(self.key_transport_method())
            .with_child(empty_cipher_data());

        xenc("EncryptedData")
            .with_ns_decl("xenc", XMLENC_NS)
            .with_attr("Type", encryption_algorithms::TYPE_ELEMENT)
            .with_child(xenc("EncryptionMethod").with_attr("Algorithm", self.cipher.uri()))
            .with_child(
                Element::new_ns("ds", "KeyInfo", XMLDSIG_NS)
                    .with_ns_decl("ds", XMLDSIG_NS)
                    .with_child(encrypted_key),
            )
            .with_child(empty_cipher_data())
    }

    fn key_transport_method(&self) -> Element {
        let method = xenc("EncryptionMethod").with_attr("Algorithm", self.key_transport.uri());
        match self.key_transport {
            KeyTransport::RsaOaepMgf1p => method.with_child(
                Element::new_ns("ds", "DigestMethod", XMLDSIG_NS)
                    .with_attr("Algorithm", digest_algorithms::SHA1),
            ),
            KeyTransport::RsaOaep => method
                .with_child(
                    Element::new_ns("ds", "DigestMethod", XMLDSIG_NS)
                        .with_attr("Algorithm", digest_algorithms::SHA256),
                )
                .with_child(
                    Element::new_ns("xenc11", "MGF", XMLENC11_NS)
                        .with_ns_decl("xenc11", XMLENC11_NS)
                        .with_attr("Algorithm", encryption_algorithms::MGF1_SHA256),
                ),
        }
    }
}

fn xenc(name: &str) -> Element {
    Element::new_ns("xenc", name, XMLENC_NS)
}

fn empty_cipher_data() -> Element {
    xenc("CipherData").with_child(xenc("CipherValue"))
}
