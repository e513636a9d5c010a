//! `samlp:ArtifactResponse` and the `samlp:Response` it carries.

use chrono::Utc;
use quick_xml::escape::escape;

use super::ids::{format_instant, generate_saml_id};
use super::{Status, SAML_NS, SAMLP_NS, SAML_VERSION, XMLENC_NS};
use crate::error::{ArtifactError, ArtifactResult};
use crate::xml::{detach, Element};

/// An encrypted assertion cut out of its response.
///
/// The element is detached from the surrounding document with every
/// namespace it inherited re-declared, so the decrypted content can be
/// parsed on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedAssertion {
    element: Element,
}

impl EncryptedAssertion {
    /// Wraps a standalone `saml:EncryptedAssertion` element.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Protocol`] if the element has another name.
    pub fn new(element: Element) -> ArtifactResult<Self> {
        if !element.is(SAML_NS, "EncryptedAssertion") {
            return Err(ArtifactError::Protocol(format!(
                "expected EncryptedAssertion, got {}",
                element.name
            )));
        }
        Ok(Self { element })
    }

    /// Returns the `saml:EncryptedAssertion` element.
    #[must_use]
    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Returns the `xenc:EncryptedData` child.
    #[must_use]
    pub fn encrypted_data(&self) -> Option<&Element> {
        self.element.child(XMLENC_NS, "EncryptedData")
    }
}

/// The `samlp:Response` embedded in an artifact response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Response ID.
    pub id: String,
    /// Issuer entity ID.
    pub issuer: Option<String>,
    /// Response status.
    pub status: Status,
    /// Encrypted assertions in document order.
    pub encrypted_assertions: Vec<EncryptedAssertion>,
    /// Number of plaintext assertions, which are ignored.
    pub plaintext_assertions: usize,
}

impl Response {
    fn from_element(root: &Element, element: &Element) -> ArtifactResult<Self> {
        let status = element
            .child(SAMLP_NS, "Status")
            .map(Status::from_element)
            .transpose()?
            .ok_or_else(|| ArtifactError::Protocol("Response without Status".into()))?;

        let encrypted_assertions = element
            .children_named(SAML_NS, "EncryptedAssertion")
            .map(|ea| {
                detach(root, ea)
                    .ok_or_else(|| ArtifactError::Protocol("detached assertion".into()))
                    .and_then(EncryptedAssertion::new)
            })
            .collect::<ArtifactResult<Vec<_>>>()?;

        Ok(Self {
            id: element.attr("ID").unwrap_or_default().to_string(),
            issuer: issuer_of(element),
            status,
            encrypted_assertions,
            plaintext_assertions: element.children_named(SAML_NS, "Assertion").count(),
        })
    }
}

/// A parsed `samlp:ArtifactResponse`.
#[derive(Debug, Clone)]
pub struct ArtifactResponse {
    /// Response ID.
    pub id: String,
    /// ID of the ArtifactResolve this answers.
    pub in_response_to: Option<String>,
    /// Issuer entity ID.
    pub issuer: Option<String>,
    /// Status of the resolution itself.
    pub status: Status,
    /// The resolved message, absent when the artifact was unknown.
    pub response: Option<Response>,
}

impl ArtifactResponse {
    /// Reads a `samlp:ArtifactResponse` element.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Protocol`] for a different element or a
    /// response without status.
    pub fn from_element(element: &Element) -> ArtifactResult<Self> {
        if !element.is(SAMLP_NS, "ArtifactResponse") {
            return Err(ArtifactError::Protocol(format!(
                "expected ArtifactResponse, got {}",
                element.qname()
            )));
        }

        let status = element
            .child(SAMLP_NS, "Status")
            .map(Status::from_element)
            .transpose()?
            .ok_or_else(|| ArtifactError::Protocol("ArtifactResponse without Status".into()))?;

        let response = element
            .child(SAMLP_NS, "Response")
            .map(|r| Response::from_element(element, r))
            .transpose()?;

        Ok(Self {
            id: element.attr("ID").unwrap_or_default().to_string(),
            in_response_to: element.attr("InResponseTo").map(str::to_string),
            issuer: issuer_of(element),
            status,
            response,
        })
    }

    /// Checks the resolution status and correlation with the request.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Protocol`] if the status is not Success or
    /// `InResponseTo` differs from `request_id`.
    pub fn validate(&self, request_id: &str) -> ArtifactResult<()> {
        if !self.status.is_success() {
            return Err(ArtifactError::Protocol(format!(
                "artifact resolution failed: {}",
                self.status
            )));
        }
        match self.in_response_to.as_deref() {
            Some(irt) if irt == request_id => Ok(()),
            Some(irt) => Err(ArtifactError::Protocol(format!(
                "InResponseTo {irt} does not match request {request_id}"
            ))),
            None => Err(ArtifactError::Protocol(
                "ArtifactResponse without InResponseTo".into(),
            )),
        }
    }

    /// Returns the first encrypted assertion of the embedded response.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::MissingAssertion`] if there is no embedded
    /// response, it reports failure, or it carries no encrypted assertion.
    pub fn first_encrypted_assertion(&self) -> ArtifactResult<&EncryptedAssertion> {
        let response = self.response.as_ref().ok_or_else(|| {
            ArtifactError::MissingAssertion("ArtifactResponse carries no Response".into())
        })?;

        if !response.status.is_success() {
            return Err(ArtifactError::MissingAssertion(format!(
                "IdP returned {}",
                response.status
            )));
        }

        response.encrypted_assertions.first().ok_or_else(|| {
            ArtifactError::MissingAssertion(if response.plaintext_assertions > 0 {
                "Response carries only unencrypted assertions".to_string()
            } else {
                "Response carries no EncryptedAssertion".to_string()
            })
        })
    }
}

fn issuer_of(element: &Element) -> Option<String> {
    element
        .child(SAML_NS, "Issuer")
        .map(|i| i.text().trim().to_string())
}

/// Builds `samlp:ArtifactResponse` documents.
///
/// This is the IdP side of the exchange; the SP uses it in tests and
/// local tooling.
#[derive(Debug, Clone)]
pub struct ArtifactResponseBuilder {
    issuer: String,
    in_response_to: String,
    status: Status,
    response_status: Status,
    encrypted_assertions: Vec<String>,
    include_response: bool,
}

impl ArtifactResponseBuilder {
    /// Starts a successful response to `in_response_to`.
    #[must_use]
    pub fn new(issuer: impl Into<String>, in_response_to: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            in_response_to: in_response_to.into(),
            status: Status::success(),
            response_status: Status::success(),
            encrypted_assertions: Vec::new(),
            include_response: true,
        }
    }

    /// Sets the status of the artifact resolution.
    #[must_use]
    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Sets the status of the embedded response.
    #[must_use]
    pub fn response_status(mut self, status: Status) -> Self {
        self.response_status = status;
        self
    }

    /// Adds a serialised `saml:EncryptedAssertion`.
    #[must_use]
    pub fn encrypted_assertion(mut self, xml: impl Into<String>) -> Self {
        self.encrypted_assertions.push(xml.into());
        self
    }

    /// Omits the embedded response entirely.
    #[must_use]
    pub fn without_response(mut self) -> Self {
        self.include_response = false;
        self
    }

    /// Serialises the response.
    #[must_use]
    pub fn build_xml(&self) -> String {
        let now = format_instant(Utc::now());
        let issuer = escape(&self.issuer);

        let inner = if self.include_response {
            format!(
                r#"<samlp:Response ID="{id}" Version="{SAML_VERSION}" IssueInstant="{now}"><saml:Issuer>{issuer}</saml:Issuer>{status}{assertions}</samlp:Response>"#,
                id = generate_saml_id(),
                status = self.response_status.to_element().to_xml(),
                assertions = self.encrypted_assertions.concat(),
            )
        } else {
            String::new()
        };

        format!(
            r#"<samlp:ArtifactResponse xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{id}" InResponseTo="{irt}" Version="{SAML_VERSION}" IssueInstant="{now}"><saml:Issuer>{issuer}</saml:Issuer>{status}{inner}</samlp:ArtifactResponse>"#,
            id = generate_saml_id(),
            irt = escape(&self.in_response_to),
            status = self.status.to_element().to_xml(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::status_codes;
    use crate::xml::parse;

    const ENCRYPTED: &str = r#"<saml:EncryptedAssertion><xenc:EncryptedData xmlns:xenc="http://www.w3.org/2001/04/xmlenc#"/></saml:EncryptedAssertion>"#;

    fn parse_response(xml: &str) -> ArtifactResponse {
        ArtifactResponse::from_element(&parse(xml).unwrap()).unwrap()
    }

    #[test]
    fn first_encrypted_assertion_is_returned() {
        let xml = ArtifactResponseBuilder::new("idp", "_req")
            .encrypted_assertion(ENCRYPTED)
            .encrypted_assertion(ENCRYPTED)
            .build_xml();
        let response = parse_response(&xml);

        response.validate("_req").unwrap();
        let ea = response.first_encrypted_assertion().unwrap();
        assert!(ea.encrypted_data().is_some());
        // The saml prefix came from the ArtifactResponse and is re-declared
        assert!(ea
            .element()
            .namespace_decls
            .iter()
            .any(|d| d.prefix.as_deref() == Some("saml")));
        assert_eq!(response.response.unwrap().encrypted_assertions.len(), 2);
    }

    #[test]
    fn no_encrypted_assertion_is_missing_assertion() {
        let response = parse_response(&ArtifactResponseBuilder::new("idp", "_req").build_xml());
        assert!(matches!(
            response.first_encrypted_assertion(),
            Err(ArtifactError::MissingAssertion(_))
        ));
    }

    #[test]
    fn missing_response_is_missing_assertion() {
        let response = parse_response(
            &ArtifactResponseBuilder::new("idp", "_req")
                .without_response()
                .build_xml(),
        );
        assert!(response.validate("_req").is_ok());
        assert!(matches!(
            response.first_encrypted_assertion(),
            Err(ArtifactError::MissingAssertion(_))
        ));
    }

    #[test]
    fn inner_failure_is_missing_assertion() {
        let response = parse_response(
            &ArtifactResponseBuilder::new("idp", "_req")
                .response_status(Status::with_codes(
                    status_codes::RESPONDER,
                    Some(status_codes::AUTHN_FAILED),
                ))
                .encrypted_assertion(ENCRYPTED)
                .build_xml(),
        );
        let err = response.first_encrypted_assertion().unwrap_err();
        assert!(matches!(err, ArtifactError::MissingAssertion(msg) if msg.contains("AuthnFailed")));
    }

    #[test]
    fn outer_failure_is_protocol_error() {
        let response = parse_response(
            &ArtifactResponseBuilder::new("idp", "_req")
                .status(Status::with_codes(status_codes::REQUESTER, None))
                .build_xml(),
        );
        assert!(matches!(response.validate("_req"), Err(ArtifactError::Protocol(_))));
    }

    #[test]
    fn mismatched_in_response_to_is_protocol_error() {
        let response = parse_response(&ArtifactResponseBuilder::new("idp", "_other").build_xml());
        assert!(matches!(response.validate("_req"), Err(ArtifactError::Protocol(_))));
    }

    #[test]
    fn other_elements_are_rejected() {
        let element = parse(r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"/>"#)
            .unwrap();
        assert!(matches!(
            ArtifactResponse::from_element(&element),
            Err(ArtifactError::Protocol(_))
        ));
    }
}
