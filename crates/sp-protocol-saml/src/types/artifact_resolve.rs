//! `samlp:ArtifactResolve` request.

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;

use super::ids::{format_instant, generate_saml_id, parse_instant};
use super::{Artifact, SAML_NS, SAMLP_NS, SAML_VERSION};
use crate::error::{ArtifactError, ArtifactResult};
use crate::xml::Element;

/// A request to exchange an artifact for the protocol message it stands for.
#[derive(Debug, Clone)]
pub struct ArtifactResolve {
    /// Unique request ID, echoed as `InResponseTo`.
    pub id: String,
    /// Time the request was issued.
    pub issue_instant: DateTime<Utc>,
    /// SP entity ID.
    pub issuer: String,
    /// IdP artifact resolution service URL.
    pub destination: String,
    /// The artifact to resolve.
    pub artifact: Artifact,
}

impl ArtifactResolve {
    /// Builds a request for `artifact` with a fresh ID and the current time.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::MalformedRequest`] if the artifact is empty.
    pub fn build(artifact: &str, sp_entity_id: &str, destination: &str) -> ArtifactResult<Self> {
        let artifact = Artifact::parse(artifact)?;
        Ok(Self {
            id: generate_saml_id(),
            issue_instant: Utc::now(),
            issuer: sp_entity_id.to_string(),
            destination: destination.to_string(),
            artifact,
        })
    }

    /// Serialises the unsigned request.
    #[must_use]
    pub fn to_xml(&self) -> String {
        format!(
            r#"<samlp:ArtifactResolve xmlns:samlp="{SAMLP_NS}" xmlns:saml="{SAML_NS}" ID="{id}" Version="{SAML_VERSION}" IssueInstant="{instant}" Destination="{destination}"><saml:Issuer>{issuer}</saml:Issuer><samlp:Artifact>{artifact}</samlp:Artifact></samlp:ArtifactResolve>"#,
            id = escape(&self.id),
            instant = format_instant(self.issue_instant),
            destination = escape(&self.destination),
            issuer = escape(&self.issuer),
            artifact = escape(self.artifact.as_str()),
        )
    }

    /// Reads a received `samlp:ArtifactResolve`.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Protocol`] if required parts are missing.
    pub fn from_element(element: &Element) -> ArtifactResult<Self> {
        if !element.is(SAMLP_NS, "ArtifactResolve") {
            return Err(ArtifactError::Protocol(format!(
                "expected ArtifactResolve, got {}",
                element.name
            )));
        }
        let id = element
            .attr("ID")
            .ok_or_else(|| ArtifactError::Protocol("ArtifactResolve without ID".into()))?;
        let issue_instant = element
            .attr("IssueInstant")
            .and_then(parse_instant)
            .ok_or_else(|| ArtifactError::Protocol("invalid IssueInstant".into()))?;
        let issuer = element
            .child(SAML_NS, "Issuer")
            .map(|i| i.text().trim().to_string())
            .unwrap_or_default();
        let artifact = element
            .child(SAMLP_NS, "Artifact")
            .map(Element::text)
            .unwrap_or_default();

        Ok(Self {
            id: id.to_string(),
            issue_instant,
            issuer,
            destination: element.attr("Destination").unwrap_or_default().to_string(),
            artifact: Artifact::parse(&artifact)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;
    use std::collections::HashSet;

    #[test]
    fn build_populates_fields() {
        let request = ArtifactResolve::build(
            "AAQAAmI2",
            "https://sp.example.com",
            "https://idp.example.com/artifact",
        )
        .unwrap();

        assert!(request.id.starts_with('_'));
        assert_eq!(request.issuer, "https://sp.example.com");
        assert_eq!(request.destination, "https://idp.example.com/artifact");
        assert_eq!(request.artifact.as_str(), "AAQAAmI2");
    }

    #[test]
    fn empty_artifact_is_malformed() {
        let result = ArtifactResolve::build("  ", "sp", "https://idp");
        assert!(matches!(result, Err(ArtifactError::MalformedRequest(_))));
    }

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<String> = (0..200)
            .map(|_| ArtifactResolve::build("a", "sp", "idp").unwrap().id)
            .collect();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn xml_roundtrip() {
        let request = ArtifactResolve::build("AAQ&x", "https://sp", "https://idp/ars").unwrap();
        let parsed = ArtifactResolve::from_element(&parse(&request.to_xml()).unwrap()).unwrap();

        assert_eq!(parsed.id, request.id);
        assert_eq!(parsed.issuer, "https://sp");
        assert_eq!(parsed.destination, "https://idp/ars");
        assert_eq!(parsed.artifact.as_str(), "AAQ&x");
        assert_eq!(
            format_instant(parsed.issue_instant),
            format_instant(request.issue_instant)
        );
    }
}
