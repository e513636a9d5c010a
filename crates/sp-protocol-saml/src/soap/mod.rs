//! SOAP 1.1 envelope handling for the artifact binding.
//!
//! ArtifactResolve and ArtifactResponse travel as the single child of a
//! SOAP `Body`. A SOAP `Fault` in place of the payload is reported as a
//! protocol error.

mod client;

pub use client::*;

use crate::error::{ArtifactError, ArtifactResult};
use crate::types::SOAP11_NS;
use crate::xml::{detach, parse, Element};

/// Wraps a serialised message in a SOAP 1.1 envelope.
#[must_use]
pub fn build_envelope(body_xml: &str) -> String {
    format!(
        r#"<soap:Envelope xmlns:soap="{SOAP11_NS}"><soap:Body>{body_xml}</soap:Body></soap:Envelope>"#
    )
}

/// Parses a SOAP 1.1 envelope and returns its body payload.
///
/// The payload is detached with its inherited namespaces re-declared.
///
/// # Errors
///
/// Returns [`ArtifactError::Protocol`] if the input is not a SOAP envelope,
/// has an empty body, or carries a `Fault`.
pub fn parse_envelope(xml: &str) -> ArtifactResult<Element> {
    let envelope =
        parse(xml).map_err(|e| ArtifactError::Protocol(format!("SOAP response is not XML: {e}")))?;
    if !envelope.is(SOAP11_NS, "Envelope") {
        return Err(ArtifactError::Protocol(format!(
            "expected SOAP Envelope, got {}",
            envelope.qname()
        )));
    }

    let body = envelope
        .child(SOAP11_NS, "Body")
        .ok_or_else(|| ArtifactError::Protocol("SOAP envelope without Body".into()))?;

    if let Some(fault) = body.child(SOAP11_NS, "Fault") {
        return Err(ArtifactError::Protocol(format!("SOAP fault: {}", describe_fault(fault))));
    }

    let payload = body
        .elements()
        .next()
        .ok_or_else(|| ArtifactError::Protocol("SOAP Body is empty".into()))?;
    detach(&envelope, payload)
        .ok_or_else(|| ArtifactError::Protocol("SOAP payload outside envelope".into()))
}

/// Returns the description of the `Fault` in a SOAP envelope, if any.
pub(crate) fn fault_in(xml: &str) -> Option<String> {
    let envelope = parse(xml).ok()?;
    if !envelope.is(SOAP11_NS, "Envelope") {
        return None;
    }
    envelope
        .child(SOAP11_NS, "Body")?
        .child(SOAP11_NS, "Fault")
        .map(describe_fault)
}

// faultcode and faultstring are unqualified in SOAP 1.1
fn describe_fault(fault: &Element) -> String {
    let field = |name: &str| {
        fault
            .elements()
            .find(|e| e.name == name && e.namespace.is_none())
            .map(|e| e.text().trim().to_string())
    };
    match (field("faultcode"), field("faultstring")) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code,
        (None, Some(message)) => message,
        (None, None) => "unspecified".to_string(),
    }
}
