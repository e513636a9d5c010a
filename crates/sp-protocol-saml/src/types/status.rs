//! SAML Status types.
//!
//! Status information returned in SAML protocol responses.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{status_codes, SAMLP_NS};
use crate::error::{ArtifactError, ArtifactResult};
use crate::xml::Element;

/// SAML protocol status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status code.
    pub status_code: StatusCode,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::new(status_codes::SUCCESS),
            status_message: None,
        }
    }

    /// Creates a status with a top-level code and optional second-level code.
    #[must_use]
    pub fn with_codes(top: &str, second: Option<&str>) -> Self {
        let mut status_code = StatusCode::new(top);
        status_code.status_code = second.map(|s| Box::new(StatusCode::new(s)));
        Self {
            status_code,
            status_message: None,
        }
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.value == status_codes::SUCCESS
    }

    /// Reads a `samlp:Status` element.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Protocol`] if the `StatusCode` is missing.
    pub fn from_element(element: &Element) -> ArtifactResult<Self> {
        let code = element
            .child(SAMLP_NS, "StatusCode")
            .ok_or_else(|| ArtifactError::Protocol("Status without StatusCode".into()))?;

        let status_message = element
            .child(SAMLP_NS, "StatusMessage")
            .map(|m| m.text().trim().to_string())
            .filter(|m| !m.is_empty());

        Ok(Self {
            status_code: StatusCode::from_element(code)?,
            status_message,
        })
    }

    /// Serialises as a `samlp:Status` element.
    #[must_use]
    pub fn to_element(&self) -> Element {
        let mut status = Element::new_ns("samlp", "Status", SAMLP_NS)
            .with_child(self.status_code.to_element());
        if let Some(message) = &self.status_message {
            status = status
                .with_child(Element::new_ns("samlp", "StatusMessage", SAMLP_NS).with_text(message));
        }
        status
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_code.value)?;
        if let Some(sub) = &self.status_code.status_code {
            write!(f, " / {}", sub.value)?;
        }
        if let Some(message) = &self.status_message {
            write!(f, " ({message})")?;
        }
        Ok(())
    }
}

/// SAML status code, optionally nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The status code URI value.
    pub value: String,

    /// Optional nested status code providing more detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a new status code with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    fn from_element(element: &Element) -> ArtifactResult<Self> {
        let value = element
            .attr("Value")
            .ok_or_else(|| ArtifactError::Protocol("StatusCode without Value".into()))?;
        let nested = match element.child(SAMLP_NS, "StatusCode") {
            Some(child) => Some(Box::new(Self::from_element(child)?)),
            None => None,
        };
        Ok(Self {
            value: value.to_string(),
            status_code: nested,
        })
    }

    fn to_element(&self) -> Element {
        let mut element =
            Element::new_ns("samlp", "StatusCode", SAMLP_NS).with_attr("Value", &self.value);
        if let Some(nested) = &self.status_code {
            element = element.with_child(nested.to_element());
        }
        element
    }
}
