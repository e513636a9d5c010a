//! SAML Assertion types.
//!
//! Assertions carry the authentication and attribute statements issued by
//! the IdP. An [`Assertion`] parsed here is *not* trusted; claims are only
//! read from a [`crate::signature::VerifiedAssertion`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{format_instant, generate_saml_id, parse_instant};
use super::{SAML_NS, SAML_VERSION};
use crate::error::{ArtifactError, ArtifactResult};
use crate::xml::Element;

/// SAML Assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique assertion ID.
    pub id: String,
    /// Time the assertion was issued.
    pub issue_instant: DateTime<Utc>,
    /// IdP entity ID.
    pub issuer: String,
    /// The subject the assertion is about.
    pub subject: Option<Subject>,
    /// Validity conditions.
    pub conditions: Option<Conditions>,
    /// Authentication statements.
    pub authn_statements: Vec<AuthnStatement>,
    /// Attribute statements.
    pub attribute_statements: Vec<AttributeStatement>,
}

impl Assertion {
    /// Creates an empty assertion with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: generate_saml_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            subject: None,
            conditions: None,
            authn_statements: Vec::new(),
            attribute_statements: Vec::new(),
        }
    }

    /// Sets the subject name identifier.
    #[must_use]
    pub fn with_subject(mut self, name_id: NameId) -> Self {
        self.subject = Some(Subject {
            name_id: Some(name_id),
        });
        self
    }

    /// Sets the conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Adds an authentication statement.
    #[must_use]
    pub fn with_authn_statement(mut self, statement: AuthnStatement) -> Self {
        self.authn_statements.push(statement);
        self
    }

    /// Adds an attribute statement.
    #[must_use]
    pub fn with_attribute_statement(mut self, statement: AttributeStatement) -> Self {
        self.attribute_statements.push(statement);
        self
    }

    /// Returns the subject's `NameID` value, if any.
    #[must_use]
    pub fn name_id(&self) -> Option<&str> {
        self.subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .map(|n| n.value.as_str())
    }

    /// Reads a `saml:Assertion` element.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Decryption`] if the element is not a
    /// well-formed assertion; it is only ever read from decrypted content.
    pub fn from_element(element: &Element) -> ArtifactResult<Self> {
        let malformed = |what: &str| ArtifactError::Decryption(format!("malformed assertion: {what}"));

        if !element.is(SAML_NS, "Assertion") {
            return Err(malformed("root is not saml:Assertion"));
        }
        let id = element.attr("ID").ok_or_else(|| malformed("missing ID"))?;
        let issue_instant = element
            .attr("IssueInstant")
            .and_then(parse_instant)
            .ok_or_else(|| malformed("invalid IssueInstant"))?;
        let issuer = element
            .child(SAML_NS, "Issuer")
            .map(|i| i.text().trim().to_string())
            .ok_or_else(|| malformed("missing Issuer"))?;

        let subject = element.child(SAML_NS, "Subject").map(|s| Subject {
            name_id: s.child(SAML_NS, "NameID").map(|n| NameId {
                value: n.text().trim().to_string(),
                format: n.attr("Format").map(str::to_string),
            }),
        });

        let conditions = element
            .child(SAML_NS, "Conditions")
            .map(Conditions::from_element)
            .transpose()?;

        let authn_statements = element
            .children_named(SAML_NS, "AuthnStatement")
            .map(AuthnStatement::from_element)
            .collect::<ArtifactResult<Vec<_>>>()?;

        let attribute_statements = element
            .children_named(SAML_NS, "AttributeStatement")
            .map(AttributeStatement::from_element)
            .collect();

        Ok(Self {
            id: id.to_string(),
            issue_instant,
            issuer,
            subject,
            conditions,
            authn_statements,
            attribute_statements,
        })
    }

    /// Serialises as a standalone `saml:Assertion` document.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.to_element().to_xml()
    }

    fn to_element(&self) -> Element {
        let mut root = saml("Assertion")
            .with_ns_decl("saml", SAML_NS)
            .with_attr("ID", &self.id)
            .with_attr("Version", SAML_VERSION)
            .with_attr("IssueInstant", format_instant(self.issue_instant))
            .with_child(saml("Issuer").with_text(&self.issuer));

        if let Some(subject) = &self.subject {
            let mut el = saml("Subject");
            if let Some(name_id) = &subject.name_id {
                let mut n = saml("NameID").with_text(&name_id.value);
                if let Some(format) = &name_id.format {
                    n = n.with_attr("Format", format);
                }
                el = el.with_child(n);
            }
            root = root.with_child(el);
        }

        if let Some(conditions) = &self.conditions {
            let mut el = saml("Conditions");
            if let Some(nb) = conditions.not_before {
                el = el.with_attr("NotBefore", format_instant(nb));
            }
            if let Some(noa) = conditions.not_on_or_after {
                el = el.with_attr("NotOnOrAfter", format_instant(noa));
            }
            for restriction in &conditions.audience_restrictions {
                let mut r = saml("AudienceRestriction");
                for audience in restriction {
                    r = r.with_child(saml("Audience").with_text(audience));
                }
                el = el.with_child(r);
            }
            root = root.with_child(el);
        }

        for statement in &self.authn_statements {
            let mut el = saml("AuthnStatement")
                .with_attr("AuthnInstant", format_instant(statement.authn_instant));
            if let Some(index) = &statement.session_index {
                el = el.with_attr("SessionIndex", index);
            }
            let mut ctx = saml("AuthnContext");
            if let Some(class_ref) = &statement.authn_context_class_ref {
                ctx = ctx.with_child(saml("AuthnContextClassRef").with_text(class_ref));
            }
            root = root.with_child(el.with_child(ctx));
        }

        for statement in &self.attribute_statements {
            let mut el = saml("AttributeStatement");
            for attribute in &statement.attributes {
                let mut a = saml("Attribute").with_attr("Name", &attribute.name);
                if let Some(friendly) = &attribute.friendly_name {
                    a = a.with_attr("FriendlyName", friendly);
                }
                for value in &attribute.values {
                    a = a.with_child(saml("AttributeValue").with_text(value));
                }
                el = el.with_child(a);
            }
            root = root.with_child(el);
        }

        root
    }
}

fn saml(name: &str) -> Element {
    Element::new_ns("saml", name, SAML_NS)
}

/// Assertion subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Name identifier.
    pub name_id: Option<NameId>,
}

/// SAML Name ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The identifier value.
    pub value: String,
    /// The name ID format URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl NameId {
    /// Creates an email-format name ID.
    #[must_use]
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            value: email.into(),
            format: Some("urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress".to_string()),
        }
    }
}

/// Assertion validity conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// Earliest valid time.
    pub not_before: Option<DateTime<Utc>>,
    /// Expiry time (exclusive).
    pub not_on_or_after: Option<DateTime<Utc>>,
    /// Each inner list is one `AudienceRestriction`.
    pub audience_restrictions: Vec<Vec<String>>,
}

impl Conditions {
    /// Creates conditions valid from `now` for `lifetime`, restricted to
    /// `audience`.
    #[must_use]
    pub fn for_audience(audience: impl Into<String>, now: DateTime<Utc>, lifetime: Duration) -> Self {
        Self {
            not_before: Some(now),
            not_on_or_after: Some(now + lifetime),
            audience_restrictions: vec![vec![audience.into()]],
        }
    }

    fn from_element(element: &Element) -> ArtifactResult<Self> {
        let instant = |name: &str| -> ArtifactResult<Option<DateTime<Utc>>> {
            element
                .attr(name)
                .map(|v| {
                    parse_instant(v).ok_or_else(|| {
                        ArtifactError::Decryption(format!("malformed assertion: invalid {name}"))
                    })
                })
                .transpose()
        };

        Ok(Self {
            not_before: instant("NotBefore")?,
            not_on_or_after: instant("NotOnOrAfter")?,
            audience_restrictions: element
                .children_named(SAML_NS, "AudienceRestriction")
                .map(|r| {
                    r.children_named(SAML_NS, "Audience")
                        .map(|a| a.text().trim().to_string())
                        .collect()
                })
                .collect(),
        })
    }

    /// Checks the validity window and audience restrictions.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::AssertionConditions`] if `now` (with
    /// `clock_skew` tolerance) is outside the window, or if any audience
    /// restriction omits `sp_entity_id`.
    pub fn validate(
        &self,
        now: DateTime<Utc>,
        clock_skew: Duration,
        sp_entity_id: &str,
    ) -> ArtifactResult<()> {
        if let Some(not_before) = self.not_before {
            if now + clock_skew < not_before {
                return Err(ArtifactError::AssertionConditions(format!(
                    "not valid before {}",
                    format_instant(not_before)
                )));
            }
        }
        if let Some(not_on_or_after) = self.not_on_or_after {
            if now - clock_skew >= not_on_or_after {
                return Err(ArtifactError::AssertionConditions(format!(
                    "expired at {}",
                    format_instant(not_on_or_after)
                )));
            }
        }
        for restriction in &self.audience_restrictions {
            if !restriction.iter().any(|a| a == sp_entity_id) {
                return Err(ArtifactError::AssertionConditions(format!(
                    "audience {sp_entity_id} not in {restriction:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Authentication statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// When the user authenticated at the IdP.
    pub authn_instant: DateTime<Utc>,
    /// IdP session index.
    pub session_index: Option<String>,
    /// Authentication context class.
    pub authn_context_class_ref: Option<String>,
}

impl AuthnStatement {
    fn from_element(element: &Element) -> ArtifactResult<Self> {
        let authn_instant = element
            .attr("AuthnInstant")
            .and_then(parse_instant)
            .ok_or_else(|| {
                ArtifactError::Decryption("malformed assertion: invalid AuthnInstant".into())
            })?;
        let authn_context_class_ref = element
            .child(SAML_NS, "AuthnContext")
            .and_then(|c| c.child(SAML_NS, "AuthnContextClassRef"))
            .map(|r| r.text().trim().to_string());

        Ok(Self {
            authn_instant,
            session_index: element.attr("SessionIndex").map(str::to_string),
            authn_context_class_ref,
        })
    }
}

/// Attribute statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStatement {
    /// Attributes in document order.
    pub attributes: Vec<Attribute>,
}

impl AttributeStatement {
    fn from_element(element: &Element) -> Self {
        Self {
            attributes: element
                .children_named(SAML_NS, "Attribute")
                .map(|a| Attribute {
                    name: a.attr("Name").unwrap_or_default().to_string(),
                    friendly_name: a.attr("FriendlyName").map(str::to_string),
                    values: a
                        .children_named(SAML_NS, "AttributeValue")
                        .map(Element::text)
                        .collect(),
                })
                .collect(),
        }
    }
}

/// A named, multi-valued attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    /// Attribute values.
    pub values: Vec<String>,
}

impl Attribute {
    /// Creates a single-valued attribute.
    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            friendly_name: None,
            values: vec![value.into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::authn_context;
    use crate::xml::parse;

    fn sample() -> Assertion {
        let now = Utc::now();
        Assertion::new("https://idp.example.com")
            .with_subject(NameId::email("user@example.com"))
            .with_conditions(Conditions::for_audience(
                "https://sp.example.com",
                now,
                Duration::minutes(5),
            ))
            .with_authn_statement(AuthnStatement {
                authn_instant: now,
                session_index: Some("_s1".into()),
                authn_context_class_ref: Some(authn_context::PASSWORD_PROTECTED_TRANSPORT.into()),
            })
            .with_attribute_statement(AttributeStatement {
                attributes: vec![Attribute::single("email", "user@example.com")],
            })
    }

    #[test]
    fn xml_roundtrip_preserves_claims() {
        let original = sample();
        let parsed = Assertion::from_element(&parse(&original.to_xml()).unwrap()).unwrap();

        assert_eq!(parsed.id, original.id);
        assert_eq!(parsed.name_id(), Some("user@example.com"));
        assert_eq!(parsed.attribute_statements, original.attribute_statements);
        assert_eq!(
            parsed.authn_statements[0].authn_context_class_ref,
            original.authn_statements[0].authn_context_class_ref
        );
        assert_eq!(parsed.conditions.unwrap().audience_restrictions, vec![vec![
            "https://sp.example.com".to_string()
        ]]);
    }

    #[test]
    fn wrong_root_is_rejected() {
        let element = parse(r#"<saml:Issuer xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"/>"#)
            .unwrap();
        assert!(Assertion::from_element(&element).is_err());
    }

    #[test]
    fn conditions_window() {
        let now = Utc::now();
        let skew = Duration::seconds(60);
        let conditions = Conditions::for_audience("sp", now, Duration::minutes(5));

        assert!(conditions.validate(now, skew, "sp").is_ok());
        // Slightly early is tolerated by the skew
        assert!(conditions.validate(now - Duration::seconds(30), skew, "sp").is_ok());
        assert!(conditions.validate(now - Duration::minutes(2), skew, "sp").is_err());
        assert!(conditions.validate(now + Duration::minutes(7), skew, "sp").is_err());
    }

    #[test]
    fn conditions_audience() {
        let now = Utc::now();
        let conditions = Conditions::for_audience("https://sp", now, Duration::minutes(5));
        let result = conditions.validate(now, Duration::zero(), "https://other");
        assert!(matches!(result, Err(ArtifactError::AssertionConditions(_))));
    }
}
