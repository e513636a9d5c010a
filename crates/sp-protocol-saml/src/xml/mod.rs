//! Namespace-aware XML tree.
//!
//! SAML messages are read and built through a small owned tree with
//! resolved namespaces. Protocol types map to and from it, and the
//! signature and encryption layers use it for structural checks and to
//! assemble templates before handing text to the XML security engine.
//!
//! Comments and processing instructions are dropped while parsing. Line
//! endings and attribute whitespace are normalised as an XML processor would.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Namespace bound to the `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Deepest element nesting accepted by [`parse`].
pub const MAX_DEPTH: usize = 128;

/// Result type for XML operations.
pub type XmlResult<T> = Result<T, XmlError>;

/// XML parsing errors.
#[derive(Debug, Error)]
pub enum XmlError {
    /// The input is not well-formed.
    #[error("malformed XML: {0}")]
    Syntax(String),

    /// A prefix is used without a declaration in scope.
    #[error("unbound namespace prefix: {0}")]
    UnboundPrefix(String),

    /// The document has no root element, or content outside it.
    #[error("invalid document structure: {0}")]
    Structure(String),
}

impl From<quick_xml::Error> for XmlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Syntax(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for XmlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Syntax(err.to_string())
    }
}

impl From<quick_xml::escape::EscapeError> for XmlError {
    fn from(err: quick_xml::escape::EscapeError) -> Self {
        Self::Syntax(err.to_string())
    }
}

impl From<std::str::Utf8Error> for XmlError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::Syntax(err.to_string())
    }
}

/// A namespace declaration (`xmlns` or `xmlns:prefix`).
///
/// `prefix` is `None` for the default namespace; an empty `uri` on the
/// default namespace undeclares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// Declared prefix, `None` for the default namespace.
    pub prefix: Option<String>,
    /// Namespace URI.
    pub uri: String,
}

impl NamespaceDecl {
    /// Creates a prefixed declaration.
    pub fn prefixed(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            uri: uri.into(),
        }
    }
}

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Prefix as written.
    pub prefix: Option<String>,
    /// Local name.
    pub name: String,
    /// Resolved namespace; unprefixed attributes have none.
    pub namespace: Option<String>,
    /// Normalised, unescaped value.
    pub value: String,
}

impl Attribute {
    fn qname(&self) -> Cow<'_, str> {
        match &self.prefix {
            Some(p) => Cow::Owned(format!("{p}:{}", self.name)),
            None => Cow::Borrowed(&self.name),
        }
    }
}

/// A child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nested element.
    Element(Element),
    /// Character data (entity references already resolved).
    Text(String),
}

/// An element with its resolved namespace and declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Prefix as written.
    pub prefix: Option<String>,
    /// Local name.
    pub name: String,
    /// Resolved namespace.
    pub namespace: Option<String>,
    /// Namespace declarations made on this element.
    pub namespace_decls: Vec<NamespaceDecl>,
    /// Attributes in document order, without namespace declarations.
    pub attributes: Vec<Attribute>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an element in a namespace. The prefix is not declared; use
    /// [`Element::with_ns_decl`] on the element that should carry it.
    pub fn new_ns(prefix: &str, name: &str, namespace: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            namespace_decls: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds a namespace declaration.
    #[must_use]
    pub fn with_ns_decl(mut self, prefix: &str, uri: &str) -> Self {
        self.namespace_decls.push(NamespaceDecl::prefixed(prefix, uri));
        self
    }

    /// Adds an unqualified attribute.
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            prefix: None,
            name: name.to_string(),
            namespace: None,
            value: value.into(),
        });
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Appends a text node.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Returns the qualified name as written.
    #[must_use]
    pub fn qname(&self) -> Cow<'_, str> {
        match &self.prefix {
            Some(p) => Cow::Owned(format!("{p}:{}", self.name)),
            None => Cow::Borrowed(&self.name),
        }
    }

    /// Returns true if this element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// Returns the value of an unqualified attribute.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Iterates over child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Iterates over child elements with the given name.
    pub fn children_named<'a, 'b>(
        &'a self,
        namespace: &'b str,
        name: &'b str,
    ) -> impl Iterator<Item = &'a Element> + use<'a, 'b> {
        self.elements().filter(move |e| e.is(namespace, name))
    }

    /// Returns the first child element with the given name.
    #[must_use]
    pub fn child(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.children_named(namespace, name).next()
    }

    /// Mutable variant of [`Element::child`].
    pub fn child_mut(&mut self, namespace: &str, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) if e.is(namespace, name) => Some(e),
            _ => None,
        })
    }

    /// Concatenates the direct text children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Replaces all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    /// Returns this element and all its descendants in document order.
    #[must_use]
    pub fn descendants(&self) -> Vec<&Element> {
        fn collect<'a>(element: &'a Element, out: &mut Vec<&'a Element>) {
            out.push(element);
            for child in element.elements() {
                collect(child, out);
            }
        }

        let mut out = Vec::new();
        collect(self, &mut out);
        out
    }

    /// Finds the element carrying `ID="id"` (SAML's identifier attribute).
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        self.descendants()
            .into_iter()
            .find(|e| e.attr("ID") == Some(id))
    }

    /// Mutable variant of [`Element::find_by_id`].
    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        if self.attr("ID") == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) => e.find_by_id_mut(id),
            Node::Text(_) => None,
        })
    }

    /// Serialises the subtree, keeping declarations where they were made.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        let qname = self.qname();
        out.push('<');
        out.push_str(&qname);
        for decl in &self.namespace_decls {
            match &decl.prefix {
                Some(p) => out.push_str(&format!(" xmlns:{p}=\"")),
                None => out.push_str(" xmlns=\""),
            }
            escape_attr(&decl.uri, out);
            out.push('"');
        }
        for attr in &self.attributes {
            out.push(' ');
            out.push_str(&attr.qname());
            out.push_str("=\"");
            escape_attr(&attr.value, out);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(e) => e.write_xml(out),
                Node::Text(t) => escape_text(t, out),
            }
        }
        out.push_str("</");
        out.push_str(&qname);
        out.push('>');
    }
}

/// Parses a standalone document and returns its root element.
///
/// # Errors
///
/// Returns an error if the input is not well-formed or uses an unbound prefix.
pub fn parse(xml: &str) -> XmlResult<Element> {
    parse_in_scope(xml, &[])
}

/// Parses a document fragment that was cut out of a larger document.
///
/// `inherited` holds the declarations in scope where the fragment lived.
/// They are used to resolve prefixes and then re-declared on the new root
/// unless the root overrides them, so the result stands alone.
///
/// # Errors
///
/// Returns an error if the input is not well-formed or uses an unbound prefix.
pub fn parse_in_scope(xml: &str, inherited: &[NamespaceDecl]) -> XmlResult<Element> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut scopes: Vec<Vec<NamespaceDecl>> = vec![inherited.to_vec()];
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::Structure(format!(
                        "elements nested deeper than {MAX_DEPTH}"
                    )));
                }
                let scope = scopes.last().map(Vec::as_slice).unwrap_or_default();
                let (element, new_scope) = open_element(&start, scope)?;
                if root.is_some() && stack.is_empty() {
                    return Err(XmlError::Structure("multiple root elements".into()));
                }
                scopes.push(new_scope);
                stack.push(element);
            }
            Event::Empty(start) => {
                let scope = scopes.last().map(Vec::as_slice).unwrap_or_default();
                let (element, _) = open_element(&start, scope)?;
                attach(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                scopes.pop();
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Structure("unbalanced end tag".into()))?;
                attach(element, &mut stack, &mut root)?;
            }
            Event::Text(text) => {
                let raw = std::str::from_utf8(&text)?;
                let normalized = normalize_line_endings(raw);
                let value = quick_xml::escape::unescape(&normalized)?;
                push_text(&mut stack, &value)?;
            }
            Event::CData(cdata) => {
                let raw = std::str::from_utf8(&cdata)?;
                push_text(&mut stack, &normalize_line_endings(raw))?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Syntax("unexpected end of document".into()));
    }
    let mut root = root.ok_or_else(|| XmlError::Structure("no root element".into()))?;

    for decl in inherited.iter().rev() {
        let shadowed = root
            .namespace_decls
            .iter()
            .any(|d| d.prefix == decl.prefix);
        if !shadowed {
            root.namespace_decls.insert(0, decl.clone());
        }
    }
    Ok(root)
}

/// Returns the namespace declarations in scope at `target`, excluding those
/// made on `target` itself. Later declarations shadow earlier ones.
///
/// Returns `None` if `target` is not part of the tree under `root`.
#[must_use]
fn ancestor_namespaces(root: &Element, target: &Element) -> Option<Vec<NamespaceDecl>> {
    fn walk(current: &Element, target: &Element, acc: &mut Vec<NamespaceDecl>) -> bool {
        if std::ptr::eq(current, target) {
            return true;
        }
        let mark = acc.len();
        acc.extend(current.namespace_decls.iter().cloned());
        for child in current.elements() {
            if walk(child, target, acc) {
                return true;
            }
        }
        acc.truncate(mark);
        false
    }

    let mut acc = Vec::new();
    if !walk(root, target, &mut acc) {
        return None;
    }

    let mut resolved: Vec<NamespaceDecl> = Vec::new();
    for decl in acc {
        resolved.retain(|d| d.prefix != decl.prefix);
        resolved.push(decl);
    }
    Some(resolved)
}

/// Clones `target` out of `root` as a standalone element, re-declaring the
/// namespaces it inherited.
#[must_use]
pub fn detach(root: &Element, target: &Element) -> Option<Element> {
    let inherited = ancestor_namespaces(root, target)?;
    let mut detached = target.clone();
    for decl in inherited.into_iter().rev() {
        if !detached.namespace_decls.iter().any(|d| d.prefix == decl.prefix) {
            detached.namespace_decls.insert(0, decl);
        }
    }
    Some(detached)
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn lookup<'a>(scope: &'a [NamespaceDecl], prefix: Option<&str>) -> Option<&'a str> {
    scope
        .iter()
        .rev()
        .find(|d| d.prefix.as_deref() == prefix)
        .map(|d| d.uri.as_str())
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

fn open_element(
    start: &BytesStart<'_>,
    scope: &[NamespaceDecl],
) -> XmlResult<(Element, Vec<NamespaceDecl>)> {
    let qname = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut decls = Vec::new();
    let mut raw_attrs = Vec::new();

    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let raw = std::str::from_utf8(&attr.value)?;
        let normalized = normalize_line_endings(raw).replace(['\t', '\n'], " ");
        let value = quick_xml::escape::unescape(&normalized)?.into_owned();

        if key == "xmlns" {
            decls.push(NamespaceDecl { prefix: None, uri: value });
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            decls.push(NamespaceDecl::prefixed(prefix, value));
        } else {
            raw_attrs.push((key, value));
        }
    }

    let mut new_scope = scope.to_vec();
    new_scope.extend(decls.iter().cloned());

    let (prefix, local) = split_qname(&qname);
    let namespace = match prefix {
        Some("xml") => Some(XML_NS.to_string()),
        Some(p) => Some(
            lookup(&new_scope, Some(p))
                .ok_or_else(|| XmlError::UnboundPrefix(p.to_string()))?
                .to_string(),
        ),
        None => lookup(&new_scope, None)
            .filter(|uri| !uri.is_empty())
            .map(str::to_string),
    };

    let mut attributes = Vec::with_capacity(raw_attrs.len());
    for (key, value) in raw_attrs {
        let (attr_prefix, attr_local) = split_qname(&key);
        let attr_ns = match attr_prefix {
            Some("xml") => Some(XML_NS.to_string()),
            Some(p) => Some(
                lookup(&new_scope, Some(p))
                    .ok_or_else(|| XmlError::UnboundPrefix(p.to_string()))?
                    .to_string(),
            ),
            None => None,
        };
        attributes.push(Attribute {
            prefix: attr_prefix.map(str::to_string),
            name: attr_local.to_string(),
            namespace: attr_ns,
            value,
        });
    }

    let element = Element {
        prefix: prefix.map(str::to_string),
        name: local.to_string(),
        namespace,
        namespace_decls: decls,
        attributes,
        children: Vec::new(),
    };
    Ok((element, new_scope))
}

fn attach(element: Element, stack: &mut [Element], root: &mut Option<Element>) -> XmlResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(XmlError::Structure("multiple root elements".into())),
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) -> XmlResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            if let Some(Node::Text(prev)) = parent.children.last_mut() {
                prev.push_str(text);
            } else if !text.is_empty() {
                parent.children.push(Node::Text(text.to_string()));
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::Structure("text outside the root element".into())),
    }
}

fn normalize_line_endings(raw: &str) -> Cow<'_, str> {
    if raw.contains('\r') {
        Cow::Owned(raw.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAML: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

    #[test]
    fn resolves_prefixed_and_default_namespaces() {
        let root = parse(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="r1">
                 <Assertion xmlns="urn:oasis:names:tc:SAML:2.0:assertion" ID="a1"><Issuer>idp</Issuer></Assertion>
               </samlp:Response>"#,
        )
        .unwrap();

        assert!(root.is("urn:oasis:names:tc:SAML:2.0:protocol", "Response"));
        let assertion = root.child(SAML, "Assertion").unwrap();
        assert_eq!(assertion.attr("ID"), Some("a1"));
        assert_eq!(assertion.child(SAML, "Issuer").unwrap().text(), "idp");
    }

    #[test]
    fn unbound_prefix_is_rejected() {
        let err = parse("<saml:Assertion/>").unwrap_err();
        assert!(matches!(err, XmlError::UnboundPrefix(p) if p == "saml"));
    }

    #[test]
    fn entities_and_line_endings_are_normalised() {
        let root = parse("<a b=\"x&#10;y\tz\">1 &lt; 2\r\n&amp; 3</a>").unwrap();
        assert_eq!(root.attr("b"), Some("x\ny z"));
        assert_eq!(root.text(), "1 < 2\n& 3");
    }

    #[test]
    fn comments_are_dropped() {
        let root = parse("<a>user<!-- injected -->@example.com</a>").unwrap();
        assert_eq!(root.text(), "user@example.com");
    }

    #[test]
    fn multiple_roots_are_rejected() {
        assert!(matches!(parse("<a/><b/>"), Err(XmlError::Structure(_))));
    }

    #[test]
    fn serialisation_roundtrips() {
        let xml = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="a&amp;1"><saml:Issuer>x &lt; y</saml:Issuer></saml:Assertion>"#;
        let root = parse(xml).unwrap();
        assert_eq!(parse(&root.to_xml()).unwrap(), root);
    }

    #[test]
    fn detach_redeclares_inherited_namespaces() {
        let root = parse(
            r#"<env:Envelope xmlns:env="urn:env" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"><env:Body><saml:Assertion ID="a"/></env:Body></env:Envelope>"#,
        )
        .unwrap();
        let body = root.elements().next().unwrap();
        let assertion = body.elements().next().unwrap();

        let detached = detach(&root, assertion).unwrap();
        let reparsed = parse(&detached.to_xml()).unwrap();
        assert!(reparsed.is(SAML, "Assertion"));
    }

    #[test]
    fn fragment_inherits_scope() {
        let inherited = vec![NamespaceDecl::prefixed("saml", SAML)];
        let root = parse_in_scope(r#"<saml:Assertion ID="a"/>"#, &inherited).unwrap();
        assert!(root.is(SAML, "Assertion"));
        assert_eq!(root.namespace_decls, inherited);
    }

    #[test]
    fn descendants_are_in_document_order() {
        let root = parse("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<&str> = root.descendants().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}{}", "<a>".repeat(MAX_DEPTH + 1), "</a>".repeat(MAX_DEPTH + 1));
        assert!(matches!(parse(&deep), Err(XmlError::Structure(msg)) if msg.contains("nested")));

        let shallow = format!("{}{}", "<a>".repeat(MAX_DEPTH), "</a>".repeat(MAX_DEPTH));
        assert!(parse(&shallow).is_ok());
    }

    #[test]
    fn control_characters_survive_serialisation() {
        let root = parse("<a b=\"x&#9;y\">1&#xD;2</a>").unwrap();
        assert_eq!(parse(&root.to_xml()).unwrap(), root);
    }

    #[test]
    fn find_by_id_searches_the_whole_tree() {
        let root = parse(r#"<a><b><c ID="target"/></b></a>"#).unwrap();
        assert_eq!(root.find_by_id("target").unwrap().name, "c");
        assert!(root.find_by_id("missing").is_none());
    }
}
