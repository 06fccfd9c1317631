//! Parsed XML element trees
//!
//! The transport layer owns framing and XML syntax; what reaches this
//! crate is an already parsed element tree. `XmlNode` is that tree,
//! together with the node classification of RFC 6241 §6 used by the
//! subtree-filter compiler, and a builder API for constructing request
//! trees from embedding code and tests.

/// An attribute of a parsed element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttr {
    pub name: String,
    /// Resolved namespace URI of the attribute, if any
    pub namespace: Option<String>,
    pub value: String,
}

/// One element of a parsed XML tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    /// Resolved namespace URI of the element, if any
    pub namespace: Option<String>,
    pub attrs: Vec<XmlAttr>,
    /// Character content; empty for pure containment nodes
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Create an element without a namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create an element in the given namespace
    pub fn in_ns(name: impl Into<String>, ns: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(ns.into()),
            ..Default::default()
        }
    }

    /// Builder: add an attribute without a namespace
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push(XmlAttr {
            name: name.into(),
            namespace: None,
            value: value.into(),
        });
        self
    }

    /// Builder: add an attribute in a namespace
    pub fn with_ns_attr(
        mut self,
        name: impl Into<String>,
        ns: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attrs.push(XmlAttr {
            name: name.into(),
            namespace: Some(ns.into()),
            value: value.into(),
        });
        self
    }

    /// Builder: set character content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Builder: append a child element
    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    /// First child with the given local name
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// First attribute with the given local name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Whether the content is empty or whitespace-only
    pub fn text_is_whitespace(&self) -> bool {
        self.text.chars().all(|c| c.is_whitespace())
    }

    /// Content-match node: no element children, non-whitespace text
    /// (RFC 6241 §6.2.5)
    pub fn is_content_match(&self) -> bool {
        self.children.is_empty() && !self.text_is_whitespace()
    }

    /// Selection node: no element children, no meaningful text
    /// (RFC 6241 §6.2.4)
    pub fn is_selection(&self) -> bool {
        self.children.is_empty() && self.text_is_whitespace()
    }

    /// Containment node: has element children (RFC 6241 §6.2.3)
    pub fn is_containment(&self) -> bool {
        !self.children.is_empty()
    }

    /// Character content with surrounding whitespace trimmed
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}
