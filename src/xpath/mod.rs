//! The XPath service abstraction (spec §4.A / §6).
//!
//! The evaluator never talks to an XML library directly — it is
//! parameterised over this trait, so the concrete engine is an
//! implementation detail the core doesn't depend on (spec §1). The default
//! implementation, [`sxd::SxdXPathService`], is backed by the real
//! `sxd_document`/`sxd_xpath` crates.

pub mod sxd;

use std::fmt;

use thiserror::Error;

/// A handle to a single node inside a parsed document.
///
/// Rather than borrowing into the underlying XML library's arena (which
/// would force every consumer of this trait to carry that library's
/// lifetime), a node is identified by its absolute, indexed-step XPath —
/// the same string [`XPathService::absolute_path`] produces for
/// diagnostics. Because `absolute_path` is required to be deterministic
/// and unique within a document, round-tripping through it to re-resolve a
/// node is always unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef(pub(crate) String);

impl NodeRef {
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_owned())
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The result of evaluating an XPath 1.0 expression (spec §4.A).
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue {
    NodeSet(Vec<NodeRef>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl XPathValue {
    /// XPath 1.0's own string-value coercion: the first node in document
    /// order for a node-set, the natural string form otherwise.
    #[must_use]
    pub fn string_value(&self) -> String {
        match self {
            Self::NodeSet(nodes) => nodes.first().map(NodeRef::path).unwrap_or_default().to_owned(),
            Self::String(s) => s.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{n:.0}")
                } else {
                    n.to_string()
                }
            }
            Self::Boolean(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum XPathError {
    #[error("malformed XML: {0}")]
    Parse(String),

    #[error("invalid XPath syntax in {xpath:?}: {reason}")]
    Syntax { xpath: String, reason: String },

    #[error("unresolved namespace prefix in {xpath:?}")]
    UnresolvedNamespace { xpath: String },

    #[error("node {0} no longer exists in the document")]
    StaleNode(String),
}

/// The XPath engine abstraction the evaluator is parameterised over (spec
/// §4.A). `Document` is left as an associated type so a given
/// implementation can own whatever arena/parse-tree representation its
/// backing library uses.
pub trait XPathService {
    type Document;

    /// Parse an XML document. Malformed XML fails with [`XPathError::Parse`].
    fn load(&self, xml: &str) -> Result<Self::Document, XPathError>;

    /// Evaluate `xpath` rooted at `context_node` so relative expressions
    /// resolve relative to it (enabling `map`'s per-node rebinding).
    fn evaluate(
        &self,
        document: &Self::Document,
        context_node: &NodeRef,
        xpath: &str,
    ) -> Result<XPathValue, XPathError>;

    /// A deterministic, unique-within-document XPath to `node`, used for
    /// node-level diagnostics in `nodeValidation` outcomes.
    fn absolute_path(&self, document: &Self::Document, node: &NodeRef) -> String {
        node.path().to_owned()
    }
}
