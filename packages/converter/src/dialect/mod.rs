//! Dialect adapters.
//!
//! Each supported vocabulary gets one adapter implementing
//! [`DialectAdapter`]. The walker, classifier, validation extractor and
//! assembler are shared; adapters only know how their tree is shaped and
//! how native attributes are spelled.

mod form_runner;
mod template;
mod xforms;

pub use form_runner::FormRunnerAdapter;
pub use template::TemplateAdapter;
pub use xforms::XFormsAdapter;

use roxmltree::{Document, Node};

use crate::namespace::{DialectTag, NamespaceTable};
use crate::types::ListItem;
use crate::xml::get_tag_name;

/// Structural role of a native node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Leaf control or static text; becomes one descriptor.
    Field,
    /// Section or subform; becomes a `group` descriptor.
    Group,
    /// Mutually exclusive field set; a group whose children share one
    /// exclusivity identifier.
    ExclusionGroup,
    /// Repeating section; expands to one group per occurrence.
    Repeat,
    /// Layout-only wrapper; its children are lifted into the parent.
    Transparent,
}

/// A native node as seen during traversal. Never serialized.
#[derive(Debug, Clone)]
pub struct RawFieldNode<'a, 'input: 'a> {
    pub node: Node<'a, 'input>,
    /// Native identifier, used for paths and `codeContext`.
    pub name: String,
    pub kind: NodeKind,
    /// Display label found in the source, if any.
    pub label: Option<String>,
}

impl<'a, 'input: 'a> RawFieldNode<'a, 'input> {
    /// Wrap a node with its identifier and role.
    #[must_use]
    pub fn new(node: Node<'a, 'input>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            node,
            name: name.into(),
            kind,
            label: None,
        }
    }

    /// Attach the display label.
    #[must_use]
    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label.filter(|l| !l.is_empty());
        self
    }

    /// Local tag name of the native element.
    #[must_use]
    pub fn tag(&self) -> &'a str {
        get_tag_name(self.node)
    }
}

/// Native attributes normalized to one vocabulary across dialects.
///
/// `required`, `minOccur`, `mandatory` and `nullTest` all end up in
/// [`required`](Self::required); constraint expressions of every dialect
/// end up in [`scripts`](Self::scripts).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeAttributes {
    /// Control kind key looked up in the per-dialect type table, e.g.
    /// `textEdit:multiline` or `select1:full`.
    pub control: Option<String>,
    pub required: bool,
    pub required_message: Option<String>,
    pub pattern: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    /// Message shown when a constraint, pattern or range check fails.
    pub constraint_message: Option<String>,
    /// Display or edit picture, e.g. a date mask.
    pub format: Option<String>,
    /// Native data reference.
    pub binding: Option<String>,
    pub help_text: Option<String>,
    /// Initial value or static text.
    pub value: Option<String>,
    pub options: Vec<ListItem>,
    /// Validation expressions, in source order.
    pub scripts: Vec<String>,
    /// Expected native attributes that were absent.
    pub missing: Vec<&'static str>,
}

impl NativeAttributes {
    /// Control kind key with any `:variant` suffix removed.
    #[must_use]
    pub fn base_control(&self) -> Option<&str> {
        self.control
            .as_deref()
            .map(|c| c.split_once(':').map_or(c, |(base, _)| base))
    }
}

/// Header hints found in the document itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMeta {
    pub title: Option<String>,
    pub form_id: Option<String>,
}

/// Per-dialect header defaults, used when no constant is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectDefaults {
    pub version: Option<&'static str>,
    pub ministry_id: Option<&'static str>,
    /// Derive a stable document id from the source content.
    pub content_id: bool,
}

/// Capability set every dialect provides to the walker.
pub trait DialectAdapter<'a, 'input: 'a> {
    /// The dialect this adapter walks.
    fn dialect(&self) -> DialectTag;

    /// Top-level nodes of the form body, in document order.
    fn enumerate_sections(&self) -> Vec<RawFieldNode<'a, 'input>>;

    /// Direct children of a container, in document order.
    fn enumerate_fields(&self, section: &RawFieldNode<'a, 'input>) -> Vec<RawFieldNode<'a, 'input>>;

    /// Number of occurrences of a repeat node, at least 1.
    fn detect_repeat(&self, node: &RawFieldNode<'a, 'input>) -> usize;

    /// The container to walk for occurrence `index` of a repeat node.
    ///
    /// The default re-walks the repeat node itself for every occurrence.
    fn occurrence_node(&self, node: &RawFieldNode<'a, 'input>, index: usize) -> RawFieldNode<'a, 'input> {
        let _ = index;
        RawFieldNode {
            kind: NodeKind::Group,
            ..node.clone()
        }
    }

    /// Native attributes of a field or group.
    fn native_attributes(&self, node: &RawFieldNode<'a, 'input>) -> NativeAttributes;

    /// Title and form id hints.
    fn document_meta(&self) -> DocumentMeta;

    /// Header defaults of the dialect.
    fn defaults(&self) -> DialectDefaults;
}

/// Build the adapter for a detected dialect.
#[must_use]
pub fn adapter_for<'a, 'input: 'a>(
    dialect: DialectTag,
    doc: &'a Document<'input>,
    namespaces: &NamespaceTable,
) -> Box<dyn DialectAdapter<'a, 'input> + 'a> {
    match dialect {
        DialectTag::Template => Box::new(TemplateAdapter::new(doc, namespaces)),
        DialectTag::XForms => Box::new(XFormsAdapter::new(doc)),
        DialectTag::FormRunner => Box::new(FormRunnerAdapter::new(doc)),
    }
}

/// Read a native boolean (`true()`, `true`, `1`, `yes`, `error`).
///
/// `error` is the template dialect's `nullTest` value for mandatory fields.
pub(crate) fn parse_native_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true()" | "true" | "1" | "yes" | "error"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_native_bool() {
        assert!(parse_native_bool("true()"));
        assert!(parse_native_bool(" TRUE "));
        assert!(parse_native_bool("error"));
        assert!(!parse_native_bool("false()"));
        assert!(!parse_native_bool("warning"));
        assert!(!parse_native_bool(""));
    }

    #[test]
    fn test_base_control() {
        let attrs = NativeAttributes {
            control: Some("select1:full".to_string()),
            ..NativeAttributes::default()
        };
        assert_eq!(attrs.base_control(), Some("select1"));
        assert_eq!(NativeAttributes::default().base_control(), None);
    }
}
