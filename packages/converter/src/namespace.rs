//! Namespace resolution and dialect detection.
//!
//! Collects the namespace declarations of a document and picks the
//! dialect whose marker URI is present.

use std::collections::BTreeSet;
use std::fmt;

use roxmltree::Document;
use serde::Serialize;

use crate::config::{FORM_RUNNER_NS, TEMPLATE_NS_MARKER, XFORMS_NS, XML_NS};
use crate::error::{ConverterError, Result};
use crate::xml::get_tag_name;

/// The supported source dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DialectTag {
    /// Adobe XFA template (XDP packages).
    Template,
    /// Plain W3C XForms.
    XForms,
    /// Orbeon Form Runner.
    FormRunner,
}

impl DialectTag {
    /// Get the string value used in logs and reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::XForms => "xforms",
            Self::FormRunner => "form-runner",
        }
    }
}

impl fmt::Display for DialectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every prefix → URI declaration of a document.
///
/// The default namespace is stored under the empty prefix. A prefix that
/// is rebound further down the tree keeps all of its URIs, so an XDP
/// package whose `config` and `template` packets both use the default
/// namespace exposes both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceTable {
    declarations: BTreeSet<(String, String)>,
}

impl NamespaceTable {
    /// Collect every namespace declared anywhere in the document.
    #[must_use]
    pub fn from_document(doc: &Document<'_>) -> Self {
        let declarations = doc
            .descendants()
            .filter(|n| n.is_element())
            .flat_map(|node| node.namespaces())
            .filter(|ns| ns.uri() != XML_NS)
            .map(|ns| (ns.name().unwrap_or_default().to_string(), ns.uri().to_string()))
            .collect();
        Self { declarations }
    }

    /// Whether any declared URI satisfies the predicate.
    pub fn any_uri(&self, mut predicate: impl FnMut(&str) -> bool) -> bool {
        self.declarations.iter().any(|(_, u)| predicate(u))
    }

    /// All declared URIs, deduplicated and sorted.
    #[must_use]
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.declarations.iter().map(|(_, u)| u.clone()).collect();
        uris.sort();
        uris.dedup();
        uris
    }

    /// Number of distinct declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Whether no namespaces were declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Pick the dialect from the marker URIs.
    ///
    /// Template wins over form-runner, form-runner wins over plain XForms
    /// (form-runner documents always declare the XForms namespace too).
    #[must_use]
    pub fn dialect(&self) -> Option<DialectTag> {
        if self.any_uri(|u| u.contains(TEMPLATE_NS_MARKER)) {
            Some(DialectTag::Template)
        } else if self.any_uri(|u| u == FORM_RUNNER_NS) {
            Some(DialectTag::FormRunner)
        } else if self.any_uri(|u| u == XFORMS_NS) {
            Some(DialectTag::XForms)
        } else {
            None
        }
    }
}

/// Resolve the namespace table and dialect of a parsed document.
///
/// # Errors
/// Returns `UnknownDialect` when no marker namespace is declared.
pub fn resolve(doc: &Document<'_>) -> Result<(NamespaceTable, DialectTag)> {
    let table = NamespaceTable::from_document(doc);
    match table.dialect() {
        Some(dialect) => {
            tracing::debug!(dialect = %dialect, namespaces = table.len(), "Resolved dialect");
            Ok((table, dialect))
        }
        None => Err(ConverterError::UnknownDialect {
            root: get_tag_name(doc.root_element()).to_string(),
            namespaces: table.uris(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect_of(xml: &str) -> Result<DialectTag> {
        let doc = Document::parse(xml).unwrap();
        resolve(&doc).map(|(_, d)| d)
    }

    #[test]
    fn test_template_dialect() {
        let xml = r#"<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/">
            <template xmlns="http://www.xfa.org/schema/xfa-template/3.3/"><subform/></template>
        </xdp:xdp>"#;
        assert_eq!(dialect_of(xml).unwrap(), DialectTag::Template);
    }

    #[test]
    fn test_form_runner_beats_xforms() {
        let xml = r#"<xh:html xmlns:xh="http://www.w3.org/1999/xhtml"
            xmlns:xf="http://www.w3.org/2002/xforms"
            xmlns:fr="http://orbeon.org/oxf/xml/form-runner"/>"#;
        assert_eq!(dialect_of(xml).unwrap(), DialectTag::FormRunner);
    }

    #[test]
    fn test_plain_xforms() {
        let xml = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:xf="http://www.w3.org/2002/xforms"/>"#;
        assert_eq!(dialect_of(xml).unwrap(), DialectTag::XForms);
    }

    #[test]
    fn test_unknown_dialect() {
        let err = dialect_of(r#"<form xmlns="urn:example"/>"#).unwrap_err();
        match err {
            ConverterError::UnknownDialect { root, namespaces } => {
                assert_eq!(root, "form");
                assert_eq!(namespaces, vec!["urn:example".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_template_behind_rebound_default_namespace() {
        let xml = r#"<xdp:xdp xmlns:xdp="http://ns.adobe.com/xdp/">
            <config xmlns="http://www.xfa.org/schema/xci/3.0/"/>
            <template xmlns="http://www.xfa.org/schema/xfa-template/3.3/"><subform name="f"><field name="a"/></subform></template>
        </xdp:xdp>"#;
        assert_eq!(dialect_of(xml).unwrap(), DialectTag::Template);
    }

    #[test]
    fn test_declaration_table() {
        let xml = r#"<a xmlns:xf="http://www.w3.org/2002/xforms" xmlns="urn:default"><b xmlns="urn:other" xmlns:q="urn:q"/></a>"#;
        let doc = Document::parse(xml).unwrap();
        let table = NamespaceTable::from_document(&doc);
        assert_eq!(
            table.uris(),
            vec![
                XFORMS_NS.to_string(),
                "urn:default".to_string(),
                "urn:other".to_string(),
                "urn:q".to_string()
            ]
        );
        assert_eq!(table.len(), 4);
        assert!(!table.any_uri(|u| u == XML_NS));
    }
}
