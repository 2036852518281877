//! XML utility functions for navigating form trees.
//!
//! Lookups match on local names only. The dialects mix prefixed and
//! default-namespace elements freely, and dialect detection has already
//! established which vocabulary is in play.

use roxmltree::Node;

/// Get the tag name without namespace prefix.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use xmlform_converter::xml::get_tag_name;
///
/// let xml = r#"<xf:model xmlns:xf="http://www.w3.org/2002/xforms"><xf:bind/></xf:model>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert_eq!(get_tag_name(doc.root_element()), "model");
/// ```
pub fn get_tag_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Check if a node is an element with the given local name.
pub fn has_tag(node: Node<'_, '_>, tag: &str) -> bool {
    node.is_element() && get_tag_name(node) == tag
}

/// Check if a node is an element with the given local name in the given namespace.
pub fn has_tag_ns(node: Node<'_, '_>, namespace: &str, tag: &str) -> bool {
    has_tag(node, tag) && node.tag_name().namespace() == Some(namespace)
}

/// Find the first child element with the given tag name.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use xmlform_converter::xml::find_child;
///
/// let xml = r#"<field><ui/><caption/></field>"#;
/// let doc = Document::parse(xml).unwrap();
/// let root = doc.root_element();
///
/// assert!(find_child(root, "caption").is_some());
/// assert!(find_child(root, "value").is_none());
/// ```
pub fn find_child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| has_tag(*child, tag))
}

/// Find all child elements with the given tag name.
pub fn find_children<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |child| has_tag(*child, tag))
}

/// Find a descendant element matching a slash-separated path of tag names.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use xmlform_converter::xml::find_by_path;
///
/// let xml = r#"<field><caption><value><text>Name</text></value></caption></field>"#;
/// let doc = Document::parse(xml).unwrap();
///
/// let text = find_by_path(doc.root_element(), "caption/value/text");
/// assert_eq!(text.and_then(|n| n.text()), Some("Name"));
/// ```
pub fn find_by_path<'a, 'input>(node: Node<'a, 'input>, path: &str) -> Option<Node<'a, 'input>> {
    path.split('/')
        .try_fold(node, |current, part| find_child(current, part))
}

/// Get the direct text content of a node, trimmed.
pub fn get_text(node: Node<'_, '_>) -> String {
    node.text()
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Get the trimmed direct text of a node, or `None` when it is empty.
pub fn non_empty_text(node: Node<'_, '_>) -> Option<String> {
    Some(get_text(node)).filter(|s| !s.is_empty())
}

/// Collect the text of a node including all descendants and tail text,
/// with whitespace collapsed.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use xmlform_converter::xml::collect_text;
///
/// let xml = r#"<p>Date of <b>birth</b> (child)</p>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert_eq!(collect_text(doc.root_element()), "Date of birth (child)");
/// ```
pub fn collect_text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<Vec<_>>()
        .join("")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Get an attribute value by local name, ignoring its namespace.
///
/// Falls back to the unqualified attribute first, so `ref` wins over `xxf:ref`.
pub fn get_attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute(name).or_else(|| {
        node.attributes()
            .find(|attr| attr.name() == name)
            .map(|attr| attr.value())
    })
}

/// Get an attribute value in a specific namespace.
pub fn get_attribute_ns<'a>(node: Node<'a, '_>, namespace: &str, name: &str) -> Option<&'a str> {
    node.attribute((namespace, name))
}

/// Whether elements in `text` nest deeper than `limit` levels.
///
/// A lexical scan that skips comments, CDATA sections, processing
/// instructions, the doctype and quoted attribute values. It stops as soon
/// as the limit is crossed and does not check well-formedness.
///
/// # Examples
/// ```
/// use xmlform_converter::xml::nesting_exceeds;
///
/// assert!(!nesting_exceeds("<a><b/></a>", 2));
/// assert!(nesting_exceeds("<a><b><c/></b></a>", 2));
/// ```
#[must_use]
pub fn nesting_exceeds(text: &str, limit: usize) -> bool {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut pos = 0;
    while let Some(offset) = bytes[pos..].iter().position(|&b| b == b'<') {
        let start = pos + offset;
        let rest = &text[start..];
        pos = if rest.starts_with("<!--") {
            skip_past(text, start, "-->")
        } else if rest.starts_with("<![CDATA[") {
            skip_past(text, start, "]]>")
        } else if rest.starts_with("<?") {
            skip_past(text, start, "?>")
        } else if rest.starts_with("<!") {
            skip_declaration(bytes, start)
        } else if rest.starts_with("</") {
            depth = depth.saturating_sub(1);
            skip_past(text, start, ">")
        } else {
            let (end, self_closing) = scan_start_tag(bytes, start);
            if !self_closing {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            end
        };
    }
    false
}

/// Position just after the next `terminator` at or after `from`, or the end.
fn skip_past(text: &str, from: usize, terminator: &str) -> usize {
    text[from..]
        .find(terminator)
        .map_or(text.len(), |i| from + i + terminator.len())
}

/// Skip a `<!...>` declaration, including a bracketed internal subset.
fn skip_declaration(bytes: &[u8], from: usize) -> usize {
    let mut brackets = 0usize;
    let mut quote = None;
    for (i, &b) in bytes.iter().enumerate().skip(from + 2) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'[') => brackets += 1,
            (None, b']') => brackets = brackets.saturating_sub(1),
            (None, b'>') if brackets == 0 => return i + 1,
            _ => {}
        }
    }
    bytes.len()
}

/// Scan a start tag; returns the position after it and whether it closes
/// itself.
fn scan_start_tag(bytes: &[u8], from: usize) -> (usize, bool) {
    let mut quote = None;
    for (i, &b) in bytes.iter().enumerate().skip(from + 1) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return (i + 1, i > from + 1 && bytes[i - 1] == b'/'),
            _ => {}
        }
    }
    (bytes.len(), false)
}

/// Get all element children of a node.
pub fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    #[test]
    fn test_get_tag_name_with_namespace() {
        let xml = r#"<ns:root xmlns:ns="http://example.com"><ns:child/></ns:root>"#;
        let doc = Document::parse(xml).unwrap();
        assert_eq!(get_tag_name(doc.root_element()), "root");
    }

    #[test]
    fn test_has_tag_ns() {
        let xml = r#"<fr:section xmlns:fr="urn:fr"/>"#;
        let doc = Document::parse(xml).unwrap();
        let root = doc.root_element();

        assert!(has_tag_ns(root, "urn:fr", "section"));
        assert!(!has_tag_ns(root, "urn:other", "section"));
        assert!(has_tag(root, "section"));
    }

    #[test]
    fn test_find_children() {
        let xml = r#"<root><item>1</item><other/><item>2</item></root>"#;
        let doc = Document::parse(xml).unwrap();

        let items: Vec<_> = find_children(doc.root_element(), "item").collect();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_nesting_exceeds() {
        assert!(!nesting_exceeds("<a><b/><c><d/></c></a>", 2));
        assert!(nesting_exceeds("<a><b/><c><d/></c></a>", 1));
        assert!(!nesting_exceeds("<a><b></b><b></b><b></b></a>", 2));
    }

    #[test]
    fn test_nesting_ignores_markup_that_is_not_an_element() {
        let xml = r#"<?xml version="1.0"?>
            <!DOCTYPE form [<!ENTITY x "<y>">]>
            <form attr="a > b" other='</z>'>
              <!-- <c><d><e> -->
              <![CDATA[<f><g><h>]]>
              <?pi <i><j>?>
              <leaf/>
            </form>"#;
        assert!(!nesting_exceeds(xml, 1));
        assert!(nesting_exceeds(xml, 0));
    }

    #[test]
    fn test_find_by_path_missing() {
        let xml = r#"<root><level1><target/></level1></root>"#;
        let doc = Document::parse(xml).unwrap();
        let root = doc.root_element();

        assert!(find_by_path(root, "level1/target").is_some());
        assert!(find_by_path(root, "level1/missing").is_none());
    }

    #[test]
    fn test_non_empty_text() {
        let xml = r#"<root><a>  x </a><b>   </b></root>"#;
        let doc = Document::parse(xml).unwrap();
        let root = doc.root_element();

        assert_eq!(non_empty_text(find_child(root, "a").unwrap()), Some("x".to_string()));
        assert_eq!(non_empty_text(find_child(root, "b").unwrap()), None);
    }

    #[test]
    fn test_get_attribute_any_namespace() {
        let xml = r#"<xf:bind xmlns:xxf="urn:xxf" xmlns:xf="urn:xf" id="a" xxf:required-message="Needed"/>"#;
        let doc = Document::parse(xml).unwrap();
        let root = doc.root_element();

        assert_eq!(get_attribute(root, "id"), Some("a"));
        assert_eq!(get_attribute(root, "required-message"), Some("Needed"));
        assert_eq!(get_attribute_ns(root, "urn:xxf", "required-message"), Some("Needed"));
        assert_eq!(get_attribute(root, "missing"), None);
    }

    #[test]
    fn test_element_children() {
        let xml = r#"<root>text<child1/>more<!-- c --><child2/></root>"#;
        let doc = Document::parse(xml).unwrap();

        assert_eq!(element_children(doc.root_element()).count(), 2);
    }
}
