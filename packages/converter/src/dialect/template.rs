//! Adapter for the XFA template dialect (XDP packages).
//!
//! Shape: `template/subform` is the form root; nested `subform`s are
//! sections, `exclGroup`s are radio sets, `field`/`draw` are leaves, and a
//! `pageSet` carries master-page content. Repeats are declared by an
//! `<occur>` child.

use roxmltree::{Document, Node};

use super::{
    parse_native_bool, DialectAdapter, DialectDefaults, DocumentMeta, NativeAttributes, NodeKind,
    RawFieldNode,
};
use crate::config::{normalize_picture, strip_markup, FORM_NUMBER_PATTERN, TEMPLATE_NS_MARKER};
use crate::namespace::{DialectTag, NamespaceTable};
use crate::types::ListItem;
use crate::xml::{
    collect_text, element_children, find_by_path, find_child, find_children, get_attribute,
    get_tag_name, has_tag, non_empty_text,
};

/// Label of the group holding master-page content.
const MASTER_PAGE_LABEL: &str = "Master Page";

/// Name of the draw carrying the form title.
const TITLE_DRAW: &str = "FormTitle";

/// Walks `template` trees.
pub struct TemplateAdapter<'a, 'input> {
    root: Node<'a, 'input>,
}

impl<'a, 'input: 'a> TemplateAdapter<'a, 'input> {
    /// Locate the root subform of an XDP package or bare template.
    #[must_use]
    pub fn new(doc: &'a Document<'input>, namespaces: &NamespaceTable) -> Self {
        let is_template_ns = |node: &Node<'_, '_>| {
            node.tag_name()
                .namespace()
                .is_some_and(|ns| ns.contains(TEMPLATE_NS_MARKER))
        };
        let template = doc
            .descendants()
            .find(|n| has_tag(*n, "template") && is_template_ns(n))
            .unwrap_or_else(|| doc.root_element());
        let root = find_child(template, "subform").unwrap_or(template);
        tracing::debug!(
            root = root.attribute("name").unwrap_or_default(),
            namespaces = namespaces.len(),
            "Template root subform located"
        );
        Self { root }
    }

    fn raw(&self, node: Node<'a, 'input>) -> Option<RawFieldNode<'a, 'input>> {
        let name = node.attribute("name").unwrap_or_default();
        let kind = match get_tag_name(node) {
            "field" | "draw" => NodeKind::Field,
            "exclGroup" => NodeKind::ExclusionGroup,
            "subform" if is_repeating(node) => NodeKind::Repeat,
            "subform" if name.is_empty() => NodeKind::Transparent,
            "subform" => NodeKind::Group,
            "pageSet" => {
                let has_content = node
                    .descendants()
                    .any(|n| has_tag(n, "draw") || has_tag(n, "field"));
                if !has_content {
                    return None;
                }
                return Some(
                    RawFieldNode::new(node, "pageSet", NodeKind::Group)
                        .with_label(Some(MASTER_PAGE_LABEL.to_string())),
                );
            }
            "pageArea" | "subformSet" | "area" => NodeKind::Transparent,
            _ => return None,
        };
        let fallback = match get_tag_name(node) {
            "draw" => "draw",
            _ => "",
        };
        let name = if name.is_empty() { fallback } else { name };
        Some(RawFieldNode::new(node, name, kind).with_label(caption(node)))
    }
}

impl<'a, 'input: 'a> DialectAdapter<'a, 'input> for TemplateAdapter<'a, 'input> {
    fn dialect(&self) -> DialectTag {
        DialectTag::Template
    }

    fn enumerate_sections(&self) -> Vec<RawFieldNode<'a, 'input>> {
        let name = self.root.attribute("name").unwrap_or("form");
        vec![RawFieldNode::new(self.root, name, NodeKind::Transparent)]
    }

    fn enumerate_fields(&self, section: &RawFieldNode<'a, 'input>) -> Vec<RawFieldNode<'a, 'input>> {
        element_children(section.node)
            .filter_map(|child| self.raw(child))
            .collect()
    }

    fn detect_repeat(&self, node: &RawFieldNode<'a, 'input>) -> usize {
        let Some(occur) = find_child(node.node, "occur") else {
            return 1;
        };
        let read = |attr: &str| occur.attribute(attr).and_then(|v| v.trim().parse::<i64>().ok());
        let count = read("initial").or_else(|| read("min")).unwrap_or(1);
        let count = match read("max") {
            Some(max) if max >= 0 => count.min(max),
            _ => count,
        };
        usize::try_from(count).unwrap_or(0).max(1)
    }

    fn native_attributes(&self, node: &RawFieldNode<'a, 'input>) -> NativeAttributes {
        let el = node.node;
        let mut attrs = NativeAttributes::default();

        match get_tag_name(el) {
            "draw" => {
                attrs.control = Some("draw".to_string());
                attrs.value = draw_text(el);
                return attrs;
            }
            "field" => {}
            _ => {
                if el.attribute("name").is_none() && node.kind != NodeKind::Transparent {
                    attrs.missing.push("name");
                }
                return attrs;
            }
        }

        if el.attribute("name").is_none() {
            attrs.missing.push("name");
        }

        let widget = find_child(el, "ui").and_then(|ui| {
            element_children(ui).find(|w| !matches!(get_tag_name(*w), "picture" | "extras"))
        });
        attrs.control = match widget {
            Some(w) => Some(control_key(w, el)),
            None => {
                attrs.missing.push("ui");
                Some("textEdit".to_string())
            }
        };

        if let Some(validate) = find_child(el, "validate") {
            attrs.required = validate.attribute("nullTest").is_some_and(parse_native_bool);
            for text in find_by_path(validate, "message")
                .into_iter()
                .flat_map(|m| find_children(m, "text"))
            {
                match text.attribute("name") {
                    Some("nullTest") => attrs.required_message = non_empty_text(text),
                    Some("scriptTest" | "formatTest") => {
                        attrs.constraint_message = non_empty_text(text);
                    }
                    _ => {}
                }
            }
            attrs.scripts.extend(find_children(validate, "script").filter_map(non_empty_text));
        }
        attrs.scripts.extend(
            find_children(el, "event")
                .filter(|e| e.attribute("activity") == Some("validate"))
                .filter_map(|e| find_child(e, "script"))
                .filter_map(non_empty_text),
        );

        attrs.format = find_by_path(el, "format/picture")
            .or_else(|| find_by_path(el, "ui/picture"))
            .and_then(non_empty_text)
            .map(|p| normalize_picture(&p));
        attrs.binding = find_child(el, "bind")
            .filter(|b| b.attribute("match") != Some("none"))
            .and_then(|b| b.attribute("ref"))
            .map(str::to_string);
        attrs.help_text = find_by_path(el, "assist/toolTip")
            .or_else(|| find_by_path(el, "assist/speak"))
            .and_then(non_empty_text);
        attrs.value = find_child(el, "value")
            .and_then(|v| element_children(v).next())
            .and_then(non_empty_text);
        attrs.options = list_items(el);
        attrs
    }

    fn document_meta(&self) -> DocumentMeta {
        let draws = || self.root.descendants().filter(|n| has_tag(*n, "draw"));
        let title = draws()
            .find(|d| d.attribute("name") == Some(TITLE_DRAW))
            .and_then(draw_text)
            .map(|t| strip_markup(&t));
        let form_id = draws()
            .filter_map(draw_text)
            .find_map(|text| {
                FORM_NUMBER_PATTERN
                    .captures(&text)
                    .map(|c| c[1].to_string())
            });
        DocumentMeta { title, form_id }
    }

    fn defaults(&self) -> DialectDefaults {
        DialectDefaults {
            version: Some("1.0"),
            ministry_id: Some("0"),
            content_id: true,
        }
    }
}

/// Whether a subform declares more than one possible occurrence.
fn is_repeating(subform: Node<'_, '_>) -> bool {
    let Some(occur) = find_child(subform, "occur") else {
        return false;
    };
    let read = |attr: &str| occur.attribute(attr).and_then(|v| v.trim().parse::<i64>().ok());
    matches!(read("max"), Some(max) if max < 0 || max > 1)
        || read("initial").is_some_and(|i| i > 1)
        || read("min").is_some_and(|m| m > 1)
}

/// Control kind key of a `<ui>` widget.
fn control_key(widget: Node<'_, '_>, field: Node<'_, '_>) -> String {
    let tag = get_tag_name(widget);
    let in_excl_group = field.parent_element().is_some_and(|p| has_tag(p, "exclGroup"));
    match tag {
        "textEdit" if widget.attribute("multiLine") == Some("1") => "textEdit:multiline".to_string(),
        "checkButton" if in_excl_group => "checkButton:exclusive".to_string(),
        "choiceList" if widget.attribute("open") == Some("multiSelect") => {
            "choiceList:multi".to_string()
        }
        other => other.to_string(),
    }
}

/// Caption text of a field, draw, subform or exclusion group.
fn caption(node: Node<'_, '_>) -> Option<String> {
    let value = find_by_path(node, "caption/value")?;
    let text = match find_child(value, "exData") {
        Some(ex) => strip_markup(&collect_text(ex)),
        None => element_children(value).next().map(collect_text)?,
    };
    Some(text).filter(|t| !t.is_empty())
}

/// Static text of a draw; rich text is flattened.
fn draw_text(draw: Node<'_, '_>) -> Option<String> {
    let value = find_child(draw, "value")?;
    let content = element_children(value).next()?;
    let text = if has_tag(content, "exData") || get_attribute(content, "contentType").is_some() {
        strip_markup(&collect_text(content))
    } else {
        collect_text(content)
    };
    Some(text).filter(|t| !t.is_empty())
}

/// Options of a choice list or check button.
///
/// A second `<items save="1">` list supplies the stored values.
fn list_items(field: Node<'_, '_>) -> Vec<ListItem> {
    let lists: Vec<Node<'_, '_>> = find_children(field, "items").collect();
    let Some(display) = lists
        .iter()
        .find(|l| l.attribute("save") != Some("1"))
        .or_else(|| lists.first())
    else {
        return Vec::new();
    };
    let saved: Vec<String> = lists
        .iter()
        .find(|l| l.attribute("save") == Some("1") && l.id() != display.id())
        .map(|l| element_children(*l).map(collect_text).collect())
        .unwrap_or_default();

    element_children(*display)
        .map(collect_text)
        .enumerate()
        .filter(|(_, text)| !text.is_empty())
        .map(|(i, text)| ListItem::new(text, saved.get(i).cloned()))
        .collect()
}
