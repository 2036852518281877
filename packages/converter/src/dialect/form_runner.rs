//! Adapter for Orbeon Form Runner documents.
//!
//! Sections are the children of the `fr-form-instance` form element and
//! hold grids. Grids are layout only, unless they repeat through
//! `<grid>-iteration` rows. Labels, hints and item lists live in
//! `fr-form-resources`; validation lives in the nested `fr-form-binds`.

use roxmltree::{Document, Node};

use super::xforms::{apply_bind, control_key, html_title, instance, ModelIndex, ITERATION_SUFFIX};
use super::{DialectAdapter, DialectDefaults, DocumentMeta, NativeAttributes, NodeKind, RawFieldNode};
use crate::config::{FORM_INSTANCE_ID, FORM_RESOURCES_ID, XML_NS};
use crate::namespace::DialectTag;
use crate::types::ListItem;
use crate::xml::{
    collect_text, element_children, find_by_path, find_child, find_children, get_tag_name, has_tag,
    non_empty_text,
};

/// Preferred resource language.
const RESOURCE_LANG: &str = "en";

/// Walks Form Runner instances.
pub struct FormRunnerAdapter<'a, 'input> {
    doc: &'a Document<'input>,
    form: Option<Node<'a, 'input>>,
    resources: Option<Node<'a, 'input>>,
    model: ModelIndex<'a, 'input>,
}

impl<'a, 'input: 'a> FormRunnerAdapter<'a, 'input> {
    /// Index the form instance, resources and binds.
    #[must_use]
    pub fn new(doc: &'a Document<'input>) -> Self {
        let form = instance(doc, FORM_INSTANCE_ID).and_then(|i| element_children(i).next());
        if form.is_none() {
            tracing::warn!(instance = FORM_INSTANCE_ID, "Form instance not found");
        }
        let resources = instance(doc, FORM_RESOURCES_ID)
            .and_then(|i| element_children(i).next())
            .and_then(|all| {
                let langs: Vec<_> = find_children(all, "resource").collect();
                langs
                    .iter()
                    .find(|r| r.attribute((XML_NS, "lang")) == Some(RESOURCE_LANG))
                    .or_else(|| langs.first())
                    .copied()
            });
        Self {
            doc,
            form,
            resources,
            model: ModelIndex::build(doc),
        }
    }

    /// Resource entry of a control.
    fn resource(&self, name: &str) -> Option<Node<'a, 'input>> {
        self.resources.and_then(|r| find_child(r, name))
    }

    fn resource_text(&self, name: &str, key: &str) -> Option<String> {
        self.resource(name)
            .and_then(|r| find_child(r, key))
            .map(collect_text)
            .filter(|t| !t.is_empty())
    }

    fn template_row(&self, name: &str) -> Option<Node<'a, 'input>> {
        instance(self.doc, &format!("{name}-template")).and_then(|i| element_children(i).next())
    }

    fn iterations(&self, node: Node<'a, 'input>, name: &str) -> Vec<Node<'a, 'input>> {
        let iteration = format!("{name}{ITERATION_SUFFIX}");
        element_children(node)
            .filter(|c| get_tag_name(*c) == iteration)
            .collect()
    }

    fn raw(&self, node: Node<'a, 'input>) -> RawFieldNode<'a, 'input> {
        let name = get_tag_name(node);
        let control = self.model.control(node);
        let control_tag = control.map(get_tag_name);
        let repeat_declared = control
            .and_then(|c| c.attribute("repeat"))
            .is_some_and(|r| matches!(r, "true" | "content"));
        let compound = element_children(node).next().is_some();

        let kind = if repeat_declared || !self.iterations(node, name).is_empty() {
            NodeKind::Repeat
        } else if control_tag == Some("grid") || (control.is_none() && name.starts_with("grid-")) {
            NodeKind::Transparent
        } else if compound || control_tag == Some("section") {
            NodeKind::Group
        } else {
            NodeKind::Field
        };
        RawFieldNode::new(node, name, kind).with_label(self.resource_text(name, "label"))
    }
}

impl<'a, 'input: 'a> DialectAdapter<'a, 'input> for FormRunnerAdapter<'a, 'input> {
    fn dialect(&self) -> DialectTag {
        DialectTag::FormRunner
    }

    fn enumerate_sections(&self) -> Vec<RawFieldNode<'a, 'input>> {
        self.form
            .map(|form| element_children(form).map(|c| self.raw(c)).collect())
            .unwrap_or_default()
    }

    fn enumerate_fields(&self, section: &RawFieldNode<'a, 'input>) -> Vec<RawFieldNode<'a, 'input>> {
        element_children(section.node)
            .map(|c| self.raw(c))
            .collect()
    }

    fn detect_repeat(&self, node: &RawFieldNode<'a, 'input>) -> usize {
        self.iterations(node.node, &node.name).len().max(1)
    }

    fn occurrence_node(&self, node: &RawFieldNode<'a, 'input>, index: usize) -> RawFieldNode<'a, 'input> {
        let target = self
            .iterations(node.node, &node.name)
            .get(index)
            .copied()
            .or_else(|| self.template_row(&node.name))
            .unwrap_or(node.node);
        RawFieldNode {
            node: target,
            kind: NodeKind::Group,
            ..node.clone()
        }
    }

    fn native_attributes(&self, node: &RawFieldNode<'a, 'input>) -> NativeAttributes {
        let mut attrs = NativeAttributes::default();
        let bind = self.model.bind(node.node);
        if let Some(bind) = bind {
            apply_bind(&mut attrs, bind);
        }
        if node.kind != NodeKind::Field {
            return attrs;
        }
        if bind.is_none() {
            attrs.missing.push("bind");
        }

        let control = self.model.control(node.node);
        let is_attachment =
            node.node.attribute("filename").is_some() || node.node.attribute("mediatype").is_some();
        attrs.control = if is_attachment {
            Some("attachment".to_string())
        } else {
            control_key(control, bind)
        };

        attrs.value = non_empty_text(node.node);
        if control.map(get_tag_name) == Some("explanation") {
            attrs.value = self
                .resource_text(&node.name, "text")
                .or_else(|| control.and_then(|c| find_by_path(c, "text")).map(collect_text));
        }
        attrs.help_text = self.resource_text(&node.name, "hint");
        if attrs.constraint_message.is_none() {
            attrs.constraint_message = self.resource_text(&node.name, "alert");
        }
        attrs.options = self
            .resource(&node.name)
            .map(|r| {
                find_children(r, "item")
                    .filter_map(|item| {
                        let text = find_child(item, "label").map(collect_text)?;
                        let value = find_child(item, "value").map(collect_text);
                        Some(ListItem::new(text, value))
                    })
                    .collect()
            })
            .unwrap_or_default();
        attrs
    }

    fn document_meta(&self) -> DocumentMeta {
        let metadata_title = || {
            instance(self.doc, "fr-form-metadata")
                .and_then(|i| i.descendants().find(|n| has_tag(*n, "title")))
                .and_then(non_empty_text)
        };
        DocumentMeta {
            title: html_title(self.doc).or_else(metadata_title),
            form_id: None,
        }
    }

    fn defaults(&self) -> DialectDefaults {
        DialectDefaults {
            version: None,
            ministry_id: None,
            content_id: false,
        }
    }
}
