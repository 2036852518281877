//! Tree traversal over an explicit work stack.
//!
//! The walker drives a [`DialectAdapter`] and turns every node it yields
//! into a classified, validated [`FieldDescriptor`]. Nesting depth is
//! bounded by heap memory, not by the call stack.

use serde_json::Value;

use crate::classify::{classify, type_properties};
use crate::config::format_identifier;
use crate::context::ConversionContext;
use crate::dialect::{DialectAdapter, NativeAttributes, NodeKind, RawFieldNode};
use crate::mapping::FieldOverride;
use crate::report::{FieldOutcome, ReportEntry};
use crate::types::{DataBinding, FieldDescriptor, FieldType};
use crate::validation;

/// One unit of pending work.
enum Frame<'a, 'input: 'a> {
    /// Process a node whose parent has the given source path.
    Visit {
        raw: RawFieldNode<'a, 'input>,
        parent_path: String,
        occurrence: Option<usize>,
    },
    /// All children of the innermost open group have been processed.
    Close,
}

/// A group descriptor still collecting children.
struct OpenGroup {
    descriptor: FieldDescriptor,
    /// Shared identifier for children of an exclusion group.
    exclusivity: Option<String>,
}

/// Walks one document through its dialect adapter.
pub struct Walker<'w, 'a, 'input: 'a> {
    adapter: &'w dyn DialectAdapter<'a, 'input>,
}

impl<'w, 'a, 'input: 'a> Walker<'w, 'a, 'input> {
    /// Create a walker over an adapter.
    #[must_use]
    pub fn new(adapter: &'w dyn DialectAdapter<'a, 'input>) -> Self {
        Self { adapter }
    }

    /// Produce the top-level descriptors in document order.
    ///
    /// Every emitted descriptor, containers included, is reported exactly
    /// once into the context's report.
    pub fn walk(&self, ctx: &mut ConversionContext<'_>) -> Vec<FieldDescriptor> {
        let mut stack: Vec<Frame<'a, 'input>> = Vec::new();
        push_children(&mut stack, self.adapter.enumerate_sections(), "");

        let mut open: Vec<OpenGroup> = Vec::new();
        let mut items: Vec<FieldDescriptor> = Vec::new();

        while let Some(frame) = stack.pop() {
            let (raw, parent_path, occurrence) = match frame {
                Frame::Close => {
                    if let Some(group) = open.pop() {
                        attach(&mut open, &mut items, group.descriptor);
                    }
                    continue;
                }
                Frame::Visit {
                    raw,
                    parent_path,
                    occurrence,
                } => (raw, parent_path, occurrence),
            };

            if raw.kind == NodeKind::Repeat {
                let count = self.adapter.detect_repeat(&raw);
                tracing::debug!(name = %raw.name, occurrences = count, "Expanding repeat");
                for index in (0..count).rev() {
                    stack.push(Frame::Visit {
                        raw: self.adapter.occurrence_node(&raw, index),
                        parent_path: parent_path.clone(),
                        occurrence: Some(index),
                    });
                }
                continue;
            }

            let path = join_path(&parent_path, segment(&raw), occurrence);
            match raw.kind {
                NodeKind::Transparent => {
                    push_children(&mut stack, self.adapter.enumerate_fields(&raw), &path);
                }
                NodeKind::Group | NodeKind::ExclusionGroup => {
                    let descriptor = self.build_group(&raw, &path, occurrence, ctx);
                    let exclusivity = (raw.kind == NodeKind::ExclusionGroup).then(|| path.clone());
                    open.push(OpenGroup {
                        descriptor,
                        exclusivity,
                    });
                    stack.push(Frame::Close);
                    push_children(&mut stack, self.adapter.enumerate_fields(&raw), &path);
                }
                NodeKind::Field => {
                    let mut descriptor = self.build_field(&raw, &path, ctx);
                    if let Some(shared) = open.last().and_then(|g| g.exclusivity.as_ref()) {
                        descriptor.properties.exclusive_group = Some(shared.clone());
                    }
                    attach(&mut open, &mut items, descriptor);
                }
                NodeKind::Repeat => {}
            }
        }

        items
    }

    fn build_group(
        &self,
        raw: &RawFieldNode<'a, 'input>,
        path: &str,
        occurrence: Option<usize>,
        ctx: &mut ConversionContext<'_>,
    ) -> FieldDescriptor {
        let attrs = self.adapter.native_attributes(raw);
        let rule = ctx.mapping.find_override(path);

        let mut descriptor = FieldDescriptor::new(FieldType::Group, ctx.next_id(), &raw.name, path);
        descriptor.label = rule
            .and_then(|r| r.label.clone())
            .or_else(|| raw.label.clone())
            .or_else(|| display_name(&raw.name));
        descriptor.required = rule.and_then(|r| r.required).unwrap_or(attrs.required);
        descriptor.help_text = rule
            .and_then(|r| r.help_text.clone())
            .or_else(|| attrs.help_text.clone());
        if let Some(index) = occurrence {
            descriptor.properties.repeater = Some(true);
            descriptor.properties.occurrence = Some(index);
        }

        let outcome = missing_outcome(&attrs).unwrap_or_else(|| match rule.and_then(|r| r.field_type) {
            Some(field_type) => {
                tracing::warn!(path, ?field_type, "fieldType override does not apply to a group");
                FieldOutcome::manual(format!("fieldType override '{field_type}' ignored on a group"))
            }
            None => FieldOutcome::Success,
        });
        self.record(ctx, raw, &descriptor, outcome);
        descriptor
    }

    fn build_field(
        &self,
        raw: &RawFieldNode<'a, 'input>,
        path: &str,
        ctx: &mut ConversionContext<'_>,
    ) -> FieldDescriptor {
        let mut attrs = self.adapter.native_attributes(raw);
        let rule: Option<&FieldOverride> = ctx.mapping.find_override(path);

        let classification = classify(
            ctx.dialect,
            path,
            &raw.name,
            raw.label.as_deref(),
            &attrs,
            ctx.mapping,
        );
        let field_type = classification.field_type;

        if let Some(required) = rule.and_then(|r| r.required) {
            attrs.required = required;
        }

        let mut descriptor = FieldDescriptor::new(field_type, ctx.next_id(), &raw.name, path);
        descriptor.label = rule
            .and_then(|r| r.label.clone())
            .or_else(|| raw.label.clone())
            .or_else(|| {
                (field_type == FieldType::TextInfo)
                    .then(|| attrs.value.clone())
                    .flatten()
            })
            .or_else(|| display_name(&raw.name));
        descriptor.value = field_value(field_type, attrs.value.as_deref());
        descriptor.required = attrs.required;
        descriptor.help_text = rule
            .and_then(|r| r.help_text.clone())
            .or_else(|| attrs.help_text.clone());
        descriptor.properties = type_properties(field_type, &attrs, descriptor.label.as_deref());
        descriptor.properties.databindings = rule
            .and_then(|r| r.data_binding.clone())
            .or_else(|| attrs.binding.clone().map(DataBinding::from_reference));

        let extracted = validation::extract(
            field_type,
            &raw.name,
            descriptor.label.as_deref(),
            &attrs,
            ctx.today(),
        );
        descriptor.validation = extracted.rules;

        let mut outcome = missing_outcome(&attrs).unwrap_or(FieldOutcome::Success);
        if let Some(reason) = classification.manual {
            outcome = outcome.escalate(FieldOutcome::manual(reason));
        }
        if let Some(script) = extracted.outcome {
            outcome = outcome.escalate(script);
        }

        tracing::debug!(
            path = %path,
            field_type = %field_type,
            origin = ?classification.origin,
            "Classified field"
        );
        self.record(ctx, raw, &descriptor, outcome);
        descriptor
    }

    fn record(
        &self,
        ctx: &mut ConversionContext<'_>,
        raw: &RawFieldNode<'a, 'input>,
        descriptor: &FieldDescriptor,
        outcome: FieldOutcome,
    ) {
        if outcome != FieldOutcome::Success {
            tracing::warn!(
                dialect = %self.adapter.dialect(),
                path = %descriptor.source_path,
                outcome = ?outcome,
                "Field needs attention"
            );
        }
        let entry = ReportEntry::new(segment(raw), &descriptor.source_path)
            .with_descriptor(descriptor.field_type, descriptor.label.as_deref());
        ctx.record(entry, outcome);
    }
}

/// Queue children so the first one is processed first.
fn push_children<'a, 'input: 'a>(
    stack: &mut Vec<Frame<'a, 'input>>,
    children: Vec<RawFieldNode<'a, 'input>>,
    parent_path: &str,
) {
    stack.extend(children.into_iter().rev().map(|raw| Frame::Visit {
        raw,
        parent_path: parent_path.to_string(),
        occurrence: None,
    }));
}

fn attach(open: &mut [OpenGroup], items: &mut Vec<FieldDescriptor>, descriptor: FieldDescriptor) {
    match open.last_mut() {
        Some(group) => group.descriptor.items.push(descriptor),
        None => items.push(descriptor),
    }
}

/// Path segment of a node; unnamed nodes fall back to their tag.
fn segment<'r>(raw: &'r RawFieldNode<'_, '_>) -> &'r str {
    if raw.name.is_empty() {
        raw.tag()
    } else {
        &raw.name
    }
}

fn join_path(parent: &str, segment: &str, occurrence: Option<usize>) -> String {
    let segment = match occurrence {
        Some(index) => format!("{segment}[{index}]"),
        None => segment.to_string(),
    };
    if parent.is_empty() {
        segment
    } else {
        format!("{parent}/{segment}")
    }
}

fn display_name(name: &str) -> Option<String> {
    Some(format_identifier(name)).filter(|l| !l.is_empty())
}

fn missing_outcome(attrs: &NativeAttributes) -> Option<FieldOutcome> {
    if attrs.missing.is_empty() {
        return None;
    }
    let names: Vec<String> = attrs.missing.iter().map(|m| format!("'{m}'")).collect();
    Some(FieldOutcome::error(format!(
        "missing native attribute {}",
        names.join(", ")
    )))
}

/// Initial value of a descriptor; checkboxes carry a boolean.
fn field_value(field_type: FieldType, value: Option<&str>) -> Option<Value> {
    let value = value?;
    match field_type {
        FieldType::Checkbox => Some(Value::Bool(matches!(value, "true" | "1" | "on" | "yes"))),
        FieldType::Button => None,
        _ => Some(Value::String(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DialectDefaults, DocumentMeta};
    use crate::mapping::MappingConfig;
    use crate::namespace::DialectTag;
    use chrono::Utc;
    use roxmltree::{Document, Node};

    /// Minimal adapter over a generic tree: `<g>` groups, `<x>` exclusion
    /// groups, `<r n="3">` repeats, `<t>` transparent wrappers, anything
    /// else a field named by its tag.
    struct TreeAdapter<'a, 'input> {
        root: Node<'a, 'input>,
    }

    impl<'a, 'input: 'a> TreeAdapter<'a, 'input> {
        fn raw(node: Node<'a, 'input>) -> RawFieldNode<'a, 'input> {
            let kind = match node.tag_name().name() {
                "g" => NodeKind::Group,
                "x" => NodeKind::ExclusionGroup,
                "r" => NodeKind::Repeat,
                "t" => NodeKind::Transparent,
                _ => NodeKind::Field,
            };
            let name = node.attribute("name").unwrap_or(node.tag_name().name());
            RawFieldNode::new(node, name, kind)
        }
    }

    impl<'a, 'input: 'a> DialectAdapter<'a, 'input> for TreeAdapter<'a, 'input> {
        fn dialect(&self) -> DialectTag {
            DialectTag::XForms
        }

        fn enumerate_sections(&self) -> Vec<RawFieldNode<'a, 'input>> {
            self.root.children().filter(|n| n.is_element()).map(Self::raw).collect()
        }

        fn enumerate_fields(&self, section: &RawFieldNode<'a, 'input>) -> Vec<RawFieldNode<'a, 'input>> {
            section.node.children().filter(|n| n.is_element()).map(Self::raw).collect()
        }

        fn detect_repeat(&self, node: &RawFieldNode<'a, 'input>) -> usize {
            node.node
                .attribute("n")
                .and_then(|n| n.parse().ok())
                .unwrap_or(1)
        }

        fn native_attributes(&self, node: &RawFieldNode<'a, 'input>) -> NativeAttributes {
            NativeAttributes {
                control: node.node.attribute("control").map(str::to_string),
                value: node.node.text().map(str::to_string),
                scripts: node.node.attribute("script").map(str::to_string).into_iter().collect(),
                ..NativeAttributes::default()
            }
        }

        fn document_meta(&self) -> DocumentMeta {
            DocumentMeta::default()
        }

        fn defaults(&self) -> DialectDefaults {
            DialectDefaults {
                version: None,
                ministry_id: None,
                content_id: false,
            }
        }
    }

    fn walk(xml: &str, mapping: &MappingConfig) -> (Vec<FieldDescriptor>, crate::report::ConversionReport) {
        let doc = Document::parse(xml).unwrap();
        let adapter = TreeAdapter {
            root: doc.root_element(),
        };
        let mut ctx = ConversionContext::new(mapping, DialectTag::XForms, None, Utc::now());
        let items = Walker::new(&adapter).walk(&mut ctx);
        (items, ctx.into_report())
    }

    #[test]
    fn test_nesting_and_document_order() {
        let (items, report) = walk(
            "<form><g name='a'><firstName/><t><email/></t></g><notes/></form>",
            &MappingConfig::new(),
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].field_type, FieldType::Group);
        assert_eq!(items[0].id, "1");
        let children: Vec<(&str, FieldType)> = items[0]
            .items
            .iter()
            .map(|d| (d.id.as_str(), d.field_type))
            .collect();
        assert_eq!(
            children,
            vec![("2", FieldType::TextInput), ("3", FieldType::Email)]
        );
        assert_eq!(items[0].items[1].source_path, "a/t/email");
        assert_eq!(items[1].field_type, FieldType::TextArea);
        assert_eq!(report.total(), 4);
    }

    #[test]
    fn test_repeat_expands_to_sibling_groups() {
        let (items, report) = walk("<form><r name='row' n='3'><amount/></r></form>", &MappingConfig::new());
        assert_eq!(items.len(), 3);
        let paths: Vec<&str> = items.iter().map(|d| d.source_path.as_str()).collect();
        assert_eq!(paths, vec!["row[0]", "row[1]", "row[2]"]);
        for (i, group) in items.iter().enumerate() {
            assert_eq!(group.properties.occurrence, Some(i));
            assert_eq!(group.properties.repeater, Some(true));
            assert_eq!(group.items[0].source_path, format!("row[{i}]/amount"));
        }
        let ids: std::collections::HashSet<&str> =
            items.iter().flat_map(FieldDescriptor::walk).map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), 6);
        assert_eq!(report.total(), 6);
    }

    #[test]
    fn test_exclusion_group_children_share_identifier() {
        let (items, _) = walk("<form><x name='sex'><male/><female/></x></form>", &MappingConfig::new());
        let group = &items[0];
        assert_eq!(group.field_type, FieldType::Group);
        for child in &group.items {
            assert_eq!(child.properties.exclusive_group.as_deref(), Some("sex"));
        }
    }

    #[test]
    fn test_override_applies_label_and_required() {
        let mapping = MappingConfig::new().with_override(
            FieldOverride::new("a/firstName")
                .unwrap()
                .with_label("Given name")
                .with_required(true),
        );
        let (items, _) = walk("<form><g name='a'><firstName/></g></form>", &mapping);
        let field = &items[0].items[0];
        assert_eq!(field.label.as_deref(), Some("Given name"));
        assert!(field.required);
        assert_eq!(field.validation[0].rule_type, "required");
    }

    #[test]
    fn test_degraded_fields_are_reported_once() {
        let (items, report) = walk(
            "<form><photo control='upload'/><code script='doMagic()'/><ok/></form>",
            &MappingConfig::new(),
        );
        assert_eq!(items[0].field_type, FieldType::TextInfo);
        assert_eq!(report.manual_intervention_needed().len(), 2);
        assert_eq!(report.success().len(), 1);
        assert_eq!(report.manual_intervention_needed()[1].raw.as_deref(), Some("doMagic()"));
    }

    #[test]
    fn test_group_field_type_override_needs_review() {
        let mapping = MappingConfig::new()
            .with_override(FieldOverride::new("address").unwrap().with_field_type(FieldType::Email));
        let (items, report) = walk("<form><g name='address'><street/></g></form>", &mapping);
        assert_eq!(items[0].field_type, FieldType::Group);
        assert_eq!(items[0].items[0].field_type, FieldType::TextInput);
        let manual = report.manual_intervention_needed();
        assert_eq!(manual.len(), 1);
        assert_eq!(manual[0].source_path, "address");
        assert!(manual[0].message.as_deref().unwrap().contains("ignored on a group"));
    }

    #[test]
    fn test_deep_nesting_does_not_recurse() {
        let depth = 128;
        let xml = format!("<form>{}<leaf/>{}</form>", "<g>".repeat(depth), "</g>".repeat(depth));
        let (items, report) = walk(&xml, &MappingConfig::new());
        assert_eq!(items.len(), 1);
        assert_eq!(report.total(), depth + 1);
    }
}
