//! Adapter for plain XForms documents.
//!
//! The data instance drives traversal: compound elements are groups,
//! leaves are fields. Controls in the body are matched to instance nodes
//! through their `bind` id or `ref`, and binds supply validation.

use std::collections::HashMap;

use roxmltree::{Document, Node};

use super::{
    parse_native_bool, DialectAdapter, DialectDefaults, DocumentMeta, NativeAttributes, NodeKind,
    RawFieldNode,
};
use crate::config::{FORM_BINDS_ID, FORM_INSTANCE_ID, XFORMS_NS, XHTML_NS, XXFORMS_NS};
use crate::namespace::DialectTag;
use crate::types::ListItem;
use crate::xml::{
    collect_text, element_children, find_child, find_children, get_attribute, get_attribute_ns,
    get_tag_name, has_tag, has_tag_ns, non_empty_text,
};

/// XForms control elements that can bind to an instance node.
const CONTROL_TAGS: [&str; 10] = [
    "input", "secret", "textarea", "output", "upload", "range", "trigger", "submit", "select",
    "select1",
];

/// Suffix of repeated-row elements in generated forms.
pub(super) const ITERATION_SUFFIX: &str = "-iteration";

/// Suffix of bind ids in generated forms (`child-name-bind`).
const BIND_ID_SUFFIX: &str = "-bind";

/// Binds and controls of an XForms model, indexed by the instance path
/// they resolve to (`contact/firstName`).
pub(super) struct ModelIndex<'a, 'input> {
    binds: PathIndex<'a, 'input>,
    controls: PathIndex<'a, 'input>,
    controls_by_bind: HashMap<String, Node<'a, 'input>>,
    repeats: PathIndex<'a, 'input>,
}

impl<'a, 'input: 'a> ModelIndex<'a, 'input> {
    /// Index every XForms `bind`, every bound control and every repeat.
    pub(super) fn build(doc: &'a Document<'input>) -> Self {
        let mut binds = PathIndex::default();
        let mut controls = PathIndex::default();
        let mut controls_by_bind = HashMap::new();
        let mut repeats = PathIndex::default();

        for node in doc.descendants().filter(|n| n.is_element()) {
            if has_tag_ns(node, XFORMS_NS, "bind") {
                binds.insert(bind_path(node), node);
                continue;
            }
            if has_tag_ns(node, XFORMS_NS, "repeat") {
                repeats.insert(control_path(node), node);
                continue;
            }
            if let Some(bind_ref) = node.attribute("bind") {
                controls_by_bind.entry(bind_ref.to_string()).or_insert(node);
            } else if CONTROL_TAGS.contains(&get_tag_name(node)) && node.attribute("ref").is_some() {
                controls.insert(control_path(node), node);
            }
        }

        Self {
            binds,
            controls,
            controls_by_bind,
            repeats,
        }
    }

    /// The bind declared for an instance element.
    pub(super) fn bind(&self, node: Node<'_, '_>) -> Option<Node<'a, 'input>> {
        self.binds.lookup(&instance_path(node))
    }

    /// The control bound to an instance element, by bind id or ref.
    pub(super) fn control(&self, node: Node<'_, '_>) -> Option<Node<'a, 'input>> {
        let path = instance_path(node);
        let bind_id = match self.binds.lookup(&path) {
            Some(bind) => bind.attribute("id").map(str::to_string),
            None => Some(format!("{}{BIND_ID_SUFFIX}", get_tag_name(node))),
        };
        bind_id
            .and_then(|id| self.controls_by_bind.get(&id).copied())
            .or_else(|| self.controls.lookup(&path))
    }

    /// Whether an `xf:repeat` iterates over this instance element.
    pub(super) fn is_repeat_target(&self, node: Node<'_, '_>) -> bool {
        self.repeats.lookup(&instance_path(node)).is_some()
    }
}

/// Model nodes keyed by the instance path they address.
#[derive(Default)]
struct PathIndex<'a, 'input> {
    entries: Vec<(String, Node<'a, 'input>)>,
}

impl<'a, 'input: 'a> PathIndex<'a, 'input> {
    fn insert(&mut self, path: String, node: Node<'a, 'input>) {
        if !path.is_empty() {
            self.entries.push((path, node));
        }
    }

    /// Resolve an instance path.
    ///
    /// An exact match wins. Otherwise entries whose path agrees with the
    /// query on its trailing segments are candidates; one candidate is
    /// taken as is, several are narrowed to the most specific entry that
    /// is a suffix of the query. Same-named leaves elsewhere never match.
    fn lookup(&self, path: &str) -> Option<Node<'a, 'input>> {
        if let Some((_, node)) = self.entries.iter().find(|(p, _)| p == path) {
            return Some(*node);
        }
        let candidates: Vec<&(String, Node<'a, 'input>)> = self
            .entries
            .iter()
            .filter(|(p, _)| is_segment_suffix(p, path) || is_segment_suffix(path, p))
            .collect();
        match candidates.as_slice() {
            [] => None,
            [(_, node)] => Some(*node),
            many => many
                .iter()
                .filter(|(p, _)| is_segment_suffix(path, p))
                .max_by_key(|(p, _)| p.len())
                .map(|(_, node)| *node),
        }
    }
}

/// Whether `tail` equals `whole` or ends it on a segment boundary.
fn is_segment_suffix(whole: &str, tail: &str) -> bool {
    whole == tail
        || whole
            .strip_suffix(tail)
            .is_some_and(|head| head.ends_with('/'))
}

/// Path of an instance element below its data root, without
/// `-iteration` rows: `section-1/grid-2/amount`.
pub(super) fn instance_path(node: Node<'_, '_>) -> String {
    let mut segments: Vec<&str> = node
        .ancestors()
        .filter(|n| n.is_element())
        .take_while(|n| {
            n.parent_element()
                .is_some_and(|p| !has_tag_ns(p, XFORMS_NS, "instance"))
        })
        .map(get_tag_name)
        .filter(|name| !name.ends_with(ITERATION_SUFFIX))
        .collect();
    segments.reverse();
    segments.join("/")
}

/// Instance path addressed by a bind, following its enclosing binds.
fn bind_path(bind: Node<'_, '_>) -> String {
    let mut exprs = Vec::new();
    for node in bind.ancestors().filter(|n| has_tag_ns(*n, XFORMS_NS, "bind")) {
        if node.attribute("id") == Some(FORM_BINDS_ID) {
            break;
        }
        let expr = node
            .attribute("nodeset")
            .or_else(|| node.attribute("ref"))
            .or_else(|| get_attribute(node, "name"));
        if let Some(expr) = expr {
            exprs.push(expr);
        }
    }
    resolve_steps(exprs.into_iter().rev())
}

/// Instance path addressed by a control, following enclosing groups and
/// repeats.
fn control_path(control: Node<'_, '_>) -> String {
    let mut exprs: Vec<&str> = control
        .ancestors()
        .filter(|n| n.tag_name().namespace() == Some(XFORMS_NS))
        .filter_map(|n| n.attribute("nodeset").or_else(|| n.attribute("ref")))
        .collect();
    exprs.reverse();
    resolve_steps(exprs.into_iter())
}

/// Join nested `ref`/`nodeset` expressions, outermost first, into one
/// instance path. An absolute expression restarts the path.
fn resolve_steps<'e>(exprs: impl Iterator<Item = &'e str>) -> String {
    let mut steps: Vec<String> = Vec::new();
    for expr in exprs {
        let (absolute, relative) = ref_steps(expr);
        if absolute {
            steps.clear();
        }
        steps.extend(relative);
    }
    steps.join("/")
}

/// Steps of one XPath reference, relative to the data root.
///
/// `instance('x')/a/b` and `/data/a/b` are absolute and both yield
/// `a/b`; `./a/@b` yields `a/b`.
fn ref_steps(expr: &str) -> (bool, Vec<String>) {
    let expr = expr.trim();
    let (absolute, rest, skip_root) = match expr.strip_prefix("instance(") {
        Some(rest) => (true, rest.split_once(')').map_or("", |(_, r)| r), false),
        None => (expr.starts_with('/'), expr, expr.starts_with('/')),
    };
    let steps = rest
        .split('/')
        .map(|s| s.trim().trim_start_matches('@'))
        .map(|s| s.rsplit(':').next().unwrap_or(s))
        .filter(|s| !s.is_empty() && *s != ".")
        .skip(usize::from(skip_root))
        .filter(|s| !s.ends_with(ITERATION_SUFFIX))
        .map(str::to_string)
        .collect();
    (absolute, steps)
}

/// Find an `xf:instance` by id.
pub(super) fn instance<'a, 'input>(doc: &'a Document<'input>, id: &str) -> Option<Node<'a, 'input>> {
    doc.descendants()
        .find(|n| has_tag_ns(*n, XFORMS_NS, "instance") && n.attribute("id") == Some(id))
}

/// Text of the XHTML `<title>`.
pub(super) fn html_title(doc: &Document<'_>) -> Option<String> {
    doc.descendants()
        .find(|n| has_tag_ns(*n, XHTML_NS, "title"))
        .map(collect_text)
        .filter(|t| !t.is_empty())
}

/// Control kind key of a bound control, refined by the bind's datatype.
pub(super) fn control_key(control: Option<Node<'_, '_>>, bind: Option<Node<'_, '_>>) -> Option<String> {
    let datatype = bind
        .and_then(|b| b.attribute("type"))
        .map(|t| t.rsplit(':').next().unwrap_or(t).to_string());

    let Some(control) = control else {
        return datatype.map(|t| format!("type:{t}"));
    };
    let tag = get_tag_name(control);
    let appearance = control.attribute("appearance").unwrap_or_default();
    let key = match tag {
        "input" if appearance.contains("checkbox") || control.attribute("type") == Some("checkbox") => {
            "input:checkbox".to_string()
        }
        "input" => match datatype {
            Some(t) if matches!(t.as_str(), "date" | "dateTime" | "boolean" | "email") => {
                format!("type:{t}")
            }
            _ => "input".to_string(),
        },
        "select1" | "select" if appearance.contains("full") => format!("{tag}:full"),
        other => other.to_string(),
    };
    Some(key)
}

/// Validation-related bind attributes.
pub(super) fn apply_bind(attrs: &mut NativeAttributes, bind: Node<'_, '_>) {
    attrs.required = get_attribute(bind, "required").is_some_and(parse_native_bool);
    let message = |name: &str| {
        get_attribute_ns(bind, XXFORMS_NS, name)
            .or_else(|| get_attribute(bind, name))
            .map(str::to_string)
    };
    attrs.required_message = message("required-message");
    attrs.constraint_message = message("constraint-message");
    attrs.pattern = get_attribute(bind, "pattern").map(str::to_string);
    attrs.min = get_attribute(bind, "min").map(str::to_string);
    attrs.max = get_attribute(bind, "max").map(str::to_string);
    if let Some(constraint) = bind.attribute("constraint") {
        attrs.scripts.push(constraint.trim().to_string());
    }
    attrs.scripts.extend(
        element_children(bind)
            .filter(|c| has_tag(*c, "constraint"))
            .filter_map(|c| c.attribute("value"))
            .map(|v| v.trim().to_string()),
    );
}

/// Inline `xf:item` options of a select control.
pub(super) fn control_items(control: Node<'_, '_>) -> Vec<ListItem> {
    find_children(control, "item")
        .filter_map(|item| {
            let text = find_child(item, "label").map(collect_text)?;
            let value = find_child(item, "value").map(collect_text);
            Some(ListItem::new(text, value))
        })
        .collect()
}

/// Walks plain XForms instances.
pub struct XFormsAdapter<'a, 'input> {
    doc: &'a Document<'input>,
    data: Option<Node<'a, 'input>>,
    model: ModelIndex<'a, 'input>,
}

impl<'a, 'input: 'a> XFormsAdapter<'a, 'input> {
    /// Index the model of a document.
    #[must_use]
    pub fn new(doc: &'a Document<'input>) -> Self {
        let instance = instance(doc, FORM_INSTANCE_ID).or_else(|| {
            doc.descendants()
                .find(|n| has_tag_ns(*n, XFORMS_NS, "instance"))
        });
        let data = instance.and_then(|i| element_children(i).next());
        if data.is_none() {
            tracing::warn!("No XForms instance data found");
        }
        Self {
            doc,
            data,
            model: ModelIndex::build(doc),
        }
    }

    fn raw(&self, node: Node<'a, 'input>) -> RawFieldNode<'a, 'input> {
        let name = get_tag_name(node);
        let compound = element_children(node).next().is_some();
        let kind = if self.model.is_repeat_target(node)
            || element_children(node).any(|c| get_tag_name(c) == format!("{name}{ITERATION_SUFFIX}"))
        {
            NodeKind::Repeat
        } else if compound {
            NodeKind::Group
        } else {
            NodeKind::Field
        };
        let label = self
            .model
            .control(node)
            .and_then(|c| find_child(c, "label"))
            .map(collect_text);
        RawFieldNode::new(node, name, kind).with_label(label)
    }

    /// Occurrence containers of a repeat: iteration children, else the
    /// repeated siblings themselves.
    fn occurrences(&self, node: &RawFieldNode<'a, 'input>) -> Vec<Node<'a, 'input>> {
        let iteration = format!("{}{ITERATION_SUFFIX}", node.name);
        let iterations: Vec<_> = element_children(node.node)
            .filter(|c| get_tag_name(*c) == iteration)
            .collect();
        if !iterations.is_empty() {
            return iterations;
        }
        node.node
            .parent_element()
            .map(|p| {
                element_children(p)
                    .filter(|c| get_tag_name(*c) == node.name)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl<'a, 'input: 'a> DialectAdapter<'a, 'input> for XFormsAdapter<'a, 'input> {
    fn dialect(&self) -> DialectTag {
        DialectTag::XForms
    }

    fn enumerate_sections(&self) -> Vec<RawFieldNode<'a, 'input>> {
        self.data
            .map(|data| self.enumerate_fields(&RawFieldNode::new(data, "", NodeKind::Transparent)))
            .unwrap_or_default()
    }

    fn enumerate_fields(&self, section: &RawFieldNode<'a, 'input>) -> Vec<RawFieldNode<'a, 'input>> {
        let mut seen_repeats: Vec<&str> = Vec::new();
        let mut fields = Vec::new();
        for child in element_children(section.node) {
            let raw = self.raw(child);
            if raw.kind == NodeKind::Repeat {
                let name = get_tag_name(child);
                if seen_repeats.contains(&name) {
                    continue;
                }
                seen_repeats.push(name);
            }
            fields.push(raw);
        }
        fields
    }

    fn detect_repeat(&self, node: &RawFieldNode<'a, 'input>) -> usize {
        self.occurrences(node).len().max(1)
    }

    fn occurrence_node(&self, node: &RawFieldNode<'a, 'input>, index: usize) -> RawFieldNode<'a, 'input> {
        let target = self
            .occurrences(node)
            .get(index)
            .copied()
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
        let control = self.model.control(node.node);
        if let Some(bind) = bind {
            apply_bind(&mut attrs, bind);
        }
        if node.kind != NodeKind::Field {
            return attrs;
        }

        attrs.control = control_key(control, bind);
        attrs.value = non_empty_text(node.node);
        if let Some(control) = control {
            attrs.help_text = find_child(control, "hint")
                .or_else(|| find_child(control, "help"))
                .map(collect_text)
                .filter(|t| !t.is_empty());
            if attrs.constraint_message.is_none() {
                attrs.constraint_message = find_child(control, "alert")
                    .map(collect_text)
                    .filter(|t| !t.is_empty());
            }
            attrs.options = control_items(control);
            if has_tag(control, "output") && attrs.value.is_none() {
                attrs.value = control.attribute("value").map(str::to_string);
            }
        } else if bind.is_none() {
            attrs.missing.push("bind");
        }
        attrs
    }

    fn document_meta(&self) -> DocumentMeta {
        DocumentMeta {
            title: html_title(self.doc),
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
