//! Core data types for the canonical form definition.
//!
//! These are the values the engine hands back to its caller. Everything
//! here serializes to the JSON shape consumed by the form renderer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical field types of the output schema.
///
/// `Group` is the container type used for sections, subforms, exclusion
/// groups and repeat occurrences. Every other variant is a leaf control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    TextInput,
    TextArea,
    Date,
    Dropdown,
    Checkbox,
    Radio,
    Button,
    Signature,
    TextInfo,
    Email,
    Phone,
    Address,
    Group,
}

impl FieldType {
    /// All leaf control types, in schema order.
    pub const LEAF_TYPES: [FieldType; 12] = [
        Self::TextInput,
        Self::TextArea,
        Self::Date,
        Self::Dropdown,
        Self::Checkbox,
        Self::Radio,
        Self::Button,
        Self::Signature,
        Self::TextInfo,
        Self::Email,
        Self::Phone,
        Self::Address,
    ];

    /// Get the string value used in JSON output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextInput => "text-input",
            Self::TextArea => "text-area",
            Self::Date => "date",
            Self::Dropdown => "dropdown",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
            Self::Button => "button",
            Self::Signature => "signature",
            Self::TextInfo => "text-info",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Address => "address",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no canonical field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFieldType(pub String);

impl fmt::Display for UnknownFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown field type '{}'", self.0)
    }
}

impl std::error::Error for UnknownFieldType {}

impl FromStr for FieldType {
    type Err = UnknownFieldType;

    /// Parse a leaf type name. `group` is not accepted: containers are
    /// decided by the source structure, never by configuration.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::LEAF_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownFieldType(s.to_string()))
    }
}

/// A single validation rule attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    /// Rule kind: `required`, `pattern`, `min`, `max`, `minLength`,
    /// `maxLength`, `maxDate`, `minDate`.
    #[serde(rename = "type")]
    pub rule_type: String,

    /// Rule operand.
    pub value: Value,

    /// Message shown when the rule fails.
    pub error_message: String,
}

impl ValidationRule {
    /// Create a new validation rule.
    #[must_use]
    pub fn new(
        rule_type: impl Into<String>,
        value: impl Into<Value>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            rule_type: rule_type.into(),
            value: value.into(),
            error_message: error_message.into(),
        }
    }
}

/// One option of a dropdown or radio list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    pub text: String,
    pub value: String,
    pub name: String,
}

impl ListItem {
    /// Create an item whose value falls back to its text.
    #[must_use]
    pub fn new(text: impl Into<String>, value: Option<String>) -> Self {
        let text = text.into();
        let value = value.filter(|v| !v.is_empty()).unwrap_or_else(|| text.clone());
        Self {
            name: value.clone(),
            text,
            value,
        }
    }
}

/// Data binding to an external record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataBinding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub path: String,
}

impl DataBinding {
    /// Build a binding for a native reference, inferring the source record
    /// from well-known path fragments.
    #[must_use]
    pub fn from_reference(path: impl Into<String>) -> Self {
        let path = path.into();
        let source = if path.contains("Contact") {
            Some("Contact".to_string())
        } else if path.contains("Service") {
            Some("Service Request".to_string())
        } else {
            None
        };
        Self { source, path }
    }
}

/// Identifier of the source construct, used by the renderer for code hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeContext {
    pub name: String,
}

/// Type-dependent descriptor properties.
///
/// Only the keys relevant to a descriptor's type are populated; everything
/// else is left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_items: Option<Vec<ListItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_multi: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub databindings: Option<DataBinding>,
    /// Shared identifier of an exclusion group (radio-equivalent set).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeater: Option<bool>,
    /// Zero-based index of a repeat occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<usize>,
}

/// One entry of the output item list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Unique within one output document.
    pub id: String,

    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    pub required: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,

    pub code_context: CodeContext,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<ValidationRule>,

    #[serde(flatten)]
    pub properties: TypeProperties,

    /// Children of a container descriptor.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<FieldDescriptor>,

    /// Dialect-native path used for override matching and diagnostics.
    #[serde(skip)]
    pub source_path: String,
}

impl FieldDescriptor {
    /// Create a bare descriptor; callers fill in properties afterwards.
    #[must_use]
    pub fn new(
        field_type: FieldType,
        id: impl Into<String>,
        name: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            field_type,
            id: id.into(),
            label: None,
            value: None,
            required: false,
            help_text: None,
            code_context: CodeContext { name: name.into() },
            validation: Vec::new(),
            properties: TypeProperties::default(),
            items: Vec::new(),
            source_path: source_path.into(),
        }
    }

    /// Depth-first iterator over this descriptor and all nested items.
    pub fn walk(&self) -> impl Iterator<Item = &FieldDescriptor> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(next.items.iter().rev());
            Some(next)
        })
    }
}

/// The `data` block of the output document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormData {
    pub items: Vec<FieldDescriptor>,
}

/// The canonical form definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDocument {
    pub version: Option<String>,
    #[serde(rename = "ministry_id")]
    pub ministry_id: Option<String>,
    pub id: Option<String>,
    pub last_modified: String,
    pub title: Option<String>,
    #[serde(rename = "form_id")]
    pub form_id: Option<String>,
    #[serde(rename = "deployed_to")]
    pub deployed_to: Option<String>,
    pub data_sources: Vec<Value>,
    pub data: FormData,
}

impl OutputDocument {
    /// Depth-first iterator over every descriptor in the document.
    pub fn descriptors(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.data.items.iter().flat_map(FieldDescriptor::walk)
    }
}
