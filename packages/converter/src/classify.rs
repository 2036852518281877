//! Field type classification.
//!
//! Precedence, first hit wins:
//!
//! 1. a matching override with a `fieldType`,
//! 2. the native control kind through the dialect's lookup table,
//! 3. identifier and label heuristics,
//! 4. `text-input`.
//!
//! [`classify`] is a pure function of its arguments, so a field classifies
//! the same way regardless of file order or batch composition.

use crate::config::DEFAULT_DATE_MASK;
use crate::dialect::NativeAttributes;
use crate::mapping::MappingConfig;
use crate::namespace::DialectTag;
use crate::types::{FieldType, TypeProperties};

/// Which precedence step decided a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOrigin {
    Override,
    Native,
    Heuristic,
    Default,
}

/// Result of classifying one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub field_type: FieldType,
    pub origin: TypeOrigin,
    /// Set when the native kind was not recognized and the field degraded
    /// to a placeholder.
    pub manual: Option<String>,
}

impl Classification {
    fn new(field_type: FieldType, origin: TypeOrigin) -> Self {
        Self {
            field_type,
            origin,
            manual: None,
        }
    }
}

/// Outcome of a native lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeMatch {
    /// The control determines the type.
    Type(FieldType),
    /// A recognized free-form control; heuristics decide.
    Generic,
    /// Not in the table.
    Unknown,
}

/// Classify a field.
#[must_use]
pub fn classify(
    dialect: DialectTag,
    source_path: &str,
    name: &str,
    label: Option<&str>,
    attrs: &NativeAttributes,
    mapping: &MappingConfig,
) -> Classification {
    if let Some(field_type) = mapping
        .find_override(source_path)
        .and_then(|rule| rule.field_type)
    {
        return Classification::new(field_type, TypeOrigin::Override);
    }

    if let Some(control) = attrs.control.as_deref() {
        match native_type(dialect, control) {
            NativeMatch::Type(field_type) => {
                return Classification::new(field_type, TypeOrigin::Native);
            }
            NativeMatch::Generic => {}
            NativeMatch::Unknown => {
                return Classification {
                    field_type: FieldType::TextInfo,
                    origin: TypeOrigin::Native,
                    manual: Some(format!("unsupported {dialect} control '{control}'")),
                };
            }
        }
    }

    heuristic_type(name, label).map_or_else(
        || Classification::new(FieldType::TextInput, TypeOrigin::Default),
        |field_type| Classification::new(field_type, TypeOrigin::Heuristic),
    )
}

fn native_type(dialect: DialectTag, control: &str) -> NativeMatch {
    match dialect {
        DialectTag::Template => template_type(control),
        DialectTag::XForms => xforms_type(control),
        DialectTag::FormRunner => form_runner_type(control),
    }
}

fn template_type(control: &str) -> NativeMatch {
    use FieldType::*;
    match control {
        "textEdit" => NativeMatch::Generic,
        "textEdit:multiline" => NativeMatch::Type(TextArea),
        "numericEdit" | "passwordEdit" => NativeMatch::Type(TextInput),
        "dateTimeEdit" => NativeMatch::Type(Date),
        "choiceList" | "choiceList:multi" => NativeMatch::Type(Dropdown),
        "checkButton" => NativeMatch::Type(Checkbox),
        "checkButton:exclusive" => NativeMatch::Type(Radio),
        "button" => NativeMatch::Type(Button),
        "signature" => NativeMatch::Type(Signature),
        "draw" => NativeMatch::Type(TextInfo),
        _ => NativeMatch::Unknown,
    }
}

fn xforms_type(control: &str) -> NativeMatch {
    use FieldType::*;
    match control {
        "input" => NativeMatch::Generic,
        "secret" | "range" => NativeMatch::Type(TextInput),
        "textarea" => NativeMatch::Type(TextArea),
        "select1" => NativeMatch::Type(Dropdown),
        "select1:full" => NativeMatch::Type(Radio),
        "select" | "select:full" | "input:checkbox" => NativeMatch::Type(Checkbox),
        "trigger" | "submit" => NativeMatch::Type(Button),
        "output" => NativeMatch::Type(TextInfo),
        "type:date" | "type:dateTime" => NativeMatch::Type(Date),
        "type:boolean" => NativeMatch::Type(Checkbox),
        "type:email" => NativeMatch::Type(Email),
        other if other.starts_with("type:") => NativeMatch::Generic,
        _ => NativeMatch::Unknown,
    }
}

fn form_runner_type(control: &str) -> NativeMatch {
    use FieldType::*;
    match control {
        "dropdown-select1" | "open-select1" | "databound-select1" => NativeMatch::Type(Dropdown),
        "checkbox-input" | "boolean-input" => NativeMatch::Type(Checkbox),
        "yesno-input" => NativeMatch::Type(Radio),
        "date" | "datetime" | "dropdown-date" | "fields-date" => NativeMatch::Type(Date),
        "currency" | "number" | "integer" | "time" => NativeMatch::Type(TextInput),
        "email" => NativeMatch::Type(Email),
        "us-phone" | "phone" => NativeMatch::Type(Phone),
        "us-address" => NativeMatch::Type(Address),
        "explanation" | "text" => NativeMatch::Type(TextInfo),
        "handwritten-signature" => NativeMatch::Type(Signature),
        "tinymce" => NativeMatch::Type(TextArea),
        other => xforms_type(other),
    }
}

/// Keyword table for identifier heuristics, in precedence order.
const HEURISTICS: [(FieldType, &[&str]); 11] = [
    (FieldType::TextInfo, &["label", "instructions", "explanation", "disclaimer"]),
    (FieldType::Date, &["date", "dob", "birth", "birthdate", "birthday"]),
    (FieldType::Signature, &["signature"]),
    (FieldType::Email, &["email", "mail"]),
    (FieldType::Phone, &["phone", "telephone", "tel", "mobile", "cell", "fax"]),
    (FieldType::Checkbox, &["checkbox", "confirmation", "consent"]),
    (FieldType::Radio, &["radio"]),
    (FieldType::Dropdown, &["dropdown", "list", "combo"]),
    (FieldType::TextArea, &["textarea", "comment", "comments", "description", "notes", "remarks"]),
    (FieldType::Address, &["address", "street"]),
    (FieldType::Button, &["button", "submit"]),
];

/// Guess a type from the identifier, then from the label.
///
/// Text-info markers only count in identifiers: a label mentioning
/// "instructions" still belongs to an input.
fn heuristic_type(name: &str, label: Option<&str>) -> Option<FieldType> {
    let name_tokens = tokenize(name);
    if let Some(field_type) = match_tokens(&name_tokens, &HEURISTICS) {
        return Some(field_type);
    }
    let label_tokens = tokenize(label.unwrap_or_default());
    match_tokens(&label_tokens, &HEURISTICS[1..])
}

fn match_tokens(tokens: &[String], table: &[(FieldType, &[&str])]) -> Option<FieldType> {
    let has_text_area = tokens
        .windows(2)
        .any(|w| w[0] == "text" && w[1] == "area");
    table.iter().find_map(|(field_type, keywords)| {
        let hit = tokens.iter().any(|t| keywords.contains(&t.as_str()))
            || (*field_type == FieldType::TextArea && has_text_area);
        hit.then_some(*field_type)
    })
}

/// Split an identifier or label into lowercase words.
///
/// Separators are non-alphanumeric characters and lower→upper camel-case
/// boundaries, so `firstName` gives `first`, `name`.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in text.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        current.extend(c.to_lowercase());
        prev_lower = c.is_lowercase() || c.is_numeric();
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Type-dependent properties of a leaf descriptor.
#[must_use]
pub fn type_properties(
    field_type: FieldType,
    attrs: &NativeAttributes,
    label: Option<&str>,
) -> TypeProperties {
    let mut props = TypeProperties::default();
    let control = attrs.base_control().unwrap_or_default();
    let placeholder = || label.map(|l| format!("Enter your {}", l.to_lowercase()));

    match field_type {
        FieldType::TextInput => {
            let input_type = match control {
                "numericEdit" | "currency" | "number" | "integer" | "range" => "number",
                "passwordEdit" | "secret" => "password",
                _ => "text",
            };
            props.input_type = Some(input_type.to_string());
            props.placeholder = placeholder();
        }
        FieldType::TextArea => props.placeholder = placeholder(),
        FieldType::Email => {
            props.input_type = Some("email".to_string());
            props.placeholder = Some("example@example.com".to_string());
        }
        FieldType::Phone => {
            props.input_type = Some("tel".to_string());
            props.mask = Some("(###) ###-####".to_string());
            props.placeholder = Some("(123) 456-7890".to_string());
        }
        FieldType::Address => props.placeholder = Some("Street address".to_string()),
        FieldType::Date => {
            let mask = attrs.format.clone().unwrap_or_else(|| DEFAULT_DATE_MASK.to_string());
            props.placeholder = Some(mask.clone());
            props.mask = Some(mask);
        }
        FieldType::Dropdown => {
            props.list_items = Some(attrs.options.clone());
            props.is_multi = Some(
                attrs.control.as_deref().is_some_and(|c| c.ends_with(":multi")) || control == "select",
            );
            props.direction = Some("bottom".to_string());
        }
        FieldType::Radio => {
            props.list_items = Some(attrs.options.clone());
            props.direction = Some("vertical".to_string());
        }
        FieldType::Checkbox if !attrs.options.is_empty() => {
            props.list_items = Some(attrs.options.clone());
        }
        FieldType::Button => {
            let button_type = if control == "submit" { "submit" } else { "button" };
            props.button_type = Some(button_type.to_string());
        }
        _ => {}
    }
    props
}
