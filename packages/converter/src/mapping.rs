//! Mapping configuration: header constants and ordered field overrides.
//!
//! The configuration is validated completely at load time. Once loaded it
//! is immutable and can be shared read-only across a batch.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::{BREADCRUMB_SEGMENT, OCCURRENCE_INDEX};
use crate::error::{ConverterError, Result};
use crate::types::{DataBinding, FieldType};

/// A mapping entry forcing properties of the fields it matches.
#[derive(Debug, Clone)]
pub struct FieldOverride {
    pattern: String,
    matcher: Regex,
    pub field_type: Option<FieldType>,
    pub label: Option<String>,
    pub required: Option<bool>,
    pub help_text: Option<String>,
    pub data_binding: Option<DataBinding>,
}

impl FieldOverride {
    /// Compile an override for a path pattern.
    ///
    /// Patterns are slash-separated and match a suffix of the source path
    /// on segment boundaries. `*` matches within one segment, `**` across
    /// zero or more segments and `?` a single character. Legacy breadcrumb patterns
    /// (`<a><b>`) are accepted and read as `a/b`.
    ///
    /// # Errors
    /// Returns `InvalidMappingConfig` for an empty pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = normalize_pattern(pattern);
        if pattern.is_empty() {
            return Err(ConverterError::invalid_mapping("xmlPath must be a non-empty string"));
        }
        let matcher = Regex::new(&glob_to_regex(&pattern)).map_err(|e| {
            ConverterError::invalid_mapping(format!("xmlPath '{pattern}' does not compile: {e}"))
        })?;
        Ok(Self {
            pattern,
            matcher,
            field_type: None,
            label: None,
            required: None,
            help_text: None,
            data_binding: None,
        })
    }

    /// Force the canonical type of matching fields.
    #[must_use]
    pub fn with_field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    /// Force the label of matching fields.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Force the requiredness of matching fields.
    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    /// Force the help text of matching fields.
    #[must_use]
    pub fn with_help_text(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = Some(help_text.into());
        self
    }

    /// Bind matching fields to an external record path.
    #[must_use]
    pub fn with_data_binding(mut self, reference: impl Into<String>) -> Self {
        self.data_binding = Some(DataBinding::from_reference(reference));
        self
    }

    /// The normalized pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the pattern matches a source path.
    ///
    /// Paths inside repeat occurrences are tried with and without their
    /// occurrence indices, so one override covers every occurrence.
    #[must_use]
    pub fn matches(&self, source_path: &str) -> bool {
        if self.matcher.is_match(source_path) {
            return true;
        }
        source_path.contains('[')
            && self
                .matcher
                .is_match(&OCCURRENCE_INDEX.replace_all(source_path, ""))
    }
}

/// Loaded mapping configuration.
#[derive(Debug, Clone, Default)]
pub struct MappingConfig {
    /// Header constants. A `None` value forces the header key to null.
    constants: BTreeMap<String, Option<String>>,
    overrides: Vec<FieldOverride>,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
    #[serde(default)]
    constants: Map<String, Value>,
    #[serde(default)]
    mappings: Vec<RawOverride>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOverride {
    xml_path: Option<String>,
    field_type: Option<String>,
    label: Option<String>,
    required: Option<bool>,
    help_text: Option<String>,
    data_binding: Option<String>,
}

impl MappingConfig {
    /// Create an empty configuration (pure heuristics, dialect defaults).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file.
    ///
    /// No path means an empty configuration. A path that cannot be read
    /// or parsed is an error; the caller decides whether to fall back.
    ///
    /// # Errors
    /// Returns `InvalidMappingConfig` naming the file and the reason.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::new());
        };
        let source_name = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|e| ConverterError::InvalidMappingConfig {
            source_name: Some(source_name.clone()),
            reason: e.to_string(),
        })?;
        let config = Self::from_json(&text).map_err(|err| match err {
            ConverterError::InvalidMappingConfig { reason, .. } => {
                ConverterError::InvalidMappingConfig {
                    source_name: Some(source_name.clone()),
                    reason,
                }
            }
            other => other,
        })?;
        tracing::info!(
            path = %source_name,
            constants = config.constants.len(),
            overrides = config.overrides.len(),
            "Loaded mapping configuration"
        );
        Ok(config)
    }

    /// Parse and validate a configuration document.
    ///
    /// # Errors
    /// Returns `InvalidMappingConfig` if the JSON is malformed, a constant
    /// is not a scalar, an `xmlPath` is empty, or a `fieldType` is not a
    /// canonical leaf type.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawMapping = serde_json::from_str(text)
            .map_err(|e| ConverterError::invalid_mapping(e.to_string()))?;

        let mut config = Self::new();
        for (key, value) in raw.constants {
            let scalar = match value {
                Value::Null => None,
                Value::String(s) => Some(s),
                Value::Bool(b) => Some(b.to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(ConverterError::invalid_mapping(format!(
                        "constants.{key} must be a scalar"
                    )));
                }
            };
            config.constants.insert(key, scalar);
        }

        for (index, entry) in raw.mappings.into_iter().enumerate() {
            let pattern = entry.xml_path.unwrap_or_default();
            let mut rule = FieldOverride::new(&pattern).map_err(|err| match err {
                ConverterError::InvalidMappingConfig { reason, .. } => {
                    ConverterError::invalid_mapping(format!("mappings[{index}]: {reason}"))
                }
                other => other,
            })?;
            if let Some(name) = entry.field_type {
                let field_type = name.parse::<FieldType>().map_err(|e| {
                    ConverterError::invalid_mapping(format!("mappings[{index}].fieldType: {e}"))
                })?;
                rule = rule.with_field_type(field_type);
            }
            rule.label = entry.label;
            rule.required = entry.required;
            rule.help_text = entry.help_text;
            rule.data_binding = entry.data_binding.map(DataBinding::from_reference);
            config.overrides.push(rule);
        }

        Ok(config)
    }

    /// Add a header constant.
    #[must_use]
    pub fn with_constant(mut self, key: impl Into<String>, value: Option<&str>) -> Self {
        self.constants.insert(key.into(), value.map(str::to_string));
        self
    }

    /// Append an override; earlier overrides take precedence.
    #[must_use]
    pub fn with_override(mut self, rule: FieldOverride) -> Self {
        self.overrides.push(rule);
        self
    }

    /// Look up a header constant. The outer `Option` tells whether the key
    /// is configured at all.
    #[must_use]
    pub fn constant(&self, key: &str) -> Option<Option<&str>> {
        self.constants.get(key).map(|v| v.as_deref())
    }

    /// The first override matching a source path.
    #[must_use]
    pub fn find_override(&self, source_path: &str) -> Option<&FieldOverride> {
        self.overrides.iter().find(|rule| rule.matches(source_path))
    }

    /// All overrides in precedence order.
    #[must_use]
    pub fn overrides(&self) -> &[FieldOverride] {
        &self.overrides
    }

    /// Whether the configuration carries no constants and no overrides.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty() && self.overrides.is_empty()
    }
}

/// Rewrite legacy breadcrumb patterns and trim separators.
fn normalize_pattern(pattern: &str) -> String {
    let pattern = pattern.trim();
    let pattern = if pattern.starts_with('<') {
        BREADCRUMB_SEGMENT
            .captures_iter(pattern)
            .map(|c| c[1].to_string())
            .collect::<Vec<_>>()
            .join("/")
    } else {
        pattern.to_string()
    };
    pattern.trim_matches('/').to_string()
}

/// Translate a path glob into an anchored suffix regex.
fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::from("(?:^|/)");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    regex.push_str("(?:.*/)?");
                } else {
                    regex.push_str(".*");
                }
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            other => regex.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    regex.push('$');
    regex
}
