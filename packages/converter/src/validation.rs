//! Validation rule extraction.
//!
//! Rules come from normalized native attributes and from constraint
//! scripts. Scripts are recognized clause by clause; a script with any
//! clause outside the recognized forms is handed back for manual review
//! with its raw text, and the remaining rules are still kept.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use crate::dialect::NativeAttributes;
use crate::report::FieldOutcome;
use crate::types::{FieldType, ValidationRule};

/// `string-length(.) <= 40`
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static STRING_LENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^string-length\([^)]*\)\s*(<=|<|>=|>|=)\s*(\d+)$").expect("valid regex")
});

/// `this.rawValue.length <= 40`
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static JS_LENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w$.]*\.length\s*(<=|<|>=|>|===|==)\s*(\d+)$").expect("valid regex")
});

/// `matches(., '^[0-9]+$')`
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static MATCHES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^matches\([^,]+,\s*(?:'([^']*)'|"([^"]*)")\s*\)$"#).expect("valid regex")
});

/// `/^\d{5}$/.test(this.rawValue)`
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static REGEX_TEST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(.+)/[gimsuy]*\.test\([^)]*\)$").expect("valid regex"));

/// `. >= 0`, `$age < 120`, `this.rawValue > 5`, `xs:decimal(.) <= 10`
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:\.|\$[\w-]+|[\w.]*rawValue|value|xs:\w+\(\.\)|number\(\.\))\s*(<=|<|>=|>)\s*(-?\d+(?:\.\d+)?)$",
    )
    .expect("valid regex")
});

/// Clause separators of compound constraints.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static CLAUSE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+and\s+|\s*&&\s*").expect("valid regex"));

/// Rules and review findings for one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub rules: Vec<ValidationRule>,
    /// `Success` unless a script needs review.
    pub outcome: Option<FieldOutcome>,
}

/// Derive the validation rules of a field.
#[must_use]
pub fn extract(
    field_type: FieldType,
    name: &str,
    label: Option<&str>,
    attrs: &NativeAttributes,
    today: NaiveDate,
) -> Extracted {
    let mut rules = Vec::new();
    let constraint_message = |fallback: String| attrs.constraint_message.clone().unwrap_or(fallback);

    if attrs.required {
        let message = attrs.required_message.clone().unwrap_or_else(|| match label {
            Some(label) => format!("{label} is required"),
            None => "This field is required".to_string(),
        });
        rules.push(ValidationRule::new("required", true, message));
    }
    if let Some(pattern) = &attrs.pattern {
        rules.push(ValidationRule::new(
            "pattern",
            pattern.as_str(),
            constraint_message("Invalid format".to_string()),
        ));
    }

    let (min_kind, max_kind) = if field_type == FieldType::Date {
        ("minDate", "maxDate")
    } else {
        ("min", "max")
    };
    if let Some(min) = &attrs.min {
        rules.push(ValidationRule::new(
            min_kind,
            bound_value(min),
            constraint_message(format!("Value must be at least {min}")),
        ));
    }
    if let Some(max) = &attrs.max {
        rules.push(ValidationRule::new(
            max_kind,
            bound_value(max),
            constraint_message(format!("Value must be at most {max}")),
        ));
    }

    let mut unparsed = Vec::new();
    for script in &attrs.scripts {
        match parse_script(script) {
            Some(parsed) => rules.extend(parsed.into_iter().map(|(kind, value)| {
                let message = constraint_message(default_message(kind, &value));
                ValidationRule::new(kind, value, message)
            })),
            None => unparsed.push(script.as_str()),
        }
    }

    if field_type == FieldType::Date
        && name.to_lowercase().contains("signed")
        && !rules.iter().any(|r| r.rule_type == "maxDate")
    {
        rules.push(ValidationRule::new(
            "maxDate",
            today.format("%Y-%m-%d").to_string(),
            "Date cannot be in the future",
        ));
    }

    let outcome = (!unparsed.is_empty()).then(|| {
        FieldOutcome::manual_with_raw("unrecognized validation script", unparsed.join("\n"))
    });
    Extracted { rules, outcome }
}

/// Parse a constraint script into `(rule kind, value)` pairs.
///
/// Returns `None` if any clause is not recognized.
fn parse_script(script: &str) -> Option<Vec<(&'static str, Value)>> {
    let body = script.trim();
    let body = body.strip_prefix("return ").unwrap_or(body);
    let body = body.trim_end_matches(';').trim();
    if body.is_empty() {
        return Some(Vec::new());
    }

    let mut rules = Vec::new();
    for clause in CLAUSE_SEPARATOR.split(body) {
        let clause = strip_parens(clause.trim());
        rules.extend(parse_clause(clause)?);
    }
    Some(rules)
}

fn parse_clause(clause: &str) -> Option<Vec<(&'static str, Value)>> {
    if let Some(caps) = STRING_LENGTH
        .captures(clause)
        .or_else(|| JS_LENGTH.captures(clause))
    {
        let n: u64 = caps[2].parse().ok()?;
        return Some(match &caps[1] {
            "<=" => vec![("maxLength", n.into())],
            "<" => vec![("maxLength", n.saturating_sub(1).into())],
            ">=" => vec![("minLength", n.into())],
            ">" => vec![("minLength", n.checked_add(1)?.into())],
            _ => vec![("minLength", n.into()), ("maxLength", n.into())],
        });
    }
    if let Some(caps) = MATCHES.captures(clause) {
        let pattern = caps.get(1).or_else(|| caps.get(2))?.as_str();
        return Some(vec![("pattern", pattern.into())]);
    }
    if let Some(caps) = REGEX_TEST.captures(clause) {
        return Some(vec![("pattern", caps[1].into())]);
    }
    if let Some(caps) = COMPARISON.captures(clause) {
        let value = bound_value(&caps[2]);
        let kind = if caps[1].starts_with('<') { "max" } else { "min" };
        return Some(vec![(kind, value)]);
    }
    None
}

/// Remove one layer of wrapping parentheses.
fn strip_parens(clause: &str) -> &str {
    clause
        .strip_prefix('(')
        .and_then(|c| c.strip_suffix(')'))
        .map_or(clause, str::trim)
}

/// Numeric bounds become JSON numbers, anything else (dates) stays a string.
fn bound_value(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return n.into();
    }
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map_or_else(|| Value::String(raw.to_string()), Value::Number)
}

fn default_message(kind: &str, value: &Value) -> String {
    match kind {
        "minLength" => format!("Must be at least {value} characters"),
        "maxLength" => format!("Must be at most {value} characters"),
        "min" => format!("Value must be at least {value}"),
        "max" => format!("Value must be at most {value}"),
        _ => "Invalid format".to_string(),
    }
}
