//! Configuration constants for the converter.

use regex::Regex;
use std::sync::LazyLock;

/// Marker fragment identifying the XFA template namespace
/// (e.g. `http://www.xfa.org/schema/xfa-template/3.0/`).
pub const TEMPLATE_NS_MARKER: &str = "xfa-template";

/// Orbeon Form Runner namespace.
pub const FORM_RUNNER_NS: &str = "http://orbeon.org/oxf/xml/form-runner";

/// Orbeon XForms extensions namespace (`xxf:` message attributes).
pub const XXFORMS_NS: &str = "http://orbeon.org/oxf/xml/xforms";

/// W3C XForms namespace.
pub const XFORMS_NS: &str = "http://www.w3.org/2002/xforms";

/// XHTML namespace (document title).
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Namespace of the implicit `xml:` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Instance id holding form data in form-runner documents.
pub const FORM_INSTANCE_ID: &str = "fr-form-instance";

/// Instance id holding labels, hints and item lists.
pub const FORM_RESOURCES_ID: &str = "fr-form-resources";

/// Bind id of the root bind in form-runner documents.
pub const FORM_BINDS_ID: &str = "fr-form-binds";

/// Mask applied to date fields without an explicit picture clause.
pub const DEFAULT_DATE_MASK: &str = "yyyy-MM-dd";

/// Timestamp format of `lastModified`.
pub const LAST_MODIFIED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+00:00";

/// Timestamp format used in generated output file names.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File extensions picked up by directory scanning.
pub const SOURCE_EXTENSIONS: [&str; 2] = ["xml", "xdp"];

/// Default directories, overridable through the environment.
pub const DEFAULT_INPUT_DIR: &str = "data/input";
pub const DEFAULT_OUTPUT_DIR: &str = "data/output";
pub const DEFAULT_REPORT_DIR: &str = "data/report";

/// Upper bound on worker threads for batch conversion.
pub const MAX_BATCH_WORKERS: usize = 16;

/// Deepest element nesting accepted in a source document. The XML parser
/// descends recursively, so deeper input is rejected before parsing.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Stack size of batch worker threads.
pub const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Form number as printed on template forms, e.g. `HR0077(16/03/07)`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
pub static FORM_NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{2,4}\d{3,})").expect("valid regex"));

/// XFA picture clause wrapper, e.g. `date{yyyy-MM-dd}`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
pub static PICTURE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:date|time|datetime)(?:\([^)]*\))?\{(.*)\}\s*$").expect("valid regex"));

/// Strip markup from rich-text labels.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
pub static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>]+>").expect("valid regex"));

/// Occurrence index suffix of a source path segment, e.g. `[2]`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
pub static OCCURRENCE_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\]").expect("valid regex"));

/// Legacy breadcrumb mapping pattern, e.g. `<section-a><control-1>`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
pub static BREADCRUMB_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^<>]+)>").expect("valid regex"));

/// Turn a native identifier into a display label.
///
/// Strips a `section-` prefix, splits on `-`/`_` and capitalizes each word.
///
/// # Examples
/// ```
/// use xmlform_converter::config::format_identifier;
///
/// assert_eq!(format_identifier("section-child-information"), "Child Information");
/// assert_eq!(format_identifier("contact_details"), "Contact Details");
/// ```
#[must_use]
pub fn format_identifier(identifier: &str) -> String {
    let identifier = identifier.strip_prefix("section-").unwrap_or(identifier);
    identifier
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Remove markup tags and collapse whitespace.
///
/// # Examples
/// ```
/// use xmlform_converter::config::strip_markup;
///
/// assert_eq!(strip_markup("<div><b>Name</b>  of child</div>"), "Name of child");
/// ```
#[must_use]
pub fn strip_markup(text: &str) -> String {
    MARKUP_TAG
        .replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize an XFA picture clause into a renderer mask.
///
/// # Examples
/// ```
/// use xmlform_converter::config::normalize_picture;
///
/// assert_eq!(normalize_picture("date{yyyy-MM-dd}"), "yyyy-MM-dd");
/// assert_eq!(normalize_picture("MM/DD/YYYY"), "MM/DD/YYYY");
/// ```
#[must_use]
pub fn normalize_picture(picture: &str) -> String {
    PICTURE_CLAUSE
        .captures(picture)
        .and_then(|c| c.get(1))
        .map_or_else(|| picture.trim().to_string(), |m| m.as_str().trim().to_string())
}
