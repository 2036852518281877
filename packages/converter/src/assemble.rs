//! Output document assembly.
//!
//! Header values come from mapping constants first, then from the
//! dialect's defaults and what the document itself says.

use std::collections::HashSet;
use std::path::Path;

use uuid::Uuid;

use crate::config::{FORM_NUMBER_PATTERN, LAST_MODIFIED_FORMAT};
use crate::context::ConversionContext;
use crate::dialect::{DialectDefaults, DocumentMeta};
use crate::error::{ConverterError, Result};
use crate::namespace::DialectTag;
use crate::types::{FieldDescriptor, FormData, OutputDocument};

/// Document-level facts the header is built from.
#[derive(Debug, Clone)]
pub struct HeaderSource<'s> {
    /// File name of the source, if known.
    pub name: Option<&'s str>,
    /// Raw source text, hashed into the content id.
    pub text: &'s str,
    pub meta: DocumentMeta,
    pub defaults: DialectDefaults,
}

/// Build the output document around the walked items.
///
/// # Errors
///
/// Returns [`ConverterError::OutputAssembly`] when two descriptors share an
/// id.
pub fn assemble(
    source: HeaderSource<'_>,
    items: Vec<FieldDescriptor>,
    ctx: &ConversionContext<'_>,
) -> Result<OutputDocument> {
    let constant = |key: &str, fallback: Option<String>| match ctx.mapping.constant(key) {
        Some(value) => value.map(str::to_string),
        None => fallback,
    };

    let content_id = source
        .defaults
        .content_id
        .then(|| Uuid::new_v5(&Uuid::NAMESPACE_OID, source.text.as_bytes()).to_string());
    let form_id = source
        .meta
        .form_id
        .clone()
        .or_else(|| fallback_form_id(ctx.dialect, source.name));

    let document = OutputDocument {
        version: constant("version", source.defaults.version.map(str::to_string)),
        ministry_id: constant("ministry_id", source.defaults.ministry_id.map(str::to_string)),
        id: constant("id", content_id),
        last_modified: ctx.now.format(LAST_MODIFIED_FORMAT).to_string(),
        title: constant("title", source.meta.title.clone()),
        form_id: constant("form_id", form_id),
        deployed_to: None,
        data_sources: Vec::new(),
        data: FormData { items },
    };

    check_unique_ids(&document)?;
    tracing::debug!(
        dialect = %ctx.dialect,
        form_id = ?document.form_id,
        descriptors = document.descriptors().count(),
        "Assembled output document"
    );
    Ok(document)
}

/// Form id derived from the file name when the document carries none.
fn fallback_form_id(dialect: DialectTag, name: Option<&str>) -> Option<String> {
    let stem = Path::new(name?).file_stem()?.to_str()?;
    if dialect == DialectTag::Template {
        if let Some(m) = FORM_NUMBER_PATTERN.captures(stem).and_then(|c| c.get(1)) {
            return Some(m.as_str().to_string());
        }
    }
    Some(stem.to_string())
}

fn check_unique_ids(document: &OutputDocument) -> Result<()> {
    let mut seen = HashSet::new();
    for descriptor in document.descriptors() {
        if !seen.insert(descriptor.id.as_str()) {
            return Err(ConverterError::OutputAssembly(format!(
                "duplicate descriptor id '{}' at {}",
                descriptor.id, descriptor.source_path
            )));
        }
    }
    Ok(())
}
