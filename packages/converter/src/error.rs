//! Error types for the converter.
//!
//! Only conditions that abort a whole file are errors. Problems with a
//! single field are recorded in the [`ConversionReport`](crate::report::ConversionReport)
//! and never surface here.

use thiserror::Error;

/// Main error type for the converter library.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// The source document is not well-formed XML.
    #[error("Malformed source XML: {0}")]
    MalformedSource(#[from] roxmltree::Error),

    /// Elements are nested deeper than the parser is allowed to descend.
    #[error("Malformed source XML: elements nested deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    /// No known dialect marker namespace was declared.
    #[error("Unknown dialect: root element <{root}> declares none of the known form namespaces{}", fmt_namespaces(.namespaces))]
    UnknownDialect {
        root: String,
        namespaces: Vec<String>,
    },

    /// The mapping configuration could not be parsed or failed validation.
    #[error("Invalid mapping configuration{}: {reason}", .source_name.as_ref().map(|s| format!(" in {s}")).unwrap_or_default())]
    InvalidMappingConfig {
        source_name: Option<String>,
        reason: String,
    },

    /// The assembled document violates a structural invariant.
    #[error("Output assembly failed: {0}")]
    OutputAssembly(String),

    /// A conversion panicked; the file is abandoned.
    #[error("Conversion aborted: {0}")]
    Aborted(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConverterError {
    /// Short machine-friendly name of the error kind, used in reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedSource(_) | Self::NestingTooDeep { .. } => "MalformedSource",
            Self::UnknownDialect { .. } => "UnknownDialect",
            Self::InvalidMappingConfig { .. } => "InvalidMappingConfig",
            Self::OutputAssembly(_) => "OutputAssemblyError",
            Self::Aborted(_) => "Aborted",
            Self::Io(_) => "Io",
            Self::Json(_) => "Json",
        }
    }

    pub(crate) fn invalid_mapping(reason: impl Into<String>) -> Self {
        Self::InvalidMappingConfig {
            source_name: None,
            reason: reason.into(),
        }
    }
}

fn fmt_namespaces(namespaces: &[String]) -> String {
    if namespaces.is_empty() {
        String::new()
    } else {
        format!(" (found: {})", namespaces.join(", "))
    }
}

/// Result type alias for converter operations.
pub type Result<T> = std::result::Result<T, ConverterError>;
