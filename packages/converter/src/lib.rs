//! Legacy form XML to canonical JSON converter.
//!
//! Reads form definitions written in one of three XML dialects and turns
//! them into a single JSON form-definition plus a per-file report of what
//! converted cleanly, what failed, and what needs a human.
//!
//! Supported dialects:
//!
//! - XFA templates (`.xdp`), detected by the `xfa-template` namespace
//! - Orbeon Form Runner documents
//! - plain W3C XForms documents
//!
//! # Example
//!
//! ```
//! use xmlform_converter::{convert, SourceDocument};
//!
//! let xml = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:xf="http://www.w3.org/2002/xforms">
//!   <head><xf:model><xf:instance><data><email/></data></xf:instance></xf:model></head>
//!   <body><xf:input ref="email"><xf:label>Email</xf:label></xf:input></body>
//! </html>"#;
//!
//! let conversion = convert(&SourceDocument::new(Some("contact.xml"), xml), None).unwrap();
//! assert_eq!(conversion.document.data.items[0].field_type.as_str(), "email");
//! assert_eq!(conversion.report.total(), 1);
//! ```
//!
//! # Architecture
//!
//! - [`namespace`]: namespace table and dialect detection
//! - [`mapping`]: mapping configuration (constants and field overrides)
//! - [`dialect`]: one adapter per dialect behind a shared trait
//! - [`walker`]: stack-based traversal producing field descriptors
//! - [`classify`]: canonical field type inference
//! - [`validation`]: validation rule extraction
//! - [`assemble`]: output document header and invariants
//! - [`report`]: per-file conversion report
//! - [`converter`]: single-file and batch entry points
//! - [`output`]: JSON file naming and writing
//! - [`cli`]: command-line interface

pub mod assemble;
pub mod classify;
pub mod cli;
pub mod config;
pub mod context;
pub mod converter;
pub mod dialect;
pub mod error;
pub mod mapping;
pub mod namespace;
pub mod output;
pub mod report;
pub mod types;
pub mod validation;
pub mod walker;
pub mod xml;

pub use converter::{convert, convert_at, convert_batch, detect, Conversion, FileOutcome, SourceDocument};
pub use error::{ConverterError, Result};
pub use mapping::{FieldOverride, MappingConfig};
pub use namespace::DialectTag;
pub use report::{ConversionReport, FieldOutcome};
pub use types::{FieldDescriptor, FieldType, OutputDocument};
