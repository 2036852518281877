//! Conversion entry points.
//!
//! [`convert`] turns one source document into an output document and its
//! report. [`convert_batch`] runs many files on a bounded set of scoped
//! worker threads; each file succeeds or fails on its own.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use chrono::{DateTime, Utc};
use roxmltree::Document;

use crate::assemble::{assemble, HeaderSource};
use crate::config::{MAX_BATCH_WORKERS, MAX_NESTING_DEPTH, WORKER_STACK_SIZE};
use crate::context::ConversionContext;
use crate::dialect::adapter_for;
use crate::error::{ConverterError, Result};
use crate::mapping::MappingConfig;
use crate::namespace::{self, DialectTag};
use crate::report::ConversionReport;
use crate::types::OutputDocument;
use crate::walker::Walker;
use crate::xml::nesting_exceeds;

/// A source file handed to the converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// File name, used for the form id fallback and in reports.
    pub name: Option<String>,
    pub text: String,
}

impl SourceDocument {
    /// Wrap in-memory XML text.
    #[must_use]
    pub fn new(name: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            name: name.map(str::to_string),
            text: text.into(),
        }
    }

    /// Read a source file from disk.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read as UTF-8 text.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let name = path.file_name().and_then(|n| n.to_str());
        Ok(Self::new(name, text))
    }

    /// Read a source file found below `root`, naming it by its
    /// slash-separated path relative to `root`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read as UTF-8 text.
    pub fn from_path_in(path: &Path, root: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::new(Some(&relative_name(path, root)), text))
    }
}

/// Slash-separated path of `path` relative to `root`.
#[must_use]
pub fn relative_name(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(segment) => segment.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Result of converting one document.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub dialect: DialectTag,
    pub document: OutputDocument,
    pub report: ConversionReport,
}

/// Progress of a single conversion, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConversionStage {
    Start,
    NamespaceResolved,
    DialectSelected,
    MappingLoaded,
    Traversing,
    Assembled,
    Done,
}

fn enter(stage: ConversionStage, source: Option<&str>) {
    tracing::trace!(stage = ?stage, source = source.unwrap_or("<inline>"), "Conversion stage");
}

/// Convert one document using the current time as `lastModified`.
///
/// # Errors
///
/// Returns an error if the XML is malformed, no known dialect is declared,
/// or the assembled document has duplicate ids. Problems with individual
/// fields never fail the call; they end up in the report.
pub fn convert(source: &SourceDocument, mapping: Option<&MappingConfig>) -> Result<Conversion> {
    convert_at(source, mapping, Utc::now())
}

/// Convert one document with a fixed conversion timestamp.
///
/// # Errors
///
/// See [`convert`].
pub fn convert_at(
    source: &SourceDocument,
    mapping: Option<&MappingConfig>,
    now: DateTime<Utc>,
) -> Result<Conversion> {
    let name = source.name.as_deref();
    enter(ConversionStage::Start, name);

    let doc = parse_source(&source.text)?;
    let (namespaces, dialect) = namespace::resolve(&doc)?;
    enter(ConversionStage::NamespaceResolved, name);

    let adapter = adapter_for(dialect, &doc, &namespaces);
    enter(ConversionStage::DialectSelected, name);

    let empty = MappingConfig::new();
    let mapping = mapping.unwrap_or(&empty);
    let mut ctx = ConversionContext::new(mapping, dialect, name, now);
    enter(ConversionStage::MappingLoaded, name);

    enter(ConversionStage::Traversing, name);
    let items = Walker::new(adapter.as_ref()).walk(&mut ctx);

    let header = HeaderSource {
        name,
        text: &source.text,
        meta: adapter.document_meta(),
        defaults: adapter.defaults(),
    };
    let document = assemble(header, items, &ctx)?;
    enter(ConversionStage::Assembled, name);

    let report = ctx.into_report();
    let summary = report.summary();
    tracing::info!(
        source = name.unwrap_or("<inline>"),
        dialect = %dialect,
        fields = summary.total_fields,
        errors = summary.total_errors,
        manual = summary.total_manual_intervention,
        "Converted document"
    );
    enter(ConversionStage::Done, name);

    Ok(Conversion {
        dialect,
        document,
        report,
    })
}

/// Detect the dialect of a document without converting it.
///
/// # Errors
///
/// Returns an error if the XML is malformed or no known dialect is declared.
pub fn detect(text: &str) -> Result<DialectTag> {
    let doc = parse_source(text)?;
    namespace::resolve(&doc).map(|(_, dialect)| dialect)
}

/// Parse source text, rejecting nesting beyond [`MAX_NESTING_DEPTH`].
fn parse_source(text: &str) -> Result<Document<'_>> {
    if nesting_exceeds(text, MAX_NESTING_DEPTH) {
        return Err(ConverterError::NestingTooDeep {
            limit: MAX_NESTING_DEPTH,
        });
    }
    Ok(Document::parse(text)?)
}

/// Outcome of one file in a batch.
#[derive(Debug)]
pub struct FileOutcome {
    pub name: Option<String>,
    pub result: Result<Conversion>,
}

impl FileOutcome {
    /// Whether the file converted without a fatal error.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// The output document, if any, and the report for this file.
    ///
    /// A fatal error yields no document and a report with one error entry.
    #[must_use]
    pub fn into_parts(self) -> (Option<OutputDocument>, ConversionReport) {
        match self.result {
            Ok(conversion) => (Some(conversion.document), conversion.report),
            Err(err) => {
                let report = ConversionReport::fatal(self.name.as_deref(), &err);
                (None, report)
            }
        }
    }
}

/// Convert many documents in parallel.
///
/// Results are returned in input order. The mapping configuration is the
/// only state shared between workers.
#[must_use]
pub fn convert_batch(
    sources: &[SourceDocument],
    mapping: Option<&MappingConfig>,
    workers: usize,
) -> Vec<FileOutcome> {
    convert_batch_with(sources, mapping, workers, |_| {})
}

/// Like [`convert_batch`], calling `on_done` as each file finishes.
///
/// Workers run with a [`WORKER_STACK_SIZE`] stack. A file whose
/// conversion panics gets an `Aborted` outcome; the other files are
/// unaffected.
pub fn convert_batch_with<F>(
    sources: &[SourceDocument],
    mapping: Option<&MappingConfig>,
    workers: usize,
    on_done: F,
) -> Vec<FileOutcome>
where
    F: Fn(&FileOutcome) + Sync,
{
    let workers = workers.clamp(1, MAX_BATCH_WORKERS).min(sources.len().max(1));
    let next = AtomicUsize::new(0);
    tracing::info!(files = sources.len(), workers, "Starting batch conversion");

    let work = || {
        let mut done = Vec::new();
        loop {
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(source) = sources.get(index) else {
                break;
            };
            let outcome = convert_one(source, mapping);
            on_done(&outcome);
            done.push((index, outcome));
        }
        done
    };

    let mut slots: Vec<Option<FileOutcome>> = (0..sources.len()).map(|_| None).collect();
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let spawned = thread::Builder::new()
                .name(format!("convert-{worker}"))
                .stack_size(WORKER_STACK_SIZE)
                .spawn_scoped(scope, work);
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => tracing::warn!(worker, error = %err, "Failed to spawn conversion worker"),
            }
        }

        let mut finished = Vec::new();
        if handles.is_empty() {
            finished.push(work());
        }
        for handle in handles {
            match handle.join() {
                Ok(done) => finished.push(done),
                Err(payload) => panic::resume_unwind(payload),
            }
        }
        for (index, outcome) in finished.into_iter().flatten() {
            slots[index] = Some(outcome);
        }
    });

    slots.into_iter().flatten().collect()
}

fn convert_one(source: &SourceDocument, mapping: Option<&MappingConfig>) -> FileOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| convert(source, mapping)))
        .unwrap_or_else(|payload| Err(ConverterError::Aborted(panic_message(payload.as_ref()))));
    if let Err(err) = &result {
        tracing::warn!(
            source = source.name.as_deref().unwrap_or("<inline>"),
            kind = err.kind(),
            error = %err,
            "Conversion failed"
        );
    }
    FileOutcome {
        name: source.name.clone(),
        result,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic while converting".to_string())
}
