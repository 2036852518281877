//! Per-file conversion state.

use chrono::{DateTime, NaiveDate, Utc};

use crate::mapping::MappingConfig;
use crate::namespace::DialectTag;
use crate::report::{ConversionReport, FieldOutcome, ReportEntry};

/// State threaded through one conversion call.
///
/// Built fresh for every file. The mapping configuration is the only
/// borrowed, shared piece.
pub struct ConversionContext<'m> {
    /// Read-only mapping configuration.
    pub mapping: &'m MappingConfig,

    /// Dialect of the document being converted.
    pub dialect: DialectTag,

    /// Conversion timestamp, used for `lastModified` and date rules.
    pub now: DateTime<Utc>,

    report: ConversionReport,
    next_id: usize,
}

impl<'m> ConversionContext<'m> {
    /// Create a context for one file.
    #[must_use]
    pub fn new(
        mapping: &'m MappingConfig,
        dialect: DialectTag,
        source_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            mapping,
            dialect,
            now,
            report: ConversionReport::new(source_name),
            next_id: 1,
        }
    }

    /// Allocate the next descriptor id ("1", "2", ...).
    pub fn next_id(&mut self) -> String {
        let id = self.next_id.to_string();
        self.next_id += 1;
        id
    }

    /// Date of the conversion.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Record one visited node in the report.
    pub fn record(&mut self, entry: ReportEntry, outcome: FieldOutcome) {
        self.report.record(entry, outcome);
    }

    /// Finish the run and hand back the report.
    #[must_use]
    pub fn into_report(self) -> ConversionReport {
        self.report
    }
}
