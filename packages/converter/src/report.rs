//! Per-run conversion report.
//!
//! Every descriptor-producing node reports exactly once, into exactly one
//! of the three buckets. The accumulator only collects; the walker decides
//! the outcome.

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::error::ConverterError;
use crate::types::FieldType;

/// Tagged result of processing one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    /// Converted with confidence.
    Success,
    /// Required native information was missing; a best-effort descriptor
    /// was still emitted.
    Error { reason: String },
    /// Converted, but a human should review the result.
    ManualIntervention { reason: String, raw: Option<String> },
}

impl FieldOutcome {
    /// Build an error outcome.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// Build a manual-intervention outcome.
    #[must_use]
    pub fn manual(reason: impl Into<String>) -> Self {
        Self::ManualIntervention {
            reason: reason.into(),
            raw: None,
        }
    }

    /// Build a manual-intervention outcome carrying the raw source text.
    #[must_use]
    pub fn manual_with_raw(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::ManualIntervention {
            reason: reason.into(),
            raw: Some(raw.into()),
        }
    }

    fn severity(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::ManualIntervention { .. } => 1,
            Self::Error { .. } => 2,
        }
    }

    /// Combine two findings for the same node. The more severe one wins;
    /// on a tie the earlier finding is kept.
    #[must_use]
    pub fn escalate(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// One report line.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    /// Native identifier of the node.
    pub field: String,
    pub source_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_type: Option<FieldType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Raw source text that could not be interpreted, e.g. a script.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ReportEntry {
    /// Create an entry for a node.
    #[must_use]
    pub fn new(field: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            source_path: source_path.into(),
            converted_type: None,
            label: None,
            message: None,
            raw: None,
        }
    }

    /// Attach the canonical type and label of the emitted descriptor.
    #[must_use]
    pub fn with_descriptor(mut self, field_type: FieldType, label: Option<&str>) -> Self {
        self.converted_type = Some(field_type);
        self.label = label.map(str::to_string);
        self
    }
}

/// Totals of a report.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ReportSummary {
    pub total_fields: usize,
    pub total_success: usize,
    pub total_errors: usize,
    pub total_manual_intervention: usize,
    /// Percentage with two decimals, e.g. `"87.50%"`.
    pub success_rate: String,
}

/// Report of one conversion call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionReport {
    source: Option<String>,
    fatal: Option<&'static str>,
    success: Vec<ReportEntry>,
    errors: Vec<ReportEntry>,
    manual_intervention_needed: Vec<ReportEntry>,
}

impl ConversionReport {
    /// Create an empty report for a source.
    #[must_use]
    pub fn new(source: Option<&str>) -> Self {
        Self {
            source: source.map(str::to_string),
            ..Self::default()
        }
    }

    /// Report for a file that aborted before producing output.
    #[must_use]
    pub fn fatal(source: Option<&str>, error: &ConverterError) -> Self {
        let mut report = Self::new(source);
        report.fatal = Some(error.kind());
        let mut entry = ReportEntry::new(source.unwrap_or_default(), "");
        entry.message = Some(error.to_string());
        report.errors.push(entry);
        report
    }

    /// Record a node under the bucket its outcome selects.
    pub fn record(&mut self, mut entry: ReportEntry, outcome: FieldOutcome) {
        match outcome {
            FieldOutcome::Success => self.success.push(entry),
            FieldOutcome::Error { reason } => {
                entry.message = Some(reason);
                self.errors.push(entry);
            }
            FieldOutcome::ManualIntervention { reason, raw } => {
                entry.message = Some(reason);
                entry.raw = raw;
                self.manual_intervention_needed.push(entry);
            }
        }
    }

    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Kind of the fatal error, if the file aborted.
    #[must_use]
    pub fn fatal_kind(&self) -> Option<&'static str> {
        self.fatal
    }

    #[must_use]
    pub fn success(&self) -> &[ReportEntry] {
        &self.success
    }

    #[must_use]
    pub fn errors(&self) -> &[ReportEntry] {
        &self.errors
    }

    #[must_use]
    pub fn manual_intervention_needed(&self) -> &[ReportEntry] {
        &self.manual_intervention_needed
    }

    /// Number of recorded nodes across all buckets.
    #[must_use]
    pub fn total(&self) -> usize {
        self.success.len() + self.errors.len() + self.manual_intervention_needed.len()
    }

    /// Compute the summary block.
    #[must_use]
    pub fn summary(&self) -> ReportSummary {
        let total = self.total();
        #[allow(clippy::cast_precision_loss)]
        let rate = if total > 0 {
            self.success.len() as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        ReportSummary {
            total_fields: total,
            total_success: self.success.len(),
            total_errors: self.errors.len(),
            total_manual_intervention: self.manual_intervention_needed.len(),
            success_rate: format!("{rate:.2}%"),
        }
    }
}

impl Serialize for ConversionReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ConversionReport", 6)?;
        state.serialize_field("source", &self.source)?;
        if let Some(kind) = self.fatal {
            state.serialize_field("fatal", kind)?;
        } else {
            state.skip_field("fatal")?;
        }
        state.serialize_field("summary", &self.summary())?;
        state.serialize_field("success", &self.success)?;
        state.serialize_field("errors", &self.errors)?;
        state.serialize_field("manual_intervention_needed", &self.manual_intervention_needed)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_escalate_prefers_error() {
        let outcome = FieldOutcome::Success
            .escalate(FieldOutcome::manual("unknown control"))
            .escalate(FieldOutcome::error("missing name"))
            .escalate(FieldOutcome::manual("script"));
        assert_eq!(outcome, FieldOutcome::error("missing name"));
    }

    #[test]
    fn test_escalate_keeps_first_on_tie() {
        let outcome = FieldOutcome::manual("first").escalate(FieldOutcome::manual("second"));
        assert_eq!(outcome, FieldOutcome::manual("first"));
    }

    #[test]
    fn test_record_routes_to_one_bucket() {
        let mut report = ConversionReport::new(Some("form.xml"));
        report.record(ReportEntry::new("a", "s/a"), FieldOutcome::Success);
        report.record(ReportEntry::new("b", "s/b"), FieldOutcome::error("no ui"));
        report.record(
            ReportEntry::new("c", "s/c"),
            FieldOutcome::manual_with_raw("unparsed script", "doSomething()"),
        );

        assert_eq!(report.total(), 3);
        assert_eq!(report.errors()[0].message.as_deref(), Some("no ui"));
        assert_eq!(report.manual_intervention_needed()[0].raw.as_deref(), Some("doSomething()"));
    }

    #[test]
    fn test_summary_rate() {
        let mut report = ConversionReport::new(None);
        for i in 0..7 {
            report.record(ReportEntry::new(i.to_string(), ""), FieldOutcome::Success);
        }
        report.record(ReportEntry::new("x", ""), FieldOutcome::manual("review"));

        let summary = report.summary();
        assert_eq!(summary.total_fields, 8);
        assert_eq!(summary.success_rate, "87.50%");
        assert_eq!(ConversionReport::new(None).summary().success_rate, "0.00%");
    }

    #[test]
    fn test_fatal_report_json() {
        let err = ConverterError::OutputAssembly("duplicate id '3'".to_string());
        let report = ConversionReport::fatal(Some("broken.xml"), &err);

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "source": "broken.xml",
                "fatal": "OutputAssemblyError",
                "summary": {
                    "total_fields": 1,
                    "total_success": 0,
                    "total_errors": 1,
                    "total_manual_intervention": 0,
                    "success_rate": "0.00%"
                },
                "success": [],
                "errors": [
                    {
                        "field": "broken.xml",
                        "sourcePath": "",
                        "message": "Output assembly failed: duplicate id '3'"
                    }
                ],
                "manual_intervention_needed": []
            })
        );
    }
}
