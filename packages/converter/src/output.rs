//! JSON output files.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::FILE_TIMESTAMP_FORMAT;
use crate::error::Result;
use crate::report::ConversionReport;
use crate::types::OutputDocument;

/// Which of the two files of a conversion is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Output,
    Report,
}

impl OutputKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Output => "output",
            Self::Report => "report",
        }
    }
}

/// Paths written for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    /// Absent when the conversion failed fatally.
    pub output: Option<PathBuf>,
    pub report: PathBuf,
}

/// File name for a generated file: `<stem>_<ext>_<kind>_<timestamp>.json`.
///
/// Directories in a relative source name become a prefix, so `a/form.xml`
/// and `b/form.xml` get distinct files.
///
/// # Examples
/// ```
/// use chrono::{TimeZone, Utc};
/// use xmlform_converter::output::{file_name, OutputKind};
///
/// let now = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();
/// assert_eq!(
///     file_name(Some("HR0077E.xdp"), OutputKind::Report, now),
///     "HR0077E_xdp_report_20240517_083000.json"
/// );
/// ```
#[must_use]
pub fn file_name(source_name: Option<&str>, kind: OutputKind, now: DateTime<Utc>) -> String {
    let path = Path::new(source_name.unwrap_or("document.xml"));
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("xml");
    let prefix: String = path
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .filter_map(|c| match c {
            Component::Normal(dir) => dir.to_str(),
            _ => None,
        })
        .map(|dir| format!("{dir}_"))
        .collect();
    format!(
        "{prefix}{stem}_{ext}_{}_{}.json",
        kind.as_str(),
        now.format(FILE_TIMESTAMP_FORMAT)
    )
}

/// Serialize a value as pretty-printed JSON with a trailing newline.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}

/// Write a value as JSON into `dir/file_name`.
///
/// Writes to a temporary file first, then renames it into place so a crash
/// never leaves a half-written file behind.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be written.
pub fn save_json<T: Serialize>(value: &T, dir: &Path, file_name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let target = dir.join(file_name);
    let temp = dir.join(format!(".{file_name}.tmp"));

    let content = to_json(value)?;
    {
        let mut file = File::create(&temp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    #[cfg(target_os = "windows")]
    if target.exists() {
        fs::remove_file(&target)?;
    }

    fs::rename(&temp, &target)?;
    tracing::debug!(path = %target.display(), "Wrote JSON file");
    Ok(target)
}

/// Write the output document (if any) and report of one source file.
///
/// # Errors
///
/// Returns an error if either file cannot be written.
pub fn write_conversion(
    document: Option<&OutputDocument>,
    report: &ConversionReport,
    output_dir: &Path,
    report_dir: &Path,
    now: DateTime<Utc>,
) -> Result<WrittenFiles> {
    let source = report.source();
    let output = document
        .map(|doc| save_json(doc, output_dir, &file_name(source, OutputKind::Output, now)))
        .transpose()?;
    let report = save_json(report, report_dir, &file_name(source, OutputKind::Report, now))?;
    Ok(WrittenFiles { output, report })
}
