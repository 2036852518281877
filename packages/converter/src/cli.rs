//! Command-line interface for the converter.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use crate::config::{DEFAULT_INPUT_DIR, DEFAULT_OUTPUT_DIR, DEFAULT_REPORT_DIR, SOURCE_EXTENSIONS};
use crate::converter::{convert, convert_batch_with, detect, relative_name, SourceDocument};
use crate::error::Result;
use crate::mapping::MappingConfig;
use crate::output::write_conversion;
use crate::report::ConversionReport;

/// Convert legacy XFA, XForms and Orbeon form XML into canonical JSON.
#[derive(Parser)]
#[command(name = "xmlform-converter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a single form file.
    Convert {
        /// Source XML or XDP file
        input: PathBuf,

        /// Mapping configuration (JSON)
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Directory for the output document
        #[arg(short, long, env = "OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Directory for the conversion report
        #[arg(short, long, env = "REPORT_DIR", default_value = DEFAULT_REPORT_DIR)]
        report_dir: PathBuf,
    },

    /// Convert every .xml and .xdp file below a directory.
    Batch {
        /// Directory to scan
        #[arg(short, long, env = "INPUT_DIR", default_value = DEFAULT_INPUT_DIR)]
        input_dir: PathBuf,

        /// Mapping configuration (JSON)
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Directory for output documents
        #[arg(short, long, env = "OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Directory for conversion reports
        #[arg(short, long, env = "REPORT_DIR", default_value = DEFAULT_REPORT_DIR)]
        report_dir: PathBuf,

        /// Number of worker threads (default: available parallelism)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Print the dialect of a form file.
    Detect {
        /// Source XML or XDP file
        input: PathBuf,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            mapping,
            output_dir,
            report_dir,
        } => convert_command(&input, mapping.as_deref(), &output_dir, &report_dir),
        Commands::Batch {
            input_dir,
            mapping,
            output_dir,
            report_dir,
            workers,
        } => batch_command(
            &input_dir,
            mapping.as_deref(),
            &output_dir,
            &report_dir,
            workers,
        ),
        Commands::Detect { input } => detect_command(&input),
    }
}

/// Execute the convert command.
fn convert_command(
    input: &Path,
    mapping: Option<&Path>,
    output_dir: &Path,
    report_dir: &Path,
) -> Result<()> {
    let mapping = MappingConfig::load(mapping)?;
    let source = SourceDocument::from_path(input)?;

    println!(
        "{} {}",
        style("Converting").bold(),
        style(input.display()).cyan()
    );

    let (document, report, fatal) = match convert(&source, Some(&mapping)) {
        Ok(conversion) => {
            println!("  Dialect: {}", style(conversion.dialect).green());
            (Some(conversion.document), conversion.report, None)
        }
        Err(err) => {
            let report = ConversionReport::fatal(source.name.as_deref(), &err);
            (None, report, Some(err))
        }
    };
    let written = write_conversion(document.as_ref(), &report, output_dir, report_dir, Utc::now())?;
    print_summary(&report);

    if let Some(path) = &written.output {
        println!("{} {}", style("Output:").green().bold(), path.display());
    }
    println!("{} {}", style("Report:").green().bold(), written.report.display());

    fatal.map_or(Ok(()), Err)
}

/// Execute the batch command.
fn batch_command(
    input_dir: &Path,
    mapping: Option<&Path>,
    output_dir: &Path,
    report_dir: &Path,
    workers: Option<usize>,
) -> Result<()> {
    let mapping = MappingConfig::load(mapping)?;
    let paths = scan_sources(input_dir)?;
    if paths.is_empty() {
        println!(
            "{} no .xml or .xdp files in {}",
            style("Nothing to do:").yellow().bold(),
            input_dir.display()
        );
        return Ok(());
    }

    let mut sources = Vec::with_capacity(paths.len());
    let mut unreadable = Vec::new();
    for path in &paths {
        match SourceDocument::from_path_in(path, input_dir) {
            Ok(source) => sources.push(source),
            Err(err) => {
                let name = relative_name(path, input_dir);
                unreadable.push(ConversionReport::fatal(Some(&name), &err));
            }
        }
    }

    let workers = workers.unwrap_or_else(|| {
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    });

    println!(
        "{} {} files from {}",
        style("Converting").bold(),
        style(paths.len()).cyan(),
        style(input_dir.display()).cyan()
    );

    let pb = ProgressBar::new(sources.len() as u64);
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("valid template"),
    );

    let outcomes = convert_batch_with(&sources, Some(&mapping), workers, |outcome| {
        if let Some(name) = &outcome.name {
            pb.set_message(name.clone());
        }
        pb.inc(1);
    });
    pb.finish_and_clear();

    let now = Utc::now();
    let mut converted = 0usize;
    let mut failed = unreadable.len();
    for report in &unreadable {
        write_conversion(None, report, output_dir, report_dir, now)?;
    }
    for outcome in outcomes {
        if outcome.is_ok() {
            converted += 1;
        } else {
            failed += 1;
        }
        let (document, report) = outcome.into_parts();
        write_conversion(document.as_ref(), &report, output_dir, report_dir, now)?;
        if let Some(kind) = report.fatal_kind() {
            println!(
                "  {} {} ({kind})",
                style("Failed").red().bold(),
                report.source().unwrap_or_default()
            );
        }
    }

    println!();
    println!(
        "{} {} converted, {} failed",
        style("Done:").green().bold(),
        style(converted).green(),
        style(failed).red()
    );
    println!("  Outputs: {}", output_dir.display());
    println!("  Reports: {}", report_dir.display());

    Ok(())
}

/// Execute the detect command.
fn detect_command(input: &Path) -> Result<()> {
    let source = SourceDocument::from_path(input)?;
    let dialect = detect(&source.text)?;
    println!("{dialect}");
    Ok(())
}

/// Source files below `dir`, sorted by path.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn scan_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_source = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SOURCE_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(e)));
        if is_source {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

fn print_summary(report: &ConversionReport) {
    let summary = report.summary();
    println!("  Fields: {}", summary.total_fields);
    println!("  Success rate: {}", style(&summary.success_rate).green());
    if summary.total_errors > 0 {
        println!("  Errors: {}", style(summary.total_errors).red().bold());
    }
    if summary.total_manual_intervention > 0 {
        println!(
            "  Manual intervention: {}",
            style(summary.total_manual_intervention).yellow().bold()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_cli_parse_convert() {
        let cli = Cli::parse_from([
            "xmlform-converter",
            "convert",
            "form.xdp",
            "--mapping",
            "mapping.json",
            "--output-dir",
            "out",
        ]);

        let Commands::Convert {
            input,
            mapping,
            output_dir,
            ..
        } = cli.command
        else {
            panic!("expected convert command");
        };
        assert_eq!(input, PathBuf::from("form.xdp"));
        assert_eq!(mapping, Some(PathBuf::from("mapping.json")));
        assert_eq!(output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_cli_parse_batch_workers() {
        let cli = Cli::parse_from(["xmlform-converter", "batch", "--input-dir", "in", "-w", "4"]);

        let Commands::Batch {
            input_dir, workers, ..
        } = cli.command
        else {
            panic!("expected batch command");
        };
        assert_eq!(input_dir, PathBuf::from("in"));
        assert_eq!(workers, Some(4));
    }

    #[test]
    fn test_scan_sources() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("b.xml"), "<a/>").unwrap();
        fs::write(root.join("a.XDP"), "<a/>").unwrap();
        fs::write(root.join("sub/c.xml"), "<a/>").unwrap();
        fs::write(root.join("notes.txt"), "").unwrap();

        let found: Vec<PathBuf> = scan_sources(root)
            .unwrap()
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            found,
            vec![
                PathBuf::from("a.XDP"),
                PathBuf::from("b.xml"),
                PathBuf::from("sub/c.xml")
            ]
        );
    }
}
