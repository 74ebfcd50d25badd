// src/report.rs

use crate::error::ReportError;
use crate::model::{Metric, Report, Summary};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const ERROR_SEPARATOR: &str = "-----------------------";

const DATE_FORMAT: &str = "%d-%m-%Y";

/// Fixed CSV header, terminated with a newline.
pub fn csv_header() -> String {
    let mut columns = vec!["project", "date", "revision"];
    columns.extend(Metric::ALL.iter().map(|m| m.name()));
    let mut header = columns.join(",");
    header.push('\n');
    header
}

impl Summary {
    /// One CSV line, every metric column present.
    pub fn csv_row(&self) -> String {
        let mut fields = vec![
            escape(&self.project),
            self.date.format(DATE_FORMAT).to_string(),
            escape(&self.revision),
        ];
        fields.extend(self.counts.iter().map(|(_, value)| value.to_string()));
        let mut row = fields.join(",");
        row.push('\n');
        row
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render the CSV body (header + rows) of a report.
pub fn render_csv(report: &Report) -> String {
    let mut out = csv_header();
    for summary in report.summaries() {
        out.push_str(&summary.csv_row());
    }
    out
}

/// Render the error log: key, message, separator per record.
pub fn render_errors(report: &Report) -> String {
    let mut out = String::new();
    for record in report.errors() {
        out.push_str(&record.key);
        out.push('\n');
        out.push_str(&record.message);
        out.push('\n');
        out.push_str(ERROR_SEPARATOR);
        out.push('\n');
    }
    out
}

/// Paths written for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    pub csv: PathBuf,
    pub errors: PathBuf,
}

/// Write `<project>.csv` and `<project>-errors.txt` into `dir`.
///
/// Each file is staged in a temp file next to its destination and renamed
/// into place, so a failed write leaves any previous file intact.
pub fn write_report(report: &Report, dir: &Path) -> Result<ReportFiles, ReportError> {
    let files = ReportFiles {
        csv: dir.join(format!("{}.csv", report.project)),
        errors: dir.join(format!("{}-errors.txt", report.project)),
    };
    write_atomic(&files.csv, render_csv(report).as_bytes())?;
    write_atomic(&files.errors, render_errors(report).as_bytes())?;
    Ok(files)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ReportError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent).map_err(ReportError::io(parent))?;
    tmp.write_all(data).map_err(ReportError::io(path))?;
    tmp.flush().map_err(ReportError::io(path))?;
    tmp.persist(path).map_err(|source| ReportError::Persist {
        source,
        path: path.to_path_buf(),
    })?;
    Ok(())
}

/// The consolidated `results.csv` shared by all projects of a run.
pub struct ResultsWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl ResultsWriter {
    pub fn create(path: &Path) -> Result<Self, ReportError> {
        let file = File::create(path).map_err(ReportError::io(path))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(csv_header().as_bytes())
            .map_err(ReportError::io(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    pub fn append(&mut self, report: &Report) -> Result<(), ReportError> {
        for summary in report.summaries() {
            self.writer
                .write_all(summary.csv_row().as_bytes())
                .map_err(ReportError::io(&self.path))?;
            self.rows += 1;
        }
        self.writer.flush().map_err(ReportError::io(&self.path))
    }

    pub fn finish(mut self) -> Result<usize, ReportError> {
        self.writer.flush().map_err(ReportError::io(&self.path))?;
        Ok(self.rows)
    }
}
