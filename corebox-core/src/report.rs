//! Run artifacts: per-run directories, the operator text log, CSV outputs.

use chrono::Local;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::manifest::{Manifest, ManifestError};

/// `20250131_142501`, used in every artifact name of a run.
pub fn run_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// `<root>/logs/<workflow>/{logs,success,fail}` for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub logs: PathBuf,
    pub success: PathBuf,
    pub fail: PathBuf,
    pub timestamp: String,
}

impl RunPaths {
    pub fn create(root: &Path, workflow: &str) -> io::Result<Self> {
        Self::create_with_timestamp(root, workflow, run_timestamp())
    }

    pub fn create_with_timestamp(
        root: &Path,
        workflow: &str,
        timestamp: String,
    ) -> io::Result<Self> {
        let base = root.join("logs").join(workflow);
        let paths = RunPaths {
            logs: base.join("logs"),
            success: base.join("success"),
            fail: base.join("fail"),
            timestamp,
        };
        for dir in [&paths.logs, &paths.success, &paths.fail] {
            fs::create_dir_all(dir)?;
        }
        info!(run_dir = %base.display(), timestamp = %paths.timestamp, "Prepared run directories");
        Ok(paths)
    }

    /// `<logs>/<stem>_<timestamp>.<ext>`
    pub fn log_file(&self, stem: &str, ext: &str) -> PathBuf {
        self.logs.join(format!("{stem}_{}.{ext}", self.timestamp))
    }

    pub fn success_file(&self, stem: &str, ext: &str) -> PathBuf {
        self.success.join(format!("{stem}_{}.{ext}", self.timestamp))
    }

    pub fn fail_file(&self, stem: &str, ext: &str) -> PathBuf {
        self.fail.join(format!("{stem}_{}.{ext}", self.timestamp))
    }
}

/// Human-readable log of one run, kept next to the structured tracing output.
///
/// Write failures are reported through `tracing` once and otherwise
/// ignored: losing the text log must not abort an upload run.
pub struct RunLog {
    path: Option<PathBuf>,
    sink: Box<dyn Write + Send>,
    failed: bool,
}

impl RunLog {
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        info!(log_file = %path.display(), "Run log created");
        Ok(RunLog {
            path: Some(path),
            sink: Box::new(BufWriter::new(file)),
            failed: false,
        })
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        RunLog {
            path: None,
            sink: Box::new(writer),
            failed: false,
        }
    }

    /// A log that discards everything.
    pub fn discard() -> Self {
        Self::from_writer(io::sink())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append `text` as-is followed by a newline.
    pub fn line(&mut self, text: impl Display) {
        let result = writeln!(self.sink, "{text}");
        self.note(result);
    }

    /// Append `text` prefixed with the current local time.
    pub fn event(&mut self, text: impl Display) {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S");
        let result = writeln!(self.sink, "[{now}] {text}");
        self.note(result);
    }

    pub fn section(&mut self, title: &str) {
        self.line("");
        self.line(format_args!("=== {title} ==="));
    }

    pub fn flush(&mut self) {
        let result = self.sink.flush();
        self.note(result);
    }

    fn note(&mut self, result: io::Result<()>) {
        if let Err(e) = result {
            if !self.failed {
                warn!(error = %e, log_file = ?self.path, "Failed to write run log");
                self.failed = true;
            }
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        let _ = self.sink.flush();
    }
}

/// Write the manifest listing that opens every upload log.
pub fn log_manifest_summary(log: &mut RunLog, manifest: &Manifest) {
    log.section("File Processing Order");
    log.line(format_args!("Total files to process: {}", manifest.len()));
    log.line("-".repeat(50));
    for (index, row) in manifest.rows.iter().enumerate() {
        let image = &row.image;
        log.line(format_args!("{}. File: {}", index + 1, image.original_filename));
        log.line(format_args!("   Line Number: {}", row.line));
        log.line(format_args!("   Drill Hole: {}", image.hole_name));
        log.line(format_args!("   Condition: {}", image.image_type_label));
        log.line(format_args!("   Full Path: {}", image.local_path.display()));
        log.line(format_args!(
            "   Depth Range: {} - {}",
            image.depth_from, image.depth_to
        ));
    }

    let mut conditions: Vec<&str> = manifest
        .rows
        .iter()
        .map(|row| row.image.image_type_label.as_str())
        .collect();
    conditions.sort_unstable();
    conditions.dedup();

    log.section("Processing Summary");
    log.line(format_args!("Total Files: {}", manifest.len()));
    log.line(format_args!(
        "Total Drill Holes: {}",
        manifest.distinct_holes().len()
    ));
    log.line(format_args!("Unique Conditions: {}", conditions.join(", ")));
}

/// Write the selected manifest rows to `path` in the manifest's own shape, so
/// the file can be fed straight back in as the next run's manifest.
pub fn write_failed_manifest(
    path: &Path,
    manifest: &Manifest,
    failed_rows: &[usize],
) -> Result<(), ManifestError> {
    let file = File::create(path)?;
    manifest.write_rows(BufWriter::new(file), failed_rows.iter().copied())?;
    info!(path = %path.display(), rows = failed_rows.len(), "Wrote failed uploads manifest");
    Ok(())
}

/// Write a header plus rows of already-rendered cells.
pub fn write_csv<I, R, S>(path: &Path, headers: &[&str], rows: I) -> Result<usize, csv::Error>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(headers)?;
    let mut count = 0;
    for row in rows {
        wtr.write_record(row)?;
        count += 1;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = count, "Wrote CSV");
    Ok(count)
}
