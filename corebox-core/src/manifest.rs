//! CSV manifest of images staged for upload.
//!
//! Column names differ between manifest generations (`BoxFrom` vs
//! `Start Number`, ...), so each field is located through a list of accepted
//! header aliases. The original header and every raw record are kept so that
//! rows can be written back out in exactly the shape they came in.

use csv::StringRecord;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::model::{FieldValue, StagedImage};

const HOLE_COLUMNS: &[&str] = &["Folder", "Hole", "Hole Name", "Drill Hole", "HoleId"];
const FROM_COLUMNS: &[&str] = &["BoxFrom", "Start Number", "Depth From", "DepthFrom"];
const TO_COLUMNS: &[&str] = &["BoxTo", "End Number", "Depth To", "DepthTo"];
const CONDITION_COLUMNS: &[&str] = &["Condition", "Image Type", "ImageType"];
const PATH_COLUMNS: &[&str] = &["Full Path", "Path"];
const FILENAME_COLUMNS: &[&str] = &["Original Filename", "File Name", "Filename"];

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to open manifest {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed manifest CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("manifest has no `{column}` column (found: {found})")]
    MissingColumn { column: &'static str, found: String },

    #[error("manifest line {line}: empty `{column}`")]
    MissingValue { line: u64, column: String },

    #[error("failed to write manifest rows: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    hole: usize,
    from: usize,
    to: usize,
    condition: usize,
    path: usize,
    filename: Option<usize>,
}

fn normalise_header(h: &str) -> String {
    h.trim_start_matches('\u{feff}').trim().to_ascii_lowercase()
}

fn find_column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    let wanted: Vec<String> = aliases.iter().map(|a| a.to_ascii_lowercase()).collect();
    headers
        .iter()
        .position(|h| wanted.contains(&normalise_header(h)))
}

fn require_column(
    headers: &StringRecord,
    aliases: &'static [&'static str],
) -> Result<usize, ManifestError> {
    find_column(headers, aliases).ok_or_else(|| ManifestError::MissingColumn {
        column: aliases[0],
        found: headers.iter().collect::<Vec<_>>().join(", "),
    })
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self, ManifestError> {
        Ok(Columns {
            hole: require_column(headers, HOLE_COLUMNS)?,
            from: require_column(headers, FROM_COLUMNS)?,
            to: require_column(headers, TO_COLUMNS)?,
            condition: require_column(headers, CONDITION_COLUMNS)?,
            path: require_column(headers, PATH_COLUMNS)?,
            filename: find_column(headers, FILENAME_COLUMNS),
        })
    }
}

/// One manifest row: the raw record plus the image it describes.
#[derive(Debug, Clone)]
pub struct ManifestRow {
    /// 1-based line in the source file (the header is line 1).
    pub line: u64,
    pub record: StringRecord,
    pub image: StagedImage,
}

/// A parsed manifest in file order.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub headers: StringRecord,
    pub rows: Vec<ManifestRow>,
}

impl Manifest {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        info!(manifest = %path.display(), "Reading upload manifest");
        let file = File::open(path).map_err(|source| ManifestError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_reader(file)?;
        info!(
            manifest = %path.display(),
            rows = manifest.len(),
            holes = manifest.distinct_holes().len(),
            "Manifest loaded"
        );
        Ok(manifest)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ManifestError> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr.headers()?.clone();
        let columns = Columns::locate(&headers)?;

        let mut rows = Vec::new();
        for (index, result) in rdr.records().enumerate() {
            let record = result?;
            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(index as u64 + 2);
            let image = parse_row(&headers, &record, columns, line)?;
            rows.push(ManifestRow {
                line,
                record,
                image,
            });
        }
        Ok(Manifest { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn staged_images(&self) -> Vec<StagedImage> {
        self.rows.iter().map(|row| row.image.clone()).collect()
    }

    /// Distinct hole names in first-seen order.
    pub fn distinct_holes(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.image.hole_name.as_str()) {
                seen.push(&row.image.hole_name);
            }
        }
        seen
    }

    /// Write the header and the selected rows, unchanged, as CSV.
    pub fn write_rows<W: Write>(
        &self,
        writer: W,
        indices: impl IntoIterator<Item = usize>,
    ) -> Result<(), ManifestError> {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        wtr.write_record(&self.headers)?;
        for index in indices {
            if let Some(row) = self.rows.get(index) {
                wtr.write_record(&row.record)?;
            }
        }
        wtr.flush()?;
        Ok(())
    }
}

fn parse_row(
    headers: &StringRecord,
    record: &StringRecord,
    columns: Columns,
    line: u64,
) -> Result<StagedImage, ManifestError> {
    let required = |idx: usize| -> Result<String, ManifestError> {
        match record.get(idx).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(ManifestError::MissingValue {
                line,
                column: headers.get(idx).unwrap_or("?").to_string(),
            }),
        }
    };

    let hole_name = required(columns.hole)?;
    let depth_from = FieldValue::new(required(columns.from)?);
    let depth_to = FieldValue::new(required(columns.to)?);
    let local_path = PathBuf::from(required(columns.path)?);
    let image_type_label = record
        .get(columns.condition)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let original_filename = columns
        .filename
        .and_then(|idx| record.get(idx))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .or_else(|| {
            local_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_default();

    Ok(StagedImage {
        hole_name,
        depth_from,
        depth_to,
        image_type_label,
        local_path,
        original_filename,
    })
}
