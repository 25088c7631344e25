//! Read-side workflows built on the same [`PortalApi`]: listing exports,
//! row-detail export and batch workflow processing.

use chrono::Local;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::{PortalConfig, DEFAULT_PROCESS_DELAY};
use crate::contract::{ApiError, DrillHoleItem, ImageItem, PortalApi};
use crate::reconcile::{find_remote_duplicates, remote_records};
use crate::report::{write_csv, RunLog, RunPaths};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Render a loose JSON field as a CSV cell: strings unquoted, null and
/// missing as empty.
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn cell_or(value: Option<&Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_string(),
        v => cell(v),
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

pub const UPLOADED_FILES_HEADERS: &[&str] = &[
    "File Name",
    "depthFrom",
    "depthTo",
    "standardType",
    "imageClass",
    "type",
    "drillHoleID",
];

pub const DUPLICATED_FILES_HEADERS: &[&str] = &["Identity Key", "Kept ID", "Duplicate ID"];

pub const DRILL_HOLES_HEADERS: &[&str] = &[
    "Hole Name",
    "ID",
    "drillHoleStatus",
    "elevation",
    "northing",
    "easting",
    "longitude",
    "latitude",
    "dip",
    "azimuth",
    "rl",
    "maxDepth",
];

pub fn image_listing_row(item: &ImageItem) -> Vec<String> {
    vec![
        item.first_file_name().unwrap_or_default().to_string(),
        cell(item.depth_from.as_ref()),
        cell(item.depth_to.as_ref()),
        cell(item.standard_type.as_ref()),
        cell(item.image_class.as_ref()),
        cell(item.image_type.as_ref()),
        cell(item.drill_hole.as_ref().and_then(|h| h.id.as_ref())),
    ]
}

pub fn drill_hole_row(item: &DrillHoleItem) -> Vec<String> {
    vec![
        item.name.clone().unwrap_or_default(),
        cell(item.id.as_ref()),
        cell(item.drill_hole_status.as_ref()),
        cell(item.elevation.as_ref()),
        cell(item.northing.as_ref()),
        cell(item.easting.as_ref()),
        cell(item.longitude.as_ref()),
        cell(item.latitude.as_ref()),
        cell(item.dip.as_ref()),
        cell(item.azimuth.as_ref()),
        cell(item.rl.as_ref()),
        cell(item.max_depth.as_ref()),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingReport {
    pub images: usize,
    pub duplicate_ids: usize,
    pub drill_holes: usize,
    pub images_csv: PathBuf,
    pub duplicates_csv: PathBuf,
    pub drill_holes_csv: PathBuf,
}

/// Export every image and drill hole the portal holds, plus the redundant
/// image ids found among them.
pub async fn export_listing<A>(
    config: &PortalConfig,
    api: &A,
    paths: &RunPaths,
) -> Result<ListingReport, ExportError>
where
    A: PortalApi + ?Sized,
{
    info!(
        project_id = config.project_id,
        prospect_id = config.prospect_id,
        "[LIST] Fetching images"
    );
    let images = api
        .list_images(config.project_id, config.prospect_id)
        .await?;
    let images_csv = paths.success_file("uploaded_files", "csv");
    write_csv(&images_csv, UPLOADED_FILES_HEADERS, images.iter().map(image_listing_row))?;

    let groups = find_remote_duplicates(&remote_records(&images));
    let duplicate_rows: Vec<[String; 3]> = groups
        .iter()
        .flat_map(|group| {
            group.redundant_ids().iter().map(move |id| {
                [group.key.to_string(), group.ids[0].clone(), id.clone()]
            })
        })
        .collect();
    let duplicates_csv = paths.success_file("duplicated_files", "csv");
    write_csv(&duplicates_csv, DUPLICATED_FILES_HEADERS, &duplicate_rows)?;
    if !duplicate_rows.is_empty() {
        warn!(
            groups = groups.len(),
            redundant = duplicate_rows.len(),
            "[LIST] Portal holds duplicate images"
        );
    }

    info!("[LIST] Fetching drill holes");
    let holes = api.list_drill_holes().await?;
    let drill_holes_csv = paths.success_file("drill_holes", "csv");
    write_csv(&drill_holes_csv, DRILL_HOLES_HEADERS, holes.iter().map(drill_hole_row))?;

    info!(
        images = images.len(),
        duplicates = duplicate_rows.len(),
        drill_holes = holes.len(),
        "[LIST] Listing export complete"
    );
    Ok(ListingReport {
        images: images.len(),
        duplicate_ids: duplicate_rows.len(),
        drill_holes: holes.len(),
        images_csv,
        duplicates_csv,
        drill_holes_csv,
    })
}

// ---------------------------------------------------------------------------
// Row-detail export
// ---------------------------------------------------------------------------

pub const OCR_SUMMARY_HEADERS: &[&str] = &[
    "projectName",
    "prospectName",
    "drillHoleName",
    "imageId",
    "ocrId",
    "ocrType",
    "ocrText",
    "rowIndex",
    "x",
    "y",
    "width",
    "height",
    "originalX",
];

pub const OUTLINE_HEADERS: &[&str] = &[
    "projectName",
    "prospectName",
    "drillHoleName",
    "imageId",
    "outlineName",
    "isPolyComplete",
    "rowFrom",
    "rowTo",
    "numPoints",
];

/// Page through the row-detail endpoint until `totalCount` items have been
/// seen or a page comes back empty.
pub async fn fetch_all_rows<A>(
    api: &A,
    project_id: i64,
    prospect_id: i64,
    page_size: u32,
) -> Result<Vec<Value>, ApiError>
where
    A: PortalApi + ?Sized,
{
    let page_size = page_size.max(1);
    let mut items = Vec::new();
    let mut skip: u64 = 0;
    loop {
        let page = api
            .image_rows(project_id, prospect_id, skip, page_size)
            .await?;
        let received = page.items.len() as u64;
        info!(skip, received, total = page.total_count, "[ROWS] Fetched page");
        if received == 0 {
            break;
        }
        items.extend(page.items);
        skip += received;
        if skip >= page.total_count {
            break;
        }
    }
    Ok(items)
}

fn item_context(item: &Value) -> [String; 4] {
    [
        cell(item.get("projectName")),
        cell(item.get("prospectName")),
        cell(item.get("drillHoleName")),
        cell_or(item.get("imageId"), "0"),
    ]
}

/// One row per OCR block across all items.
pub fn ocr_rows(items: &[Value]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for item in items {
        let context = item_context(item);
        let Some(ocrs) = item.get("ocrs").and_then(Value::as_array) else {
            continue;
        };
        for ocr in ocrs {
            let mut row = context.to_vec();
            row.extend([
                cell(ocr.get("id")),
                cell(ocr.get("type")),
                cell(ocr.get("text")),
                cell_or(ocr.get("rowIndex"), "0"),
                cell_or(ocr.get("x"), "0"),
                cell_or(ocr.get("y"), "0"),
                cell_or(ocr.get("width"), "0"),
                cell_or(ocr.get("height"), "0"),
                cell_or(ocr.get("originalX"), "0"),
            ]);
            rows.push(row);
        }
    }
    rows
}

fn point_y(point: &Value) -> Option<&Value> {
    match point {
        Value::Array(coords) => coords.get(1),
        Value::Object(map) => map.get("y"),
        _ => None,
    }
}

/// One row per core outline with at least one point: the vertical extent
/// (min and max point y) and the point count.
pub fn outline_rows(items: &[Value]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for item in items {
        let context = item_context(item);
        let Some(outlines) = item.get("coreOutlines").and_then(Value::as_array) else {
            continue;
        };
        for outline in outlines {
            let points = outline
                .get("points")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if points.is_empty() {
                continue;
            }
            let ys: Vec<(f64, &Value)> = points
                .iter()
                .filter_map(point_y)
                .filter_map(|y| y.as_f64().map(|v| (v, y)))
                .collect();
            let from = ys.iter().min_by(|a, b| a.0.total_cmp(&b.0)).map(|p| p.1);
            let to = ys.iter().max_by(|a, b| a.0.total_cmp(&b.0)).map(|p| p.1);

            let mut row = context.to_vec();
            row.extend([
                cell(outline.get("name")),
                cell_or(outline.get("isPolyComplete"), "false"),
                cell_or(from, "0"),
                cell_or(to, "0"),
                points.len().to_string(),
            ]);
            rows.push(row);
        }
    }
    rows
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowExportReport {
    pub items: usize,
    pub ocr_rows: usize,
    pub outline_rows: usize,
    pub raw_json: PathBuf,
    pub summary_csv: PathBuf,
    pub detailed_csv: PathBuf,
}

/// Fetch all row-detail items and write the raw JSON, the OCR summary and
/// the core outline summary.
pub async fn export_rows<A>(
    config: &PortalConfig,
    api: &A,
    paths: &RunPaths,
) -> Result<RowExportReport, ExportError>
where
    A: PortalApi + ?Sized,
{
    let items = fetch_all_rows(
        api,
        config.project_id,
        config.prospect_id,
        config.row_page_size,
    )
    .await?;

    let raw_json = paths.log_file("image_row_data_raw", "json");
    std::fs::write(&raw_json, serde_json::to_string_pretty(&items)?)?;
    info!(path = %raw_json.display(), items = items.len(), "[ROWS] Raw data saved");

    let summary_csv = paths.success_file("image_row_summary", "csv");
    let ocr_count = write_csv(&summary_csv, OCR_SUMMARY_HEADERS, ocr_rows(&items))?;

    let detailed_csv = paths.success_file("image_row_detailed", "csv");
    let outline_count = write_csv(&detailed_csv, OUTLINE_HEADERS, outline_rows(&items))?;

    Ok(RowExportReport {
        items: items.len(),
        ocr_rows: ocr_count,
        outline_rows: outline_count,
        raw_json,
        summary_csv,
        detailed_csv,
    })
}

// ---------------------------------------------------------------------------
// Batch processing
// ---------------------------------------------------------------------------

pub const PROCESSED_HEADERS: &[&str] = &[
    "Image ID",
    "Filename",
    "Drill Hole",
    "Depth From",
    "Depth To",
    "Timestamp",
];

pub const PROCESS_FAILED_HEADERS: &[&str] = &[
    "Image ID",
    "Filename",
    "Drill Hole",
    "Depth From",
    "Depth To",
    "Timestamp",
    "Error",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Only written when at least one image succeeded.
    pub success_csv: Option<PathBuf>,
    /// Only written when at least one image failed.
    pub failed_csv: Option<PathBuf>,
}

/// Submit every image of the configured project/prospect to `workflow_id`,
/// one request at a time.
pub async fn process_images<A>(
    config: &PortalConfig,
    api: &A,
    workflow_id: i64,
    paths: &RunPaths,
    log: &mut RunLog,
) -> Result<ProcessReport, ExportError>
where
    A: PortalApi + ?Sized,
{
    let delay = config.request_delay.unwrap_or(DEFAULT_PROCESS_DELAY);

    log.line("=== Batch Image Processing Log ===");
    log.line(format_args!(
        "Started at: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    log.line(format_args!("Project ID: {}", config.project_id));
    log.line(format_args!("Prospect ID: {}", config.prospect_id));
    log.line(format_args!("Workflow ID: {workflow_id}"));
    log.line(format_args!("Authentication method: {}", config.auth.mode_name()));

    let images = match api
        .list_images(config.project_id, config.prospect_id)
        .await
    {
        Ok(images) => images,
        Err(e) => {
            error!(error = %e, "[PROCESS][ERROR] Failed to fetch images");
            log.event(format_args!("Failed to fetch images: {e}"));
            return Err(e.into());
        }
    };
    let total = images.len();
    info!(total, workflow_id, "[PROCESS] Starting batch processing");
    log.line(format_args!("Found {total} images to process"));

    let mut succeeded: Vec<Vec<String>> = Vec::new();
    let mut failed: Vec<Vec<String>> = Vec::new();

    for (i, image) in images.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        let filename = image.first_file_name().unwrap_or("Unknown").to_string();
        let hole = image.hole_name().unwrap_or("Unknown").to_string();
        let id_cell = cell(image.id.as_ref());

        log.line("");
        log.event(format_args!("Processing image {}/{total}: {filename}", i + 1));
        log.line(format_args!("  Image ID: {id_cell}"));
        log.line(format_args!("  Drill Hole: {hole}"));
        log.line(format_args!(
            "  Depth Range: {} - {}",
            cell_or(image.depth_from.as_ref(), "Unknown"),
            cell_or(image.depth_to.as_ref(), "Unknown")
        ));

        let result = match image.id.clone().filter(|v| !v.is_null()) {
            Some(id) => api.process_image(id, workflow_id).await,
            None => Err(ApiError::UnexpectedShape("image has no id".into())),
        };

        let mut row = vec![
            id_cell,
            filename.clone(),
            hole,
            cell_or(image.depth_from.as_ref(), "Unknown"),
            cell_or(image.depth_to.as_ref(), "Unknown"),
            Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        ];
        match result {
            Ok(()) => {
                info!(image = %filename, "[PROCESS] Processed");
                log.line("  Successfully processed");
                succeeded.push(row);
            }
            Err(e) => {
                error!(image = %filename, error = %e, "[PROCESS][ERROR] Processing failed");
                log.line(format_args!("  Failed to process. Error: {e}"));
                row.push(e.to_string());
                failed.push(row);
            }
        }
    }

    log.section("Processing Summary");
    log.line(format_args!("Total Images: {total}"));
    log.line(format_args!("Successfully Processed: {}", succeeded.len()));
    log.line(format_args!("Failed to Process: {}", failed.len()));
    log.line(format_args!(
        "Completion Time: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    log.flush();

    let success_csv = if succeeded.is_empty() {
        None
    } else {
        let path = paths.success_file("successful_images", "csv");
        write_csv(&path, PROCESSED_HEADERS, &succeeded)?;
        Some(path)
    };
    let failed_csv = if failed.is_empty() {
        None
    } else {
        let path = paths.fail_file("failed_images", "csv");
        write_csv(&path, PROCESS_FAILED_HEADERS, &failed)?;
        Some(path)
    };

    info!(
        total,
        succeeded = succeeded.len(),
        failed = failed.len(),
        "[PROCESS] Batch processing complete"
    );
    Ok(ProcessReport {
        total,
        succeeded: succeeded.len(),
        failed: failed.len(),
        success_csv,
        failed_csv,
    })
}
