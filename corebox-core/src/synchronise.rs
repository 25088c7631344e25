//! High-level pipeline for one upload run: manifest → reconcile → provision → upload.
//!
//! [`synchronise`] wires the individual stages together for a single
//! project/prospect:
//!   - writes the manifest summary to the run log
//!   - fetches every image the portal already holds (fatal on failure)
//!   - reports remote duplicates found in that listing
//!   - provisions one drill hole per distinct hole name
//!   - uploads everything that is not a duplicate
//!
//! Per-image problems never abort the run; they show up as failed outcomes in
//! the returned [`SynchroniseReport`]. Only the remote listing (and the drill
//! hole listing in reuse mode) is fatal, because without it duplicates cannot
//! be detected.

use tracing::{error, info, warn};

use crate::config::PortalConfig;
use crate::contract::{ApiError, PortalApi};
use crate::manifest::Manifest;
use crate::orchestrate::{upload_images, ImageOutcome, UploadSummary, UploadTarget};
use crate::provision::{existing_hole_ids, provision_drill_holes, ProvisionFailure};
use crate::reconcile::{find_remote_duplicates, remote_records, DuplicateGroup};
use crate::report::{log_manifest_summary, RunLog};

#[derive(Debug, thiserror::Error)]
pub enum SynchroniseError {
    #[error("failed to list remote images: {0}")]
    ListImages(#[source] ApiError),

    #[error("failed to list remote drill holes: {0}")]
    ListDrillHoles(#[source] ApiError),
}

/// Everything a run produced, for the caller to report on.
#[derive(Debug)]
pub struct SynchroniseReport {
    /// One entry per manifest row, in manifest order.
    pub outcomes: Vec<ImageOutcome>,
    pub summary: UploadSummary,
    pub provision_failures: Vec<ProvisionFailure>,
    pub remote_duplicates: Vec<DuplicateGroup>,
}

impl SynchroniseReport {
    /// Manifest row indices whose upload failed.
    pub fn failed_rows(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.is_failed())
            .map(|o| o.index)
            .collect()
    }
}

pub async fn synchronise<A>(
    config: &PortalConfig,
    api: &A,
    manifest: &Manifest,
    log: &mut RunLog,
) -> Result<SynchroniseReport, SynchroniseError>
where
    A: PortalApi + ?Sized,
{
    info!(
        project_id = config.project_id,
        prospect_id = config.prospect_id,
        images = manifest.len(),
        "[SYNC] Starting upload run"
    );
    log_manifest_summary(log, manifest);

    let items = api
        .list_images(config.project_id, config.prospect_id)
        .await
        .map_err(|e| {
            error!(error = %e, "[SYNC][ERROR] Listing remote images failed");
            log.event(format_args!("Failed to list remote images: {e}"));
            SynchroniseError::ListImages(e)
        })?;
    let remote = remote_records(&items);
    info!(items = items.len(), usable = remote.len(), "[SYNC] Fetched remote images");
    log.section("Remote Images");
    log.line(format_args!(
        "Fetched {} remote images ({} usable for duplicate checks)",
        items.len(),
        remote.len()
    ));

    let remote_duplicates = find_remote_duplicates(&remote);
    for group in &remote_duplicates {
        warn!(key = %group.key, ids = ?group.ids, "[SYNC] Portal already holds duplicate images");
        log.line(format_args!(
            "Remote duplicate {}: keep {}, redundant {}",
            group.key,
            group.ids[0],
            group.redundant_ids().join(", ")
        ));
    }

    let staged = manifest.staged_images();

    let existing = if config.reuse_existing_holes {
        let holes = api.list_drill_holes().await.map_err(|e| {
            error!(error = %e, "[SYNC][ERROR] Listing drill holes failed");
            log.event(format_args!("Failed to list drill holes: {e}"));
            SynchroniseError::ListDrillHoles(e)
        })?;
        Some(existing_hole_ids(&holes))
    } else {
        None
    };

    let provision = provision_drill_holes(
        api,
        config.project_id,
        config.prospect_id,
        &staged,
        existing.as_ref(),
        log,
    )
    .await;

    let target = UploadTarget {
        project_id: config.project_id,
        prospect_id: config.prospect_id,
        request_delay: config.request_delay,
    };
    let outcomes = upload_images(api, target, &staged, &remote, &provision.holes, log).await;
    let summary = UploadSummary::from_outcomes(&outcomes);

    log.section("Final Summary");
    log.line(format_args!("Total files: {}", summary.total));
    log.line(format_args!("Uploaded: {}", summary.uploaded));
    log.line(format_args!("Skipped (duplicates): {}", summary.skipped));
    log.line(format_args!("Failed: {}", summary.failed));
    log.flush();

    info!(
        total = summary.total,
        uploaded = summary.uploaded,
        skipped = summary.skipped,
        failed = summary.failed,
        "[SYNC] Upload run complete"
    );

    Ok(SynchroniseReport {
        outcomes,
        summary,
        provision_failures: provision.failures,
        remote_duplicates,
    })
}
