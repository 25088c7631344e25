//! Upload orchestration: one outcome per staged image, in manifest order.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::contract::{ApiError, ImageUpload, PortalApi};
use crate::model::{RemoteImageRecord, StagedImage};
use crate::provision::DrillHoleMap;
use crate::reconcile::find_match;
use crate::report::RunLog;

/// Why an image was not uploaded even though it was not a duplicate.
#[derive(Debug, thiserror::Error)]
pub enum FailureReason {
    #[error("no drill hole id for `{hole_name}`")]
    MissingHoleId { hole_name: String },

    #[error("cannot read {}: {message}", .path.display())]
    ReadFile { path: PathBuf, message: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The portal already holds an image with the same identity key.
    Duplicate,
}

#[derive(Debug)]
pub enum UploadOutcome {
    Success,
    Skipped(SkipReason),
    Failed(FailureReason),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UploadOutcome::Failed(_))
    }
}

/// The outcome for the staged image at `index` of the input slice.
#[derive(Debug)]
pub struct ImageOutcome {
    pub index: usize,
    pub display_name: String,
    pub outcome: UploadOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub total: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl UploadSummary {
    pub fn from_outcomes(outcomes: &[ImageOutcome]) -> Self {
        let mut summary = UploadSummary {
            total: outcomes.len(),
            ..Default::default()
        };
        for o in outcomes {
            match o.outcome {
                UploadOutcome::Success => summary.uploaded += 1,
                UploadOutcome::Skipped(_) => summary.skipped += 1,
                UploadOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Settings the orchestrator needs from the run configuration.
#[derive(Debug, Clone, Copy)]
pub struct UploadTarget {
    pub project_id: i64,
    pub prospect_id: i64,
    /// Slept between upload requests, never before the first one.
    pub request_delay: Option<Duration>,
}

/// Upload every staged image that is not already on the portal.
///
/// Never fails as a whole: each image gets its own [`UploadOutcome`].
pub async fn upload_images<A>(
    api: &A,
    target: UploadTarget,
    staged: &[StagedImage],
    remote: &[RemoteImageRecord],
    holes: &DrillHoleMap,
    log: &mut RunLog,
) -> Vec<ImageOutcome>
where
    A: PortalApi + ?Sized,
{
    info!(images = staged.len(), remote = remote.len(), "[UPLOAD] Starting image uploads");
    log.section("Upload Progress");

    let mut outcomes = Vec::with_capacity(staged.len());
    let mut requests_sent = 0usize;

    for (index, image) in staged.iter().enumerate() {
        let name = image.display_name();
        let outcome = if let Some(existing) = find_match(&image.identity_key(), remote) {
            info!(image = %name, remote_id = %existing.id, "[UPLOAD] Skipping duplicate");
            log.event(format_args!(
                "Skipping {name}: already uploaded (image ID {})",
                existing.id
            ));
            UploadOutcome::Skipped(SkipReason::Duplicate)
        } else {
            match upload_one(api, target, image, holes, &mut requests_sent, log).await {
                Ok(()) => {
                    info!(image = %name, "[UPLOAD] Uploaded");
                    log.event(format_args!("Successfully uploaded {name}"));
                    UploadOutcome::Success
                }
                Err(reason) => {
                    error!(image = %name, error = %reason, "[UPLOAD][ERROR] Upload failed");
                    log.event(format_args!("Failed to upload {name}: {reason}"));
                    UploadOutcome::Failed(reason)
                }
            }
        };
        outcomes.push(ImageOutcome {
            index,
            display_name: name,
            outcome,
        });
    }

    let summary = UploadSummary::from_outcomes(&outcomes);
    info!(
        total = summary.total,
        uploaded = summary.uploaded,
        skipped = summary.skipped,
        failed = summary.failed,
        "[UPLOAD] Finished image uploads"
    );
    outcomes
}

async fn upload_one<A>(
    api: &A,
    target: UploadTarget,
    image: &StagedImage,
    holes: &DrillHoleMap,
    requests_sent: &mut usize,
    log: &mut RunLog,
) -> Result<(), FailureReason>
where
    A: PortalApi + ?Sized,
{
    let hole_id = holes
        .get(&image.hole_name)
        .ok_or_else(|| FailureReason::MissingHoleId {
            hole_name: image.hole_name.clone(),
        })?;

    let content = tokio::fs::read(&image.local_path).await.map_err(|e| {
        warn!(path = %image.local_path.display(), error = %e, "Cannot read staged image");
        FailureReason::ReadFile {
            path: image.local_path.clone(),
            message: e.to_string(),
        }
    })?;

    log.event(format_args!(
        "Going to upload: {} ({} bytes, hole ID {hole_id})",
        image.original_filename,
        content.len()
    ));

    let request = ImageUpload {
        project_id: target.project_id,
        prospect_id: target.prospect_id,
        hole_id,
        standard_type: image.standard_type().code(),
        depth_from: image.depth_from.to_string(),
        depth_to: image.depth_to.to_string(),
        file_name: image.original_filename.clone(),
        content,
    };
    if *requests_sent > 0 {
        if let Some(delay) = target.request_delay {
            tokio::time::sleep(delay).await;
        }
    }
    *requests_sent += 1;
    api.upload_image(request).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ErrorDetail, MockPortalApi};
    use crate::model::{FieldValue, IdentityKey};
    use tempfile::tempdir;

    fn staged_in(dir: &std::path::Path, hole: &str, from: &str, label: &str) -> StagedImage {
        let file = format!("{hole}_{from}.jpg");
        let path = dir.join(&file);
        std::fs::write(&path, b"jpeg").unwrap();
        StagedImage {
            hole_name: hole.into(),
            depth_from: FieldValue::new(from),
            depth_to: FieldValue::new("99"),
            image_type_label: label.into(),
            local_path: path,
            original_filename: file,
        }
    }

    fn target() -> UploadTarget {
        UploadTarget {
            project_id: 1,
            prospect_id: 2,
            request_delay: None,
        }
    }

    fn holes(entries: &[(&str, i64)]) -> DrillHoleMap {
        let mut map = DrillHoleMap::default();
        for (name, id) in entries {
            map.insert(*name, *id);
        }
        map
    }

    #[tokio::test]
    async fn duplicates_are_skipped_and_rest_uploaded() {
        let dir = tempdir().unwrap();
        let images = vec![
            staged_in(dir.path(), "A", "1", "Dry"),
            staged_in(dir.path(), "A", "2", "Dry"),
        ];
        let remote = vec![RemoteImageRecord {
            id: "77".into(),
            key: IdentityKey {
                hole_name: "A".into(),
                depth_from: FieldValue::new("1.0"),
                depth_to: FieldValue::new("99"),
                standard_type: FieldValue::new("1"),
            },
            file_name: None,
        }];

        let mut api = MockPortalApi::new();
        api.expect_upload_image()
            .withf(|req| req.depth_from == "2" && req.hole_id == 5 && req.standard_type == 1)
            .times(1)
            .returning(|_| Ok(()));

        let outcomes = upload_images(
            &api,
            target(),
            &images,
            &remote,
            &holes(&[("A", 5)]),
            &mut RunLog::discard(),
        )
        .await;

        assert!(matches!(outcomes[0].outcome, UploadOutcome::Skipped(SkipReason::Duplicate)));
        assert!(outcomes[1].outcome.is_success());
    }

    #[tokio::test]
    async fn missing_hole_and_unreadable_file_fail_individually() {
        let dir = tempdir().unwrap();
        let mut gone = staged_in(dir.path(), "A", "3", "Wet");
        gone.local_path = dir.path().join("does-not-exist.jpg");
        let images = vec![
            staged_in(dir.path(), "B", "1", "Wet"),
            gone,
            staged_in(dir.path(), "A", "4", "Wet"),
        ];

        let mut api = MockPortalApi::new();
        api.expect_upload_image()
            .times(1)
            .returning(|_| Ok(()));

        let outcomes = upload_images(
            &api,
            target(),
            &images,
            &[],
            &holes(&[("A", 5)]),
            &mut RunLog::discard(),
        )
        .await;

        assert!(matches!(
            &outcomes[0].outcome,
            UploadOutcome::Failed(FailureReason::MissingHoleId { hole_name }) if hole_name == "B"
        ));
        assert!(matches!(
            outcomes[1].outcome,
            UploadOutcome::Failed(FailureReason::ReadFile { .. })
        ));
        assert!(outcomes[2].outcome.is_success());

        let summary = UploadSummary::from_outcomes(&outcomes);
        assert_eq!(
            summary,
            UploadSummary {
                total: 3,
                uploaded: 1,
                skipped: 0,
                failed: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_slept_between_uploads_only() {
        let dir = tempdir().unwrap();
        let images: Vec<_> = ["1", "2", "3"]
            .iter()
            .map(|from| staged_in(dir.path(), "A", from, "Dry"))
            .collect();
        let paced = UploadTarget {
            request_delay: Some(Duration::from_secs(5)),
            ..target()
        };

        let mut api = MockPortalApi::new();
        api.expect_upload_image().times(4).returning(|_| Ok(()));
        let holes = holes(&[("A", 5)]);

        let start = tokio::time::Instant::now();
        let outcomes =
            upload_images(&api, paced, &images, &[], &holes, &mut RunLog::discard()).await;
        assert!(outcomes.iter().all(|o| o.outcome.is_success()));
        assert_eq!(start.elapsed(), Duration::from_secs(10));

        let start = tokio::time::Instant::now();
        upload_images(&api, paced, &images[..1], &[], &holes, &mut RunLog::discard()).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn api_rejection_is_a_failed_outcome() {
        let dir = tempdir().unwrap();
        let images = vec![staged_in(dir.path(), "A", "1", "Dry")];

        let mut api = MockPortalApi::new();
        api.expect_upload_image().returning(|_| {
            Err(ApiError::Status(ErrorDetail {
                status: 400,
                message: Some("Depth overlap".into()),
                ..Default::default()
            }))
        });

        let outcomes = upload_images(
            &api,
            target(),
            &images,
            &[],
            &holes(&[("A", 5)]),
            &mut RunLog::discard(),
        )
        .await;

        match &outcomes[0].outcome {
            UploadOutcome::Failed(FailureReason::Api(e)) => {
                assert_eq!(e.status_code(), Some(400));
                assert!(e.to_string().contains("Depth overlap"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
