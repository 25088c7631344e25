use corebox_core::config::{AuthConfig, PortalConfig};
use corebox_core::contract::{
    ApiError, DrillHoleRef, ErrorDetail, ImageFile, ImageItem, MockPortalApi, NewDrillHole,
};
use corebox_core::manifest::Manifest;
use corebox_core::orchestrate::{FailureReason, UploadOutcome, UploadSummary};
use corebox_core::report::{write_failed_manifest, RunLog};
use corebox_core::synchronise::{synchronise, SynchroniseError};
use serde_json::json;
use std::path::Path;
use tempfile::tempdir;

fn config() -> PortalConfig {
    PortalConfig::new(11, 22, AuthConfig::ApiKey("test-key".into()))
}

/// Write a manifest plus one small file per row into `dir`.
fn stage(dir: &Path, rows: &[(&str, &str, &str, &str)]) -> Manifest {
    let mut csv = String::from("Folder,BoxFrom,BoxTo,Range,Condition,Original Filename,Full Path\n");
    for (hole, from, to, condition) in rows {
        let name = format!("{hole}_{from}_{to}_{condition}.jpg");
        let path = dir.join(&name);
        std::fs::write(&path, b"\xff\xd8 fake jpeg").unwrap();
        csv.push_str(&format!(
            "{hole},{from},{to},1,{condition},{name},{}\n",
            path.display()
        ));
    }
    let manifest_path = dir.join("manifest.csv");
    std::fs::write(&manifest_path, csv).unwrap();
    Manifest::from_path(&manifest_path).unwrap()
}

fn remote(id: i64, hole: &str, from: f64, to: f64, standard_type: i64) -> ImageItem {
    ImageItem {
        id: Some(json!(id)),
        drill_hole: Some(DrillHoleRef {
            id: Some(json!(900)),
            name: Some(hole.to_string()),
        }),
        depth_from: Some(json!(from)),
        depth_to: Some(json!(to)),
        standard_type: Some(json!(standard_type)),
        files: Some(vec![ImageFile {
            file_name: Some(format!("renamed_{id}.jpg")),
        }]),
        ..Default::default()
    }
}

#[tokio::test]
async fn only_new_images_are_uploaded() {
    let dir = tempdir().unwrap();
    let manifest = stage(
        dir.path(),
        &[
            ("DH1", "0", "4.5", "Dry"),
            ("DH1", "4.5", "9", "Dry"),
            ("DH1", "9", "13.5", "Wet"),
        ],
    );

    let mut api = MockPortalApi::new();
    api.expect_list_images()
        .withf(|project, prospect| *project == 11 && *prospect == 22)
        .times(1)
        .returning(|_, _| Ok(vec![remote(1, "DH1", 0.0, 4.5, 1), remote(2, "DH1", 4.5, 9.0, 1)]));
    api.expect_create_drill_hole()
        .times(1)
        .returning(|_| Ok(500));
    api.expect_upload_image()
        .withf(|req| req.depth_from == "9" && req.standard_type == 2 && req.hole_id == 500)
        .times(1)
        .returning(|_| Ok(()));

    let report = synchronise(&config(), &api, &manifest, &mut RunLog::discard())
        .await
        .unwrap();

    assert_eq!(
        report.summary,
        UploadSummary {
            total: 3,
            uploaded: 1,
            skipped: 2,
            failed: 0
        }
    );
    assert!(report.failed_rows().is_empty());
}

#[tokio::test]
async fn one_create_per_distinct_hole_name() {
    let dir = tempdir().unwrap();
    let manifest = stage(
        dir.path(),
        &[("A", "0", "1", "Dry"), ("B", "0", "1", "Dry"), ("A", "1", "2", "Dry")],
    );

    let mut api = MockPortalApi::new();
    api.expect_list_images().returning(|_, _| Ok(vec![]));
    api.expect_create_drill_hole()
        .times(2)
        .returning(|req: NewDrillHole| Ok(if req.name == "A" { 1 } else { 2 }));
    api.expect_upload_image().times(3).returning(|_| Ok(()));

    let report = synchronise(&config(), &api, &manifest, &mut RunLog::discard())
        .await
        .unwrap();
    assert_eq!(report.summary.uploaded, 3);
}

#[tokio::test]
async fn failed_hole_only_fails_its_own_images() {
    let dir = tempdir().unwrap();
    let manifest = stage(
        dir.path(),
        &[("A", "0", "1", "Dry"), ("B", "0", "1", "Wet"), ("A", "1", "2", "Wet")],
    );

    let mut api = MockPortalApi::new();
    api.expect_list_images().returning(|_, _| Ok(vec![]));
    api.expect_create_drill_hole().returning(|req| {
        if req.name == "B" {
            Err(ApiError::Status(ErrorDetail {
                status: 400,
                message: Some("Name taken".into()),
                ..Default::default()
            }))
        } else {
            Ok(10)
        }
    });
    api.expect_upload_image()
        .withf(|req| req.hole_id == 10)
        .times(2)
        .returning(|_| Ok(()));

    let log_dir = tempdir().unwrap();
    let log_path = log_dir.path().join("run.txt");
    let mut log = RunLog::create(&log_path).unwrap();
    let report = synchronise(&config(), &api, &manifest, &mut log).await.unwrap();
    drop(log);

    assert_eq!(report.summary.uploaded, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.provision_failures.len(), 1);
    assert!(matches!(
        &report.outcomes[1].outcome,
        UploadOutcome::Failed(FailureReason::MissingHoleId { hole_name }) if hole_name == "B"
    ));
    assert_eq!(report.failed_rows(), vec![1]);

    let text = std::fs::read_to_string(&log_path).unwrap();
    assert!(text.contains("Failed to create drill hole B"));
    assert!(text.contains("Uploaded: 2"));
}

#[tokio::test]
async fn failed_rows_round_trip_as_manifest() {
    let dir = tempdir().unwrap();
    let manifest = stage(
        dir.path(),
        &[("A", "0", "1", "Dry"), ("A", "1", "2", "Dry"), ("A", "2", "3", "Dry")],
    );

    let mut api = MockPortalApi::new();
    api.expect_list_images().returning(|_, _| Ok(vec![]));
    api.expect_create_drill_hole().returning(|_| Ok(3));
    api.expect_upload_image().returning(|req| {
        if req.depth_from == "1" {
            Err(ApiError::Status(ErrorDetail {
                status: 500,
                body: Some("boom".into()),
                ..Default::default()
            }))
        } else {
            Ok(())
        }
    });

    let report = synchronise(&config(), &api, &manifest, &mut RunLog::discard())
        .await
        .unwrap();
    assert_eq!(report.failed_rows(), vec![1]);

    let failed_path = dir.path().join("failed.csv");
    write_failed_manifest(&failed_path, &manifest, &report.failed_rows()).unwrap();
    let retry = Manifest::from_path(&failed_path).unwrap();

    assert_eq!(retry.headers, manifest.headers);
    assert_eq!(retry.len(), 1);
    assert_eq!(retry.rows[0].record, manifest.rows[1].record);
    assert_eq!(retry.rows[0].image, manifest.rows[1].image);
}

#[tokio::test]
async fn empty_manifest_makes_no_writes() {
    let dir = tempdir().unwrap();
    let manifest = stage(dir.path(), &[]);

    let mut api = MockPortalApi::new();
    api.expect_list_images().returning(|_, _| Ok(vec![]));
    api.expect_create_drill_hole().never();
    api.expect_upload_image().never();

    let report = synchronise(&config(), &api, &manifest, &mut RunLog::discard())
        .await
        .unwrap();
    assert_eq!(report.summary, UploadSummary::default());
}

#[tokio::test]
async fn listing_failure_is_fatal() {
    let dir = tempdir().unwrap();
    let manifest = stage(dir.path(), &[("A", "0", "1", "Dry")]);

    let mut api = MockPortalApi::new();
    api.expect_list_images().returning(|_, _| {
        Err(ApiError::Status(ErrorDetail {
            status: 401,
            ..Default::default()
        }))
    });
    api.expect_create_drill_hole().never();
    api.expect_upload_image().never();

    let err = synchronise(&config(), &api, &manifest, &mut RunLog::discard())
        .await
        .unwrap_err();
    assert!(matches!(err, SynchroniseError::ListImages(_)));
}

#[tokio::test]
async fn reuse_mode_consults_drill_hole_listing() {
    let dir = tempdir().unwrap();
    let manifest = stage(dir.path(), &[("OLD", "0", "1", "Dry"), ("NEW", "0", "1", "Dry")]);

    let mut cfg = config();
    cfg.reuse_existing_holes = true;

    let mut api = MockPortalApi::new();
    api.expect_list_images().returning(|_, _| Ok(vec![]));
    api.expect_list_drill_holes().times(1).returning(|| {
        Ok(vec![serde_json::from_value(json!({"id": 41, "name": "OLD"})).unwrap()])
    });
    api.expect_create_drill_hole()
        .withf(|req| req.name == "NEW")
        .times(1)
        .returning(|_| Ok(42));
    api.expect_upload_image().times(2).returning(|_| Ok(()));

    let report = synchronise(&cfg, &api, &manifest, &mut RunLog::discard())
        .await
        .unwrap();
    assert_eq!(report.summary.uploaded, 2);
}
