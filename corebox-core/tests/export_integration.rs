use corebox_core::config::{AuthConfig, PortalConfig};
use corebox_core::contract::{ApiError, ErrorDetail, ImageItem, MockPortalApi, RowPage};
use corebox_core::export::{export_listing, export_rows, fetch_all_rows, process_images};
use corebox_core::report::{RunLog, RunPaths};
use mockall::predicate::eq;
use mockall::Sequence;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::tempdir;

fn config() -> PortalConfig {
    let mut cfg = PortalConfig::new(3, 4, AuthConfig::ApiKey("k".into()));
    cfg.request_delay = Some(Duration::from_millis(1));
    cfg
}

fn rows(n: usize, offset: usize) -> Vec<Value> {
    (0..n)
        .map(|i| json!({"imageId": offset + i, "drillHoleName": "DH1"}))
        .collect()
}

#[tokio::test]
async fn pagination_stops_at_total_count() {
    let mut api = MockPortalApi::new();
    let mut seq = Sequence::new();
    api.expect_image_rows()
        .with(eq(3), eq(4), eq(0), eq(2))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _, _| Ok(RowPage { items: rows(2, 0), total_count: 5 }));
    api.expect_image_rows()
        .with(eq(3), eq(4), eq(2), eq(2))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _, _| Ok(RowPage { items: rows(2, 2), total_count: 5 }));
    api.expect_image_rows()
        .with(eq(3), eq(4), eq(4), eq(2))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _, _| Ok(RowPage { items: rows(1, 4), total_count: 5 }));

    let items = fetch_all_rows(&api, 3, 4, 2).await.unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items[4]["imageId"], 4);
}

#[tokio::test]
async fn pagination_stops_on_empty_page() {
    let mut api = MockPortalApi::new();
    let mut seq = Sequence::new();
    api.expect_image_rows()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _, _| Ok(RowPage { items: rows(3, 0), total_count: 100 }));
    api.expect_image_rows()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _, _| Ok(RowPage { items: vec![], total_count: 100 }));

    let items = fetch_all_rows(&api, 3, 4, 3).await.unwrap();
    assert_eq!(items.len(), 3);
}

#[tokio::test]
async fn row_export_writes_json_and_csvs() {
    let out = tempdir().unwrap();
    let paths = RunPaths::create_with_timestamp(out.path(), "get_image_row", "20250101_000000".into())
        .unwrap();

    let mut api = MockPortalApi::new();
    api.expect_image_rows().times(1).returning(|_, _, _, _| {
        Ok(RowPage {
            items: vec![json!({
                "projectName": "P", "prospectName": "Q", "drillHoleName": "DH1", "imageId": 8,
                "ocrs": [{"id": "a", "type": "depth", "text": "1.5"}],
                "coreOutlines": [{"name": "r1", "isPolyComplete": false, "points": [[0, 2], [1, 9]]}]
            })],
            total_count: 1,
        })
    });

    let report = export_rows(&config(), &api, &paths).await.unwrap();
    assert_eq!(report.items, 1);
    assert_eq!(report.ocr_rows, 1);
    assert_eq!(report.outline_rows, 1);

    let raw: Value = serde_json::from_str(&std::fs::read_to_string(&report.raw_json).unwrap()).unwrap();
    assert_eq!(raw[0]["imageId"], 8);

    let detailed = std::fs::read_to_string(&report.detailed_csv).unwrap();
    assert!(detailed.starts_with("projectName,prospectName,drillHoleName,imageId,outlineName"));
    assert!(detailed.contains("P,Q,DH1,8,r1,false,2,9,2"));
}

#[tokio::test]
async fn listing_export_reports_duplicates() {
    let out = tempdir().unwrap();
    let paths = RunPaths::create_with_timestamp(out.path(), "get_upload_list", "20250101_000000".into())
        .unwrap();

    let image = |id: i64, from: f64| -> ImageItem {
        serde_json::from_value(json!({
            "id": id, "drillHole": {"id": 7, "name": "DH1"},
            "depthFrom": from, "depthTo": 5, "standardType": 1, "imageClass": 1, "type": 1,
            "files": [{"fileName": format!("f{id}.jpg")}]
        }))
        .unwrap()
    };
    let images = vec![image(1, 0.0), image(2, 0.0), image(3, 1.0)];

    let mut api = MockPortalApi::new();
    api.expect_list_images()
        .returning(move |_, _| Ok(images.clone()));
    api.expect_list_drill_holes().returning(|| {
        Ok(vec![serde_json::from_value(json!({"id": 7, "name": "DH1", "maxDepth": 120.5})).unwrap()])
    });

    let report = export_listing(&config(), &api, &paths).await.unwrap();
    assert_eq!(report.images, 3);
    assert_eq!(report.duplicate_ids, 1);
    assert_eq!(report.drill_holes, 1);

    let dupes = std::fs::read_to_string(&report.duplicates_csv).unwrap();
    assert!(dupes.contains(",1,2"), "{dupes}");
    let uploaded = std::fs::read_to_string(&report.images_csv).unwrap();
    assert!(uploaded.contains("f3.jpg,1.0,5,1,1,1,7"), "{uploaded}");
    let holes = std::fs::read_to_string(&report.drill_holes_csv).unwrap();
    assert!(holes.contains("DH1,7,"));
    assert!(holes.trim_end().ends_with("120.5"));
}

#[tokio::test]
async fn batch_processing_splits_success_and_failure() {
    let out = tempdir().unwrap();
    let paths = RunPaths::create_with_timestamp(out.path(), "execute_batch", "20250101_000000".into())
        .unwrap();

    let mut api = MockPortalApi::new();
    api.expect_list_images().returning(|_, _| {
        Ok(vec![
            serde_json::from_value(json!({"id": 1, "files": [{"fileName": "a.jpg"}]})).unwrap(),
            serde_json::from_value(json!({"id": 2, "files": [{"fileName": "b.jpg"}]})).unwrap(),
        ])
    });
    api.expect_process_image()
        .withf(|id, workflow| *workflow == 9 && *id == json!(1))
        .times(1)
        .returning(|_, _| Ok(()));
    api.expect_process_image()
        .withf(|id, workflow| *workflow == 9 && *id == json!(2))
        .times(1)
        .returning(|_, _| {
            Err(ApiError::Status(ErrorDetail {
                status: 500,
                message: Some("Workflow busy".into()),
                ..Default::default()
            }))
        });

    let report = process_images(&config(), &api, 9, &paths, &mut RunLog::discard())
        .await
        .unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);

    let failed = std::fs::read_to_string(report.failed_csv.unwrap()).unwrap();
    assert!(failed.contains("Workflow busy"));
    let ok = std::fs::read_to_string(report.success_csv.unwrap()).unwrap();
    assert!(ok.contains("1,a.jpg,Unknown"));
}
