//! # contract: the remote operations every workflow consumes
//!
//! [`PortalApi`] is the seam between the workflows in this crate and the HTTP
//! client in the CLI crate. Request types are owned plain data so the trait
//! can be mocked with `mockall` (exported behind `test-export-mocks`).
//!
//! Response items are deliberately loose (`Option` everywhere, JSON values for
//! numeric fields): the portal does not always populate every field, and the
//! workflows decide per record whether a missing field is fatal for that
//! record or just a warning.

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Longest slice of a non-JSON error body kept in an [`ErrorDetail`].
pub const RAW_BODY_LIMIT: usize = 500;

/// Image entry from the listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageItem {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub drill_hole: Option<DrillHoleRef>,
    #[serde(default)]
    pub depth_from: Option<Value>,
    #[serde(default)]
    pub depth_to: Option<Value>,
    #[serde(default)]
    pub standard_type: Option<Value>,
    #[serde(default)]
    pub image_class: Option<Value>,
    #[serde(default, rename = "type")]
    pub image_type: Option<Value>,
    #[serde(default)]
    pub files: Option<Vec<ImageFile>>,
}

impl ImageItem {
    pub fn first_file_name(&self) -> Option<&str> {
        self.files
            .as_ref()
            .and_then(|files| files.first())
            .and_then(|f| f.file_name.as_deref())
    }

    pub fn hole_name(&self) -> Option<&str> {
        self.drill_hole.as_ref().and_then(|h| h.name.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrillHoleRef {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFile {
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Drill hole entry from the drill hole listing endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillHoleItem {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub drill_hole_status: Option<Value>,
    #[serde(default)]
    pub elevation: Option<Value>,
    #[serde(default)]
    pub northing: Option<Value>,
    #[serde(default)]
    pub easting: Option<Value>,
    #[serde(default)]
    pub longitude: Option<Value>,
    #[serde(default)]
    pub latitude: Option<Value>,
    #[serde(default)]
    pub dip: Option<Value>,
    #[serde(default)]
    pub azimuth: Option<Value>,
    #[serde(default)]
    pub rl: Option<Value>,
    #[serde(default)]
    pub max_depth: Option<Value>,
}

/// Minimal data needed to create a drill hole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDrillHole {
    pub name: String,
    pub project_id: i64,
    pub prospect_id: i64,
}

/// One image upload: metadata fields plus the file content.
#[derive(Clone, PartialEq)]
pub struct ImageUpload {
    pub project_id: i64,
    pub prospect_id: i64,
    pub hole_id: i64,
    pub standard_type: u8,
    pub depth_from: String,
    pub depth_to: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("project_id", &self.project_id)
            .field("prospect_id", &self.prospect_id)
            .field("hole_id", &self.hole_id)
            .field("standard_type", &self.standard_type)
            .field("depth_from", &self.depth_from)
            .field("depth_to", &self.depth_to)
            .field("file_name", &self.file_name)
            .field("content_len", &self.content.len())
            .finish()
    }
}

/// One page of the row-detail endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPage {
    pub items: Vec<Value>,
    pub total_count: u64,
}

/// What the portal said when it rejected a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetail {
    pub status: u16,
    pub url: String,
    pub message: Option<String>,
    pub details: Option<String>,
    pub validation_errors: Vec<String>,
    /// Raw (truncated) body when it was not JSON.
    pub body: Option<String>,
}

impl ErrorDetail {
    /// Parse an error response body. JSON bodies contribute the
    /// `error.message`, `error.details` and `error.validationErrors` fields;
    /// anything else is kept as truncated text.
    pub fn from_body(status: u16, url: &str, body: &str) -> Self {
        let mut detail = ErrorDetail {
            status,
            url: url.to_string(),
            ..Default::default()
        };
        match serde_json::from_str::<Value>(body) {
            Ok(json) => {
                if let Some(error) = json.get("error") {
                    detail.message = error
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_owned);
                    detail.details = error.get("details").and_then(|d| match d {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    });
                    if let Some(list) = error.get("validationErrors").and_then(Value::as_array) {
                        detail.validation_errors = list
                            .iter()
                            .map(|v| {
                                v.get("message")
                                    .and_then(Value::as_str)
                                    .unwrap_or("Unknown error")
                                    .to_string()
                            })
                            .collect();
                    }
                }
            }
            Err(_) => detail.body = Some(truncate_body(body)),
        }
        detail
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= RAW_BODY_LIMIT {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(RAW_BODY_LIMIT).collect();
    cut.push_str("...");
    cut
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {} from {}", self.status, self.url)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        if !self.validation_errors.is_empty() {
            write!(f, "; validation: {}", self.validation_errors.join("; "))?;
        }
        if let Some(body) = &self.body {
            write!(f, "; body: {body}")?;
        }
        Ok(())
    }
}

/// Errors surfaced by [`PortalApi`] implementations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network-level failure: connect, timeout, broken body.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The portal answered with an unexpected HTTP status.
    #[error("{0}")]
    Status(ErrorDetail),

    /// The response parsed but lacked a field the caller needs.
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status(detail) => Some(detail.status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Remote operations against the image portal.
///
/// Every method performs exactly one request (the implementation never
/// retries) and is awaited before the next call is made.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PortalApi: Send + Sync {
    /// All images for a project/prospect, in one large page.
    async fn list_images(&self, project_id: i64, prospect_id: i64)
        -> Result<Vec<ImageItem>, ApiError>;

    /// All drill holes visible to the caller.
    async fn list_drill_holes(&self) -> Result<Vec<DrillHoleItem>, ApiError>;

    /// Create a drill hole and return its id.
    async fn create_drill_hole(&self, req: NewDrillHole) -> Result<i64, ApiError>;

    /// Upload one image. Only HTTP 200 counts as success.
    async fn upload_image(&self, req: ImageUpload) -> Result<(), ApiError>;

    /// One page of row-level OCR/annotation data.
    async fn image_rows(
        &self,
        project_id: i64,
        prospect_id: i64,
        skip: u64,
        take: u32,
    ) -> Result<RowPage, ApiError>;

    /// Submit an existing image to a processing workflow.
    async fn process_image(&self, image_id: Value, workflow_id: i64) -> Result<(), ApiError>;
}
