//! reqwest implementation of [`PortalApi`].
//!
//! One authenticated client per run. Credentials are exchanged for a bearer
//! token in [`PortalClient::connect`]. The login request carries
//! [`corebox_core::auth::base_headers`]; every request after it carries the
//! same set plus the credential from [`corebox_core::auth::request_headers`].

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use corebox_core::auth::{base_headers, request_headers, AuthSession};
use corebox_core::config::{AuthConfig, PortalConfig};
use corebox_core::contract::{
    ApiError, DrillHoleItem, ErrorDetail, ImageItem, ImageUpload, NewDrillHole, PortalApi, RowPage,
};

/// Listing endpoints are asked for everything in a single page.
const MAX_RESULT_COUNT: &str = "100000";

#[derive(Debug, Clone)]
pub struct PortalClient {
    http: Client,
    base_url: String,
    headers: HeaderMap,
}

impl PortalClient {
    /// Build the HTTP client and authenticate. A failed login is returned as
    /// [`ApiError::Auth`] before any other request is made.
    pub async fn connect(config: &PortalConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        let base_url = config.api_endpoint.trim_end_matches('/').to_string();

        let session = match &config.auth {
            AuthConfig::ApiKey(key) => {
                info!("Using API key authentication");
                AuthSession::ApiKey(key.clone())
            }
            AuthConfig::Credentials { username, password } => {
                info!(username = %username, "Authenticating with username and password");
                let token = login(&http, &base_url, username, password).await?;
                info!("Login successful");
                AuthSession::Bearer(token)
            }
        };
        let headers = request_headers(&session, &base_url)?;

        Ok(PortalClient {
            http,
            base_url,
            headers,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send with the session headers; non-success statuses become
    /// [`ApiError::Status`] with the parsed error body.
    async fn send(&self, request: RequestBuilder, url: &str) -> Result<(StatusCode, String), ApiError> {
        let response = request.headers(self.headers.clone()).send().await.map_err(|e| {
            error!(error = %e, url = %url, "Request failed");
            ApiError::Transport(e)
        })?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = %status, url = %url, bytes = body.len(), "Response received");
        if !status.is_success() {
            let detail = ErrorDetail::from_body(status.as_u16(), url, &body);
            error!(status = %status, url = %url, detail = %detail, "Portal returned an error");
            return Err(ApiError::Status(detail));
        }
        Ok((status, body))
    }

    async fn send_json(&self, request: RequestBuilder, url: &str) -> Result<Value, ApiError> {
        let (_, body) = self.send(request, url).await?;
        parse_body(&body)
    }
}

fn parse_body(body: &str) -> Result<Value, ApiError> {
    serde_json::from_str(body)
        .map_err(|e| ApiError::UnexpectedShape(format!("response is not JSON: {e}")))
}

/// `result.<field>` of an ABP-style response envelope.
fn result_field<'a>(body: &'a Value, field: &str) -> Result<&'a Value, ApiError> {
    body.get("result")
        .and_then(|r| r.get(field))
        .ok_or_else(|| ApiError::UnexpectedShape(format!("missing result.{field}")))
}

fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

async fn login(
    http: &Client,
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<String, ApiError> {
    let url = format!("{base_url}/TokenAuth/Authenticate");
    let response = http
        .post(&url)
        .headers(base_headers(base_url)?)
        .json(&json!({
            "userNameOrEmailAddress": username,
            "password": password,
        }))
        .send()
        .await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let detail = ErrorDetail::from_body(status.as_u16(), &url, &body);
        error!(detail = %detail, "Login rejected");
        return Err(ApiError::Auth(detail.to_string()));
    }
    let json = parse_body(&body).map_err(|e| ApiError::Auth(e.to_string()))?;
    result_field(&json, "accessToken")
        .ok()
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::Auth("login response has no result.accessToken".into()))
}

#[async_trait]
impl PortalApi for PortalClient {
    async fn list_images(
        &self,
        project_id: i64,
        prospect_id: i64,
    ) -> Result<Vec<ImageItem>, ApiError> {
        let url = self.url("/services/app/Image/GetAll");
        info!(project_id, prospect_id, "Fetching images");
        let request = self.http.get(&url).query(&[
            ("ProjectIds", project_id.to_string()),
            ("ProspectIds", prospect_id.to_string()),
            ("MaxResultCount", MAX_RESULT_COUNT.to_string()),
        ]);
        let body = self.send_json(request, &url).await?;
        let items = result_field(&body, "items")?;
        serde_json::from_value(items.clone())
            .map_err(|e| ApiError::UnexpectedShape(format!("image items: {e}")))
    }

    async fn list_drill_holes(&self) -> Result<Vec<DrillHoleItem>, ApiError> {
        let url = self.url("/services/app/DrillHole/GetAll");
        info!("Fetching drill holes");
        let request = self
            .http
            .get(&url)
            .query(&[("MaxResultCount", MAX_RESULT_COUNT)]);
        let body = self.send_json(request, &url).await?;
        let items = result_field(&body, "items")?;
        serde_json::from_value(items.clone())
            .map_err(|e| ApiError::UnexpectedShape(format!("drill hole items: {e}")))
    }

    async fn create_drill_hole(&self, req: NewDrillHole) -> Result<i64, ApiError> {
        let url = self.url("/services/app/DrillHole/Create");
        let request = self.http.post(&url).json(&json!({
            "name": req.name,
            "rl": 0,
            "maxDepth": 0,
            "projectId": req.project_id,
            "prospectId": req.prospect_id,
            "isActive": true,
        }));
        let body = self.send_json(request, &url).await?;
        let id = result_field(&body, "id")?;
        as_id(id).ok_or_else(|| ApiError::UnexpectedShape(format!("drill hole id is not an integer: {id}")))
    }

    async fn upload_image(&self, req: ImageUpload) -> Result<(), ApiError> {
        let url = self.url("/services/app/Image/Create");
        let part = Part::bytes(req.content)
            .file_name(req.file_name.clone())
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("Type", "1")
            .text("ImageClass", "1")
            .text("StandardType", req.standard_type.to_string())
            .text("ProjectId", req.project_id.to_string())
            .text("ProspectId", req.prospect_id.to_string())
            .text("HoleId", req.hole_id.to_string())
            .text("DepthFrom", req.depth_from)
            .text("DepthTo", req.depth_to)
            .part("image", part);

        let (status, body) = self.send(self.http.post(&url).multipart(form), &url).await?;
        // Only a plain 200 means the image was stored.
        if status != StatusCode::OK {
            return Err(ApiError::Status(ErrorDetail::from_body(
                status.as_u16(),
                &url,
                &body,
            )));
        }
        info!(file = %req.file_name, hole_id = req.hole_id, "Image uploaded");
        Ok(())
    }

    async fn image_rows(
        &self,
        project_id: i64,
        prospect_id: i64,
        skip: u64,
        take: u32,
    ) -> Result<RowPage, ApiError> {
        let url = self.url("/services/app/Image/GetDetailByRow");
        let request = self.http.get(&url).query(&[
            ("projectId", project_id.to_string()),
            ("prospectId", prospect_id.to_string()),
            ("SkipCount", skip.to_string()),
            ("MaxResultCount", take.to_string()),
        ]);
        let body = self.send_json(request, &url).await?;
        let items = result_field(&body, "items")?
            .as_array()
            .cloned()
            .ok_or_else(|| ApiError::UnexpectedShape("result.items is not an array".into()))?;
        // Without a total the first page is treated as the last.
        let total_count = result_field(&body, "totalCount")
            .ok()
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(RowPage { items, total_count })
    }

    async fn process_image(&self, image_id: Value, workflow_id: i64) -> Result<(), ApiError> {
        let url = self.url("/services/app/Image/ProcessImage");
        let request = self.http.post(&url).json(&json!({
            "imageId": image_id,
            "workflowId": workflow_id,
        }));
        self.send(request, &url).await?;
        Ok(())
    }
}
