use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use corebox_core::config::{AuthConfig, PortalConfig, DEFAULT_API_ENDPOINT, DEFAULT_ROW_PAGE_SIZE};

pub const API_KEY_ENV: &str = "PORTAL_API_KEY";
pub const USERNAME_ENV: &str = "PORTAL_USERNAME";
pub const PASSWORD_ENV: &str = "PORTAL_PASSWORD";

/// Non-secret settings as they appear in the YAML file.
#[derive(Deserialize)]
struct StaticConfig {
    #[serde(default)]
    api_endpoint: Option<String>,
    project_id: i64,
    prospect_id: i64,
    #[serde(default)]
    workflow_id: Option<i64>,
    #[serde(default)]
    output_dir: Option<PathBuf>,
    #[serde(default)]
    request_delay_ms: Option<u64>,
    #[serde(default)]
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    reuse_existing_holes: bool,
    #[serde(default)]
    row_page_size: Option<u32>,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Loads a static YAML config file (no secrets) and takes the credentials
/// from the environment. Errors name the missing or invalid setting.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PortalConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let static_conf: StaticConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML {:?}: {e}", path_ref)
    })?;

    let auth = AuthConfig::resolve(
        env_value(API_KEY_ENV),
        env_value(USERNAME_ENV),
        env_value(PASSWORD_ENV),
    )
    .with_context(|| {
        error!("No portal credentials in the environment");
        format!("No portal credentials: set {API_KEY_ENV}, or both {USERNAME_ENV} and {PASSWORD_ENV}")
    })?;

    let api_endpoint = static_conf
        .api_endpoint
        .map(|e| e.trim().trim_end_matches('/').to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());

    let row_page_size = static_conf.row_page_size.unwrap_or(DEFAULT_ROW_PAGE_SIZE);
    if row_page_size == 0 {
        anyhow::bail!("row_page_size must be greater than zero");
    }

    let config = PortalConfig {
        api_endpoint,
        project_id: static_conf.project_id,
        prospect_id: static_conf.prospect_id,
        auth,
        output_dir: static_conf.output_dir.unwrap_or_else(|| PathBuf::from(".")),
        workflow_id: static_conf.workflow_id,
        request_delay: static_conf.request_delay_ms.map(Duration::from_millis),
        request_timeout: static_conf.request_timeout_secs.map(Duration::from_secs),
        reuse_existing_holes: static_conf.reuse_existing_holes,
        row_page_size,
    };
    config.trace_loaded();
    Ok(config)
}
