use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Endpoint used when the config file does not name one.
pub const DEFAULT_API_ENDPOINT: &str = "https://api-portal1.fastgeo.com.au/api";

/// Page size for the row-detail export when the config does not set one.
pub const DEFAULT_ROW_PAGE_SIZE: u32 = 100;

/// Delay between batch-processing requests when the config does not set one.
pub const DEFAULT_PROCESS_DELAY: Duration = Duration::from_millis(500);

/// How the client proves its identity to the portal.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthConfig {
    /// Static key sent as an `x-api-key` header on every request.
    ApiKey(String),
    /// Username/password exchanged for a bearer token before any other call.
    Credentials { username: String, password: String },
}

impl AuthConfig {
    /// Picks the auth mode from optional raw settings. A non-blank API key
    /// wins over credentials; blank values count as absent.
    pub fn resolve(
        api_key: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Option<Self> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        if let Some(key) = present(api_key) {
            return Some(AuthConfig::ApiKey(key));
        }
        match (present(username), present(password)) {
            (Some(username), Some(password)) => {
                Some(AuthConfig::Credentials { username, password })
            }
            _ => None,
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            AuthConfig::ApiKey(_) => "api_key",
            AuthConfig::Credentials { .. } => "credentials",
        }
    }
}

// Secrets never reach log output.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::ApiKey(_) => f.debug_tuple("ApiKey").field(&"<redacted>").finish(),
            AuthConfig::Credentials { username, .. } => f
                .debug_struct("Credentials")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Everything a run needs to know, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub api_endpoint: String,
    pub project_id: i64,
    pub prospect_id: i64,
    pub auth: AuthConfig,
    /// Root under which `logs/<workflow>/...` run directories are created.
    pub output_dir: PathBuf,
    /// Workflow used by the batch-processing command.
    pub workflow_id: Option<i64>,
    /// Fixed sleep between upload requests; `None` sends back to back.
    pub request_delay: Option<Duration>,
    pub request_timeout: Option<Duration>,
    /// Skip drill hole creation for names the portal already lists.
    pub reuse_existing_holes: bool,
    pub row_page_size: u32,
}

impl PortalConfig {
    pub fn new(project_id: i64, prospect_id: i64, auth: AuthConfig) -> Self {
        PortalConfig {
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            project_id,
            prospect_id,
            auth,
            output_dir: PathBuf::from("."),
            workflow_id: None,
            request_delay: None,
            request_timeout: None,
            reuse_existing_holes: false,
            row_page_size: DEFAULT_ROW_PAGE_SIZE,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            api_endpoint = %self.api_endpoint,
            project_id = self.project_id,
            prospect_id = self.prospect_id,
            auth_mode = self.auth.mode_name(),
            output_dir = %self.output_dir.display(),
            "Loaded PortalConfig"
        );
        debug!(config = ?self, "PortalConfig loaded (full debug)");
    }
}
