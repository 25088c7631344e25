//! Request authentication for the portal API.
//!
//! Every remote call goes through [`base_headers`]: the login request uses it
//! as is, everything after login adds the [`AuthSession`] credential through
//! [`request_headers`].

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, ACCEPT, AUTHORIZATION, CACHE_CONTROL,
    ORIGIN, PRAGMA, REFERER, USER_AGENT,
};
use tracing::warn;

const API_KEY_HEADER: &str = "x-api-key";

/// Result of authenticating: either the static API key or a bearer token
/// obtained from the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthSession {
    ApiKey(String),
    Bearer(String),
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthSession::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            AuthSession::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// Browser-facing origin of the portal, derived from the API endpoint.
///
/// `https://api-portal1.example.com/api` becomes `https://portal1.example.com`:
/// the trailing `/api` path and an `api-` host prefix are removed.
pub fn portal_origin(api_endpoint: &str) -> String {
    let trimmed = api_endpoint.trim_end_matches('/');
    let base = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    match reqwest::Url::parse(base) {
        Ok(mut url) => {
            let stripped = url
                .host_str()
                .and_then(|h| h.strip_prefix("api-"))
                .map(str::to_owned);
            if let Some(host) = stripped {
                if let Err(e) = url.set_host(Some(&host)) {
                    warn!(host = %host, error = %e, "Keeping api- prefix in portal origin");
                }
            }
            url.origin().ascii_serialization()
        }
        Err(_) => base.to_string(),
    }
}

/// Headers shared by every portal request, without any credential.
///
/// Content-Type is left to the request builder so JSON and multipart bodies
/// each get the right value.
pub fn base_headers(api_endpoint: &str) -> Result<HeaderMap, InvalidHeaderValue> {
    let origin = portal_origin(api_endpoint);
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(ORIGIN, HeaderValue::from_str(&origin)?);
    headers.insert(REFERER, HeaderValue::from_str(&format!("{origin}/"))?);
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("corebox/", env!("CARGO_PKG_VERSION"))),
    );
    Ok(headers)
}

/// [`base_headers`] plus the credential for `session`.
pub fn request_headers(
    session: &AuthSession,
    api_endpoint: &str,
) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = base_headers(api_endpoint)?;
    match session {
        AuthSession::ApiKey(key) => {
            let mut value = HeaderValue::from_str(key)?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }
        AuthSession::Bearer(token) => {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
    }
    Ok(headers)
}
