//! Backend origin and transport settings
//!
//! Base URL precedence: explicit value > `CLM_API_BASE_URL` > `CLM_API_URL`
//! (legacy name) > `DEFAULT_BASE_URL`. Whitespace and trailing slashes are
//! trimmed so paths can always be appended with a leading `/`.

use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const BASE_URL_ENV: &str = "CLM_API_BASE_URL";
pub const LEGACY_BASE_URL_ENV: &str = "CLM_API_URL";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    /// Per-request timeout for ordinary calls. Streaming generation is exempt.
    pub timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("clm-client/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    /// Resolve the base URL from the environment, falling back to the default.
    pub fn from_env() -> Result<Self> {
        Self::new(&resolve_base_url(None))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path beginning with `/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Pick the base URL by precedence without validating it.
pub fn resolve_base_url(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_owned)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| non_empty_env(BASE_URL_ENV))
        .or_else(|| non_empty_env(LEGACY_BASE_URL_ENV))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Config("base_url must not be empty".into()));
    }
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| Error::Config(format!("base_url {trimmed:?} is not a URL: {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(Error::Config(format!(
            "base_url must use http or https, got: {trimmed}"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that touch process environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: callers hold ENV_MUTEX.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    #[test]
    fn trims_whitespace_and_trailing_slashes() {
        let config = ClientConfig::new("  https://clm.example.com///  ").unwrap();
        assert_eq!(config.base_url(), "https://clm.example.com");
        assert_eq!(
            config.url("/api/v1/contracts/"),
            "https://clm.example.com/api/v1/contracts/"
        );
    }

    #[test]
    fn rejects_empty_and_non_http_urls() {
        assert!(ClientConfig::new("   ").is_err());
        assert!(ClientConfig::new("ftp://clm.example.com").is_err());
        assert!(ClientConfig::new("not a url").is_err());
    }

    #[test]
    fn explicit_url_wins_over_environment() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(BASE_URL_ENV, "https://from-env.example.com") };
        assert_eq!(
            resolve_base_url(Some("https://explicit.example.com")),
            "https://explicit.example.com"
        );
        unsafe { remove_env(BASE_URL_ENV) };
    }

    #[test]
    fn preferred_env_wins_over_legacy_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(BASE_URL_ENV, "https://preferred.example.com") };
        unsafe { set_env(LEGACY_BASE_URL_ENV, "https://legacy.example.com") };
        assert_eq!(resolve_base_url(None), "https://preferred.example.com");

        unsafe { remove_env(BASE_URL_ENV) };
        assert_eq!(resolve_base_url(None), "https://legacy.example.com");

        unsafe { remove_env(LEGACY_BASE_URL_ENV) };
        assert_eq!(resolve_base_url(None), DEFAULT_BASE_URL);
    }

    #[test]
    fn default_timeout_applies() {
        let config = ClientConfig::new(DEFAULT_BASE_URL).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
        let config = config.with_timeout(Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
