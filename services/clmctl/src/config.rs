//! Configuration types and loading
//!
//! Precedence: CLI args > env vars > config file > defaults. The config file
//! is optional unless a path was asked for explicitly; without one every
//! setting takes its default.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "clmctl.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    /// Overridden by `CLM_API_BASE_URL` (or the legacy `CLM_API_URL`).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where the token pair and profile are kept between runs
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// Overridden by `CLMCTL_TOKEN_FILE`.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogConfig {
    /// Overridden by `LOG_FORMAT`.
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// A missing file is only an error when `required` (the path came from
    /// `--config` or `CONFIG_PATH`).
    pub fn load(path: &Path, required: bool) -> common::Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(url) = non_empty_env(clm_client::config::BASE_URL_ENV)
            .or_else(|| non_empty_env(clm_client::config::LEGACY_BASE_URL_ENV))
        {
            config.api.base_url = Some(url);
        }
        if let Some(path) = non_empty_env("CLMCTL_TOKEN_FILE") {
            config.session.token_file = Some(PathBuf::from(path));
        }
        if let Some(format) = non_empty_env("LOG_FORMAT") {
            config.log.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(common::Error::Config(format!(
                        "LOG_FORMAT must be json or pretty, got: {other}"
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// The flag is true when the path was named explicitly.
    pub fn resolve_path(cli_path: Option<&Path>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (p.to_path_buf(), true);
        }
        if let Some(p) = non_empty_env("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }

    /// Session file: configured path, else `~/.config/clmctl/session.json`,
    /// else `session.json` in the working directory.
    pub fn token_file(&self) -> PathBuf {
        if let Some(path) = &self.session.token_file {
            return path.clone();
        }
        match std::env::var_os("HOME").filter(|h| !h.is_empty()) {
            Some(home) => PathBuf::from(home)
                .join(".config")
                .join("clmctl")
                .join("session.json"),
            None => PathBuf::from("session.json"),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
