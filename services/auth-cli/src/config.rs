//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! A missing file is only an error when its path was given explicitly.

use common::{Error, Result};
use oauth_redirect::OAuthSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "authctl.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub oauth: OAuthConfig,
    pub storage: StorageConfig,
}

/// Identity backend settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Redirect flow settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub frontend_url: String,
    /// Used when the backend has no client id for the provider
    pub google_client_id: Option<String>,
    pub github_client_id: Option<String>,
}

/// Where credentials and OAuth state are persisted
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001/api/auth".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:8081".into(),
            google_client_id: None,
            github_client_id: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".session"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// When `explicit` is false a missing file yields the defaults.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        let mut config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|source| Error::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Config::default(),
            Err(source) => {
                return Err(Error::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        config.apply_env()?;
        config.normalize()?;
        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// The flag reports whether the path was named explicitly.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Ok(url) = std::env::var("FRONTEND_URL") {
            self.oauth.frontend_url = url;
        }
        if let Ok(id) = std::env::var("GOOGLE_CLIENT_ID") {
            self.oauth.google_client_id = Some(id);
        }
        if let Ok(id) = std::env::var("GITHUB_CLIENT_ID") {
            self.oauth.github_client_id = Some(id);
        }
        if let Ok(secs) = std::env::var("API_TIMEOUT_SECS") {
            self.api.timeout_secs = secs.parse().map_err(|_| Error::Invalid {
                setting: "API_TIMEOUT_SECS",
                reason: format!("must be an integer, got: {secs}"),
            })?;
        }
        Ok(())
    }

    fn normalize(&mut self) -> Result<()> {
        for (name, url) in [
            ("api.base_url", &self.api.base_url),
            ("oauth.frontend_url", &self.oauth.frontend_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Invalid {
                    setting: name,
                    reason: format!("must start with http:// or https://, got: {url}"),
                });
            }
        }

        if self.api.timeout_secs == 0 {
            return Err(Error::Invalid {
                setting: "api.timeout_secs",
                reason: "must be greater than 0".into(),
            });
        }

        self.api.base_url = normalize_base_url(&self.api.base_url);
        self.oauth.frontend_url = self.oauth.frontend_url.trim_end_matches('/').to_string();
        Ok(())
    }

    pub fn oauth_settings(&self) -> OAuthSettings {
        OAuthSettings {
            api_base_url: self.api.base_url.clone(),
            frontend_url: self.oauth.frontend_url.clone(),
            google_client_id: self.oauth.google_client_id.clone(),
            github_client_id: self.oauth.github_client_id.clone(),
        }
    }
}

/// Strip trailing slashes and make the URL end in `/api/auth`.
fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.ends_with("/api/auth") {
        url.to_string()
    } else if url.ends_with("/api") {
        format!("{url}/auth")
    } else {
        format!("{url}/api/auth")
    }
}
