use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const PREDICTOR_URL_ENV: &str = "FITROOM_API_URL";
pub const TRYON_URL_ENV: &str = "FITROOM_TRYON_URL";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Location of a remote service plus the per-request timeout used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    base_url: Url,
    timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        let parsed = Url::parse(trimmed).map_err(|err| ConfigError::InvalidBaseUrl {
            value: trimmed.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                value: trimmed.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        Ok(Self {
            base_url: parsed,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn from_env(key: &str) -> Result<Self, ConfigError> {
        let value = non_empty_env(key).ok_or_else(|| ConfigError::MissingEnv {
            key: key.to_string(),
        })?;
        Self::new(&value)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `{base_url}/{path}`; the base path prefix is kept.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Resolves a URL returned by the service: absolute URLs pass through,
    /// rooted paths resolve against the base origin.
    pub fn resolve(&self, reference: &str) -> Result<Url, ConfigError> {
        self.base_url
            .join(reference.trim())
            .map_err(|err| ConfigError::InvalidBaseUrl {
                value: reference.to_string(),
                reason: err.to_string(),
            })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
