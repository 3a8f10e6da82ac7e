use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL;

/// Longest accepted cache TTL (7 days).
pub const MAX_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL, without the `/api` prefix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    /// Upper bound on cached responses. Unbounded when absent.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_cache_enabled() -> bool {
    true
}
fn default_cache_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl_secs(),
            max_entries: None,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| format!("base_url '{}' is not a valid URL: {e}", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "base_url must use http or https, got '{}'",
                url.scheme()
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be > 0".into());
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err("cache.ttl_secs must be > 0 when the cache is enabled".into());
        }
        if self.cache.ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(format!(
                "cache.ttl_secs must be at most {MAX_CACHE_TTL_SECS} (7 days), got {}",
                self.cache.ttl_secs
            ));
        }
        if self.cache.max_entries == Some(0) {
            return Err("cache.max_entries must be > 0".into());
        }
        Ok(())
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

pub mod loader {
    use super::ClientConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Loads client configuration.
    ///
    /// Sources, lowest priority first: the TOML file at `path` (or
    /// `eventhub.toml` in the working directory), then environment
    /// variables such as `EVENTHUB__BASE_URL` or `EVENTHUB__CACHE__TTL_SECS`.
    pub fn load_config(path: Option<&str>) -> Result<ClientConfig, String> {
        let mut builder = Config::builder();
        let file = PathBuf::from(path.unwrap_or("eventhub.toml"));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        } else if let Some(p) = path {
            return Err(format!("config file not found: {p}"));
        }
        builder = builder.add_source(
            Environment::with_prefix("EVENTHUB")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: ClientConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
