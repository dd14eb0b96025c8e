use chrono::Duration;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;
use std::path::Path;

/// Environment variables with this prefix override file settings
pub const ENV_PREFIX: &str = "MATCH_FEED_";

/// Configuration for request deduplication
#[serde_inline_default]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeduplicationConfig {
    /// How long a request may stay in flight before callers get a timeout
    #[serde_inline_default(30_000)]
    pub timeout_ms: u64,
    /// Whether a summary is logged when duplicate calls were coalesced
    #[serde_inline_default(true)]
    pub log_duplicates: bool,
    /// Whether deduplication is enabled
    #[serde_inline_default(true)]
    pub enabled: bool,
    /// Whether a timed out operation is aborted instead of left running
    #[serde(default)]
    pub abort_on_timeout: bool,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            log_duplicates: true,
            enabled: true,
            abort_on_timeout: false,
        }
    }
}

impl DeduplicationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::milliseconds(self.timeout_ms.min(i64::MAX as u64) as i64)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.num_milliseconds().max(0) as u64;
        self
    }
}

/// Settings for a feed client talking to the football data backend
#[serde_inline_default]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL the endpoint paths are joined onto
    #[serde_inline_default(String::from("http://localhost:3001/"))]
    pub backend_url: String,
    #[serde(default)]
    pub deduplication: DeduplicationConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            backend_url: String::from("http://localhost:3001/"),
            deduplication: DeduplicationConfig::default(),
        }
    }
}

impl FeedConfig {
    /// Layered configuration: defaults, then the YAML file, then the environment.
    ///
    /// Nested keys use a double underscore, e.g. `MATCH_FEED_DEDUPLICATION__TIMEOUT_MS`.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(FeedConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        let config: FeedConfig = Self::figment(path).extract()?;
        log::debug!(
            "Loaded feed config: backend {} (deduplication enabled: {}, timeout: {}ms)",
            config.backend_url,
            config.deduplication.enabled,
            config.deduplication.timeout_ms
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = TempDir::new("match-feed-config").unwrap();
        let path = dir.path().join("feed.yaml");
        fs::write(
            &path,
            "backend_url: http://feed.internal:8080/\ndeduplication:\n  timeout_ms: 5000\n",
        )
        .unwrap();

        let config = FeedConfig::load(&path).unwrap();
        assert_eq!(config.backend_url, "http://feed.internal:8080/");
        assert_eq!(config.deduplication.timeout_ms, 5000);
        assert!(config.deduplication.log_duplicates);
        assert!(config.deduplication.enabled);
        assert!(!config.deduplication.abort_on_timeout);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new("match-feed-config").unwrap();
        let config = FeedConfig::load(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, FeedConfig::default());
    }

    #[test]
    fn test_request_timeout_conversion() {
        let config = DeduplicationConfig::default();
        assert_eq!(config.request_timeout(), Duration::seconds(30));

        let config = config.with_timeout(Duration::milliseconds(250));
        assert_eq!(config.timeout_ms, 250);

        let config = config.with_timeout(Duration::milliseconds(-5));
        assert_eq!(config.timeout_ms, 0);
    }
}
