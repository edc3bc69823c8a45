//! Engine configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Client-side engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base URL of the remote resource API
    pub api_url: String,
    /// Bearer token sent with every request
    pub api_token: Option<String>,
    /// Directory holding cached snapshots and pending logs
    pub cache_dir: PathBuf,
    /// Background refresh cadence while online
    pub poll_interval: Duration,
    /// Per-request timeout for remote calls
    pub request_timeout: Duration,
    /// Reachability probe cadence
    pub probe_interval: Duration,
}

impl EngineConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_token: None,
            cache_dir: PathBuf::from(".sprout-cache"),
            poll_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            probe_interval: Duration::from_secs(15),
        }
    }

    /// Load configuration from environment variables, reading a `.env` file first.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = var("SPROUT_API_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingApiUrl)?;

        let mut config = Self::new(api_url.trim_end_matches('/'));
        config.api_token = var("SPROUT_API_TOKEN").filter(|t| !t.is_empty());
        if let Some(dir) = var("SPROUT_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(secs) = seconds(&var, "SPROUT_POLL_INTERVAL_SECS")? {
            config.poll_interval = secs;
        }
        if let Some(secs) = seconds(&var, "SPROUT_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = secs;
        }
        if let Some(secs) = seconds(&var, "SPROUT_PROBE_INTERVAL_SECS")? {
            config.probe_interval = secs;
        }
        Ok(config)
    }
}

fn seconds<F>(var: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = var(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
        _ => Err(ConfigError::InvalidDuration(key)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("SPROUT_API_URL environment variable is required")]
    MissingApiUrl,

    #[error("Invalid {0} value, expected a positive number of seconds")]
    InvalidDuration(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[("SPROUT_API_URL", "http://localhost:3000/")]).unwrap();
        assert_eq!(config.api_url, "http://localhost:3000");
        assert_eq!(config.api_token, None);
        assert_eq!(config.cache_dir, PathBuf::from(".sprout-cache"));
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.probe_interval, Duration::from_secs(15));
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("SPROUT_API_URL", "https://api.example.test"),
            ("SPROUT_API_TOKEN", "secret"),
            ("SPROUT_CACHE_DIR", "/tmp/sprout"),
            ("SPROUT_POLL_INTERVAL_SECS", "60"),
            ("SPROUT_REQUEST_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/sprout"));
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn rejects_missing_url_and_bad_durations() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingApiUrl)));
        assert!(matches!(
            load(&[
                ("SPROUT_API_URL", "http://localhost"),
                ("SPROUT_POLL_INTERVAL_SECS", "0"),
            ]),
            Err(ConfigError::InvalidDuration("SPROUT_POLL_INTERVAL_SECS"))
        ));
    }
}
