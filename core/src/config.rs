//! Client configuration.
//!
//! Loaded from the environment (`from_env`) or from a JSON file (`load`).
//! Every field has a default so an empty file or an empty environment yields
//! a working local-development setup.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub const ENV_BASE_URL: &str = "PROMINIS_API_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "PROMINIS_API_TIMEOUT_MS";
pub const ENV_TOKEN_DIR: &str = "PROMINIS_TOKEN_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Directory for the persisted token. `None` keeps it in memory.
    pub token_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            token_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.base_url = base_url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            config.timeout_ms = parse_timeout(&raw)?;
        }
        if let Some(dir) = lookup(ENV_TOKEN_DIR).filter(|v| !v.trim().is_empty()) {
            config.token_dir = Some(PathBuf::from(dir));
        }
        Ok(config)
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        if config.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "timeout_ms",
                value: "0".to_string(),
            });
        }
        Ok(config)
    }
}

fn parse_timeout(raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(ConfigError::InvalidValue {
            name: ENV_TIMEOUT_MS,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_local_backend() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080/api");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.token_dir.is_none());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_BASE_URL, "https://api.prominis.test"),
            (ENV_TIMEOUT_MS, "2500"),
            (ENV_TOKEN_DIR, "/tmp/prominis"),
        ]);
        let config = ClientConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url, "https://api.prominis.test");
        assert_eq!(config.timeout_ms, 2500);
        assert_eq!(config.token_dir, Some(PathBuf::from("/tmp/prominis")));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err = ClientConfig::from_lookup(|name| (name == ENV_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn load_fills_missing_fields() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"base_url":"http://staging/api"}"#).unwrap();
        file.flush().unwrap();

        let config = ClientConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.base_url, "http://staging/api");
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn load_missing_file_reports_path() {
        let err = ClientConfig::load("/nonexistent/prominis.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/prominis.json"));
    }
}
