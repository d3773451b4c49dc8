//! Scanner configuration
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! defaults below.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// User agent for requests (Edge on Windows)
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";

/// Default number of concurrent asset probes
pub const DEFAULT_THREADS: usize = 100;

/// Request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// WPScan API base URL
pub const DEFAULT_VULNDB_URL: &str = "https://wpscan.com/api/v3/";

/// Token value meaning "no credential configured"
pub const PLACEHOLDER_TOKEN: &str = "0000000000000000000000000000";

/// Configuration shared by every stage of a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// User-Agent header sent to the target
    pub user_agent: String,
    /// Worker count for plugin/theme enumeration
    pub threads: usize,
    /// Status codes that mark an asset probe response as a miss
    pub ignore_code: BTreeSet<u16>,
    /// Body sizes (bytes) that mark an asset probe response as a miss
    pub ignore_size: BTreeSet<usize>,
    /// Vulnerability database API tokens, tried in order
    pub api_tokens: Vec<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Accept self-signed or otherwise invalid TLS certificates on the target
    pub accept_invalid_certs: bool,
    /// Allow scanning loopback and private network addresses
    pub allow_private: bool,
    /// Vulnerability database base URL
    pub vulndb_url: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            threads: DEFAULT_THREADS,
            ignore_code: [403, 301, 302, 401, 404].into_iter().collect(),
            ignore_size: [0].into_iter().collect(),
            api_tokens: vec![PLACEHOLDER_TOKEN.to_string()],
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            accept_invalid_certs: true,
            allow_private: false,
            vulndb_url: DEFAULT_VULNDB_URL.to_string(),
        }
    }
}

impl ScanConfig {
    /// Read a configuration file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::InvalidConfig("threads must be at least 1".into()));
        }
        if self.api_tokens.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one API token is required (use the placeholder for none)".into(),
            ));
        }
        Ok(())
    }

    /// Whether an asset probe response should be discarded
    pub fn is_ignored(&self, status: u16, size: usize) -> bool {
        self.ignore_code.contains(&status) || self.ignore_size.contains(&size)
    }

    /// Whether at least one token is not the placeholder
    pub fn has_api_token(&self) -> bool {
        self.api_tokens.iter().any(|t| !is_placeholder(t))
    }
}

/// Whether a token stands for "no credential"
pub fn is_placeholder(token: &str) -> bool {
    let token = token.trim();
    token.is_empty() || token.chars().all(|c| c == '0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threads, 100);
        assert!(!config.has_api_token());
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"threads": 8, "api_tokens": ["abc"]}"#).unwrap();

        let config = ScanConfig::load(&path).unwrap();
        assert_eq!(config.threads, 8);
        assert_eq!(config.api_tokens, vec!["abc"]);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(config.has_api_token());
    }

    #[test]
    fn reject_zero_threads() {
        let config = ScanConfig {
            threads: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_empty_token_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_tokens": []}"#).unwrap();
        let err = ScanConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = ScanConfig {
            threads: 4,
            allow_private: true,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ScanConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn ignored_responses() {
        let config = ScanConfig::default();
        assert!(config.is_ignored(404, 120));
        assert!(config.is_ignored(200, 0));
        assert!(!config.is_ignored(200, 120));
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder(PLACEHOLDER_TOKEN));
        assert!(is_placeholder(""));
        assert!(!is_placeholder("a1b2c3"));
    }
}
