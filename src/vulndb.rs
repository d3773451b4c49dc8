//! WPScan vulnerability database client
//!
//! Every data request is preceded by a quota check for the current API
//! token. When that token has no requests left the client moves on to the
//! next one and never goes back: the cursor lives as long as the client.

use crate::config::{ScanConfig, is_placeholder};
use crate::error::{Error, Result};
use crate::model::{AssetFinding, VulnerabilityRecord};
use crate::version::is_still_vulnerable;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Quota status of one API token
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Status {
    pub requests_remaining: i64,
}

/// One entry of a vulnerability database lookup
///
/// Plugin and theme lookups fill every field; WordPress core lookups only
/// carry `vulnerabilities`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VulnDbEntry {
    pub friendly_name: Option<String>,
    pub latest_version: Option<String>,
    pub last_updated: Option<String>,
    pub popular: Option<bool>,
    pub vulnerabilities: Option<Vec<VulnerabilityRecord>>,
}

/// Lookup response, keyed by slug or by dotted WordPress version
pub type VulnDbResponse = BTreeMap<String, VulnDbEntry>;

/// Which asset endpoint to query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Plugin,
    Theme,
}

impl AssetKind {
    fn endpoint(self) -> &'static str {
        match self {
            Self::Plugin => "plugins",
            Self::Theme => "themes",
        }
    }

    /// Directory under `wp-content` holding assets of this kind
    pub fn content_dir(self) -> &'static str {
        self.endpoint()
    }
}

/// Vulnerability database client rotating across API tokens
#[derive(Debug)]
pub struct VulnerabilityClient {
    client: Client,
    base_url: Url,
    tokens: Vec<String>,
    cursor: usize,
}

impl VulnerabilityClient {
    pub fn new(base_url: &str, tokens: Vec<String>, timeout: Duration) -> Result<Self> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            tokens,
            cursor: 0,
        })
    }

    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        Self::new(
            &config.vulndb_url,
            config.api_tokens.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Index of the token currently used for requests
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, token: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Token token={}", token))
            .send()
            .await
            .map_err(|e| Error::HttpRequest(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::HttpStatus(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| Error::VulnDbResponse(e.to_string()))
    }

    /// Quota status of a single token
    pub async fn status(&self, token: &str) -> Result<Status> {
        self.get(self.endpoint(&["status"])?, token).await
    }

    /// Remaining requests for the token at the cursor; placeholders have none
    async fn remaining(&self, token: &str) -> Result<i64> {
        if is_placeholder(token) {
            return Ok(0);
        }
        Ok(self.status(token).await?.requests_remaining)
    }

    /// Issue a lookup with the first token that still has quota
    pub async fn request_with_rotation<T: DeserializeOwned>(&mut self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        loop {
            let Some(token) = self.tokens.get(self.cursor) else {
                return Err(Error::QuotaExhausted);
            };

            let remaining = self.remaining(token).await?;
            if remaining > 0 {
                debug!(credential = self.cursor, remaining, %url, "vulnerability lookup");
                return self.get(url, token).await;
            }

            if self.cursor + 1 < self.tokens.len() {
                self.cursor += 1;
                info!(credential = self.cursor, "API quota exhausted, rotating credential");
            } else {
                return Err(Error::QuotaExhausted);
            }
        }
    }

    /// Core vulnerabilities for a WordPress version such as "6.2.2"
    pub async fn get_by_wordpress_version(&mut self, version: &str) -> Result<VulnDbResponse> {
        let key = version.replace('.', "");
        self.request_with_rotation(&["wordpresses", &key]).await
    }

    pub async fn get_by_plugin_slug(&mut self, slug: &str) -> Result<VulnDbResponse> {
        self.get_by_asset(AssetKind::Plugin, slug).await
    }

    pub async fn get_by_theme_slug(&mut self, slug: &str) -> Result<VulnDbResponse> {
        self.get_by_asset(AssetKind::Theme, slug).await
    }

    pub async fn get_by_asset(&mut self, kind: AssetKind, slug: &str) -> Result<VulnDbResponse> {
        self.request_with_rotation(&[kind.endpoint(), slug]).await
    }

    /// Sum of remaining requests across every token
    ///
    /// Each token is queried independently of the rotation cursor. Tokens
    /// whose status cannot be read count as zero.
    pub async fn total_remaining_credits(&self) -> u64 {
        let mut total = 0u64;
        for (index, token) in self.tokens.iter().enumerate() {
            if is_placeholder(token) {
                continue;
            }
            match self.status(token).await {
                Ok(status) => total += status.requests_remaining.max(0) as u64,
                Err(e) => warn!(credential = index, error = %e, "failed to read API token status"),
            }
        }
        total
    }
}

/// Vulnerabilities from `entry` still affecting `installed`
///
/// Records without a fix version cannot be compared and are dropped.
pub fn unpatched(entry: &VulnDbEntry, installed: &str) -> Vec<VulnerabilityRecord> {
    entry
        .vulnerabilities
        .iter()
        .flatten()
        .filter(|v| {
            v.fixed_in
                .as_deref()
                .is_some_and(|fixed_in| is_still_vulnerable(fixed_in, installed))
        })
        .cloned()
        .collect()
}

/// Build the finding for an installed asset from its database entry
pub fn asset_finding(entry: &VulnDbEntry, installed: &str) -> AssetFinding {
    AssetFinding {
        friendly_name: entry.friendly_name.clone(),
        latest_version: entry.latest_version.clone(),
        current_version: installed.to_string(),
        last_updated: entry.last_updated.clone(),
        popular: entry.popular.unwrap_or(false),
        vulnerabilities: unpatched(entry, installed),
    }
}

/// Core vulnerabilities still affecting WordPress `version`
///
/// Core records are listed per release, so one without a fix version is
/// kept: nothing has patched it yet.
pub fn core_vulnerabilities(response: &VulnDbResponse, version: &str) -> Vec<VulnerabilityRecord> {
    let Some(entry) = response.get(version) else {
        return Vec::new();
    };
    entry
        .vulnerabilities
        .iter()
        .flatten()
        .filter(|v| match &v.fixed_in {
            Some(fixed_in) => is_still_vulnerable(fixed_in, version),
            None => true,
        })
        .map(|v| VulnerabilityRecord {
            verified: false,
            introduced_in: Some(version.to_string()),
            ..v.clone()
        })
        .collect()
}
