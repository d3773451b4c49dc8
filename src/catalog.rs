//! Plugin and theme slug catalog
//!
//! The catalog lists every slug published in the WordPress.org plugin and
//! theme repositories. Scans read a snapshot of it; [`AssetCatalog::sync`]
//! refreshes it from the SVN directory listings at most once a day.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

pub const PLUGINS_SVN_URL: &str = "https://plugins.svn.wordpress.org/";
pub const THEMES_SVN_URL: &str = "https://themes.svn.wordpress.org/";

/// Minimum time between two syncs
const SYNC_INTERVAL_HOURS: i64 = 24;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetCatalog {
    pub plugins: Vec<String>,
    pub themes: Vec<String>,
    pub last_sync_date: Option<DateTime<Utc>>,
}

/// Where sync fetches its listings from
#[derive(Debug, Clone)]
pub struct CatalogSources {
    pub plugins_url: String,
    pub themes_url: String,
}

impl Default for CatalogSources {
    fn default() -> Self {
        Self {
            plugins_url: PLUGINS_SVN_URL.to_string(),
            themes_url: THEMES_SVN_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Updated { plugins: usize, themes: usize },
    TooRecent { last_sync: DateTime<Utc> },
}

impl AssetCatalog {
    pub fn new(plugins: Vec<String>, themes: Vec<String>) -> Self {
        Self {
            plugins,
            themes,
            last_sync_date: None,
        }
    }

    /// Load a catalog file; a missing file is an empty catalog
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.themes.is_empty()
    }

    /// Refresh both lists unless the last sync is younger than a day
    pub async fn sync(
        &mut self,
        client: &Client,
        sources: &CatalogSources,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome> {
        if let Some(last_sync) = self.last_sync_date
            && now - last_sync < Duration::hours(SYNC_INTERVAL_HOURS)
        {
            return Ok(SyncOutcome::TooRecent { last_sync });
        }

        let plugins = fetch_listing(client, &sources.plugins_url).await?;
        let themes = fetch_listing(client, &sources.themes_url).await?;
        info!(plugins = plugins.len(), themes = themes.len(), "catalog synced");

        self.plugins = plugins;
        self.themes = themes;
        self.last_sync_date = Some(now);

        Ok(SyncOutcome::Updated {
            plugins: self.plugins.len(),
            themes: self.themes.len(),
        })
    }
}

async fn fetch_listing(client: &Client, url: &str) -> Result<Vec<String>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::HttpRequest(e.to_string()))?;
    if !response.status().is_success() {
        return Err(Error::HttpStatus(response.status().as_u16()));
    }
    let html = response
        .text()
        .await
        .map_err(|e| Error::HttpRequest(e.to_string()))?;
    Ok(parse_listing(&html))
}

/// Slugs from an SVN directory index (`<li><a href="slug/">slug/</a></li>`)
pub fn parse_listing(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("li a[href]") else {
        return Vec::new();
    };

    let mut seen = BTreeSet::new();
    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| !href.contains("://") && !href.starts_with(['?', '#', '.']))
        .map(|href| href.trim().trim_end_matches('/').to_string())
        .filter(|slug| !slug.is_empty() && !slug.contains('/'))
        .filter(|slug| seen.insert(slug.clone()))
        .collect()
}
