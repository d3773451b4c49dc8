//! WordPress fingerprinting
//!
//! A single fetch of the site root decides whether a scan is worth starting
//! and, when a generator tag is present, which core version is installed.

use crate::http::TargetClient;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

/// Product name looked for in generator tags and Server headers
const PRODUCT: &str = "WordPress";

/// Path fragments that only show up in WordPress markup
const WP_INDICATORS: &[&str] = &[
    "wp-content",
    "wp-admin",
    "wp-includes",
    "wp-login.php",
    "content=\"WordPress",
];

static GENERATOR_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^WordPress (\d+(?:\.\d+)+)").expect("valid regex"));

/// What the root page revealed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    pub is_wordpress: bool,
    /// Core version from the generator meta tag
    pub version: Option<String>,
}

pub struct Detector;

impl Detector {
    /// Fetch the root page and fingerprint it; any failure reads as "not WordPress"
    pub async fn fingerprint(client: &TargetClient) -> Fingerprint {
        let fetched = match client.get("/").await {
            Ok(fetched) if (200..300).contains(&fetched.status) => fetched,
            Ok(fetched) => {
                debug!(status = fetched.status, "root page not successful");
                return Fingerprint::default();
            }
            Err(e) => {
                debug!(error = %e, "root page unreachable");
                return Fingerprint::default();
            }
        };

        Self::fingerprint_page(&fetched.body, fetched.server())
    }

    pub async fn is_target(client: &TargetClient) -> bool {
        Self::fingerprint(client).await.is_wordpress
    }

    /// Fingerprint an already fetched page
    pub fn fingerprint_page(html: &str, server: Option<&str>) -> Fingerprint {
        let document = Html::parse_document(html);
        let generators = generator_contents(&document);

        let string_match = WP_INDICATORS.iter().any(|needle| html.contains(needle));
        let meta_match = generators.iter().any(|c| c.starts_with(PRODUCT));
        let server_match = server
            .map(|s| s.to_lowercase().contains(&PRODUCT.to_lowercase()))
            .unwrap_or(false);

        let version = generators.iter().find_map(|content| {
            GENERATOR_VERSION_RE
                .captures(content)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        });

        Fingerprint {
            is_wordpress: string_match || meta_match || server_match,
            version,
        }
    }
}

fn generator_contents(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("meta[name='generator']") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
        .collect()
}
