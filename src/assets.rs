//! Plugin and theme version enumeration
//!
//! Every catalog slug is probed through its `readme.txt`, whose
//! `Stable tag:` line gives the installed version. Misses are silent.

use crate::config::ScanConfig;
use crate::http::TargetClient;
use crate::pool::WorkerPool;
use crate::vulndb::AssetKind;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, trace};

/// Installed versions keyed by slug
pub type AssetVersions = BTreeMap<String, String>;

static STABLE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Stable\s*tag:\s*([\w.-]+)").expect("valid regex"));

/// Extract the version from a `readme.txt` body
pub fn extract_stable_tag(body: &str) -> Option<String> {
    STABLE_TAG_RE
        .captures(body)?
        .get(1)
        .map(|m| m.as_str().to_string())
}

struct ProbeContext {
    client: TargetClient,
    config: ScanConfig,
}

impl ProbeContext {
    async fn probe(&self, kind: AssetKind, slug: &str) -> Option<String> {
        let path = format!("/wp-content/{}/{}/readme.txt", kind.content_dir(), slug);
        let fetched = match self.client.get(&path).await {
            Ok(fetched) => fetched,
            Err(e) => {
                debug!(slug, error = %e, "asset probe failed");
                return None;
            }
        };

        if self.config.is_ignored(fetched.status, fetched.body.len()) || !fetched.is_ok() {
            trace!(slug, status = fetched.status, "asset not present");
            return None;
        }

        extract_stable_tag(&fetched.body)
    }
}

/// Bounded-concurrency prober for plugin/theme versions
pub struct AssetVersionProber {
    context: Arc<ProbeContext>,
    pool: WorkerPool,
}

impl AssetVersionProber {
    pub fn new(client: TargetClient, config: &ScanConfig) -> Self {
        Self {
            context: Arc::new(ProbeContext {
                client,
                config: config.clone(),
            }),
            pool: WorkerPool::new(config.threads),
        }
    }

    /// Probe every slug and return the versions that were found
    ///
    /// Returns only after every probe has completed.
    pub async fn probe_all(&self, kind: AssetKind, slugs: &[String]) -> AssetVersions {
        info!(
            kind = kind.content_dir(),
            candidates = slugs.len(),
            workers = self.pool.workers(),
            "enumerating assets"
        );

        let context = Arc::clone(&self.context);
        let found = self
            .pool
            .run(slugs.to_vec(), move |slug| {
                let context = Arc::clone(&context);
                async move {
                    let version = context.probe(kind, &slug).await;
                    version.map(|v| (slug, v))
                }
            })
            .await;

        let versions: AssetVersions = found.into_iter().flatten().collect();
        info!(kind = kind.content_dir(), found = versions.len(), "asset enumeration done");
        versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(threads: usize) -> ScanConfig {
        ScanConfig {
            threads,
            allow_private: true,
            ..Default::default()
        }
    }

    #[test]
    fn stable_tag_variants() {
        assert_eq!(extract_stable_tag("Stable tag: 5.3.1\n").as_deref(), Some("5.3.1"));
        assert_eq!(extract_stable_tag("stable TAG:trunk").as_deref(), Some("trunk"));
        assert_eq!(extract_stable_tag("Stable tag:   2.0-beta_1").as_deref(), Some("2.0-beta_1"));
        assert_eq!(extract_stable_tag("Tested up to: 6.4"), None);
    }

    #[tokio::test]
    async fn probes_every_slug_and_keeps_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-content/plugins/akismet/readme.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("=== Akismet ===\nStable tag: 5.3\n"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wp-content/plugins/no-tag/readme.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("=== No tag ==="))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/wp-content/plugins/missing-\d+/readme\.txt$"))
            .respond_with(ResponseTemplate::new(404))
            .expect(10)
            .mount(&server)
            .await;

        let client = TargetClient::new(&server.uri(), &config(3)).await.unwrap();
        let prober = AssetVersionProber::new(client, &config(3));

        let mut slugs: Vec<String> = (0..10).map(|i| format!("missing-{}", i)).collect();
        slugs.push("akismet".into());
        slugs.push("no-tag".into());

        let versions = prober.probe_all(AssetKind::Plugin, &slugs).await;
        assert_eq!(versions.len(), 1);
        assert_eq!(versions.get("akismet").map(String::as_str), Some("5.3"));
        assert!(versions.keys().all(|k| slugs.contains(k)));
    }

    #[tokio::test]
    async fn themes_use_theme_directory() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-content/themes/astra/readme.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Stable tag: 4.1.0"))
            .expect(1)
            .mount(&server)
            .await;

        let client = TargetClient::new(&server.uri(), &config(2)).await.unwrap();
        let prober = AssetVersionProber::new(client, &config(2));
        let versions = prober.probe_all(AssetKind::Theme, &["astra".to_string()]).await;
        assert_eq!(versions["astra"], "4.1.0");
    }

    #[tokio::test]
    async fn ignored_sizes_are_misses() {
        let server = MockServer::start().await;
        let body = "Stable tag: 1.0";
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let mut cfg = config(1);
        cfg.ignore_size.insert(body.len());
        let client = TargetClient::new(&server.uri(), &cfg).await.unwrap();
        let prober = AssetVersionProber::new(client, &cfg);
        let versions = prober.probe_all(AssetKind::Plugin, &["soft-404".to_string()]).await;
        assert!(versions.is_empty());
    }

    #[tokio::test]
    async fn unreachable_target_yields_empty_map() {
        let client = TargetClient::new("http://127.0.0.1:9", &config(4)).await.unwrap();
        let prober = AssetVersionProber::new(client, &config(4));
        let slugs: Vec<String> = (0..8).map(|i| format!("p{}", i)).collect();
        assert!(prober.probe_all(AssetKind::Plugin, &slugs).await.is_empty());
    }
}
