//! Scan orchestration
//!
//! [`Scanner::start`] fingerprints the target and, if it is WordPress,
//! persists a new job and hands back a [`ScanRun`]. The run owns everything
//! one job needs (target client, vulnerability client and its credential
//! cursor) and walks the stages in order, writing each result to the store
//! before moving on.

use crate::assets::{AssetVersionProber, AssetVersions};
use crate::catalog::AssetCatalog;
use crate::config::ScanConfig;
use crate::detector::{Detector, Fingerprint};
use crate::error::{Error, Result};
use crate::http::TargetClient;
use crate::model::{AssetFinding, AssetFindings, JobField, ScanJob, ScanStatus};
use crate::probes::ProbeSuite;
use crate::store::JobStore;
use crate::vulndb::{AssetKind, VulnerabilityClient, asset_finding, core_vulnerabilities};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Stages run after the job is created, in order
const STAGES: [ScanStatus; 5] = [
    ScanStatus::DetectingFingerprint,
    ScanStatus::ProbingSurface,
    ScanStatus::EnumeratingPlugins,
    ScanStatus::EnumeratingThemes,
    ScanStatus::CorrelatingCoreVulnerabilities,
];

/// How a stage ended
#[derive(Debug)]
pub enum StageOutcome {
    /// Every step produced a result
    Completed,
    /// Results were recorded but some data is missing
    Degraded(String),
    /// The job cannot continue
    Fatal(Error),
}

/// Result of trying to start a scan
pub enum StartOutcome {
    /// Fingerprinting failed; nothing was persisted
    NotWordPress,
    Started(Box<ScanRun>),
}

/// Entry point holding the inputs shared by every scan it starts
pub struct Scanner {
    config: Arc<ScanConfig>,
    catalog: Arc<AssetCatalog>,
    store: Arc<dyn JobStore>,
}

impl Scanner {
    pub fn new(config: ScanConfig, catalog: AssetCatalog, store: Arc<dyn JobStore>) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            store,
        }
    }

    /// Fingerprint `url` and create the job if it is WordPress
    pub async fn start(&self, url: &str) -> Result<StartOutcome> {
        let target = TargetClient::new(url, &self.config).await?;
        let fingerprint = Detector::fingerprint(&target).await;
        if !fingerprint.is_wordpress {
            info!(url = %target.origin(), "target is not WordPress, scan not started");
            return Ok(StartOutcome::NotWordPress);
        }

        let vulndb = VulnerabilityClient::from_config(&self.config)?;
        let job = ScanJob::new(target.origin().as_str());
        self.store.create(&job).await?;
        info!(job_id = %job.id, url = %job.url, "scan job created");

        Ok(StartOutcome::Started(Box::new(ScanRun {
            job,
            fingerprint,
            target,
            vulndb,
            quota_exhausted: false,
            config: Arc::clone(&self.config),
            catalog: Arc::clone(&self.catalog),
            store: Arc::clone(&self.store),
        })))
    }

    /// Start and run a scan to completion; `None` if the target is not WordPress
    pub async fn scan(&self, url: &str) -> Result<Option<ScanJob>> {
        match self.start(url).await? {
            StartOutcome::NotWordPress => Ok(None),
            StartOutcome::Started(run) => Ok(Some(run.run().await)),
        }
    }
}

/// One job's pipeline
pub struct ScanRun {
    job: ScanJob,
    fingerprint: Fingerprint,
    target: TargetClient,
    vulndb: VulnerabilityClient,
    quota_exhausted: bool,
    config: Arc<ScanConfig>,
    catalog: Arc<AssetCatalog>,
    store: Arc<dyn JobStore>,
}

impl ScanRun {
    pub fn id(&self) -> Uuid {
        self.job.id
    }

    pub fn job(&self) -> &ScanJob {
        &self.job
    }

    /// Run every stage and return the final job
    pub async fn run(mut self) -> ScanJob {
        for stage in STAGES {
            let outcome = match self.run_stage(stage).await {
                Ok(outcome) => outcome,
                Err(e) => StageOutcome::Fatal(e),
            };

            match outcome {
                StageOutcome::Completed => debug!(job_id = %self.job.id, %stage, "stage completed"),
                StageOutcome::Degraded(reason) => {
                    warn!(job_id = %self.job.id, %stage, %reason, "stage completed with missing data")
                }
                StageOutcome::Fatal(e) => {
                    error!(job_id = %self.job.id, %stage, error = %e, "scan failed");
                    self.job.advance(ScanStatus::Failed);
                    self.persist_quietly(vec![JobField::Status(ScanStatus::Failed)]).await;
                    return self.job;
                }
            }
        }

        if let Err(e) = self.enter(ScanStatus::Finished).await {
            error!(job_id = %self.job.id, error = %e, "failed to record completion");
        }
        info!(
            job_id = %self.job.id,
            vulnerabilities = self.job.vulnerability_count(),
            "scan finished"
        );
        self.job
    }

    async fn run_stage(&mut self, stage: ScanStatus) -> Result<StageOutcome> {
        self.enter(stage).await?;
        match stage {
            ScanStatus::DetectingFingerprint => self.record_fingerprint().await,
            ScanStatus::ProbingSurface => self.probe_surface().await,
            ScanStatus::EnumeratingPlugins => self.enumerate(AssetKind::Plugin).await,
            ScanStatus::EnumeratingThemes => self.enumerate(AssetKind::Theme).await,
            ScanStatus::CorrelatingCoreVulnerabilities => self.correlate_core().await,
            ScanStatus::Created | ScanStatus::Finished | ScanStatus::Failed => {
                Ok(StageOutcome::Completed)
            }
        }
    }

    /// Apply fields locally, then write them through to the store
    ///
    /// Write failures are logged and the run continues; a job that has
    /// disappeared from the store is fatal.
    async fn persist(&mut self, fields: Vec<JobField>) -> Result<()> {
        self.job.apply(&fields);
        match self.store.upsert(self.job.id, &fields).await {
            Ok(()) => Ok(()),
            Err(e @ Error::JobNotFound(_)) => Err(e),
            Err(e) => {
                warn!(job_id = %self.job.id, error = %e, "failed to persist scan progress");
                Ok(())
            }
        }
    }

    async fn persist_quietly(&mut self, fields: Vec<JobField>) {
        if let Err(e) = self.persist(fields).await {
            warn!(job_id = %self.job.id, error = %e, "failed to persist scan progress");
        }
    }

    async fn enter(&mut self, status: ScanStatus) -> Result<()> {
        info!(job_id = %self.job.id, %status, "entering stage");
        self.persist(vec![JobField::Status(status)]).await
    }

    async fn record_fingerprint(&mut self) -> Result<StageOutcome> {
        let version = self.fingerprint.version.clone();
        self.persist(vec![JobField::WordPressVersion(version.clone())])
            .await?;
        Ok(match version {
            Some(_) => StageOutcome::Completed,
            None => StageOutcome::Degraded("WordPress version not disclosed".into()),
        })
    }

    async fn probe_surface(&mut self) -> Result<StageOutcome> {
        let suite = ProbeSuite::new(self.target.clone());
        for exposure in ProbeSuite::ORDER {
            let exposed = suite.check(exposure).await;
            debug!(job_id = %self.job.id, %exposure, exposed, "probe done");
            self.persist(vec![JobField::Exposure(exposure, exposed)])
                .await?;
        }
        let users = suite.users().await;
        self.persist(vec![JobField::Users(users)]).await?;
        Ok(StageOutcome::Completed)
    }

    async fn enumerate(&mut self, kind: AssetKind) -> Result<StageOutcome> {
        let slugs = match kind {
            AssetKind::Plugin => &self.catalog.plugins,
            AssetKind::Theme => &self.catalog.themes,
        };
        let prober = AssetVersionProber::new(self.target.clone(), &self.config);
        let versions = prober.probe_all(kind, slugs).await;

        let (findings, outcome) = self.correlate_assets(kind, versions).await;
        let field = match kind {
            AssetKind::Plugin => JobField::Plugins(findings),
            AssetKind::Theme => JobField::Themes(findings),
        };
        self.persist(vec![field]).await?;
        Ok(outcome)
    }

    /// Look up every discovered asset in the vulnerability database
    ///
    /// Assets that cannot be looked up are still reported with their
    /// installed version.
    async fn correlate_assets(
        &mut self,
        kind: AssetKind,
        versions: AssetVersions,
    ) -> (AssetFindings, StageOutcome) {
        let mut findings = AssetFindings::new();
        let mut missing = 0usize;

        for (slug, installed) in versions {
            if self.quota_exhausted {
                missing += 1;
                findings.insert(slug, AssetFinding::uncorrelated(installed));
                continue;
            }

            match self.vulndb.get_by_asset(kind, &slug).await {
                Ok(response) => {
                    let finding = response
                        .get(&slug)
                        .or_else(|| response.values().next())
                        .map(|entry| asset_finding(entry, &installed))
                        .unwrap_or_else(|| AssetFinding::uncorrelated(&installed));
                    findings.insert(slug, finding);
                }
                Err(e) => {
                    if matches!(e, Error::QuotaExhausted) {
                        warn!(job_id = %self.job.id, "vulnerability database quota exhausted");
                        self.quota_exhausted = true;
                    } else {
                        debug!(job_id = %self.job.id, slug = %slug, error = %e, "vulnerability lookup failed");
                    }
                    missing += 1;
                    findings.insert(slug, AssetFinding::uncorrelated(installed));
                }
            }
        }

        let outcome = if missing == 0 {
            StageOutcome::Completed
        } else {
            StageOutcome::Degraded(format!(
                "{} {} without vulnerability data",
                missing,
                kind.content_dir()
            ))
        };
        (findings, outcome)
    }

    async fn correlate_core(&mut self) -> Result<StageOutcome> {
        let Some(version) = self.job.wordpress_version.clone() else {
            return Ok(StageOutcome::Completed);
        };
        if self.quota_exhausted {
            return Ok(StageOutcome::Degraded("API quota exhausted".into()));
        }

        let vulns = match self.vulndb.get_by_wordpress_version(&version).await {
            Ok(response) => core_vulnerabilities(&response, &version),
            Err(e) => {
                if matches!(e, Error::QuotaExhausted) {
                    self.quota_exhausted = true;
                }
                return Ok(StageOutcome::Degraded(format!(
                    "core vulnerability lookup failed: {}",
                    e
                )));
            }
        };
        self.persist(vec![JobField::WordPressVulnerabilities(vulns)])
            .await?;
        Ok(StageOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Exposure, JobSummary};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Store that logs every upserted field, in call order
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStore,
        writes: Mutex<Vec<String>>,
    }

    impl RecordingStore {
        fn writes(&self) -> Vec<String> {
            self.writes.lock().unwrap().clone()
        }
    }

    fn label(field: &JobField) -> String {
        match field {
            JobField::Status(status) => format!("status:{:?}", status),
            JobField::WordPressVersion(_) => "wordpress_version".into(),
            JobField::Exposure(exposure, _) => format!("exposure:{:?}", exposure),
            JobField::Users(_) => "users".into(),
            JobField::Plugins(_) => "plugins".into(),
            JobField::Themes(_) => "themes".into(),
            JobField::WordPressVulnerabilities(_) => "wordpress_vulnerabilities".into(),
        }
    }

    #[async_trait]
    impl JobStore for RecordingStore {
        async fn create(&self, job: &ScanJob) -> Result<()> {
            self.inner.create(job).await
        }

        async fn upsert(&self, id: Uuid, fields: &[JobField]) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .extend(fields.iter().map(label));
            self.inner.upsert(id, fields).await
        }

        async fn find(&self, id: Uuid) -> Result<Option<ScanJob>> {
            self.inner.find(id).await
        }

        async fn delete(&self, id: Uuid) -> Result<bool> {
            self.inner.delete(id).await
        }

        async fn list(&self) -> Result<Vec<JobSummary>> {
            self.inner.list().await
        }
    }

    fn local_config(vulndb: &str) -> ScanConfig {
        ScanConfig {
            allow_private: true,
            threads: 4,
            vulndb_url: vulndb.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn non_wordpress_target_persists_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>static site</html>"))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let scanner = Scanner::new(
            local_config(&server.uri()),
            AssetCatalog::default(),
            store.clone(),
        );
        assert!(matches!(
            scanner.start(&server.uri()).await.unwrap(),
            StartOutcome::NotWordPress
        ));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleted_job_fails_the_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<link href=\"/wp-content/x.css\">"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let scanner = Scanner::new(
            local_config(&server.uri()),
            AssetCatalog::default(),
            store.clone(),
        );
        let StartOutcome::Started(run) = scanner.start(&server.uri()).await.unwrap() else {
            panic!("expected scan to start");
        };
        assert_eq!(run.job().status, ScanStatus::Created);
        store.delete(run.id()).await.unwrap();

        let job = run.run().await;
        assert_eq!(job.status, ScanStatus::Failed);
    }

    #[tokio::test]
    async fn each_stage_is_written_before_the_next_starts() {
        let target = MockServer::start().await;
        let vulndb = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<meta name="generator" content="WordPress 6.2"><link href="/wp-content/x.css">"#,
            ))
            .mount(&target)
            .await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "requests_remaining": 5 })))
            .mount(&vulndb)
            .await;
        Mock::given(method("GET"))
            .and(path("/wordpresses/62"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "6.2": { "vulnerabilities": [{ "title": "Core XSS", "fixed_in": "6.2.1" }] }
            })))
            .mount(&vulndb)
            .await;

        let store = Arc::new(RecordingStore::default());
        let config = ScanConfig {
            api_tokens: vec!["token".into()],
            ..local_config(&vulndb.uri())
        };
        let scanner = Scanner::new(config, AssetCatalog::default(), store.clone());
        let job = scanner.scan(&target.uri()).await.unwrap().expect("WordPress target");
        assert_eq!(job.status, ScanStatus::Finished);

        let mut expected = vec![
            "status:DetectingFingerprint".to_string(),
            "wordpress_version".into(),
            "status:ProbingSurface".into(),
        ];
        expected.extend(ProbeSuite::ORDER.iter().map(|e: &Exposure| format!("exposure:{:?}", e)));
        expected.extend(
            [
                "users",
                "status:EnumeratingPlugins",
                "plugins",
                "status:EnumeratingThemes",
                "themes",
                "status:CorrelatingCoreVulnerabilities",
                "wordpress_vulnerabilities",
                "status:Finished",
            ]
            .map(String::from),
        );
        assert_eq!(store.writes(), expected);
        assert_eq!(store.find(job.id).await.unwrap(), Some(job));
    }
}
