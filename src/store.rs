//! Persistence of scan jobs
//!
//! The scanner only needs [`JobStore::create`] and [`JobStore::upsert`]; the
//! read and delete operations serve the CLI.

use crate::error::{Error, Result};
use crate::model::{JobField, JobSummary, ScanJob};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job; fails if the id is already taken
    async fn create(&self, job: &ScanJob) -> Result<()>;

    /// Merge `fields` into the stored job
    ///
    /// Safe to repeat with the same or overlapping fields.
    async fn upsert(&self, id: Uuid, fields: &[JobField]) -> Result<()>;

    async fn find(&self, id: Uuid) -> Result<Option<ScanJob>>;

    /// Remove a job, returning whether it existed
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Summaries of every job, newest first
    async fn list(&self) -> Result<Vec<JobSummary>>;
}

fn newest_first(mut summaries: Vec<JobSummary>) -> Vec<JobSummary> {
    summaries.sort_by(|a, b| b.scan_date.cmp(&a.scan_date));
    summaries
}

/// Store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<BTreeMap<Uuid, ScanJob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, job: &ScanJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(Error::Store(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn upsert(&self, id: Uuid, fields: &[JobField]) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        job.apply(fields);
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<ScanJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<JobSummary>> {
        let jobs = self.jobs.read().await;
        Ok(newest_first(jobs.values().map(ScanJob::summary).collect()))
    }
}

/// Store writing one JSON document per job into a directory
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles on job files
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (and create if needed) a store directory
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("scan_result_{}.json", id))
    }

    async fn read_job(&self, path: &Path) -> Result<Option<ScanJob>> {
        match tokio::fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_job(&self, job: &ScanJob) -> Result<()> {
        let raw = serde_json::to_vec_pretty(job)?;
        let path = self.path_for(job.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileStore {
    async fn create(&self, job: &ScanJob) -> Result<()> {
        let _guard = self.lock.lock().await;
        if tokio::fs::try_exists(self.path_for(job.id)).await? {
            return Err(Error::Store(format!("job {} already exists", job.id)));
        }
        self.write_job(job).await
    }

    async fn upsert(&self, id: Uuid, fields: &[JobField]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut job = self
            .read_job(&self.path_for(id))
            .await?
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        job.apply(fields);
        self.write_job(&job).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<ScanJob>> {
        self.read_job(&self.path_for(id)).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<JobSummary>> {
        let mut summaries = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match self.read_job(&path).await {
                Ok(Some(job)) => summaries.push(job.summary()),
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable job file"),
            }
        }
        Ok(newest_first(summaries))
    }
}
