//! Job storage.
//!
//! The orchestrator only sees the `JobStore` trait, so in-memory and
//! on-disk storage are interchangeable.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::job::MigrationJob;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: &str) -> CoreResult<Option<MigrationJob>>;

    /// Insert or replace a job.
    async fn put(&self, job: &MigrationJob) -> CoreResult<()>;

    /// All jobs, oldest first.
    async fn list(&self) -> CoreResult<Vec<MigrationJob>>;
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, MigrationJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, id: &str) -> CoreResult<Option<MigrationJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn put(&self, job: &MigrationJob) -> CoreResult<()> {
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn list(&self) -> CoreResult<Vec<MigrationJob>> {
        let mut jobs: Vec<MigrationJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}

/// One pretty-printed JSON file per job.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn job_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Ids become file names, so they must not leave the store directory.
    fn is_storable_id(id: &str) -> bool {
        !id.is_empty() && !id.contains(['/', '\\']) && !id.contains("..")
    }

    fn load(path: &Path) -> CoreResult<MigrationJob> {
        let content = fs::read_to_string(path)?;
        let job = serde_json::from_str(&content)?;
        Ok(job)
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn get(&self, id: &str) -> CoreResult<Option<MigrationJob>> {
        if !Self::is_storable_id(id) {
            return Err(CoreError::JobNotFound(id.to_string()));
        }
        let path = self.job_path(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    async fn put(&self, job: &MigrationJob) -> CoreResult<()> {
        if !Self::is_storable_id(&job.id) {
            return Err(CoreError::InvalidState(format!(
                "job id {:?} cannot be used as a file name",
                job.id
            )));
        }
        fs::create_dir_all(&self.dir)?;
        let path = self.job_path(&job.id);
        let json = serde_json::to_string_pretty(job)?;
        fs::write(&path, json)?;
        debug!("Saved job {} to {:?}", job.id, path);
        Ok(())
    }

    async fn list(&self) -> CoreResult<Vec<MigrationJob>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut jobs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load(&path) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!("Skipping unreadable job file {:?}: {}", path, e),
            }
        }
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}
