use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use crate::jobs::model::{JobPatch, JobRecord};

/// File name of the persisted job cache inside the data directory.
pub const STORAGE_FILE: &str = "autofill_jobs_v1.json";

/// Merge `patch` into `records` (newest first).
///
/// An unknown `job_id` is prepended as a new record; a known one is merged
/// in place so its position never changes.
pub fn upsert(mut records: Vec<JobRecord>, patch: JobPatch, now: DateTime<Utc>) -> Vec<JobRecord> {
    match records.iter_mut().find(|r| r.job_id == patch.job_id) {
        Some(existing) => existing.apply(patch, now),
        None => records.insert(0, JobRecord::from_patch(patch, now)),
    }
    records
}

/// The client's job registry. Cheap to clone; all clones share one
/// collection, and `upsert` is the only write path.
///
/// A path-backed store treats the file as the source of truth: several
/// processes may share one data directory, so every write re-reads the file
/// under an exclusive lock and every read refreshes the cached copy.
#[derive(Clone)]
pub struct JobStore {
    records: Arc<Mutex<Vec<JobRecord>>>,
    path: Option<PathBuf>,
}

impl JobStore {
    /// Store without a backing file.
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            path: None,
        }
    }

    /// Open the store under `dir`, restoring whatever was persisted there.
    /// An unusable directory only costs persistence; writes report it later.
    pub async fn open(dir: &Path) -> Self {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "data dir unavailable, starting empty");
        }
        let path = dir.join(STORAGE_FILE);
        let records = load_records(&path).await;
        tracing::info!(path = %path.display(), jobs = records.len(), "job store loaded");

        Self {
            records: Arc::new(Mutex::new(records)),
            path: Some(path),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Merge a partial record and persist the whole collection.
    ///
    /// The cached merge is kept even if the write fails; the error is still
    /// returned so the caller can report it.
    pub async fn upsert(&self, patch: JobPatch) -> anyhow::Result<JobRecord> {
        let job_id = patch.job_id.clone();
        if job_id.trim().is_empty() {
            anyhow::bail!("upsert requires a job_id");
        }

        let mut guard = self.records.lock().await;
        let Some(path) = &self.path else {
            let records = std::mem::take(&mut *guard);
            *guard = upsert(records, patch, Utc::now());
            return find(&guard, &job_id);
        };

        let lock = match StoreLock::acquire(path).await {
            Ok(lock) => lock,
            Err(e) => {
                let records = std::mem::take(&mut *guard);
                *guard = upsert(records, patch, Utc::now());
                return Err(e.context("job store lock"));
            }
        };

        let current = load_records(path).await;
        *guard = upsert(current, patch, Utc::now());
        let record = find(&guard, &job_id)?;
        save_records(path, &guard).await?;
        drop(lock);
        Ok(record)
    }

    pub async fn list(&self) -> Vec<JobRecord> {
        self.refreshed().await.clone()
    }

    pub async fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.refreshed()
            .await
            .iter()
            .find(|r| r.job_id == job_id)
            .cloned()
    }

    /// Ids of every queued or running job, in store order.
    pub async fn active_ids(&self) -> Vec<String> {
        self.refreshed()
            .await
            .iter()
            .filter(|r| r.status.is_active())
            .map(|r| r.job_id.clone())
            .collect()
    }

    /// Drop every record (explicit user action).
    pub async fn clear(&self) -> anyhow::Result<()> {
        let mut guard = self.records.lock().await;
        guard.clear();
        if let Some(path) = &self.path {
            let _lock = StoreLock::acquire(path).await?;
            save_records(path, &guard).await?;
        }
        Ok(())
    }

    /// Cached records, reloaded first when another writer may have changed
    /// the file. A missing file keeps the cache.
    async fn refreshed(&self) -> MutexGuard<'_, Vec<JobRecord>> {
        let mut guard = self.records.lock().await;
        if let Some(path) = &self.path {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                *guard = load_records(path).await;
            }
        }
        guard
    }
}

fn find(records: &[JobRecord], job_id: &str) -> anyhow::Result<JobRecord> {
    records
        .iter()
        .find(|r| r.job_id == job_id)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("job {job_id} missing after upsert"))
}

/// Advisory lock on a sibling `.lock` file, held across a read-merge-write.
struct StoreLock {
    file: std::fs::File,
}

impl StoreLock {
    async fn acquire(store_path: &Path) -> anyhow::Result<Self> {
        let path = store_path.with_extension("lock");
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await??;
        Ok(Self { file })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Read the persisted collection. Missing, unreadable or corrupt content
/// yields an empty collection; individual malformed entries are skipped.
pub async fn load_records(path: &Path) -> Vec<JobRecord> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "job store unreadable, starting empty");
            return Vec::new();
        }
    };

    let items = match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            tracing::warn!(path = %path.display(), "job store is not an array, starting empty");
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "job store corrupt, starting empty");
            return Vec::new();
        }
    };

    let total = items.len();
    let records: Vec<JobRecord> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if records.len() < total {
        tracing::warn!(skipped = total - records.len(), "dropped malformed job records");
    }
    records
}

async fn save_records(path: &Path, records: &[JobRecord]) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(records)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
