//! Durable job records.
//!
//! Every operation is atomic per record: readers never see a partially
//! written job. `write` is a whole-record replace with last-writer-wins
//! semantics; callers re-read before writing.

use crate::error::{NarratorError, Result};
use crate::job::types::Job;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Storage of job records keyed by job id.
pub trait JobStore: Send + Sync {
    /// Persist a new record. Fails if the id is already taken.
    fn create(&self, job: &Job) -> Result<String>;

    fn read(&self, id: &str) -> Result<Job>;

    /// Replace an existing record.
    fn write(&self, job: &Job) -> Result<()>;

    /// Every record accepted by `filter`, oldest first.
    fn list(&self, filter: &dyn Fn(&Job) -> bool) -> Result<Vec<Job>>;

    /// Remove a record. Removing a missing record is not an error.
    fn delete(&self, id: &str) -> Result<()>;
}

/// Job ids become file names, so only a conservative alphabet is allowed.
pub fn validate_job_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(NarratorError::InvalidJobId { id: id.to_string() })
    }
}

fn sort_oldest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One pretty-printed JSON file per job under a directory.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    root: PathBuf,
}

impl FileJobStore {
    /// Open (creating if needed) a job directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| NarratorError::JobStore {
            message: format!("Failed to create job directory {}: {}", root.display(), e),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        validate_job_id(id)?;
        Ok(self.root.join(format!("{id}.json")))
    }

    /// Serialize to a fresh temp file in the same directory and fsync it.
    fn write_temp(&self, job: &Job) -> Result<PathBuf> {
        let temp = self.root.join(format!(
            ".{}.{}.{}.tmp",
            job.id,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let result = (|| -> Result<()> {
            let json = serde_json::to_vec_pretty(job)?;
            let mut file = fs::File::create(&temp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            Ok(())
        })();
        match result {
            Ok(()) => Ok(temp),
            Err(e) => {
                remove_temp(&temp);
                Err(NarratorError::JobStore {
                    message: format!("Failed to write record for {}: {}", job.id, e),
                })
            }
        }
    }

    fn parse(id: &str, bytes: &[u8]) -> Result<Job> {
        serde_json::from_slice(bytes).map_err(|e| NarratorError::CorruptRecord {
            id: id.to_string(),
            message: e.to_string(),
        })
    }
}

fn remove_temp(temp: &Path) {
    if let Err(e) = fs::remove_file(temp)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log::warn!("failed to remove temp record {}: {e}", temp.display());
    }
}

impl JobStore for FileJobStore {
    fn create(&self, job: &Job) -> Result<String> {
        let path = self.record_path(&job.id)?;
        let temp = self.write_temp(job)?;

        // hard_link refuses to replace an existing file, so two creates with
        // the same id cannot both succeed.
        let linked = fs::hard_link(&temp, &path);
        remove_temp(&temp);
        match linked {
            Ok(()) => Ok(job.id.clone()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(NarratorError::JobAlreadyExists { id: job.id.clone() })
            }
            Err(e) => Err(NarratorError::JobStore {
                message: format!("Failed to create record for {}: {}", job.id, e),
            }),
        }
    }

    fn read(&self, id: &str) -> Result<Job> {
        let path = self.record_path(id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NarratorError::JobNotFound { id: id.to_string() });
            }
            Err(e) => {
                return Err(NarratorError::JobStore {
                    message: format!("Failed to read {}: {}", path.display(), e),
                });
            }
        };
        Self::parse(id, &bytes)
    }

    fn write(&self, job: &Job) -> Result<()> {
        let path = self.record_path(&job.id)?;
        if !path.is_file() {
            return Err(NarratorError::JobNotFound { id: job.id.clone() });
        }
        let temp = self.write_temp(job)?;
        fs::rename(&temp, &path).map_err(|e| {
            remove_temp(&temp);
            NarratorError::JobStore {
                message: format!("Failed to replace record for {}: {}", job.id, e),
            }
        })
    }

    fn list(&self, filter: &dyn Fn(&Job) -> bool) -> Result<Vec<Job>> {
        let entries = fs::read_dir(&self.root).map_err(|e| NarratorError::JobStore {
            message: format!("Failed to list {}: {}", self.root.display(), e),
        })?;

        let mut jobs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            if id.starts_with('.') || validate_job_id(id).is_err() {
                continue;
            }
            match self.read(id) {
                Ok(job) if filter(&job) => jobs.push(job),
                Ok(_) => {}
                // Deleted between read_dir and read.
                Err(NarratorError::JobNotFound { .. }) => {}
                Err(e) => log::warn!("skipping job record {}: {e}", path.display()),
            }
        }
        sort_oldest_first(&mut jobs);
        Ok(jobs)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let path = self.record_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NarratorError::JobStore {
                message: format!("Failed to delete {}: {}", path.display(), e),
            }),
        }
    }
}

/// In-process store holding serialized records.
///
/// Records are kept as JSON so every read returns an independent copy, the
/// same as the file store.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.records.lock().map_err(|_| NarratorError::JobStore {
            message: "job store lock poisoned".to_string(),
        })
    }
}

impl JobStore for MemoryJobStore {
    fn create(&self, job: &Job) -> Result<String> {
        validate_job_id(&job.id)?;
        let json = serde_json::to_string(job)?;
        let mut records = self.records()?;
        if records.contains_key(&job.id) {
            return Err(NarratorError::JobAlreadyExists { id: job.id.clone() });
        }
        records.insert(job.id.clone(), json);
        Ok(job.id.clone())
    }

    fn read(&self, id: &str) -> Result<Job> {
        let records = self.records()?;
        let json = records
            .get(id)
            .ok_or_else(|| NarratorError::JobNotFound { id: id.to_string() })?;
        FileJobStore::parse(id, json.as_bytes())
    }

    fn write(&self, job: &Job) -> Result<()> {
        let json = serde_json::to_string(job)?;
        let mut records = self.records()?;
        match records.get_mut(&job.id) {
            Some(slot) => {
                *slot = json;
                Ok(())
            }
            None => Err(NarratorError::JobNotFound { id: job.id.clone() }),
        }
    }

    fn list(&self, filter: &dyn Fn(&Job) -> bool) -> Result<Vec<Job>> {
        let records = self.records()?;
        let mut jobs = Vec::new();
        for (id, json) in records.iter() {
            match FileJobStore::parse(id, json.as_bytes()) {
                Ok(job) if filter(&job) => jobs.push(job),
                Ok(_) => {}
                Err(e) => log::warn!("skipping job record {id}: {e}"),
            }
        }
        sort_oldest_first(&mut jobs);
        Ok(jobs)
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.records()?.remove(id);
        Ok(())
    }
}
