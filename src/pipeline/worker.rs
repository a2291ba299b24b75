//! Background workers executing job runs.
//!
//! Workers pull tasks from one shared queue. Every run still serializes on
//! the orchestrator's exclusive-access gate, so additional workers only
//! queue behind it; they keep a slow job from blocking task intake.

use crate::error::{NarratorError, Result};
use crate::job::Job;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::orchestrator::{Orchestrator, RunOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Work a worker can pick up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum JobTask {
    Run { job_id: String },
    Regenerate { job_id: String, index: usize },
}

impl JobTask {
    pub fn job_id(&self) -> &str {
        match self {
            JobTask::Run { job_id } | JobTask::Regenerate { job_id, .. } => job_id,
        }
    }
}

type TokenRegistry = Arc<Mutex<HashMap<String, CancelToken>>>;

fn lock_tokens(tokens: &TokenRegistry) -> MutexGuard<'_, HashMap<String, CancelToken>> {
    tokens.lock().unwrap_or_else(|e| e.into_inner())
}

/// Pool of tokio workers sharing one task queue.
pub struct WorkerPool {
    orchestrator: Arc<Orchestrator>,
    sender: mpsc::UnboundedSender<JobTask>,
    tokens: TokenRegistry,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` workers (at least one) on the current runtime.
    pub fn start(orchestrator: Arc<Orchestrator>, workers: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let tokens: TokenRegistry = Arc::default();

        let workers = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    orchestrator.clone(),
                    receiver.clone(),
                    tokens.clone(),
                ))
            })
            .collect();

        Self {
            orchestrator,
            sender,
            tokens,
            workers,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Queue a task. Its job shares one cancel token with any other queued
    /// task of the same job.
    pub fn submit(&self, task: JobTask) -> Result<()> {
        lock_tokens(&self.tokens)
            .entry(task.job_id().to_string())
            .or_default();
        log::debug!("queued {:?}", task);
        self.sender.send(task).map_err(|e| {
            NarratorError::Other(format!("worker queue closed, dropped {:?}", e.0))
        })
    }

    /// Request cancellation: persist the request and trip the job's token so
    /// an in-flight run stops at its next chunk boundary.
    ///
    /// A job no worker knows about gets a run queued so its cleanup happens.
    pub fn cancel(&self, job_id: &str) -> Result<Job> {
        let job = self.orchestrator.request_cancel(job_id)?;
        let tracked = match lock_tokens(&self.tokens).get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        };
        if !tracked {
            self.submit(JobTask::Run {
                job_id: job_id.to_string(),
            })?;
        }
        Ok(job)
    }

    /// Queue every job a previous process left unfinished.
    pub fn resume_interrupted(&self) -> Result<Vec<String>> {
        let jobs = self
            .orchestrator
            .store()
            .list(&|job: &Job| job.status.is_resumable())?;
        let mut resumed = Vec::with_capacity(jobs.len());
        for job in jobs {
            log::info!("resuming {} (was {})", job.id, job.status);
            self.submit(JobTask::Run {
                job_id: job.id.clone(),
            })?;
            resumed.push(job.id);
        }
        Ok(resumed)
    }

    /// Whether any queued or running task belongs to `job_id`.
    pub fn is_tracked(&self, job_id: &str) -> bool {
        lock_tokens(&self.tokens).contains_key(job_id)
    }

    /// Abort the workers. Queued tasks are dropped.
    ///
    /// A run interrupted here resumes from its last persisted chunk on the
    /// next start.
    pub fn shutdown(&self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

async fn worker_loop(
    id: usize,
    orchestrator: Arc<Orchestrator>,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<JobTask>>>,
    tokens: TokenRegistry,
) {
    loop {
        let task = receiver.lock().await.recv().await;
        let Some(task) = task else {
            log::debug!("worker {id}: queue closed");
            break;
        };

        let token = lock_tokens(&tokens)
            .entry(task.job_id().to_string())
            .or_default()
            .clone();
        log::debug!("worker {id}: {:?}", task);

        let result = match &task {
            JobTask::Run { job_id } => orchestrator.run(job_id, &token).await,
            JobTask::Regenerate { job_id, index } => {
                orchestrator.regenerate(job_id, *index, &token).await
            }
        };
        match result {
            Ok(RunOutcome::Failed { error }) => {
                log::error!("{}: failed: {error}", task.job_id())
            }
            Ok(outcome) => log::info!("{}: {:?}", task.job_id(), outcome),
            Err(e) => log::error!("{}: {e}", task.job_id()),
        }

        let mut registry = lock_tokens(&tokens);
        if registry
            .get(task.job_id())
            .is_some_and(|t| t.is_cancelled())
            || !orchestrator
                .store()
                .read(task.job_id())
                .is_ok_and(|job| job.status.is_active())
        {
            registry.remove(task.job_id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ArtifactStore;
    use crate::job::{JobStatus, JobStore, MemoryJobStore};
    use crate::pipeline::gate::ExclusiveGate;
    use crate::pipeline::orchestrator::JobRequest;
    use crate::synth::MockSynthesizer;
    use crate::voice::VoiceLibrary;
    use std::time::Duration;
    use tempfile::TempDir;

    fn pool(
        synth: MockSynthesizer,
        workers: usize,
    ) -> (TempDir, Arc<MemoryJobStore>, WorkerPool) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let orchestrator = Orchestrator::new(
            store.clone(),
            ArtifactStore::open(dir.path().join("audio")).unwrap(),
            VoiceLibrary::open(dir.path().join("voices")).unwrap(),
            Arc::new(synth),
            ExclusiveGate::new(),
        );
        (dir, store, WorkerPool::start(Arc::new(orchestrator), workers))
    }

    async fn wait_for(store: &MemoryJobStore, id: &str, done: impl Fn(Option<&Job>) -> bool) {
        for _ in 0..500 {
            let job = store.read(id).ok();
            if done(job.as_ref()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not reach the expected state");
    }

    #[tokio::test]
    async fn submitted_jobs_run_to_completion() {
        let (_dir, store, pool) = pool(MockSynthesizer::default(), 2);
        let a = pool
            .orchestrator()
            .create_job(JobRequest::new("One. Two."))
            .unwrap();
        let b = pool
            .orchestrator()
            .create_job(JobRequest::new("Three. Four."))
            .unwrap();
        pool.submit(JobTask::Run { job_id: a.id.clone() }).unwrap();
        pool.submit(JobTask::Run { job_id: b.id.clone() }).unwrap();
        assert!(pool.is_tracked(&a.id));

        for id in [&a.id, &b.id] {
            wait_for(&store, id, |j| {
                j.is_some_and(|j| j.status == JobStatus::Completed)
            })
            .await;
        }
        pool.shutdown();
    }

    #[tokio::test]
    async fn resume_picks_up_interrupted_jobs_only() {
        let (_dir, store, pool) = pool(MockSynthesizer::default(), 1);
        let orchestrator = pool.orchestrator().clone();
        let interrupted = orchestrator.create_job(JobRequest::new("Left over.")).unwrap();
        let settled = orchestrator.create_job(JobRequest::new("All done.")).unwrap();
        let mut record = store.read(&settled.id).unwrap();
        record.status = JobStatus::Review;
        store.write(&record).unwrap();

        let resumed = pool.resume_interrupted().unwrap();
        assert_eq!(resumed, vec![interrupted.id.clone()]);
        wait_for(&store, &interrupted.id, |j| {
            j.is_some_and(|j| j.status == JobStatus::Completed)
        })
        .await;
        assert_eq!(store.read(&settled.id).unwrap().status, JobStatus::Review);
        pool.shutdown();
    }

    #[tokio::test]
    async fn cancel_stops_a_running_job() {
        let synth = MockSynthesizer::default().with_latency(Duration::from_millis(30));
        let (_dir, store, pool) = pool(synth.clone(), 1);
        let text = "One. Two. Three. Four. Five. Six. Seven. Eight.";
        let job = pool
            .orchestrator()
            .create_job(JobRequest::new(text).with_words_per_chunk(1))
            .unwrap();
        pool.submit(JobTask::Run { job_id: job.id.clone() }).unwrap();

        wait_for(&store, &job.id, |j| {
            j.is_some_and(|j| j.status == JobStatus::Processing)
        })
        .await;
        pool.cancel(&job.id).unwrap();

        wait_for(&store, &job.id, |j| j.is_none()).await;
        assert!(synth.call_count() < 8);
        pool.shutdown();
    }

    #[test]
    fn task_serializes_with_tag() {
        let task = JobTask::Regenerate {
            job_id: "job_1".into(),
            index: 2,
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["task"], "regenerate");
        assert_eq!(task.job_id(), "job_1");
    }
}
