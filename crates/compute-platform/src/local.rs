//! Plataforma local: cola de jobs en memoria con un pool de workers
//! independiente por carril (rápido/lento) y persistencia en un
//! `ResultStore`.
//!
//! Para una misma identidad sólo puede haber un job vivo: un envío cuyo id ya
//! está registrado (y no expirado) se absorbe sin programar trabajo. Sólo se
//! expiran jobs terminados, así que reenviar un job expirado nunca se solapa
//! con su ejecución anterior.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use compute_core::errors::render_error_chain;
use compute_core::services::{JobQueue, ResultStore};
use compute_core::workspace::reserved::{EXCEPTION_LOG, INPUT_CONFIG, INPUT_REQUEST};
use compute_core::{JobId, JobRecord, JobStatus, JobSubmission, PlatformError, PluginExecutor, QueueLane,
                   QueueMessage, Workspace};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::{QueueOptions, ServiceOptions};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
struct JobEntry {
    status: JobStatus,
    owner: String,
    lane: QueueLane,
    seq: u64,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// Marcas de tiempo de un job local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimes {
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct Inner {
    jobs: DashMap<JobId, JobEntry>,
    seq: AtomicU64,
    fast: ThreadPool,
    slow: ThreadPool,
    executor: PluginExecutor,
    store: Arc<dyn ResultStore>,
    workspace_root: PathBuf,
}

#[derive(Clone)]
pub struct LocalPlatform {
    inner: Arc<Inner>,
}

fn build_pool(queue: &QueueOptions) -> Result<ThreadPool, PlatformError> {
    let name = queue.name.clone();
    ThreadPoolBuilder::new().num_threads(queue.workers)
                            .thread_name(move |i| format!("{}-{}", name, i))
                            .build()
                            .map_err(|e| PlatformError::Unavailable(format!("worker pool '{}': {}", queue.name, e)))
}

impl LocalPlatform {
    pub fn new(options: &ServiceOptions,
               executor: PluginExecutor,
               store: Arc<dyn ResultStore>)
               -> Result<Self, PlatformError> {
        std::fs::create_dir_all(&options.workspace_root)?;
        let inner = Inner { jobs: DashMap::new(),
                            seq: AtomicU64::new(0),
                            fast: build_pool(&options.fast_queue)?,
                            slow: build_pool(&options.slow_queue)?,
                            executor,
                            store,
                            workspace_root: options.workspace_root.clone() };
        info!("local platform ready: {} ({} workers), {} ({} workers)",
              options.fast_queue.name,
              options.fast_queue.workers,
              options.slow_queue.name,
              options.slow_queue.workers);
        Ok(Self { inner: Arc::new(inner) })
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.inner.store
    }

    pub fn executor(&self) -> &PluginExecutor {
        &self.inner.executor
    }

    pub fn job_times(&self, job_id: &JobId) -> Option<JobTimes> {
        self.inner.jobs.get(job_id).map(|e| JobTimes { submitted_at: e.submitted_at,
                                                       started_at: e.started_at,
                                                       finished_at: e.finished_at })
    }

    /// Espera hasta que el job llegue a un estado terminal.
    pub fn wait_for(&self, job_id: &JobId, timeout: Duration) -> Result<JobRecord, PlatformError> {
        let deadline = Instant::now() + timeout;
        loop {
            let record = self.get_job(job_id)?.ok_or_else(|| PlatformError::NotFound(job_id.to_string()))?;
            if record.status.is_finished() {
                return Ok(record);
            }
            if Instant::now() >= deadline {
                return Err(PlatformError::Unavailable(format!("timed out waiting for job {}", job_id)));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Inner {
    fn pool(&self, lane: QueueLane) -> &ThreadPool {
        match lane {
            QueueLane::Fast => &self.fast,
            QueueLane::Slow => &self.slow,
        }
    }

    fn record(&self, job_id: &JobId, entry: &JobEntry) -> JobRecord {
        // Posición = jobs en cola enviados antes en el mismo carril.
        let queue_position = if entry.status == JobStatus::Queued {
            let ahead = self.jobs
                            .iter()
                            .filter(|e| e.status == JobStatus::Queued && e.lane == entry.lane && e.seq < entry.seq)
                            .count();
            Some(ahead as u32)
        } else {
            None
        };
        JobRecord { job_id: *job_id, status: entry.status, queue_position, owner: entry.owner.clone() }
    }

    /// Aplica una transición sólo si la entrada sigue siendo la del envío
    /// `seq`; un worker de un envío anterior nunca pisa el registro actual.
    fn transition(&self, job_id: &JobId, seq: u64, status: JobStatus) -> bool {
        match self.jobs.get_mut(job_id) {
            Some(mut e) if e.seq == seq && e.status != JobStatus::Expired => {
                e.status = status;
                match status {
                    JobStatus::InProgress => e.started_at = Some(Utc::now()),
                    JobStatus::Complete | JobStatus::Failed => e.finished_at = Some(Utc::now()),
                    _ => {}
                }
                true
            }
            _ => false,
        }
    }

    /// Deja en el store la entrada del job antes de programarlo.
    fn stage_inputs(&self, job_id: &JobId, message: &QueueMessage, resubmission: bool) -> Result<(), PlatformError> {
        if resubmission {
            self.store.delete(job_id)?;
        }
        self.store.put_file(job_id, INPUT_CONFIG, &serde_json::to_vec(message)?)?;
        self.store.put_file(job_id, INPUT_REQUEST, &serde_json::to_vec(&message.request)?)?;
        Ok(())
    }

    fn run(&self, job_id: JobId, seq: u64, message: QueueMessage) {
        if !self.transition(&job_id, seq, JobStatus::InProgress) {
            debug!("[job {}] removed or replaced before it could start", job_id);
            return;
        }
        let status = match self.execute(&job_id, &message) {
            Ok(true) => JobStatus::Complete,
            Ok(false) => JobStatus::Failed,
            Err(e) => {
                error!("[job {}] platform failure: {}", job_id, e);
                let text = render_error_chain(&e);
                if let Err(e) = self.store.put_file(&job_id, EXCEPTION_LOG, text.as_bytes()) {
                    warn!("[job {}] could not store {}: {}", job_id, EXCEPTION_LOG, e);
                }
                JobStatus::Failed
            }
        };
        if self.transition(&job_id, seq, status) {
            info!("[job {}] finished with status {:?}", job_id, status);
        } else {
            warn!("[job {}] finished with status {:?} after its entry was removed", job_id, status);
        }
    }

    /// Ejecuta en un workspace nuevo y devuelve si el job terminó limpio.
    fn execute(&self, job_id: &JobId, message: &QueueMessage) -> Result<bool, PlatformError> {
        let workspace = Workspace::create_in(&self.workspace_root, job_id)?;
        let result = self.execute_in(job_id, message, &workspace);
        let path = workspace.path().display().to_string();
        if let Err(e) = workspace.remove() {
            warn!("[job {}] could not remove workspace {}: {}", job_id, path, e);
        }
        result
    }

    fn execute_in(&self, job_id: &JobId, message: &QueueMessage, workspace: &Workspace) -> Result<bool, PlatformError> {
        workspace.write_json(INPUT_CONFIG, message)?;
        workspace.write_json(INPUT_REQUEST, &message.request)?;
        match self.executor.execute(job_id, message, workspace) {
            Ok(outcome) => {
                let persisted = self.store.persist(job_id, workspace, outcome.files())?;
                debug!("[job {}] persisted {} files", job_id, persisted.len());
                Ok(outcome.is_success())
            }
            Err(fatal) => {
                error!("[job {}] cannot be executed: {}", job_id, fatal);
                self.store.put_file(job_id, EXCEPTION_LOG, render_error_chain(&fatal).as_bytes())?;
                Ok(false)
            }
        }
    }
}

impl JobQueue for LocalPlatform {
    fn get_job(&self, job_id: &JobId) -> Result<Option<JobRecord>, PlatformError> {
        // Se clona la entrada para no sostener el lock del shard mientras se
        // recorre la tabla calculando la posición en cola.
        let entry = self.inner.jobs.get(job_id).map(|e| e.clone());
        Ok(entry.map(|e| self.inner.record(job_id, &e)))
    }

    fn submit(&self, lane: QueueLane, submission: JobSubmission) -> Result<bool, PlatformError> {
        let JobSubmission { job_id, owner, message } = submission;
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        let entry = JobEntry { status: JobStatus::Queued,
                               owner,
                               lane,
                               seq,
                               submitted_at: Utc::now(),
                               started_at: None,
                               finished_at: None };
        let resubmission = match self.inner.jobs.entry(job_id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().status != JobStatus::Expired {
                    debug!("[job {}] already registered, submission absorbed", job_id);
                    return Ok(false);
                }
                occupied.insert(entry);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                false
            }
        };

        // Sin entradas persistidas el job no puede ejecutarse: se retira el
        // registro para que un envío posterior vuelva a intentarlo.
        if let Err(e) = self.inner.stage_inputs(&job_id, &message, resubmission) {
            self.inner.jobs.remove_if(&job_id, |_, entry| entry.seq == seq);
            error!("[job {}] could not be queued: {}", job_id, e);
            return Err(e);
        }

        info!("[job {}] queued on {:?} lane", job_id, lane);
        let inner = self.inner.clone();
        self.inner.pool(lane).spawn(move || inner.run(job_id, seq, message));
        Ok(true)
    }

    fn delete_job(&self, job_id: &JobId) -> Result<(), PlatformError> {
        self.inner.jobs.remove(job_id).ok_or_else(|| PlatformError::NotFound(job_id.to_string()))?;
        self.inner.store.delete(job_id)?;
        info!("[job {}] deleted", job_id);
        Ok(())
    }

    fn expire_job(&self, job_id: &JobId) -> Result<(), PlatformError> {
        let mut entry = self.inner.jobs.get_mut(job_id).ok_or_else(|| PlatformError::NotFound(job_id.to_string()))?;
        if !entry.status.is_finished() {
            return Err(PlatformError::NotFinished(job_id.to_string()));
        }
        entry.status = JobStatus::Expired;
        drop(entry);
        info!("[job {}] expired", job_id);
        Ok(())
    }

    fn list_jobs(&self) -> Result<Vec<JobRecord>, PlatformError> {
        let mut entries: Vec<(JobId, JobEntry)> = self.inner.jobs.iter().map(|e| (*e.key(), e.value().clone())).collect();
        entries.sort_by_key(|(_, e)| e.seq);
        Ok(entries.iter().map(|(id, e)| self.inner.record(id, e)).collect())
    }
}
