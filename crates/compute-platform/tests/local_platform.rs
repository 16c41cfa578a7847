use std::fs;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use compute_core::services::{JobQueue, ResultStore};
use compute_core::{identity_of, AuthTuple, DataStream, JobId, JobRequest, JobStatus, JobSubmission, PlatformError,
                   Plugin, PluginDescriptor, PluginError, PluginExecutionContext, PluginExecutor, PluginMetrics,
                   PluginRegistry, QueueLane, QueueMessage, StreamSpec, StudyServices, Workspace};
use compute_platform::{DirectoryStudyService, FsResultStore, LocalPlatform, QueueOptions, ServiceOptions};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NapConfig {
    #[serde(default)]
    sleep_ms: u64,
    #[serde(default)]
    fail: bool,
}

struct Nap;

impl Plugin for Nap {
    type Config = NapConfig;

    const URL_SEGMENT: &'static str = "nap";
    const DISPLAY_NAME: &'static str = "Nap";
    const DESCRIPTION: &'static str = "sleeps, then copies its input";
    const QUEUE_LANE: QueueLane = QueueLane::Fast;

    fn stream_specs(_config: &NapConfig) -> Vec<StreamSpec> {
        vec![StreamSpec::new("nap-input", "E1")]
    }

    fn execute(ctx: &PluginExecutionContext, config: &NapConfig) -> Result<(), PluginError> {
        thread::sleep(Duration::from_millis(config.sleep_ms));
        ctx.workspace().write("scratch.txt", "zzz")?;
        if config.fail {
            return Err(PluginError::msg("woke up on the wrong side"));
        }
        let input = ctx.workspace().read_to_string("nap-input")?;
        ctx.workspace().write_data_result(input)?;
        Ok(())
    }
}

/// Store en disco cuyas escrituras fallan mientras `down` está activo.
struct FlakyStore {
    inner: FsResultStore,
    down: Arc<AtomicBool>,
}

impl ResultStore for FlakyStore {
    fn persist(&self, job_id: &JobId, workspace: &Workspace, files: &[String]) -> Result<Vec<String>, PlatformError> {
        self.inner.persist(job_id, workspace, files)
    }

    fn list_files(&self, job_id: &JobId) -> Result<Option<Vec<String>>, PlatformError> {
        self.inner.list_files(job_id)
    }

    fn open_file(&self, job_id: &JobId, name: &str) -> Result<Option<DataStream>, PlatformError> {
        self.inner.open_file(job_id, name)
    }

    fn put_file(&self, job_id: &JobId, name: &str, data: &[u8]) -> Result<(), PlatformError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(PlatformError::Unavailable("store down".into()));
        }
        self.inner.put_file(job_id, name, data)
    }

    fn delete(&self, job_id: &JobId) -> Result<(), PlatformError> {
        self.inner.delete(job_id)
    }
}

struct Env {
    _dirs: Vec<tempfile::TempDir>,
    platform: LocalPlatform,
    workspace_root: std::path::PathBuf,
}

fn env() -> Env {
    env_with_store(|store| Arc::new(store) as Arc<dyn ResultStore>)
}

fn env_with_store(wrap: impl FnOnce(FsResultStore) -> Arc<dyn ResultStore>) -> Env {
    let data = tempfile::tempdir().unwrap();
    let study = data.path().join("DS_1");
    fs::create_dir(&study).unwrap();
    fs::write(study.join("study.json"), r#"{"id":"DS_1","rootEntity":{"id":"E1","variables":[],"children":[]}}"#).unwrap();
    fs::write(study.join("E1.tsv"), "E1.v\na\n").unwrap();
    let cache = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();

    let options = ServiceOptions { fast_queue: QueueOptions { name: "fast-test".into(), workers: 1 },
                                   slow_queue: QueueOptions { name: "slow-test".into(), workers: 1 },
                                   workspace_root: scratch.path().to_path_buf(),
                                   job_cache_dir: cache.path().to_path_buf(),
                                   ..ServiceOptions::default() };
    let registry = PluginRegistry::from_descriptors([PluginDescriptor::of::<Nap>()]).unwrap();
    let services = StudyServices::from_single(Arc::new(DirectoryStudyService::new(data.path())));
    let executor = PluginExecutor::new(Arc::new(registry), services, Arc::new(PluginMetrics::new()));
    let store = wrap(FsResultStore::new(cache.path()).unwrap());
    let platform = LocalPlatform::new(&options, executor, store).unwrap();
    Env { workspace_root: scratch.path().to_path_buf(), _dirs: vec![data, cache, scratch], platform }
}

fn submission(config: Value) -> JobSubmission {
    let request = JobRequest::new("DS_1", config);
    let job_id = identity_of("nap", &request);
    JobSubmission { job_id,
                    owner: "user-1".into(),
                    message: QueueMessage { plugin: "nap".into(),
                                            request: request.normalized().to_value(),
                                            auth_header: AuthTuple::new("Auth-Key", "tok") } }
}

fn read(platform: &LocalPlatform, id: &JobId, name: &str) -> String {
    let mut text = String::new();
    platform.store().open_file(id, name).unwrap().unwrap().read_to_string(&mut text).unwrap();
    text
}

fn wait_until_status(platform: &LocalPlatform, id: &JobId, status: JobStatus) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while platform.get_job(id).unwrap().map(|r| r.status) != Some(status) {
        assert!(Instant::now() < deadline, "job never reached {status:?}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn completed_job_persists_outputs_and_cleans_workspace() {
    let env = env();
    let sub = submission(json!({}));
    let id = sub.job_id;
    assert!(env.platform.submit(QueueLane::Fast, sub).unwrap());

    let record = env.platform.wait_for(&id, Duration::from_secs(5)).unwrap();
    assert_eq!(record.status, JobStatus::Complete);
    assert_eq!(record.owner, "user-1");
    assert_eq!(env.platform.store().list_files(&id).unwrap().unwrap(),
               vec!["input-config", "input-request", "output-data"]);
    assert_eq!(read(&env.platform, &id, "output-data"), "E1.v\na\n");
    let config: Value = serde_json::from_str(&read(&env.platform, &id, "input-config")).unwrap();
    assert_eq!(config["plugin"], json!("nap"));
    assert_eq!(fs::read_dir(&env.workspace_root).unwrap().count(), 0, "workspace directory removed");
    let times = env.platform.job_times(&id).unwrap();
    assert!(times.finished_at.unwrap() >= times.submitted_at);
}

#[test]
fn failed_job_persists_whole_workspace() {
    let env = env();
    let sub = submission(json!({"fail": true}));
    let id = sub.job_id;
    env.platform.submit(QueueLane::Fast, sub).unwrap();

    let record = env.platform.wait_for(&id, Duration::from_secs(5)).unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    let files = env.platform.store().list_files(&id).unwrap().unwrap();
    for name in ["scratch.txt", "nap-input", "input-meta", "exception.log"] {
        assert!(files.iter().any(|f| f == name), "missing {name} in {files:?}");
    }
    assert!(read(&env.platform, &id, "exception.log").contains("wrong side"));
}

#[test]
fn unknown_plugin_fails_with_exception_log() {
    let env = env();
    let mut sub = submission(json!({}));
    sub.message.plugin = "ghost".into();
    let id = sub.job_id;
    env.platform.submit(QueueLane::Slow, sub).unwrap();

    assert_eq!(env.platform.wait_for(&id, Duration::from_secs(5)).unwrap().status, JobStatus::Failed);
    assert!(read(&env.platform, &id, "exception.log").contains("unknown plugin 'ghost'"));
}

#[test]
fn live_duplicate_is_absorbed_and_queue_positions_follow_submission_order() {
    let env = env();
    let blocker = submission(json!({"sleepMs": 300}));
    let blocker_id = blocker.job_id;
    env.platform.submit(QueueLane::Fast, blocker.clone()).unwrap();
    wait_until_status(&env.platform, &blocker_id, JobStatus::InProgress);
    assert!(!env.platform.submit(QueueLane::Fast, blocker).unwrap(), "duplicate absorbed");

    let second = submission(json!({"sleepMs": 1}));
    let third = submission(json!({"sleepMs": 2}));
    let (second_id, third_id) = (second.job_id, third.job_id);
    env.platform.submit(QueueLane::Fast, second).unwrap();
    env.platform.submit(QueueLane::Fast, third).unwrap();

    assert_eq!(env.platform.get_job(&second_id).unwrap().unwrap().queue_position, Some(0));
    assert_eq!(env.platform.get_job(&third_id).unwrap().unwrap().queue_position, Some(1));
    assert_eq!(env.platform.get_job(&blocker_id).unwrap().unwrap().queue_position, None);

    for id in [blocker_id, second_id, third_id] {
        assert_eq!(env.platform.wait_for(&id, Duration::from_secs(5)).unwrap().status, JobStatus::Complete);
    }
    assert_eq!(env.platform.list_jobs().unwrap().len(), 3);
}

#[test]
fn expired_job_can_be_resubmitted_and_deleted() {
    let env = env();
    let sub = submission(json!({}));
    let id = sub.job_id;
    env.platform.submit(QueueLane::Fast, sub.clone()).unwrap();
    env.platform.wait_for(&id, Duration::from_secs(5)).unwrap();

    env.platform.expire_job(&id).unwrap();
    assert_eq!(env.platform.get_job(&id).unwrap().unwrap().status, JobStatus::Expired);
    assert!(env.platform.submit(QueueLane::Fast, sub).unwrap());
    assert_eq!(env.platform.wait_for(&id, Duration::from_secs(5)).unwrap().status, JobStatus::Complete);

    env.platform.delete_job(&id).unwrap();
    assert!(env.platform.get_job(&id).unwrap().is_none());
    assert!(env.platform.store().list_files(&id).unwrap().is_none());
    assert!(env.platform.delete_job(&id).is_err());
}

#[test]
fn failed_store_write_does_not_leave_a_phantom_queued_job() {
    let down = Arc::new(AtomicBool::new(true));
    let flag = down.clone();
    let env = env_with_store(move |inner| Arc::new(FlakyStore { inner, down: flag }) as Arc<dyn ResultStore>);
    let sub = submission(json!({}));
    let id = sub.job_id;

    assert!(matches!(env.platform.submit(QueueLane::Fast, sub.clone()), Err(PlatformError::Unavailable(_))));
    assert!(env.platform.get_job(&id).unwrap().is_none(), "no record left behind");

    down.store(false, Ordering::SeqCst);
    assert!(env.platform.submit(QueueLane::Fast, sub).unwrap(), "resubmission schedules work");
    assert_eq!(env.platform.wait_for(&id, Duration::from_secs(5)).unwrap().status, JobStatus::Complete);
}

#[test]
fn running_job_cannot_be_expired() {
    let env = env();
    let sub = submission(json!({"sleepMs": 200}));
    let id = sub.job_id;
    env.platform.submit(QueueLane::Fast, sub.clone()).unwrap();
    wait_until_status(&env.platform, &id, JobStatus::InProgress);

    assert!(matches!(env.platform.expire_job(&id), Err(PlatformError::NotFinished(_))));
    assert!(!env.platform.submit(QueueLane::Fast, sub).unwrap(), "still absorbed while running");
    assert_eq!(env.platform.wait_for(&id, Duration::from_secs(5)).unwrap().status, JobStatus::Complete);
}

#[test]
fn queued_job_cannot_be_expired() {
    let env = env();
    let blocker = submission(json!({"sleepMs": 200}));
    let blocker_id = blocker.job_id;
    env.platform.submit(QueueLane::Fast, blocker).unwrap();
    wait_until_status(&env.platform, &blocker_id, JobStatus::InProgress);

    let waiting = submission(json!({"sleepMs": 1}));
    let waiting_id = waiting.job_id;
    env.platform.submit(QueueLane::Fast, waiting).unwrap();
    assert_eq!(env.platform.get_job(&waiting_id).unwrap().unwrap().status, JobStatus::Queued);
    assert!(matches!(env.platform.expire_job(&waiting_id), Err(PlatformError::NotFinished(_))));
    assert_eq!(env.platform.wait_for(&waiting_id, Duration::from_secs(5)).unwrap().status, JobStatus::Complete);
}

#[test]
fn expire_then_resubmit_runs_exactly_one_more_execution() {
    let env = env();
    let sub = submission(json!({"sleepMs": 20}));
    let id = sub.job_id;
    env.platform.submit(QueueLane::Fast, sub.clone()).unwrap();
    env.platform.wait_for(&id, Duration::from_secs(5)).unwrap();
    let first_finish = env.platform.job_times(&id).unwrap().finished_at.unwrap();

    env.platform.expire_job(&id).unwrap();
    env.platform.expire_job(&id).unwrap();
    assert!(env.platform.submit(QueueLane::Fast, sub.clone()).unwrap());
    assert!(!env.platform.submit(QueueLane::Fast, sub).unwrap(), "second resubmission absorbed");

    assert_eq!(env.platform.wait_for(&id, Duration::from_secs(5)).unwrap().status, JobStatus::Complete);
    let times = env.platform.job_times(&id).unwrap();
    assert!(times.submitted_at >= first_finish);
    let snapshot = env.platform.executor().metrics().snapshot("nap").unwrap();
    assert_eq!(snapshot.successes, 2);
    assert_eq!(env.platform.list_jobs().unwrap().len(), 1);
}
