//! Flujo completo: controlador de cómputo -> plataforma local -> executor ->
//! store en disco, con estudios servidos desde un directorio.

use std::fs;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use computeflow::platform::{DirectoryStudyService, FsResultStore, LocalPlatform, QueueOptions, ServiceOptions};
use computeflow::service::{ApiError, ComputeController, JobsController};
use computeflow::services::{ResultStore, StudyServices};
use computeflow::{identity_of, AuthContext, AuthTuple, JobId, JobRequest, JobStatus, Plugin, PluginDescriptor,
                  PluginError, PluginExecutionContext, PluginExecutor, PluginMetrics, PluginRegistry, QueueLane,
                  StreamSpec};
use rayon::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};

static COUNTER_RUNS: AtomicUsize = AtomicUsize::new(0);

/// Cuenta sus ejecuciones; duerme para que las peticiones concurrentes se
/// solapen con el job en curso.
struct Counter;

#[derive(Deserialize)]
struct CounterConfig {
    #[allow(dead_code)]
    tag: String,
}

impl Plugin for Counter {
    type Config = CounterConfig;

    const URL_SEGMENT: &'static str = "counter";
    const DISPLAY_NAME: &'static str = "Counter";
    const DESCRIPTION: &'static str = "counts executions";
    const QUEUE_LANE: QueueLane = QueueLane::Slow;

    fn stream_specs(_config: &CounterConfig) -> Vec<StreamSpec> {
        Vec::new()
    }

    fn execute(ctx: &PluginExecutionContext, _config: &CounterConfig) -> Result<(), PluginError> {
        COUNTER_RUNS.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        ctx.workspace().write_stats_result(&json!({"runs": 1}))?;
        Ok(())
    }
}

struct Broken;

impl Plugin for Broken {
    type Config = Value;

    const URL_SEGMENT: &'static str = "broken";
    const DISPLAY_NAME: &'static str = "Broken";
    const DESCRIPTION: &'static str = "leaves scratch files behind and fails";
    const QUEUE_LANE: QueueLane = QueueLane::Fast;

    fn stream_specs(_config: &Value) -> Vec<StreamSpec> {
        vec![StreamSpec::new("broken-input", "E1")]
    }

    fn execute(ctx: &PluginExecutionContext, _config: &Value) -> Result<(), PluginError> {
        ctx.workspace().write("partial.csv", "1,2\n")?;
        ctx.workspace().write_data_result("half written")?;
        Err(PluginError::msg("solver diverged"))
    }
}

struct Sneaky;

impl Plugin for Sneaky {
    type Config = Value;

    const URL_SEGMENT: &'static str = "sneaky";
    const DISPLAY_NAME: &'static str = "Sneaky";
    const DESCRIPTION: &'static str = "requests a stream named like a framework file";
    const QUEUE_LANE: QueueLane = QueueLane::Fast;

    fn stream_specs(_config: &Value) -> Vec<StreamSpec> {
        vec![StreamSpec::new("output-stats", "E1")]
    }

    fn execute(ctx: &PluginExecutionContext, _config: &Value) -> Result<(), PluginError> {
        ctx.workspace().write_data_result("never")?;
        Ok(())
    }
}

struct Env {
    _dirs: Vec<tempfile::TempDir>,
    platform: LocalPlatform,
    store: Arc<dyn ResultStore>,
    compute: ComputeController<LocalPlatform>,
    jobs: JobsController<LocalPlatform, Arc<dyn ResultStore>>,
}

fn env() -> Env {
    let data = tempfile::tempdir().unwrap();
    let study = data.path().join("DS_1");
    fs::create_dir(&study).unwrap();
    fs::write(study.join("study.json"),
              json!({"id": "DS_1", "rootEntity": {"id": "E1", "variables": [{"id": "v1"}], "children": []}}).to_string())
        .unwrap();
    fs::write(study.join("E1.tsv"), "E1.id\tE1.v1\nr1\tred\nr2\t\nr3\tblue\n").unwrap();
    let cache = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();

    let options = ServiceOptions { fast_queue: QueueOptions { name: "fast-e2e".into(), workers: 2 },
                                   slow_queue: QueueOptions { name: "slow-e2e".into(), workers: 2 },
                                   workspace_root: scratch.path().to_path_buf(),
                                   job_cache_dir: cache.path().to_path_buf(),
                                   ..ServiceOptions::default() };
    let mut descriptors = computeflow::plugins::default_plugins();
    descriptors.extend([PluginDescriptor::of::<Counter>(),
                        PluginDescriptor::of::<Broken>(),
                        PluginDescriptor::of::<Sneaky>()]);
    let registry = Arc::new(PluginRegistry::from_descriptors(descriptors).unwrap());
    let services = StudyServices::from_single(Arc::new(DirectoryStudyService::new(data.path())));
    let store: Arc<dyn ResultStore> = Arc::new(FsResultStore::new(cache.path()).unwrap());
    let executor = PluginExecutor::new(registry.clone(), services.clone(), Arc::new(PluginMetrics::new()));
    let platform = LocalPlatform::new(&options, executor, store.clone()).unwrap();
    let compute = ComputeController::new(registry, services, platform.clone(), store.clone());
    let jobs = JobsController::new(platform.clone(), store.clone());
    Env { _dirs: vec![data, cache, scratch], platform, store, compute, jobs }
}

fn alice() -> AuthContext {
    AuthContext::new("alice", AuthTuple::new("Auth-Key", "alice-token"))
}

fn run_to_end(env: &Env, plugin: &str, body: Value) -> (JobId, JobStatus, Vec<String>) {
    let view = env.compute.submit(plugin, body, &alice(), true).unwrap();
    let record = env.platform.wait_for(&view.job_id, Duration::from_secs(10)).unwrap();
    let files = env.store.list_files(&view.job_id).unwrap().unwrap_or_default();
    (view.job_id, record.status, files)
}

#[test]
fn identity_ignores_omitted_collections_and_key_order() {
    let omitted = JobRequest::from_value(json!({"studyId": "DS_1", "config": null})).unwrap();
    let explicit =
        JobRequest::from_value(json!({"derivedVariables": [], "filters": [], "studyId": "DS_1", "config": null})).unwrap();
    assert_eq!(identity_of("scatterplot", &omitted), identity_of("scatterplot", &explicit));
    assert_ne!(identity_of("scatterplot", &omitted), identity_of("histogram", &omitted));
}

#[test]
fn example_plugin_round_trip_through_the_platform() {
    let env = env();
    let body = json!({"studyId": "DS_1",
                      "config": {"inputVariable": {"entityId": "E1", "variableId": "v1"}, "valueSuffix": "!"}});
    let (job_id, status, files) = run_to_end(&env, "example", body.clone());

    assert_eq!(status, JobStatus::Complete);
    for name in ["output-data", "output-meta", "output-stats"] {
        assert!(files.iter().any(|f| f == name), "{name} not persisted: {files:?}");
    }
    let mut data = String::new();
    env.compute.result_file("example", "tabular", body, &alice()).unwrap().read_to_string(&mut data).unwrap();
    assert_eq!(data, "id\tv1WithSuffix\nr1\tred!\nr2\t\nr3\tblue!\n");

    env.jobs.delete_job(&job_id.to_string(), "alice").unwrap();
    assert!(env.store.list_files(&job_id).unwrap().is_none());
}

#[test]
fn invalid_config_never_reaches_the_queue() {
    let env = env();
    let body = json!({"studyId": "DS_1",
                      "config": {"inputVariable": {"entityId": "E7", "variableId": "v1"}, "valueSuffix": "!"}});
    match env.compute.submit("example", body, &alice(), true) {
        Err(ApiError::BadRequest(msg)) => assert_eq!(msg, "Invalid entity ID : E7"),
        other => panic!("expected a bad request, got {:?}", other.map(|v| v.status)),
    }
}

#[test]
fn concurrent_identical_submissions_execute_once() {
    let env = env();
    let body = json!({"studyId": "DS_1", "config": {"tag": "concurrent"}});
    let ids: Vec<JobId> = (0..16).into_par_iter()
                                 .map(|_| env.compute.submit("counter", body.clone(), &alice(), true).unwrap().job_id)
                                 .collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));

    let record = env.platform.wait_for(&ids[0], Duration::from_secs(10)).unwrap();
    assert_eq!(record.status, JobStatus::Complete);
    // Una vez terminado, reenviar devuelve el estado cacheado sin re-ejecutar.
    env.compute.submit("counter", body, &alice(), true).unwrap();
    assert_eq!(COUNTER_RUNS.load(Ordering::SeqCst), 1);
}

#[test]
fn plugin_failure_persists_the_whole_workspace() {
    let env = env();
    let (_, status, files) = run_to_end(&env, "broken", json!({"studyId": "DS_1", "config": {}}));
    assert_eq!(status, JobStatus::Failed);
    for name in ["broken-input", "partial.csv", "output-data", "exception.log", "input-meta"] {
        assert!(files.iter().any(|f| f == name), "{name} not persisted: {files:?}");
    }
}

#[test]
fn reserved_stream_name_fails_the_job_without_fetching() {
    let env = env();
    let (job_id, status, files) = run_to_end(&env, "sneaky", json!({"studyId": "DS_1", "config": {}}));
    assert_eq!(status, JobStatus::Failed);
    assert!(files.iter().any(|f| f == "error.log"), "{files:?}");
    assert!(!files.iter().any(|f| f == "output-data" || f == "output-stats"), "{files:?}");

    let mut log = String::new();
    env.store.open_file(&job_id, "error.log").unwrap().unwrap().read_to_string(&mut log).unwrap();
    assert!(log.contains("output-stats"));
}
