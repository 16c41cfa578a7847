use std::io::Cursor;
use std::sync::Arc;

use compute_core::services::{AccessService, DataStream, MergeService, MetadataService, StudyServices, TabularRequest};
use compute_core::{AuthTuple, ExecutionOutcome, FailureKind, FetchError, JobId, PluginExecutor, PluginMetrics,
                   QueueMessage, StudyAccess, Workspace};
use compute_plugins::{default_registry, ExampleStats};
use serde_json::{json, Value};

struct TsvStudy {
    tsv: &'static str,
}

impl MetadataService for TsvStudy {
    fn study_detail(&self, study_id: &str, _auth: &AuthTuple) -> Result<Option<Value>, FetchError> {
        Ok(Some(json!({"id": study_id, "rootEntity": {"id": "E1", "variables": [{"id": "v1"}]}})))
    }
}

impl MergeService for TsvStudy {
    fn derived_variable_metadata(&self, _s: &str, d: &[Value], _a: &AuthTuple) -> Result<Vec<Value>, FetchError> {
        Ok(d.to_vec())
    }

    fn tabular_data(&self, _request: &TabularRequest, _auth: &AuthTuple) -> Result<DataStream, FetchError> {
        Ok(Box::new(Cursor::new(self.tsv.as_bytes().to_vec())))
    }
}

impl AccessService for TsvStudy {
    fn study_access(&self, _s: &str, _a: &AuthTuple) -> Result<Option<StudyAccess>, FetchError> {
        Ok(Some(StudyAccess { allow_visualizations: true }))
    }
}

fn run(plugin: &str, config: Value, tsv: &'static str) -> (tempfile::TempDir, Workspace, ExecutionOutcome) {
    let executor = PluginExecutor::new(Arc::new(default_registry().unwrap()),
                                       StudyServices::from_single(Arc::new(TsvStudy { tsv })),
                                       Arc::new(PluginMetrics::new()));
    let dir = tempfile::tempdir().unwrap();
    let ws = Workspace::open(dir.path()).unwrap();
    let message = QueueMessage { plugin: plugin.into(),
                                 request: json!({"studyId": "DS_1", "config": config}),
                                 auth_header: AuthTuple::new("Auth-Key", "tok") };
    let outcome = executor.execute(&JobId::from_bytes([9; 16]), &message, &ws).unwrap();
    (dir, ws, outcome)
}

#[test]
fn example_plugin_writes_all_three_results() {
    let config = json!({"inputVariable": {"entityId": "E1", "variableId": "v1"}, "valueSuffix": "_x"});
    let (_dir, ws, outcome) = run("example", config, "E1.id\tE1.v1\nr1\ta\nr2\t\nr3\tb\n");

    assert_eq!(outcome,
               ExecutionOutcome::Success { files: vec!["output-stats".into(), "output-meta".into(), "output-data".into()] });
    assert_eq!(ws.read_to_string("output-data").unwrap(), "id\tv1WithSuffix\nr1\ta_x\nr2\t\nr3\tb_x\n");
    let stats: ExampleStats = serde_json::from_str(&ws.read_to_string("output-stats").unwrap()).unwrap();
    assert_eq!(stats.num_empty_values, 1);
    let meta: Value = serde_json::from_str(&ws.read_to_string("output-meta").unwrap()).unwrap();
    assert_eq!(meta["variables"][0]["variableSpec"]["variableId"], "v1WithSuffix");
}

#[test]
fn example_plugin_fails_on_empty_stream() {
    let config = json!({"inputVariable": {"entityId": "E1", "variableId": "v1"}, "valueSuffix": "_x"});
    let (_dir, ws, outcome) = run("example", config, "");
    assert_eq!(outcome.failure_kind(), Some(FailureKind::PluginExecution));
    assert!(ws.read_to_string("exception.log").unwrap().contains("'example-input' is empty"));
}

#[cfg(unix)]
#[test]
fn sort_plugin_keeps_header_first() {
    let (_dir, ws, outcome) = run("sort", json!({"entityId": "E1"}), "E1.v1\ncherry\napple\nbanana\n");
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(ws.read_to_string("output-data").unwrap(), "E1.v1\napple\nbanana\ncherry\n");

    let (_dir, ws, _) = run("sort", json!({"entityId": "E1", "reverse": true}), "E1.v1\ncherry\napple\nbanana\n");
    assert_eq!(ws.read_to_string("output-data").unwrap(), "E1.v1\ncherry\nbanana\napple\n");
}
