//! Contexto de ejecución de un plugin.
//!
//! Se construye una sola vez por intento de ejecución con todos sus campos.
//! La metadata de referencia (detalle del estudio + variables derivadas) se
//! calcula en la construcción y luego es inmutable.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{ContextError, FetchError, RequestError};
use crate::identity::JobId;
use crate::model::{AuthTuple, JobRequest, ReferenceMetadata};
use crate::process::ExternalProcessRunner;
use crate::services::{DataStream, MergeService, TabularRequest};
use crate::workspace::Workspace;

/// Cliente del servicio de merge ligado a las credenciales del llamador.
#[derive(Clone)]
pub struct MergeClient {
    service: Arc<dyn MergeService>,
    auth: AuthTuple,
}

impl MergeClient {
    /// Liga `service` a las credenciales `auth` del mensaje del job.
    pub fn new(service: Arc<dyn MergeService>, auth: AuthTuple) -> Self {
        Self { service, auth }
    }

    /// Credenciales con las que se hacen todas las llamadas.
    pub fn auth(&self) -> &AuthTuple {
        &self.auth
    }

    pub fn derived_variable_metadata(&self, study_id: &str, derived: &[Value]) -> Result<Vec<Value>, FetchError> {
        self.service.derived_variable_metadata(study_id, derived, &self.auth)
    }

    pub fn tabular_data(&self, request: &TabularRequest) -> Result<DataStream, FetchError> {
        self.service.tabular_data(request, &self.auth)
    }
}

/// Piezas del contexto. Todas son obligatorias; `PluginExecutionContext::new`
/// falla nombrando la primera que falte.
#[derive(Default)]
pub struct ContextParts {
    pub job_id: Option<JobId>,
    pub plugin: Option<String>,
    pub request: Option<JobRequest>,
    pub workspace: Option<Workspace>,
    pub study_detail: Option<Value>,
    pub merge_client: Option<MergeClient>,
}

/// Todo lo que un plugin ve durante su ejecución. No se persiste.
pub struct PluginExecutionContext {
    job_id: JobId,
    plugin: String,
    request: JobRequest,
    workspace: Workspace,
    reference_metadata: ReferenceMetadata,
    merge_client: MergeClient,
}

impl PluginExecutionContext {
    /// Valida que estén todas las piezas y calcula la metadata de referencia.
    ///
    /// Las variables derivadas sólo se consultan al servicio de merge si el
    /// request trae alguna. Un fallo de esa consulta es `ContextError::Metadata`.
    pub fn new(parts: ContextParts) -> Result<Self, ContextError> {
        let job_id = parts.job_id.ok_or(ContextError::MissingField("jobId"))?;
        let plugin = parts.plugin.ok_or(ContextError::MissingField("plugin"))?;
        let request = parts.request.ok_or(ContextError::MissingField("request"))?;
        let workspace = parts.workspace.ok_or(ContextError::MissingField("workspace"))?;
        let study_detail = parts.study_detail.ok_or(ContextError::MissingField("studyDetail"))?;
        let merge_client = parts.merge_client.ok_or(ContextError::MissingField("mergeClient"))?;

        let derived = if request.derived_variables().is_empty() {
            Vec::new()
        } else {
            merge_client.derived_variable_metadata(&request.study_id, request.derived_variables())?
        };
        let reference_metadata = ReferenceMetadata::new(request.study_id.clone(), study_detail, derived);

        Ok(Self { job_id,
                  plugin,
                  request,
                  workspace,
                  reference_metadata,
                  merge_client })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn request(&self) -> &JobRequest {
        &self.request
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Detalle del estudio + metadata de variables derivadas.
    pub fn reference_metadata(&self) -> &ReferenceMetadata {
        &self.reference_metadata
    }

    pub fn merge_client(&self) -> &MergeClient {
        &self.merge_client
    }

    /// Config del request decodificado al tipo del plugin.
    pub fn config_as<C: DeserializeOwned>(&self) -> Result<C, RequestError> {
        self.request.config_as()
    }

    /// Runner de procesos con el workspace como directorio de trabajo.
    pub fn process(&self, command: impl Into<String>) -> ExternalProcessRunner {
        ExternalProcessRunner::new(command, &self.workspace)
    }

    /// Prefijo de log del job.
    pub fn log_tag(&self) -> String {
        format!("[job {} {}]", self.job_id, self.plugin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingMerge {
        calls: AtomicUsize,
    }

    impl MergeService for CountingMerge {
        fn derived_variable_metadata(&self, _study: &str, derived: &[Value], _auth: &AuthTuple) -> Result<Vec<Value>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(derived.iter().map(|d| json!({"id": d, "entityId": "E1"})).collect())
        }

        fn tabular_data(&self, _request: &TabularRequest, _auth: &AuthTuple) -> Result<DataStream, FetchError> {
            Err(FetchError::NotFound("no data".into()))
        }
    }

    fn parts(dir: &tempfile::TempDir, merge: Arc<CountingMerge>, request: JobRequest) -> ContextParts {
        ContextParts { job_id: Some(JobId::from_bytes([1; 16])),
                       plugin: Some("example".into()),
                       request: Some(request),
                       workspace: Some(Workspace::open(dir.path()).unwrap()),
                       study_detail: Some(json!({"id": "DS_1"})),
                       merge_client: Some(MergeClient::new(merge, AuthTuple::new("Auth-Key", "tok"))) }
    }

    #[test]
    fn missing_field_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let mut p = parts(&dir, Arc::default(), JobRequest::new("DS_1", json!({})));
        p.workspace = None;
        let err = PluginExecutionContext::new(p).err().unwrap();
        assert_eq!(err.to_string(), "workspace must not be null");

        let err = PluginExecutionContext::new(ContextParts::default()).err().unwrap();
        assert!(matches!(err, ContextError::MissingField("jobId")));
    }

    #[test]
    fn derived_variable_metadata_fetched_once_and_only_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let merge = Arc::new(CountingMerge::default());
        let ctx = PluginExecutionContext::new(parts(&dir, merge.clone(), JobRequest::new("DS_1", json!({})))).unwrap();
        assert!(ctx.reference_metadata().derived_variables.is_empty());
        assert_eq!(merge.calls.load(Ordering::SeqCst), 0);

        let req = JobRequest::new("DS_1", json!({})).with_derived_variables(vec![json!("dv1")]);
        let ctx = PluginExecutionContext::new(parts(&dir, merge.clone(), req)).unwrap();
        assert_eq!(ctx.reference_metadata().derived_variables.len(), 1);
        let _ = ctx.reference_metadata();
        assert_eq!(merge.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.log_tag(), format!("[job {} example]", ctx.job_id()));
    }
}
