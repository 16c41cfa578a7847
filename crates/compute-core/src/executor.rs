//! Driver del ciclo de vida de un intento de ejecución en el worker:
//! preparación de entradas, ejecución del plugin y selección de artefactos a
//! persistir.
//!
//! Un `execute` es un único intento; los reintentos son cosa de la cola. Los
//! fallos de fetch y de plugin nunca salen de aquí: quedan como artefactos de
//! diagnóstico en el workspace y como `ExecutionOutcome::Failure`. Sólo un
//! mensaje que no puede procesarse (plugin desconocido, payload ilegible)
//! produce `ExecutorError`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::context::{ContextParts, MergeClient, PluginExecutionContext};
use crate::errors::{render_error_chain, ExecutorError, FetchError, PluginError};
use crate::identity::JobId;
use crate::metrics::PluginMetrics;
use crate::model::{AuthTuple, JobRequest, QueueMessage};
use crate::registry::{PluginDescriptor, PluginRegistry};
use crate::services::{StudyServices, TabularRequest};
use crate::workspace::reserved::{ERROR_LOG, EXCEPTION_LOG, INPUT_META};
use crate::workspace::{is_reserved, validate_file_name, Workspace, OUTPUT_FILES};

/// Causa de un intento fallido.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    MetadataFetch,
    InvalidStreamSpec,
    TabularFetch,
    PluginExecution,
}

impl FailureKind {
    /// Fallos detectados antes de invocar la lógica del plugin.
    pub fn is_early(self) -> bool {
        !matches!(self, FailureKind::PluginExecution)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success { files: Vec<String> },
    Failure { kind: FailureKind, files: Vec<String> },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// Archivos del workspace seleccionados para persistir.
    pub fn files(&self) -> &[String] {
        match self {
            ExecutionOutcome::Success { files } | ExecutionOutcome::Failure { files, .. } => files,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ExecutionOutcome::Success { .. } => None,
            ExecutionOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}

pub struct PluginExecutor {
    registry: Arc<PluginRegistry>,
    services: StudyServices,
    metrics: Arc<PluginMetrics>,
}

impl PluginExecutor {
    pub fn new(registry: Arc<PluginRegistry>, services: StudyServices, metrics: Arc<PluginMetrics>) -> Self {
        Self { registry, services, metrics }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<PluginMetrics> {
        &self.metrics
    }

    pub fn execute(&self,
                   job_id: &JobId,
                   message: &QueueMessage,
                   workspace: &Workspace)
                   -> Result<ExecutionOutcome, ExecutorError> {
        info!("[job {}] executing job", job_id);
        let descriptor = self.registry
                             .get(&message.plugin)
                             .ok_or_else(|| ExecutorError::UnknownPlugin(message.plugin.clone()))?;
        let tag = format!("[job {} {}]", job_id, descriptor.url_segment);
        debug!("{} loaded plugin descriptor", tag);

        let request = (descriptor.parse_request)(message.request.clone())
            .map_err(|e| ExecutorError::InvalidPayload(e.to_string()))?;

        Ok(self.run_phases(&tag, job_id, descriptor, request, message, workspace))
    }

    fn run_phases(&self,
                  tag: &str,
                  job_id: &JobId,
                  descriptor: &PluginDescriptor,
                  request: JobRequest,
                  message: &QueueMessage,
                  workspace: &Workspace)
                  -> ExecutionOutcome {
        // Preparing: metadata del estudio.
        debug!("{} retrieving study detail for {}", tag, request.study_id);
        let study_detail = match self.fetch_study_detail(&request.study_id, &message.auth_header, workspace) {
            Ok(detail) => detail,
            Err(e) => {
                error!("{} failed to fetch study detail: {}", tag, e);
                return early_failure(tag, workspace, FailureKind::MetadataFetch, Some(render_error_chain(&e)));
            }
        };

        let parts = ContextParts { job_id: Some(*job_id),
                                   plugin: Some(descriptor.url_segment.to_string()),
                                   request: Some(request),
                                   workspace: Some(workspace.clone()),
                                   study_detail: Some(study_detail),
                                   merge_client: Some(MergeClient::new(self.services.merge.clone(),
                                                                       message.auth_header.clone())) };
        let ctx = match PluginExecutionContext::new(parts) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!("{} failed to build reference metadata: {}", tag, e);
                return early_failure(tag, workspace, FailureKind::MetadataFetch, Some(render_error_chain(&e)));
            }
        };

        // Preparing: validación de streams antes de cualquier descarga.
        debug!("{} validating stream specs", tag);
        let specs = match (descriptor.stream_specs)(ctx.request()) {
            Ok(specs) => specs,
            Err(e) => {
                error!("{} could not resolve stream specs: {}", tag, e);
                write_diagnostic(tag, workspace, ERROR_LOG, &render_error_chain(&e));
                return early_failure(tag, workspace, FailureKind::InvalidStreamSpec, None);
            }
        };
        let mut problems = Vec::new();
        for spec in &specs {
            if is_reserved(&spec.stream_name) {
                error!("{} plugin is attempting to download merge data into reserved file \"{}\"",
                       tag, spec.stream_name);
                problems.push(format!("stream name \"{}\" is a reserved file name", spec.stream_name));
            } else if validate_file_name(&spec.stream_name).is_err() {
                error!("{} invalid stream name \"{}\"", tag, spec.stream_name);
                problems.push(format!("stream name \"{}\" is not a valid file name", spec.stream_name));
            }
        }
        if !problems.is_empty() {
            write_diagnostic(tag, workspace, ERROR_LOG, &(problems.join("\n") + "\n"));
            return early_failure(tag, workspace, FailureKind::InvalidStreamSpec, None);
        }

        // Preparing: datos tabulares.
        for spec in &specs {
            debug!("{} retrieving tabular study data: {}", tag, spec.stream_name);
            let treq = TabularRequest::new(ctx.reference_metadata(),
                                           ctx.request().filters(),
                                           ctx.request().derived_variables(),
                                           spec);
            let fetched = ctx.merge_client()
                             .tabular_data(&treq)
                             .map_err(PluginError::from)
                             .and_then(|mut stream| {
                                 workspace.write_stream(&spec.stream_name, &mut stream)
                                          .map_err(PluginError::from)
                             });
            match fetched {
                Ok(bytes) => debug!("{} wrote {} bytes into {}", tag, bytes, spec.stream_name),
                Err(e) => {
                    error!("{} failed to fetch tabular data: {}", tag, e);
                    return early_failure(tag, workspace, FailureKind::TabularFetch, Some(render_error_chain(&e)));
                }
            }
        }

        // Executing.
        debug!("{} running plugin", tag);
        let timer = self.metrics.start_timer(descriptor.url_segment);
        let result = panic::catch_unwind(AssertUnwindSafe(|| (descriptor.execute)(&ctx)));
        let elapsed = timer.observe();

        let failure_text = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(render_error_chain(&e)),
            Err(payload) => Some(format!("plugin panicked: {}\n", panic_message(payload.as_ref()))),
        };

        // Persisting.
        match failure_text {
            None => {
                self.metrics.record_success(descriptor.url_segment);
                info!("{} plugin finished in {:.3}s", tag, elapsed);
                ExecutionOutcome::Success { files: workspace.select_existing(&OUTPUT_FILES) }
            }
            Some(text) => {
                self.metrics.record_failure(descriptor.url_segment);
                error!("{} plugin failed after {:.3}s: {}", tag, elapsed, text.trim_end());
                write_diagnostic(tag, workspace, EXCEPTION_LOG, &text);
                let files = workspace.list_all().unwrap_or_else(|e| {
                                                    warn!("{} could not list workspace: {}", tag, e);
                                                    workspace.select_existing(&OUTPUT_FILES)
                                                });
                ExecutionOutcome::Failure { kind: FailureKind::PluginExecution, files }
            }
        }
    }

    fn fetch_study_detail(&self,
                          study_id: &str,
                          auth: &AuthTuple,
                          workspace: &Workspace)
                          -> Result<serde_json::Value, PluginError> {
        let detail = self.services
                         .metadata
                         .study_detail(study_id, auth)?
                         .ok_or_else(|| FetchError::NotFound(format!("study '{}'", study_id)))?;
        workspace.write_json(INPUT_META, &detail)?;
        Ok(detail)
    }
}

fn early_failure(tag: &str,
                 workspace: &Workspace,
                 kind: FailureKind,
                 exception: Option<String>)
                 -> ExecutionOutcome {
    if let Some(text) = exception {
        write_diagnostic(tag, workspace, EXCEPTION_LOG, &text);
    }
    ExecutionOutcome::Failure { kind, files: workspace.select_existing(&OUTPUT_FILES) }
}

fn write_diagnostic(tag: &str, workspace: &Workspace, name: &str, text: &str) {
    if let Err(e) = workspace.write(name, text) {
        warn!("{} could not write {}: {}", tag, name, e);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
