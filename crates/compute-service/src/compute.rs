//! Endpoints de cómputo: envío de jobs, atajo a archivos de resultado y
//! listado de plugins.

use std::cell::RefCell;
use std::sync::Arc;

use compute_core::services::{DataStream, JobQueue, ResultStore, StudyServices};
use compute_core::workspace::{OUTPUT_DATA, OUTPUT_META, OUTPUT_STATS};
use compute_core::{identity_of, AuthContext, AuthTuple, FetchError, JobOrchestrator, JobRequest, JobStatusView,
                   PluginOverview, PluginRegistry, ReferenceMetadata, ValidationError};
use log::{debug, info};
use once_cell::unsync::OnceCell;
use serde_json::Value;

use crate::error::ApiError;

pub struct ComputeController<Q: JobQueue> {
    registry: Arc<PluginRegistry>,
    services: StudyServices,
    orchestrator: JobOrchestrator<Q>,
    store: Arc<dyn ResultStore>,
}

impl<Q: JobQueue> ComputeController<Q> {
    pub fn new(registry: Arc<PluginRegistry>, services: StudyServices, queue: Q, store: Arc<dyn ResultStore>) -> Self {
        Self { registry, services, orchestrator: JobOrchestrator::new(queue), store }
    }

    /// `GET /computes`
    pub fn plugin_overview(&self) -> Vec<PluginOverview> {
        self.registry.overview()
    }

    /// `POST /computes/{plugin}?autostart=`
    pub fn submit(&self,
                  segment: &str,
                  body: Value,
                  auth: &AuthContext,
                  autostart: bool)
                  -> Result<JobStatusView, ApiError> {
        let descriptor = self.registry.lookup(segment)?;
        let request = (descriptor.parse_request)(body)?;

        self.require_permissions(&request.study_id, &auth.auth)?;

        if !request.has_config() {
            return Err(ApiError::BadRequest("The request object does not contain a 'config' property value.".into()));
        }

        // La metadata sólo se pide si el validador la usa, y como mucho una vez.
        let fetch_failure: RefCell<Option<FetchError>> = RefCell::new(None);
        let cache: OnceCell<Result<ReferenceMetadata, ValidationError>> = OnceCell::new();
        let supplier = || {
            cache.get_or_init(|| match self.reference_metadata(&request, &auth.auth) {
                     Ok(meta) => Ok(meta),
                     Err(MetadataFailure::Invalid(v)) => Err(v),
                     Err(MetadataFailure::Fetch(f)) => {
                         let err = ValidationError::new(f.to_string());
                         *fetch_failure.borrow_mut() = Some(f);
                         Err(err)
                     }
                 })
                 .clone()
        };
        let verdict = (descriptor.validate_config)(&request, &supplier);
        if let Some(e) = fetch_failure.into_inner() {
            return Err(e.into());
        }
        verdict.map_err(|e| ApiError::BadRequest(e.0))?;

        debug!("request for plugin {} on study {} passed validation", segment, request.study_id);
        Ok(self.orchestrator.submit_or_fetch(descriptor, request, auth, autostart)?)
    }

    /// `POST /computes/{plugin}/{file}`: `file` es `meta`, `tabular` o
    /// `statistics`.
    pub fn result_file(&self, segment: &str, kind: &str, body: Value, auth: &AuthContext) -> Result<DataStream, ApiError> {
        let descriptor = self.registry.lookup(segment)?;
        let request = (descriptor.parse_request)(body)?;
        self.require_permissions(&request.study_id, &auth.auth)?;

        let file_name = match kind {
            "meta" => OUTPUT_META,
            "tabular" => OUTPUT_DATA,
            "statistics" => OUTPUT_STATS,
            _ => return Err(ApiError::NotFound),
        };

        let job_id = identity_of(descriptor.url_segment, &request);
        let job = self.orchestrator.queue().get_job(&job_id)?.ok_or(ApiError::NotFound)?;
        if !job.status.is_finished() {
            return Err(ApiError::Forbidden);
        }
        info!("[job {}] serving {}", job_id, file_name);
        self.store.open_file(&job_id, file_name)?.ok_or(ApiError::NotFound)
    }

    fn require_permissions(&self, study_id: &str, auth: &AuthTuple) -> Result<(), ApiError> {
        match self.services.access.study_access(study_id, auth)? {
            Some(access) if access.allow_visualizations => Ok(()),
            _ => Err(ApiError::Forbidden),
        }
    }

    fn reference_metadata(&self, request: &JobRequest, auth: &AuthTuple) -> Result<ReferenceMetadata, MetadataFailure> {
        let study_id = &request.study_id;
        let detail = self.services
                         .metadata
                         .study_detail(study_id, auth)
                         .map_err(MetadataFailure::Fetch)?
                         .ok_or_else(|| {
                             MetadataFailure::Invalid(ValidationError::new(format!("Invalid study ID: {}", study_id)))
                         })?;
        let derived = if request.derived_variables().is_empty() {
            Vec::new()
        } else {
            self.services
                .merge
                .derived_variable_metadata(study_id, request.derived_variables(), auth)
                .map_err(MetadataFailure::Fetch)?
        };
        Ok(ReferenceMetadata::new(study_id.clone(), detail, derived))
    }
}

enum MetadataFailure {
    Invalid(ValidationError),
    Fetch(FetchError),
}
