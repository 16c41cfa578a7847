//! Contratos de los colaboradores externos: servicios de estudio (metadata,
//! datos tabulares, permisos), cola de jobs y store de resultados.
//!
//! Todos son `Send + Sync`: se comparten entre los hilos de los pools de
//! trabajo detrás de un `Arc`.

use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FetchError, PlatformError};
use crate::identity::JobId;
use crate::model::{AuthTuple, JobRecord, JobSubmission, ReferenceMetadata, StreamSpec, StudyAccess};
use crate::registry::QueueLane;
use crate::workspace::Workspace;

/// Stream de bytes devuelto por un colaborador.
pub type DataStream = Box<dyn Read + Send>;

/// Detalle de estudios (entidades y variables).
pub trait MetadataService: Send + Sync {
    /// `Ok(None)` si el estudio no existe.
    fn study_detail(&self, study_id: &str, auth: &AuthTuple) -> Result<Option<Value>, FetchError>;
}

/// Permisos de un principal sobre los estudios.
pub trait AccessService: Send + Sync {
    /// `Ok(None)` si no hay registro de permisos para ese estudio.
    fn study_access(&self, study_id: &str, auth: &AuthTuple) -> Result<Option<StudyAccess>, FetchError>;
}

/// Request de datos tabulares enviado al servicio de merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularRequest {
    pub study_id: String,
    pub filters: Vec<Value>,
    pub derived_variables: Vec<Value>,
    pub output_entity_id: String,
    pub output_variables: Vec<Value>,
}

impl TabularRequest {
    /// Arma el request de un stream: filtros y variables derivadas del job,
    /// entidad y variables de salida del `StreamSpec`.
    pub fn new(metadata: &ReferenceMetadata, filters: &[Value], derived: &[Value], spec: &StreamSpec) -> Self {
        Self { study_id: metadata.study_id.clone(),
               filters: filters.to_vec(),
               derived_variables: derived.to_vec(),
               output_entity_id: spec.entity_id.clone(),
               output_variables: spec.variables.clone() }
    }
}

/// Servicio de merge: metadata de variables derivadas y streams tabulares.
pub trait MergeService: Send + Sync {
    /// Metadata de las variables derivadas del request, en el mismo orden.
    fn derived_variable_metadata(&self,
                                 study_id: &str,
                                 derived_variables: &[Value],
                                 auth: &AuthTuple)
                                 -> Result<Vec<Value>, FetchError>;

    /// Stream TSV con cabecera en notación `entidad.variable`.
    fn tabular_data(&self, request: &TabularRequest, auth: &AuthTuple) -> Result<DataStream, FetchError>;
}

/// Cola durable de jobs (plataforma externa).
///
/// Es la dueña de los `JobRecord`: el core sólo los lee y decide si encolar.
pub trait JobQueue: Send + Sync {
    /// `Ok(None)` si nunca se envió un job con esa identidad (o se borró).
    fn get_job(&self, job_id: &JobId) -> Result<Option<JobRecord>, PlatformError>;

    /// Devuelve `false` si la cola absorbió el envío (ya había un job vivo con
    /// esa identidad).
    fn submit(&self, lane: QueueLane, submission: JobSubmission) -> Result<bool, PlatformError>;

    /// Borra el registro y los archivos persistidos del job.
    fn delete_job(&self, job_id: &JobId) -> Result<(), PlatformError>;

    /// Marca como expirado un job terminado; un reenvío con autostart lo
    /// vuelve a ejecutar.
    fn expire_job(&self, job_id: &JobId) -> Result<(), PlatformError>;

    /// Todos los jobs conocidos, en orden de envío.
    fn list_jobs(&self) -> Result<Vec<JobRecord>, PlatformError>;
}

/// Store durable de artefactos de jobs.
pub trait ResultStore: Send + Sync {
    /// Copia `files` del workspace y devuelve los nombres persistidos.
    fn persist(&self, job_id: &JobId, workspace: &Workspace, files: &[String]) -> Result<Vec<String>, PlatformError>;

    /// `Ok(None)` si no hay nada persistido para ese job.
    fn list_files(&self, job_id: &JobId) -> Result<Option<Vec<String>>, PlatformError>;

    /// `Ok(None)` si el archivo no fue persistido.
    fn open_file(&self, job_id: &JobId, name: &str) -> Result<Option<DataStream>, PlatformError>;

    /// Escribe (o reemplaza) un archivo suelto del job.
    fn put_file(&self, job_id: &JobId, name: &str, data: &[u8]) -> Result<(), PlatformError>;

    /// Elimina todo lo persistido del job; no falla si no había nada.
    fn delete(&self, job_id: &JobId) -> Result<(), PlatformError>;
}

impl<T: MetadataService + ?Sized> MetadataService for Arc<T> {
    fn study_detail(&self, study_id: &str, auth: &AuthTuple) -> Result<Option<Value>, FetchError> {
        (**self).study_detail(study_id, auth)
    }
}

impl<T: AccessService + ?Sized> AccessService for Arc<T> {
    fn study_access(&self, study_id: &str, auth: &AuthTuple) -> Result<Option<StudyAccess>, FetchError> {
        (**self).study_access(study_id, auth)
    }
}

impl<T: MergeService + ?Sized> MergeService for Arc<T> {
    fn derived_variable_metadata(&self,
                                 study_id: &str,
                                 derived_variables: &[Value],
                                 auth: &AuthTuple)
                                 -> Result<Vec<Value>, FetchError> {
        (**self).derived_variable_metadata(study_id, derived_variables, auth)
    }

    fn tabular_data(&self, request: &TabularRequest, auth: &AuthTuple) -> Result<DataStream, FetchError> {
        (**self).tabular_data(request, auth)
    }
}

impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    fn get_job(&self, job_id: &JobId) -> Result<Option<JobRecord>, PlatformError> {
        (**self).get_job(job_id)
    }

    fn submit(&self, lane: QueueLane, submission: JobSubmission) -> Result<bool, PlatformError> {
        (**self).submit(lane, submission)
    }

    fn delete_job(&self, job_id: &JobId) -> Result<(), PlatformError> {
        (**self).delete_job(job_id)
    }

    fn expire_job(&self, job_id: &JobId) -> Result<(), PlatformError> {
        (**self).expire_job(job_id)
    }

    fn list_jobs(&self) -> Result<Vec<JobRecord>, PlatformError> {
        (**self).list_jobs()
    }
}

impl<T: ResultStore + ?Sized> ResultStore for Arc<T> {
    fn persist(&self, job_id: &JobId, workspace: &Workspace, files: &[String]) -> Result<Vec<String>, PlatformError> {
        (**self).persist(job_id, workspace, files)
    }

    fn list_files(&self, job_id: &JobId) -> Result<Option<Vec<String>>, PlatformError> {
        (**self).list_files(job_id)
    }

    fn open_file(&self, job_id: &JobId, name: &str) -> Result<Option<DataStream>, PlatformError> {
        (**self).open_file(job_id, name)
    }

    fn put_file(&self, job_id: &JobId, name: &str, data: &[u8]) -> Result<(), PlatformError> {
        (**self).put_file(job_id, name, data)
    }

    fn delete(&self, job_id: &JobId) -> Result<(), PlatformError> {
        (**self).delete(job_id)
    }
}

/// Conjunto de servicios de estudio que necesitan el executor y el
/// controlador de cómputo.
#[derive(Clone)]
pub struct StudyServices {
    pub metadata: Arc<dyn MetadataService>,
    pub merge: Arc<dyn MergeService>,
    pub access: Arc<dyn AccessService>,
}

impl StudyServices {
    /// Un colaborador distinto por contrato.
    pub fn new(metadata: Arc<dyn MetadataService>, merge: Arc<dyn MergeService>, access: Arc<dyn AccessService>) -> Self {
        Self { metadata, merge, access }
    }

    /// Los tres contratos servidos por un único valor.
    pub fn from_single<S>(service: Arc<S>) -> Self
        where S: MetadataService + MergeService + AccessService + 'static
    {
        Self { metadata: service.clone(), merge: service.clone(), access: service }
    }
}
