//! Endpoints de jobs: estado, listado y descarga de archivos, borrado.

use compute_core::services::{DataStream, JobQueue, ResultStore};
use compute_core::{JobId, JobRecord, JobStatusView};
use log::info;

use crate::error::ApiError;

/// Archivo listo para enviarse como adjunto.
pub struct FileDownload {
    pub file_name: String,
    pub body: DataStream,
}

impl FileDownload {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename={}", self.file_name)
    }
}

pub struct JobsController<Q, S> {
    queue: Q,
    store: S,
}

impl<Q: JobQueue, S: ResultStore> JobsController<Q, S> {
    pub fn new(queue: Q, store: S) -> Self {
        Self { queue, store }
    }

    /// `GET /jobs/{jobId}`
    pub fn get_job(&self, raw_id: &str) -> Result<JobStatusView, ApiError> {
        Ok(self.require_job(raw_id)?.to_view())
    }

    /// `GET /jobs/{jobId}/files`
    pub fn list_files(&self, raw_id: &str) -> Result<Vec<String>, ApiError> {
        let job = self.require_job(raw_id)?;
        Ok(self.store.list_files(&job.job_id)?.unwrap_or_default())
    }

    /// `GET /jobs/{jobId}/files/{fileName}`
    pub fn get_file(&self, raw_id: &str, file_name: &str) -> Result<FileDownload, ApiError> {
        let job = self.require_job(raw_id)?;
        let body = self.store.open_file(&job.job_id, file_name)?.ok_or(ApiError::NotFound)?;
        Ok(FileDownload { file_name: file_name.to_string(), body })
    }

    /// `DELETE /jobs/{jobId}`: sólo el propietario y sólo en estado terminal.
    pub fn delete_job(&self, raw_id: &str, principal: &str) -> Result<(), ApiError> {
        let job = self.require_job(raw_id)?;
        if !(job.is_owned_by(principal) && job.status.is_finished()) {
            return Err(ApiError::Forbidden);
        }
        self.queue.delete_job(&job.job_id)?;
        info!("[job {}] deleted by {}", job.job_id, principal);
        Ok(())
    }

    fn require_job(&self, raw_id: &str) -> Result<JobRecord, ApiError> {
        // Un id mal formado no puede corresponder a ningún job.
        let job_id: JobId = raw_id.parse().map_err(|_| ApiError::NotFound)?;
        self.queue.get_job(&job_id)?.ok_or(ApiError::NotFound)
    }
}
