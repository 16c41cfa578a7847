//! Registro de job (propiedad de la cola externa) y vista de estado expuesta
//! al cliente.

use serde::{Deserialize, Serialize};

use crate::identity::JobId;

/// Estado de un job tal como lo reporta la cola.
///
/// Transiciones esperadas: `Queued -> InProgress -> (Complete | Failed)`;
/// cualquier estado terminal puede pasar a `Expired`, y un job expirado puede
/// volver a `Queued` si se reenvía con autostart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    InProgress,
    Complete,
    Failed,
    Expired,
}

impl JobStatus {
    /// Estados terminales: sólo estos admiten borrado o descarga de archivos.
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed | JobStatus::Expired)
    }
}

/// Valores de estado en el wire (incluye `NOSUCHJOB`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Queued,
    InProgress,
    Complete,
    Failed,
    Expired,
    NoSuchJob,
}

impl From<JobStatus> for ResponseStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued => ResponseStatus::Queued,
            JobStatus::InProgress => ResponseStatus::InProgress,
            JobStatus::Complete => ResponseStatus::Complete,
            JobStatus::Failed => ResponseStatus::Failed,
            JobStatus::Expired => ResponseStatus::Expired,
        }
    }
}

/// Registro de job (sólo lectura para el core).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    pub queue_position: Option<u32>,
    /// Principal que envió el job por primera vez.
    pub owner: String,
}

impl JobRecord {
    pub fn is_owned_by(&self, principal: &str) -> bool {
        self.owner == principal
    }

    pub fn to_view(&self) -> JobStatusView {
        JobStatusView { job_id: self.job_id,
                        status: self.status.into(),
                        queue_position: self.queue_position }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    pub status: ResponseStatus,
    #[serde(rename = "queuePosition", default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
}

impl JobStatusView {
    /// Vista sintética devuelta justo después de encolar; el estado real puede
    /// haber cambiado cuando el cliente la observa.
    pub fn queued(job_id: JobId) -> Self {
        Self { job_id, status: ResponseStatus::Queued, queue_position: None }
    }

    pub fn no_such_job(job_id: JobId) -> Self {
        Self { job_id, status: ResponseStatus::NoSuchJob, queue_position: None }
    }
}
