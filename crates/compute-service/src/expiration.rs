//! Expiración manual de jobs (endpoint de administración).

use std::io::Read;

use compute_core::services::{JobQueue, ResultStore};
use compute_core::workspace::reserved::INPUT_CONFIG;
use compute_core::{JobId, JobStatus, PlatformError, QueueMessage};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiredJobs {
    pub num_jobs_expired: usize,
}

/// Criterios opcionales de la petición de expiración.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpirationFilter<'a> {
    pub job_id: Option<&'a str>,
    pub study_id: Option<&'a str>,
    pub plugin_name: Option<&'a str>,
}

pub struct ExpirationController<Q, S> {
    queue: Q,
    store: S,
    admin_token: Option<String>,
}

impl<Q: JobQueue, S: ResultStore> ExpirationController<Q, S> {
    pub fn new(queue: Q, store: S, admin_token: Option<String>) -> Self {
        Self { queue, store, admin_token }
    }

    /// `GET /expire-compute-jobs`. Sin filtros expira todos los jobs vivos.
    pub fn expire(&self, filter: ExpirationFilter<'_>, admin_token: Option<&str>) -> Result<ExpiredJobs, ApiError> {
        match (self.admin_token.as_deref(), admin_token) {
            (Some(expected), Some(given)) if expected == given => {}
            _ => return Err(ApiError::Forbidden),
        }
        if filter.job_id.is_some() && (filter.study_id.is_some() || filter.plugin_name.is_some()) {
            return Err(ApiError::BadRequest("If job-id param is specified, study-id and plugin-name are not allowed."
                                                .into()));
        }

        let candidates = self.queue.list_jobs()?;
        let targets: Vec<JobId> = candidates.par_iter()
                                            .filter(|job| job.status != JobStatus::Expired)
                                            .filter(|job| self.matches(&job.job_id, &filter))
                                            .map(|job| job.job_id)
                                            .collect();

        let mut expired = 0;
        for id in &targets {
            match self.queue.expire_job(id) {
                Ok(()) => expired += 1,
                Err(PlatformError::NotFinished(_)) => debug!("[job {}] still running, left alone", id),
                Err(e) => error!("[job {}] unable to expire: {}", id, e),
            }
        }
        info!("expired {} jobs (jobId = {:?}, studyId = {:?}, pluginName = {:?})",
              expired, filter.job_id, filter.study_id, filter.plugin_name);
        Ok(ExpiredJobs { num_jobs_expired: expired })
    }

    fn matches(&self, job_id: &JobId, filter: &ExpirationFilter<'_>) -> bool {
        if let Some(wanted) = filter.job_id {
            return job_id.to_string() == wanted;
        }
        if filter.study_id.is_none() && filter.plugin_name.is_none() {
            return true;
        }
        let config = match self.store.open_file(job_id, INPUT_CONFIG) {
            Ok(Some(stream)) => stream,
            Ok(None) => {
                warn!("[job {}] could not find job config file in non-expired job", job_id);
                return false;
            }
            Err(e) => {
                error!("[job {}] could not open job config file: {}", job_id, e);
                return true;
            }
        };
        match read_message(config) {
            Some(message) => {
                let study = message.request.get("studyId").and_then(|v| v.as_str());
                let plugin_ok = filter.plugin_name.map_or(true, |p| p == message.plugin);
                let study_ok = filter.study_id.map_or(true, |s| Some(s) == study);
                plugin_ok && study_ok
            }
            None => {
                error!("[job {}] could not parse job config file", job_id);
                true
            }
        }
    }
}

fn read_message(mut stream: impl Read) -> Option<QueueMessage> {
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).ok()?;
    serde_json::from_slice(&bytes).ok()
}
