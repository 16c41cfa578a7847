//! Decisión de envío: dedup por identidad contra la cola y (re)encolado.

use log::{debug, info};

use crate::errors::PlatformError;
use crate::identity::identity_of;
use crate::model::{AuthContext, JobRequest, JobStatus, JobStatusView, JobSubmission, QueueMessage};
use crate::registry::PluginDescriptor;
use crate::services::JobQueue;

pub struct JobOrchestrator<Q: JobQueue> {
    queue: Q,
}

impl<Q: JobQueue> JobOrchestrator<Q> {
    pub fn new(queue: Q) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Devuelve el estado del job existente o, con `autostart`, lo encola.
    ///
    /// El chequeo y el encolado no son atómicos: dos envíos simultáneos
    /// pueden llegar ambos a `submit`, y es la cola quien absorbe el
    /// duplicado.
    pub fn submit_or_fetch(&self,
                           descriptor: &PluginDescriptor,
                           request: JobRequest,
                           auth: &AuthContext,
                           autostart: bool)
                           -> Result<JobStatusView, PlatformError> {
        let job_id = identity_of(descriptor.url_segment, &request);

        if let Some(existing) = self.queue.get_job(&job_id)? {
            if existing.status != JobStatus::Expired || !autostart {
                debug!("[job {}] found existing job with status {:?}", job_id, existing.status);
                return Ok(existing.to_view());
            }
        }

        if !autostart {
            return Ok(JobStatusView::no_such_job(job_id));
        }

        info!("[job {}] submitting job to the {:?} queue", job_id, descriptor.queue_lane);
        let message = QueueMessage { plugin: descriptor.url_segment.to_string(),
                                     request: request.normalized().to_value(),
                                     auth_header: auth.auth.clone() };
        let accepted = self.queue.submit(descriptor.queue_lane,
                                         JobSubmission { job_id, owner: auth.principal.clone(), message })?;
        if !accepted {
            debug!("[job {}] queue absorbed duplicate submission", job_id);
        }
        Ok(JobStatusView::queued(job_id))
    }
}
