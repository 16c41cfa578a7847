//! Modelos neutrales del framework (request, job, mensajes de cola, streams).

pub mod job;
pub mod message;
pub mod request;
pub mod stream;

pub use job::{JobRecord, JobStatus, JobStatusView, ResponseStatus};
pub use message::{AuthContext, AuthTuple, JobSubmission, QueueMessage};
pub use request::JobRequest;
pub use stream::{ReferenceMetadata, StreamSpec, StudyAccess};
