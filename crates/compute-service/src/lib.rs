//! compute-service: controladores de la superficie HTTP, independientes del
//! transporte. Cada operación devuelve `Result<_, ApiError>`; el servidor que
//! los monte sólo traduce `ApiError::status_code()`.
pub mod compute;
pub mod error;
pub mod expiration;
pub mod jobs;

pub use compute::ComputeController;
pub use error::ApiError;
pub use expiration::{ExpirationController, ExpirationFilter, ExpiredJobs};
pub use jobs::{FileDownload, JobsController};
