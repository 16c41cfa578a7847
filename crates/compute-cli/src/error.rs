use compute_core::{JobIdParseError, PlatformError, RegistryError, RequestError};
use compute_platform::ConfigError;
use compute_service::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("could not read '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    JobId(#[from] JobIdParseError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("request rejected: {0}")]
    Api(#[from] ApiError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("job {0} finished with status {1}")]
    JobFailed(String, String),
    #[error("no results for job {0}")]
    NoResults(String),
}

impl CliError {
    /// 4: recurso inexistente o rechazado; 5: fallo interno; 1: el job falló.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::JobFailed(..) => 1,
            CliError::Registry(_) | CliError::JobId(_) | CliError::NoResults(_) => 4,
            CliError::Platform(PlatformError::NotFound(_)) => 4,
            CliError::Api(e) if e.status_code() < 500 => 4,
            CliError::ReadFile { .. } | CliError::Json(_) | CliError::Request(_) => 2,
            _ => 5,
        }
    }
}
