//! Errores del core.
//!
//! Cada familia corresponde a un colaborador o fase del ciclo de vida de un
//! job. Los errores de plugin y de fetch nunca cruzan la frontera del
//! `PluginExecutor`: se convierten en artefactos de diagnóstico.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Errores al operar sobre el workspace de un job.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid workspace file name: {0:?}")]
    InvalidName(String),
    #[error("workspace io error on '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl WorkspaceError {
    pub(crate) fn io(name: impl Into<String>, source: io::Error) -> Self {
        Self::Io { name: name.into(), source }
    }
}

/// Errores del lanzador de procesos externos.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("could not redirect output of '{command}' into '{file}': {source}")]
    Redirect {
        command: String,
        file: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed waiting for '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("process '{command}' was terminated by a signal")]
    Terminated { command: String },
}

/// Errores de los servicios remotos de metadata / datos tabulares.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream responded {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode upstream response: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Fallo al construir el contexto de ejecución de un plugin.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("{0} must not be null")]
    MissingField(&'static str),
    #[error("could not build reference metadata: {0}")]
    Metadata(#[from] FetchError),
}

/// Cuerpo de request que no corresponde al tipo esperado por el plugin.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed compute request: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("invalid plugin config: {0}")]
    InvalidConfig(#[source] serde_json::Error),
}

/// Rechazo semántico de una configuración antes de encolar.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no plugin registered under '{0}'")]
    NotFound(String),
    #[error("plugin '{0}' registered twice")]
    Duplicate(String),
}

/// Fallos que la lógica de un plugin puede reportar.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("'{command}' exited with status {code}")]
    ExitStatus { command: String, code: i32 },
    #[error("{0}")]
    Failed(String),
}

impl PluginError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errores fatales del executor: reintentar el mismo mensaje no sirve.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),
    #[error("undecodable job payload: {0}")]
    InvalidPayload(String),
}

/// Errores de los colaboradores de plataforma (cola de jobs y store).
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("platform io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("platform unavailable: {0}")]
    Unavailable(String),
    #[error("job {0} has not finished yet")]
    NotFinished(String),
}

/// Renderiza un error con su cadena de causas, una por línea. Es el texto que
/// termina en `exception.log`.
pub fn render_error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut cause = err.source();
    while let Some(c) = cause {
        out.push_str("\ncaused by: ");
        out.push_str(&c.to_string());
        cause = c.source();
    }
    out.push('\n');
    out
}
