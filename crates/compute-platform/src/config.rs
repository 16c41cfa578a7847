//! Opciones del servicio cargadas desde variables de entorno.
//!
//! `.env` se carga una sola vez. Los valores mal formados son un error, no un
//! default silencioso.

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::errors::ConfigError;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

pub const DEFAULT_FAST_QUEUE: &str = "fast-jobs";
pub const DEFAULT_SLOW_QUEUE: &str = "slow-jobs";
pub const DEFAULT_WORKERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    pub name: String,
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOptions {
    pub fast_queue: QueueOptions,
    pub slow_queue: QueueOptions,
    pub workspace_root: PathBuf,
    pub job_cache_dir: PathBuf,
    pub subsetting_host: Option<String>,
    pub merge_host: Option<String>,
    pub dataset_access_host: Option<String>,
    pub admin_auth_token: Option<String>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        let tmp = env::temp_dir();
        Self { fast_queue: QueueOptions { name: DEFAULT_FAST_QUEUE.into(), workers: DEFAULT_WORKERS },
               slow_queue: QueueOptions { name: DEFAULT_SLOW_QUEUE.into(), workers: DEFAULT_WORKERS },
               workspace_root: tmp.join("compute-workspaces"),
               job_cache_dir: tmp.join("compute-cache"),
               subsetting_host: None,
               merge_host: None,
               dataset_access_host: None,
               admin_auth_token: None }
    }
}

impl ServiceOptions {
    pub fn from_env() -> Result<Self, ConfigError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de valores arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let workers = |key: &'static str| -> Result<usize, ConfigError> {
            match get(key) {
                None => Ok(DEFAULT_WORKERS),
                Some(v) => {
                    let n: usize = v.parse().map_err(|_| ConfigError::InvalidNumber { key, value: v.clone() })?;
                    if n == 0 {
                        return Err(ConfigError::ZeroWorkers(key));
                    }
                    Ok(n)
                }
            }
        };
        let url = |key: &'static str| -> Result<Option<String>, ConfigError> {
            match get(key) {
                None => Ok(None),
                Some(v) if v.starts_with("http://") || v.starts_with("https://") => {
                    Ok(Some(v.trim_end_matches('/').to_string()))
                }
                Some(v) => Err(ConfigError::InvalidUrl { key, value: v }),
            }
        };

        Ok(Self { fast_queue: QueueOptions { name: get("FAST_QUEUE_NAME").unwrap_or(defaults.fast_queue.name),
                                             workers: workers("FAST_QUEUE_WORKERS")? },
                  slow_queue: QueueOptions { name: get("SLOW_QUEUE_NAME").unwrap_or(defaults.slow_queue.name),
                                             workers: workers("SLOW_QUEUE_WORKERS")? },
                  workspace_root: get("WORKSPACE_ROOT").map(PathBuf::from).unwrap_or(defaults.workspace_root),
                  job_cache_dir: get("JOB_CACHE_DIR").map(PathBuf::from).unwrap_or(defaults.job_cache_dir),
                  subsetting_host: url("EDA_SUBSETTING_HOST")?,
                  merge_host: url("EDA_MERGE_HOST")?,
                  dataset_access_host: url("DATASET_ACCESS_HOST")?,
                  admin_auth_token: get("ADMIN_AUTH_TOKEN") })
    }
}

/// Forzar carga temprana de .env desde los binarios.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
