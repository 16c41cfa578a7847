//! Errores de configuración de la plataforma.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    ZeroWorkers(&'static str),
    #[error("{key} must be an http(s) url, got '{value}'")]
    InvalidUrl { key: &'static str, value: String },
}
