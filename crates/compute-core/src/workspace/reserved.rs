//! Nombres de archivo reservados del workspace.

pub const INPUT_META: &str = "input-meta";
pub const INPUT_CONFIG: &str = "input-config";
pub const INPUT_REQUEST: &str = "input-request";
pub const OUTPUT_STATS: &str = "output-stats";
pub const OUTPUT_META: &str = "output-meta";
pub const OUTPUT_DATA: &str = "output-data";
pub const ERROR_LOG: &str = "error.log";
pub const EXCEPTION_LOG: &str = "exception.log";

/// Todos los nombres que un plugin no puede usar como nombre de stream.
pub const RESERVED_FILES: [&str; 8] =
    [INPUT_META, INPUT_CONFIG, INPUT_REQUEST, OUTPUT_STATS, OUTPUT_META, OUTPUT_DATA, ERROR_LOG, EXCEPTION_LOG];

/// Conjunto bien conocido que se persiste tras una ejecución limpia.
pub const OUTPUT_FILES: [&str; 5] = [OUTPUT_STATS, OUTPUT_META, OUTPUT_DATA, ERROR_LOG, EXCEPTION_LOG];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_FILES.contains(&name)
}
