//! Constantes del framework.
//!
//! Valores estáticos que participan en el cálculo de identidades de job y en
//! la instrumentación de plugins. `IDENTITY_BYTES` forma parte del contrato
//! observable: cambiarlo invalida todas las identidades ya persistidas.

/// Ancho (en bytes) del digest que identifica un job (128 bits).
pub const IDENTITY_BYTES: usize = 16;

/// Longitud de la representación hexadecimal de una identidad.
pub const IDENTITY_HEX_LEN: usize = IDENTITY_BYTES * 2;

/// Buckets (segundos) del histograma de tiempo de ejecución por plugin.
pub const EXEC_TIME_BUCKETS: [f64; 14] = [0.1, 0.5, 1.0, 1.5, 3.0, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0, 180.0, 300.0, 3000.0];
