//! computeflow: ejecución de jobs de cómputo direccionados por contenido.
//!
//! Este crate es la fachada del workspace:
//! - Re-exporta el núcleo (`compute_core`): identidad de jobs, registro de
//!   plugins, workspace, executor y orquestador.
//! - Expone las implementaciones de referencia (`platform`), los
//!   controladores de la API (`service`) y los plugins concretos (`plugins`).

pub use compute_core::*;
pub use compute_platform as platform;
pub use compute_plugins as plugins;
pub use compute_service as service;
