//! compute-platform: implementaciones de referencia de los colaboradores
//! externos (cola local con pools por carril, store en filesystem, clientes
//! de los servicios de estudio) y opciones del servicio.
pub mod config;
pub mod directory;
pub mod errors;
pub mod http;
pub mod local;
pub mod store;

pub use config::{init_dotenv, QueueOptions, ServiceOptions};
pub use directory::DirectoryStudyService;
pub use errors::ConfigError;
pub use http::HttpStudyClient;
pub use local::{JobTimes, LocalPlatform};
pub use store::FsResultStore;
