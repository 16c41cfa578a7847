//! compute-core: identidad de jobs, registro de plugins, workspace y ciclo de
//! vida de ejecución.
pub mod constants;
pub mod context;
pub mod errors;
pub mod executor;
pub mod hashing;
pub mod identity;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod services;
pub mod workspace;

pub use context::{ContextParts, MergeClient, PluginExecutionContext};
pub use errors::{ContextError, ExecutorError, FetchError, PlatformError, PluginError, ProcessError, RegistryError,
                 RequestError, ValidationError, WorkspaceError};
pub use executor::{ExecutionOutcome, FailureKind, PluginExecutor};
pub use identity::{canonical_request_json, identity_of, JobId, JobIdParseError};
pub use metrics::{PluginMetrics, PluginMetricsSnapshot};
pub use model::{AuthContext, AuthTuple, JobRecord, JobRequest, JobStatus, JobStatusView, JobSubmission, QueueMessage,
                ReferenceMetadata, ResponseStatus, StreamSpec, StudyAccess};
pub use orchestrator::JobOrchestrator;
pub use process::ExternalProcessRunner;
pub use registry::{MetadataSupplier, Plugin, PluginDescriptor, PluginOverview, PluginRegistry, QueueLane};
pub use services::{AccessService, DataStream, JobQueue, MergeService, MetadataService, ResultStore, StudyServices,
                   TabularRequest};
pub use workspace::Workspace;
