//! Registro de plugins.
//!
//! Cada plugin se describe con un `PluginDescriptor`: metadatos estáticos y
//! una tabla de punteros a función (parseo de request, validación de config,
//! streams requeridos, ejecución). El registro se construye una vez al
//! arrancar a partir de una lista explícita y después sólo se lee.

use std::fmt;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::PluginExecutionContext;
use crate::errors::{PluginError, RegistryError, RequestError, ValidationError};
use crate::model::{JobRequest, ReferenceMetadata, StreamSpec};

/// Pool de trabajo al que se envían los jobs de un plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueLane {
    Fast,
    Slow,
}

/// Proveedor perezoso de metadata de referencia para los validadores. Sólo
/// se invoca si la validación realmente la necesita.
pub type MetadataSupplier<'a> = &'a dyn Fn() -> Result<ReferenceMetadata, ValidationError>;

pub type ParseRequestFn = fn(Value) -> Result<JobRequest, RequestError>;
pub type ValidateConfigFn = fn(&JobRequest, MetadataSupplier<'_>) -> Result<(), ValidationError>;
pub type StreamSpecsFn = fn(&JobRequest) -> Result<Vec<StreamSpec>, PluginError>;
pub type ExecuteFn = fn(&PluginExecutionContext) -> Result<(), PluginError>;

/// Metadatos y tabla de funciones de un plugin registrado.
#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    /// Identificador público del plugin; forma parte de la identidad del job.
    pub url_segment: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub queue_lane: QueueLane,
    /// Decodifica el body; un config de otro tipo es `RequestError::InvalidConfig`.
    pub parse_request: ParseRequestFn,
    pub validate_config: ValidateConfigFn,
    /// Streams a descargar antes de ejecutar.
    pub stream_specs: StreamSpecsFn,
    pub execute: ExecuteFn,
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
         .field("url_segment", &self.url_segment)
         .field("queue_lane", &self.queue_lane)
         .finish_non_exhaustive()
    }
}

/// Plugin con configuración tipada. `PluginDescriptor::of::<P>()` genera la
/// tabla de funciones a partir de estas funciones asociadas.
pub trait Plugin: 'static {
    type Config: DeserializeOwned;

    const URL_SEGMENT: &'static str;
    const DISPLAY_NAME: &'static str;
    const DESCRIPTION: &'static str;
    const QUEUE_LANE: QueueLane;

    /// Validación semántica previa al encolado.
    fn validate(_config: &Self::Config,
                _request: &JobRequest,
                _metadata: MetadataSupplier<'_>)
                -> Result<(), ValidationError> {
        Ok(())
    }

    /// Streams tabulares que el plugin necesita en su workspace.
    fn stream_specs(config: &Self::Config) -> Vec<StreamSpec>;

    fn execute(ctx: &PluginExecutionContext, config: &Self::Config) -> Result<(), PluginError>;
}

fn parse_request_with<P: Plugin>(body: Value) -> Result<JobRequest, RequestError> {
    let request = JobRequest::from_value(body)?;
    // Config nulo se deja pasar: el controlador lo reporta con su propio mensaje.
    if request.has_config() {
        request.config_as::<P::Config>()?;
    }
    Ok(request)
}

fn validate_with<P: Plugin>(request: &JobRequest, metadata: MetadataSupplier<'_>) -> Result<(), ValidationError> {
    let config = request.config_as::<P::Config>().map_err(|e| ValidationError::new(e.to_string()))?;
    P::validate(&config, request, metadata)
}

fn stream_specs_with<P: Plugin>(request: &JobRequest) -> Result<Vec<StreamSpec>, PluginError> {
    let config = request.config_as::<P::Config>()?;
    Ok(P::stream_specs(&config))
}

fn execute_with<P: Plugin>(ctx: &PluginExecutionContext) -> Result<(), PluginError> {
    let config = ctx.config_as::<P::Config>()?;
    P::execute(ctx, &config)
}

impl PluginDescriptor {
    /// Descriptor de un plugin tipado.
    pub fn of<P: Plugin>() -> Self {
        Self { url_segment: P::URL_SEGMENT,
               display_name: P::DISPLAY_NAME,
               description: P::DESCRIPTION,
               queue_lane: P::QUEUE_LANE,
               parse_request: parse_request_with::<P>,
               validate_config: validate_with::<P>,
               stream_specs: stream_specs_with::<P>,
               execute: execute_with::<P> }
    }
}

/// Entrada del listado público de plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginOverview {
    pub name: String,
    pub display_name: String,
    pub description: String,
}

/// Plugins indexados por `url_segment`, en orden de registro. Se arma al
/// arrancar y se inyecta en quien lo necesite.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: IndexMap<&'static str, PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra en orden; falla ante el primer segmento repetido.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self, RegistryError>
        where I: IntoIterator<Item = PluginDescriptor>
    {
        let mut registry = Self::new();
        for d in descriptors {
            registry.register(d)?;
        }
        Ok(registry)
    }

    /// `RegistryError::Duplicate` si el segmento ya estaba registrado.
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), RegistryError> {
        if self.plugins.contains_key(descriptor.url_segment) {
            return Err(RegistryError::Duplicate(descriptor.url_segment.to_string()));
        }
        self.plugins.insert(descriptor.url_segment, descriptor);
        Ok(())
    }

    /// Como `get`, pero un segmento desconocido es `RegistryError::NotFound`.
    pub fn lookup(&self, url_segment: &str) -> Result<&PluginDescriptor, RegistryError> {
        self.plugins.get(url_segment).ok_or_else(|| RegistryError::NotFound(url_segment.to_string()))
    }

    pub fn get(&self, url_segment: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(url_segment)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.plugins.values()
    }

    /// Listado en orden de registro.
    pub fn overview(&self) -> Vec<PluginOverview> {
        self.plugins
            .values()
            .map(|d| PluginOverview { name: d.url_segment.to_string(),
                                      display_name: d.display_name.to_string(),
                                      description: d.description.to_string() })
            .collect()
    }
}
