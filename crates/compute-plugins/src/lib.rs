//! compute-plugins: plugins concretos y la lista explícita de plugins por
//! defecto.
//!
//! El registro no se descubre en tiempo de ejecución: quien arranca el
//! servicio llama a `default_registry()` (o arma el suyo con
//! `PluginRegistry::from_descriptors`) y lo inyecta en los componentes.

pub mod example;
pub mod sort;
pub mod variables;

use compute_core::{PluginDescriptor, PluginRegistry, RegistryError};

pub use example::{ExampleConfig, ExamplePlugin, ExampleStats};
pub use sort::{SortConfig, SortPlugin};
pub use variables::VariableSpec;

/// Plugins disponibles, en el orden en que aparecen en el listado público.
pub fn default_plugins() -> Vec<PluginDescriptor> {
    vec![PluginDescriptor::of::<ExamplePlugin>(), PluginDescriptor::of::<SortPlugin>()]
}

pub fn default_registry() -> Result<PluginRegistry, RegistryError> {
    PluginRegistry::from_descriptors(default_plugins())
}
