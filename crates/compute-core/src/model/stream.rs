//! Especificaciones de streams tabulares y metadata de referencia del estudio.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stream tabular que un plugin necesita. El archivo descargado en el
/// workspace se llama exactamente `stream_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSpec {
    pub stream_name: String,
    pub entity_id: String,
    #[serde(default)]
    pub variables: Vec<Value>,
}

impl StreamSpec {
    pub fn new(stream_name: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self { stream_name: stream_name.into(), entity_id: entity_id.into(), variables: Vec::new() }
    }

    pub fn with_vars<I>(mut self, vars: I) -> Self
        where I: IntoIterator<Item = Value>
    {
        self.variables.extend(vars);
        self
    }
}

/// Permisos del llamador sobre un estudio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyAccess {
    pub allow_visualizations: bool,
}

/// Detalle del estudio + metadata de variables derivadas del request.
///
/// Se calcula una sola vez al construir el contexto de ejecución (o al
/// validar en el envío) y no se vuelve a consultar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceMetadata {
    pub study_id: String,
    pub study: Value,
    #[serde(default)]
    pub derived_variables: Vec<Value>,
}

impl ReferenceMetadata {
    pub fn new(study_id: impl Into<String>, study: Value, derived_variables: Vec<Value>) -> Self {
        Self { study_id: study_id.into(), study, derived_variables }
    }

    /// Busca una entidad por id recorriendo `rootEntity` y sus `children`.
    pub fn entity(&self, entity_id: &str) -> Option<&Value> {
        self.study.get("rootEntity").and_then(|root| find_entity(root, entity_id))
    }

    /// Busca una variable dentro de una entidad (incluye variables derivadas
    /// asociadas a esa entidad).
    pub fn variable(&self, entity_id: &str, variable_id: &str) -> Option<&Value> {
        let own = self.entity(entity_id)
                      .and_then(|e| e.get("variables"))
                      .and_then(Value::as_array)
                      .and_then(|vars| vars.iter().find(|v| has_id(v, variable_id)));
        own.or_else(|| {
               self.derived_variables.iter().find(|v| {
                                                 has_id(v, variable_id)
                                                 && v.get("entityId").and_then(Value::as_str) == Some(entity_id)
                                             })
           })
    }
}

fn has_id(value: &Value, id: &str) -> bool {
    value.get("id").and_then(Value::as_str) == Some(id)
}

fn find_entity<'a>(node: &'a Value, entity_id: &str) -> Option<&'a Value> {
    if has_id(node, entity_id) {
        return Some(node);
    }
    node.get("children")
        .and_then(Value::as_array)
        .and_then(|children| children.iter().find_map(|c| find_entity(c, entity_id)))
}
