//! Referencia a una variable de un estudio.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSpec {
    pub entity_id: String,
    pub variable_id: String,
}

impl VariableSpec {
    pub fn new(entity_id: impl Into<String>, variable_id: impl Into<String>) -> Self {
        Self { entity_id: entity_id.into(), variable_id: variable_id.into() }
    }

    /// Notación `entidad.variable` usada en las cabeceras del merge service.
    pub fn dot_notation(&self) -> String {
        format!("{}.{}", self.entity_id, self.variable_id)
    }

    pub fn to_value(&self) -> Value {
        json!({"entityId": self.entity_id, "variableId": self.variable_id})
    }
}
