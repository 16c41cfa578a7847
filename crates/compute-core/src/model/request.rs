//! Request de cómputo deserializado.
//!
//! `JobRequest` es la representación neutra de cualquier request de plugin:
//! los campos comunes (`studyId`, `filters`, `derivedVariables`) son
//! explícitos, `config` queda como JSON hasta que el plugin lo decodifique
//! con `config_as`, y cualquier otro campo de nivel superior se conserva en
//! `extra` para que participe en la identidad del job.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RequestError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub study_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_variables: Option<Vec<Value>>,
    #[serde(default)]
    pub config: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobRequest {
    pub fn new(study_id: impl Into<String>, config: Value) -> Self {
        Self { study_id: study_id.into(),
               filters: None,
               derived_variables: None,
               config,
               extra: Map::new() }
    }

    pub fn with_filters(mut self, filters: Vec<Value>) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_derived_variables(mut self, derived: Vec<Value>) -> Self {
        self.derived_variables = Some(derived);
        self
    }

    /// Decodifica un cuerpo JSON arbitrario.
    pub fn from_value(body: Value) -> Result<Self, RequestError> {
        serde_json::from_value(body).map_err(RequestError::Malformed)
    }

    /// Ausente y lista vacía son equivalentes: tras normalizar, `filters` y
    /// `derivedVariables` siempre están presentes.
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    pub fn normalize(&mut self) {
        self.filters.get_or_insert_with(Vec::new);
        self.derived_variables.get_or_insert_with(Vec::new);
    }

    pub fn filters(&self) -> &[Value] {
        self.filters.as_deref().unwrap_or(&[])
    }

    pub fn derived_variables(&self) -> &[Value] {
        self.derived_variables.as_deref().unwrap_or(&[])
    }

    pub fn has_config(&self) -> bool {
        !self.config.is_null()
    }

    /// Acceso tipado a la configuración del plugin.
    pub fn config_as<C: DeserializeOwned>(&self) -> Result<C, RequestError> {
        C::deserialize(&self.config).map_err(RequestError::InvalidConfig)
    }

    /// Representación JSON equivalente a la serialización serde (sin fallos
    /// posibles: todos los campos ya son JSON).
    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        map.insert("studyId".into(), Value::String(self.study_id.clone()));
        if let Some(filters) = &self.filters {
            map.insert("filters".into(), Value::Array(filters.clone()));
        }
        if let Some(derived) = &self.derived_variables {
            map.insert("derivedVariables".into(), Value::Array(derived.clone()));
        }
        map.insert("config".into(), self.config.clone());
        Value::Object(map)
    }
}
