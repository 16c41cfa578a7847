//! Mensajes intercambiados con la cola de jobs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::JobId;

/// Header de autenticación del request original (nombre + valor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTuple {
    pub header: String,
    pub token: String,
}

impl AuthTuple {
    pub fn new(header: impl Into<String>, token: impl Into<String>) -> Self {
        Self { header: header.into(), token: token.into() }
    }
}

/// Identidad del llamador: el principal decide la propiedad del job, el
/// header se reenvía a los servicios remotos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub principal: String,
    pub auth: AuthTuple,
}

impl AuthContext {
    pub fn new(principal: impl Into<String>, auth: AuthTuple) -> Self {
        Self { principal: principal.into(), auth }
    }
}

/// Payload que viaja por la cola: `{plugin, request, authHeader}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub plugin: String,
    pub request: Value,
    #[serde(rename = "authHeader")]
    pub auth_header: AuthTuple,
}

/// Envío completo a la cola: el mensaje más la identidad bajo la que se
/// registra y el principal propietario.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSubmission {
    pub job_id: JobId,
    pub owner: String,
    pub message: QueueMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn queue_message_schema() {
        let msg = QueueMessage { plugin: "example".into(),
                                 request: json!({"studyId": "DS_1"}),
                                 auth_header: AuthTuple::new("Auth-Key", "secret") };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v, json!({"plugin": "example", "request": {"studyId": "DS_1"}, "authHeader": {"header": "Auth-Key", "token": "secret"}}));
        let back: QueueMessage = serde_json::from_value(v).unwrap();
        assert_eq!(back, msg);
    }
}
