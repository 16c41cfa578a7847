//! Cliente HTTP de los servicios de estudio (subsetting, merge y permisos).
//!
//! Rutas:
//! - `GET  {subsetting}/studies/{studyId}` -> `{"study": {...}}`
//! - `POST {merge}/merging-internal/derived-variables/metadata` -> `[...]`
//! - `POST {merge}/merging-internal/query` -> stream tabular
//! - `GET  {access}/permissions/{studyId}` -> `{"allowVisualizations": bool}`
//!
//! El `studyId` viaja como segmento de ruta codificado.
//! 404 se traduce a "no existe" (`Ok(None)`) donde el contrato lo admite.

use std::io::Read;
use std::time::Duration;

use compute_core::services::{AccessService, DataStream, MergeService, MetadataService, TabularRequest};
use compute_core::{AuthTuple, FetchError, StudyAccess};
use log::debug;
use serde_json::{json, Value};

use crate::config::ServiceOptions;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: u64 = 4 * 1024;

pub struct HttpStudyClient {
    agent: ureq::Agent,
    subsetting_host: Option<String>,
    merge_host: Option<String>,
    access_host: Option<String>,
}

impl HttpStudyClient {
    pub fn new(subsetting_host: Option<String>, merge_host: Option<String>, access_host: Option<String>) -> Self {
        // Sin timeout de lectura: los streams tabulares pueden ser largos.
        let agent = ureq::AgentBuilder::new().timeout_connect(CONNECT_TIMEOUT).build();
        Self { agent, subsetting_host, merge_host, access_host }
    }

    pub fn from_options(options: &ServiceOptions) -> Self {
        Self::new(options.subsetting_host.clone(),
                  options.merge_host.clone(),
                  options.dataset_access_host.clone())
    }

    fn url(host: &Option<String>, service: &str, path: &str) -> Result<String, FetchError> {
        host.as_ref()
            .map(|h| format!("{}{}", h, path))
            .ok_or_else(|| FetchError::Transport(format!("no host configured for the {} service", service)))
    }

    /// Ejecuta la petición; `Ok(None)` para 404.
    fn call(request: ureq::Request, body: Option<&Value>) -> Result<Option<ureq::Response>, FetchError> {
        debug!("{} {}", request.method(), request.url());
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        match result {
            Ok(response) => Ok(Some(response)),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(ureq::Error::Status(status, response)) => {
                let mut message = String::new();
                let _ = response.into_reader().take(MAX_ERROR_BODY).read_to_string(&mut message);
                Err(FetchError::Http { status, message })
            }
            Err(ureq::Error::Transport(err)) => Err(FetchError::Transport(err.to_string())),
        }
    }

    fn authed(&self, method: &str, url: &str, auth: &AuthTuple) -> ureq::Request {
        self.agent.request(method, url).set(&auth.header, &auth.token)
    }
}

impl MetadataService for HttpStudyClient {
    fn study_detail(&self, study_id: &str, auth: &AuthTuple) -> Result<Option<Value>, FetchError> {
        let path = format!("/studies/{}", urlencoding::encode(study_id));
        let url = Self::url(&self.subsetting_host, "subsetting", &path)?;
        let Some(response) = Self::call(self.authed("GET", &url, auth), None)? else {
            return Ok(None);
        };
        let mut body: Value = response.into_json().map_err(|e| FetchError::Decode(e.to_string()))?;
        match body.get_mut("study").map(Value::take) {
            Some(study) => Ok(Some(study)),
            None => Err(FetchError::Decode(format!("study detail for {} has no 'study' field", study_id))),
        }
    }
}

impl MergeService for HttpStudyClient {
    fn derived_variable_metadata(&self,
                                 study_id: &str,
                                 derived_variables: &[Value],
                                 auth: &AuthTuple)
                                 -> Result<Vec<Value>, FetchError> {
        let url = Self::url(&self.merge_host, "merge", "/merging-internal/derived-variables/metadata")?;
        let body = json!({"studyId": study_id, "derivedVariables": derived_variables});
        let response = Self::call(self.authed("POST", &url, auth), Some(&body))?
            .ok_or_else(|| FetchError::NotFound(format!("study '{}'", study_id)))?;
        response.into_json().map_err(|e| FetchError::Decode(e.to_string()))
    }

    fn tabular_data(&self, request: &TabularRequest, auth: &AuthTuple) -> Result<DataStream, FetchError> {
        let url = Self::url(&self.merge_host, "merge", "/merging-internal/query")?;
        let body = serde_json::to_value(request).map_err(|e| FetchError::Decode(e.to_string()))?;
        let response = Self::call(self.authed("POST", &url, auth).set("Accept", "text/tab-separated-values"),
                                  Some(&body))?
            .ok_or_else(|| FetchError::NotFound(format!("entity '{}'", request.output_entity_id)))?;
        let stream: DataStream = response.into_reader();
        Ok(stream)
    }
}

impl AccessService for HttpStudyClient {
    fn study_access(&self, study_id: &str, auth: &AuthTuple) -> Result<Option<StudyAccess>, FetchError> {
        let path = format!("/permissions/{}", urlencoding::encode(study_id));
        let url = Self::url(&self.access_host, "dataset access", &path)?;
        match Self::call(self.authed("GET", &url, auth), None)? {
            Some(response) => response.into_json().map(Some).map_err(|e| FetchError::Decode(e.to_string())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_host_is_a_transport_error() {
        let client = HttpStudyClient::new(None, None, None);
        let auth = AuthTuple::new("Auth-Key", "tok");
        let err = client.study_detail("DS_1", &auth).unwrap_err();
        assert!(matches!(err, FetchError::Transport(ref m) if m.contains("subsetting")));
        assert!(client.study_access("DS_1", &auth).is_err());
    }
}
