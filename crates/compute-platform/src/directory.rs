//! Servicio de estudio respaldado por un directorio, para ejecuciones
//! offline (CLI y tests).
//!
//! ```text
//! <root>/<studyId>/study.json     detalle del estudio
//! <root>/<studyId>/<entityId>.tsv datos tabulares de la entidad
//! <root>/<studyId>/access.json    permisos (opcional, por defecto todo permitido)
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::PathBuf;

use compute_core::services::{AccessService, DataStream, MergeService, MetadataService, TabularRequest};
use compute_core::{AuthTuple, FetchError, StudyAccess};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct DirectoryStudyService {
    root: PathBuf,
}

impl DirectoryStudyService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn study_file(&self, study_id: &str, name: &str) -> Result<PathBuf, FetchError> {
        let plain = |s: &str| !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\']);
        if !plain(study_id) || !plain(name) {
            return Err(FetchError::NotFound(format!("{}/{}", study_id, name)));
        }
        Ok(self.root.join(study_id).join(name))
    }

    fn read_json(&self, study_id: &str, name: &str) -> Result<Option<Value>, FetchError> {
        let path = self.study_file(study_id, name)?;
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| FetchError::Decode(e.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl MetadataService for DirectoryStudyService {
    fn study_detail(&self, study_id: &str, _auth: &AuthTuple) -> Result<Option<Value>, FetchError> {
        self.read_json(study_id, "study.json")
    }
}

impl MergeService for DirectoryStudyService {
    /// Sin servicio de merge: las variables derivadas se devuelven tal cual.
    fn derived_variable_metadata(&self,
                                 _study_id: &str,
                                 derived_variables: &[Value],
                                 _auth: &AuthTuple)
                                 -> Result<Vec<Value>, FetchError> {
        Ok(derived_variables.to_vec())
    }

    fn tabular_data(&self, request: &TabularRequest, _auth: &AuthTuple) -> Result<DataStream, FetchError> {
        let path = self.study_file(&request.study_id, &format!("{}.tsv", request.output_entity_id))?;
        match File::open(&path) {
            Ok(f) => Ok(Box::new(BufReader::new(f))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(format!("no tabular data at {}", path.display())))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl AccessService for DirectoryStudyService {
    fn study_access(&self, study_id: &str, _auth: &AuthTuple) -> Result<Option<StudyAccess>, FetchError> {
        if !self.study_file(study_id, "study.json")?.is_file() {
            return Ok(None);
        }
        match self.read_json(study_id, "access.json")? {
            Some(v) => serde_json::from_value(v).map(Some).map_err(|e| FetchError::Decode(e.to_string())),
            None => Ok(Some(StudyAccess { allow_visualizations: true })),
        }
    }
}
