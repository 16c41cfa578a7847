//! Store de resultados en el filesystem: `<root>/<jobId>/<archivo>`.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::PathBuf;

use compute_core::services::{DataStream, ResultStore};
use compute_core::{JobId, PlatformError, Workspace, WorkspaceError};
use log::{debug, warn};

#[derive(Debug, Clone)]
pub struct FsResultStore {
    root: PathBuf,
}

impl FsResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PlatformError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    fn file(&self, job_id: &JobId, name: &str) -> Option<PathBuf> {
        let plain = !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0']);
        plain.then(|| self.job_dir(job_id).join(name))
    }
}

impl ResultStore for FsResultStore {
    fn persist(&self, job_id: &JobId, workspace: &Workspace, files: &[String]) -> Result<Vec<String>, PlatformError> {
        let dir = self.job_dir(job_id);
        fs::create_dir_all(&dir)?;
        let mut persisted = Vec::with_capacity(files.len());
        for name in files {
            let src = workspace.file_path(name)?;
            if !src.is_file() {
                warn!("[job {}] skipping missing workspace file {}", job_id, name);
                continue;
            }
            fs::copy(&src, dir.join(name)).map_err(|e| WorkspaceError::Io { name: name.clone(), source: e })?;
            persisted.push(name.clone());
        }
        debug!("[job {}] persisted {:?}", job_id, persisted);
        Ok(persisted)
    }

    fn list_files(&self, job_id: &JobId) -> Result<Option<Vec<String>>, PlatformError> {
        let dir = self.job_dir(job_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Ok(name) = entry.file_name().into_string() {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(Some(names))
    }

    fn open_file(&self, job_id: &JobId, name: &str) -> Result<Option<DataStream>, PlatformError> {
        let Some(path) = self.file(job_id, name) else {
            return Ok(None);
        };
        match File::open(path) {
            Ok(f) => Ok(Some(Box::new(BufReader::new(f)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put_file(&self, job_id: &JobId, name: &str, data: &[u8]) -> Result<(), PlatformError> {
        let path = self.file(job_id, name).ok_or_else(|| WorkspaceError::InvalidName(name.to_string()))?;
        fs::create_dir_all(self.job_dir(job_id))?;
        fs::write(path, data)?;
        Ok(())
    }

    fn delete(&self, job_id: &JobId) -> Result<(), PlatformError> {
        match fs::remove_dir_all(self.job_dir(job_id)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
