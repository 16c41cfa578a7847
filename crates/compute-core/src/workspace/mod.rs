//! Workspace de un job: directorio privado de trabajo para un único intento
//! de ejecución.
//!
//! Todos los nombres de archivo son componentes simples (sin separadores);
//! `list_all` sólo enumera archivos regulares del nivel superior.

pub mod reserved;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::errors::WorkspaceError;
use crate::identity::JobId;

pub use reserved::{is_reserved, OUTPUT_DATA, OUTPUT_FILES, OUTPUT_META, OUTPUT_STATS, RESERVED_FILES};

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Abre un directorio existente como workspace.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        if !root.is_dir() {
            let name = root.display().to_string();
            return Err(WorkspaceError::io(name, io::Error::new(io::ErrorKind::NotFound, "not a directory")));
        }
        Ok(Self { root })
    }

    /// Crea `<parent>/<jobId>-<uuid>`. La creación falla si el directorio ya
    /// existe, de modo que el workspace queda en propiedad exclusiva.
    pub fn create_in(parent: &Path, job_id: &JobId) -> Result<Self, WorkspaceError> {
        fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent.display().to_string(), e))?;
        let root = parent.join(format!("{}-{}", job_id, Uuid::new_v4()));
        fs::create_dir(&root).map_err(|e| WorkspaceError::io(root.display().to_string(), e))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        validate_file_name(name)?;
        Ok(self.root.join(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Escribe (o reemplaza) un archivo completo.
    pub fn write(&self, name: &str, data: impl AsRef<[u8]>) -> Result<(), WorkspaceError> {
        let path = self.file_path(name)?;
        fs::write(path, data).map_err(|e| WorkspaceError::io(name, e))
    }

    /// Copia un stream en el archivo `name` y devuelve los bytes escritos.
    pub fn write_stream(&self, name: &str, data: &mut dyn Read) -> Result<u64, WorkspaceError> {
        let mut out = BufWriter::new(self.touch(name)?);
        let n = io::copy(data, &mut out).map_err(|e| WorkspaceError::io(name, e))?;
        out.flush().map_err(|e| WorkspaceError::io(name, e))?;
        Ok(n)
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), WorkspaceError> {
        let bytes = serde_json::to_vec(value).map_err(|e| WorkspaceError::io(name, io::Error::other(e)))?;
        self.write(name, bytes)
    }

    /// Crea (truncando) el archivo y devuelve el handle de escritura.
    pub fn touch(&self, name: &str) -> Result<File, WorkspaceError> {
        let path = self.file_path(name)?;
        OpenOptions::new().create(true)
                          .write(true)
                          .truncate(true)
                          .open(path)
                          .map_err(|e| WorkspaceError::io(name, e))
    }

    pub fn open_read(&self, name: &str) -> Result<BufReader<File>, WorkspaceError> {
        let path = self.file_path(name)?;
        File::open(path).map(BufReader::new).map_err(|e| WorkspaceError::io(name, e))
    }

    pub fn read_to_string(&self, name: &str) -> Result<String, WorkspaceError> {
        let path = self.file_path(name)?;
        fs::read_to_string(path).map_err(|e| WorkspaceError::io(name, e))
    }

    /// Nombres de todos los archivos regulares del workspace, ordenados.
    pub fn list_all(&self) -> Result<Vec<String>, WorkspaceError> {
        let label = self.root.display().to_string();
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| WorkspaceError::io(label.clone(), e))? {
            let entry = entry.map_err(|e| WorkspaceError::io(label.clone(), e))?;
            let is_file = entry.file_type().map_err(|e| WorkspaceError::io(label.clone(), e))?.is_file();
            if !is_file {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Subconjunto de `names` que existe en el workspace, en el orden dado.
    pub fn select_existing(&self, names: &[&str]) -> Vec<String> {
        names.iter().filter(|n| self.exists(n)).map(|n| n.to_string()).collect()
    }

    pub fn write_data_result(&self, data: impl AsRef<[u8]>) -> Result<(), WorkspaceError> {
        self.write(OUTPUT_DATA, data)
    }

    pub fn write_meta_result<T: Serialize + ?Sized>(&self, meta: &T) -> Result<(), WorkspaceError> {
        self.write_json(OUTPUT_META, meta)
    }

    pub fn write_stats_result<T: Serialize + ?Sized>(&self, stats: &T) -> Result<(), WorkspaceError> {
        self.write_json(OUTPUT_STATS, stats)
    }

    /// Elimina el directorio completo.
    pub fn remove(self) -> Result<(), WorkspaceError> {
        let label = self.root.display().to_string();
        fs::remove_dir_all(&self.root).map_err(|e| WorkspaceError::io(label, e))
    }
}

pub(crate) fn validate_file_name(name: &str) -> Result<(), WorkspaceError> {
    let bad = name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(WorkspaceError::InvalidName(name.to_string()));
    }
    Ok(())
}
