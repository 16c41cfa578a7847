//! Lanzador de procesos externos.
//!
//! Bloquea el hilo del worker hasta que el proceso termina. No hay timeout ni
//! límite de salida: quien necesite acotar la ejecución debe hacerlo por su
//! cuenta. stderr siempre va a `error.log` dentro del directorio de trabajo.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use log::{debug, info, warn};

use crate::errors::ProcessError;
use crate::workspace::reserved::ERROR_LOG;
use crate::workspace::{validate_file_name, Workspace};

#[derive(Debug, Clone)]
pub struct ExternalProcessRunner {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    work_dir: PathBuf,
    stdout_file: Option<String>,
}

impl ExternalProcessRunner {
    /// Runner con el workspace como directorio de trabajo.
    pub fn new(command: impl Into<String>, workspace: &Workspace) -> Self {
        Self::in_dir(command, workspace.path())
    }

    pub fn in_dir(command: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self { command: command.into(),
               args: Vec::new(),
               env: BTreeMap::new(),
               work_dir: work_dir.into(),
               stdout_file: None }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sobrescribe una variable de entorno; el resto (incluido `PATH`) se
    /// hereda.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
        where I: IntoIterator<Item = (K, V)>,
              K: Into<String>,
              V: Into<String>
    {
        self.env.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Redirige stdout a un archivo del directorio de trabajo.
    pub fn stdout_to(mut self, file_name: impl Into<String>) -> Self {
        self.stdout_file = Some(file_name.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Ejecuta y devuelve el código de salida.
    pub fn run(&self) -> Result<i32, ProcessError> {
        info!("running external process '{}' with {} args in {}",
              self.command,
              self.args.len(),
              self.work_dir.display());
        debug!("process args: {:?}", self.args);

        let stderr = self.redirect_target(ERROR_LOG)?;
        let stdout = match &self.stdout_file {
            Some(name) => Stdio::from(self.redirect_target(name)?),
            None => Stdio::null(),
        };

        let mut child = Command::new(&self.command).args(&self.args)
                                                   .envs(&self.env)
                                                   .current_dir(&self.work_dir)
                                                   .stdin(Stdio::null())
                                                   .stdout(stdout)
                                                   .stderr(Stdio::from(stderr))
                                                   .spawn()
                                                   .map_err(|source| ProcessError::Spawn { command: self.command.clone(),
                                                                                           source })?;

        let status = child.wait()
                          .map_err(|source| ProcessError::Wait { command: self.command.clone(), source })?;
        match status.code() {
            Some(code) => {
                if code != 0 {
                    warn!("external process '{}' exited with {}", self.command, code);
                } else {
                    debug!("external process '{}' finished", self.command);
                }
                Ok(code)
            }
            None => Err(ProcessError::Terminated { command: self.command.clone() }),
        }
    }

    fn redirect_target(&self, name: &str) -> Result<File, ProcessError> {
        let redirect_err = |source: std::io::Error| ProcessError::Redirect { command: self.command.clone(),
                                                             file: name.to_string(),
                                                             source };
        validate_file_name(name).map_err(|_| {
                                    redirect_err(std::io::Error::new(std::io::ErrorKind::InvalidInput,
                                                                     "not a workspace file name"))
                                })?;
        File::create(self.work_dir.join(name)).map_err(redirect_err)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn ws() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        (dir, ws)
    }

    #[test]
    fn captures_stderr_into_error_log() {
        let (_dir, ws) = ws();
        let code = ExternalProcessRunner::new("sh", &ws).args(["-c", "echo oops >&2; exit 3"]).run().unwrap();
        assert_eq!(code, 3);
        assert_eq!(ws.read_to_string(ERROR_LOG).unwrap(), "oops\n");
    }

    #[test]
    fn env_overrides_and_cwd() {
        let (_dir, ws) = ws();
        let code = ExternalProcessRunner::new("sh", &ws).args(["-c", "printf '%s' \"$GREETING\" > out.txt"])
                                                       .env("GREETING", "hola")
                                                       .run()
                                                       .unwrap();
        assert_eq!(code, 0);
        assert_eq!(ws.read_to_string("out.txt").unwrap(), "hola");
    }

    #[test]
    fn stdout_redirect() {
        let (_dir, ws) = ws();
        ExternalProcessRunner::new("sh", &ws).args(["-c", "echo data"]).stdout_to("output-data").run().unwrap();
        assert_eq!(ws.read_to_string("output-data").unwrap(), "data\n");
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let (_dir, ws) = ws();
        let err = ExternalProcessRunner::new("definitely-not-a-binary-xyz", &ws).run().unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }
}
