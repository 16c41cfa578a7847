//! compute-cli: herramienta de operación local.
//!
//! ```bash
//! # Identidad de un job (idempotente: mismo request => mismo id)
//! compute-cli job-id --plugin example --request request.json
//!
//! # Plugins registrados
//! compute-cli plugins
//!
//! # Ejecutar un job completo contra estudios en un directorio local
//! compute-cli run --plugin sort --request request.json --data-dir ./studies --cache-dir ./cache
//!
//! # Archivos persistidos de un job
//! compute-cli files --job <ID> --cache-dir ./cache --show output-data
//! ```

mod error;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use compute_core::services::{ResultStore, StudyServices};
use compute_core::{identity_of, AuthContext, AuthTuple, JobId, JobStatus, PluginExecutor, PluginMetrics};
use compute_platform::{DirectoryStudyService, FsResultStore, LocalPlatform, ServiceOptions};
use compute_service::ComputeController;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "compute-cli", about = "Content-addressed compute jobs from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the job id a request would be stored under
    JobId {
        #[arg(long)]
        plugin: String,
        /// JSON file with the compute request
        #[arg(long)]
        request: PathBuf,
    },

    /// List registered plugins
    Plugins,

    /// Submit a job to an in-process platform and wait for it
    Run {
        #[arg(long)]
        plugin: String,
        #[arg(long)]
        request: PathBuf,
        /// Directory with one sub-directory per study
        #[arg(long)]
        data_dir: PathBuf,
        /// Result store directory (defaults to JOB_CACHE_DIR)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },

    /// List or print persisted result files of a job
    Files {
        #[arg(long)]
        job: String,
        #[arg(long)]
        cache_dir: PathBuf,
        /// File to print to stdout
        #[arg(long)]
        show: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                             .with_writer(io::stderr)
                             .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[compute-cli] {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::JobId { plugin, request } => {
            let registry = compute_plugins::default_registry()?;
            let descriptor = registry.lookup(&plugin)?;
            let request = (descriptor.parse_request)(read_json(&request)?)?;
            println!("{}", identity_of(descriptor.url_segment, &request));
            Ok(())
        }
        Command::Plugins => {
            let registry = compute_plugins::default_registry()?;
            for plugin in registry.overview() {
                println!("{}\t{}\t{}", plugin.name, plugin.display_name, plugin.description);
            }
            Ok(())
        }
        Command::Run { plugin, request, data_dir, cache_dir, timeout_secs } => {
            run_job(&plugin, &request, data_dir, cache_dir, Duration::from_secs(timeout_secs))
        }
        Command::Files { job, cache_dir, show } => {
            let job_id: JobId = job.parse()?;
            let store = FsResultStore::new(cache_dir)?;
            match show {
                Some(name) => {
                    let mut file = store.open_file(&job_id, &name)?
                                        .ok_or_else(|| CliError::NoResults(format!("{} ({})", job_id, name)))?;
                    let mut stdout = io::stdout().lock();
                    io::copy(&mut file, &mut stdout)?;
                    stdout.flush()?;
                }
                None => {
                    let files = store.list_files(&job_id)?.ok_or_else(|| CliError::NoResults(job_id.to_string()))?;
                    for name in files {
                        println!("{}", name);
                    }
                }
            }
            Ok(())
        }
    }
}

fn run_job(plugin: &str,
           request: &Path,
           data_dir: PathBuf,
           cache_dir: Option<PathBuf>,
           timeout: Duration)
           -> Result<(), CliError> {
    let mut options = ServiceOptions::from_env()?;
    if let Some(dir) = cache_dir {
        options.job_cache_dir = dir;
    }
    let body = read_json(request)?;

    let registry = Arc::new(compute_plugins::default_registry()?);
    let services = StudyServices::from_single(Arc::new(DirectoryStudyService::new(data_dir)));
    let store: Arc<dyn ResultStore> = Arc::new(FsResultStore::new(&options.job_cache_dir)?);
    let executor = PluginExecutor::new(registry.clone(), services.clone(), Arc::new(PluginMetrics::new()));
    let platform = LocalPlatform::new(&options, executor, store.clone())?;
    let controller = ComputeController::new(registry, services, platform.clone(), store.clone());

    let auth = AuthContext::new("compute-cli", AuthTuple::new("Auth-Key", "local"));
    let view = controller.submit(plugin, body, &auth, true)?;
    info!("job {} is {:?}", view.job_id, view.status);

    let record = platform.wait_for(&view.job_id, timeout)?;
    let files = store.list_files(&record.job_id)?.unwrap_or_default();
    println!("{}\t{:?}\t{}", record.job_id, record.status, files.join(","));
    for m in platform.executor().metrics().snapshot_all() {
        info!("plugin {}: {} ok, {} failed, {:.3}s total", m.plugin, m.successes, m.failures, m.sum_seconds);
    }
    if record.status == JobStatus::Failed {
        return Err(CliError::JobFailed(record.job_id.to_string(), "FAILED".into()));
    }
    Ok(())
}

fn read_json(path: &Path) -> Result<Value, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::ReadFile { path: path.display().to_string(),
                                                                               source })?;
    Ok(serde_json::from_str(&text)?)
}
