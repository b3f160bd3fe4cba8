// Process Launcher.
//
// Spawns the server detached from this process, points its output at the log
// sinks, and persists the pid before handing control back. The pid file is the
// only thing a later `mockd stop` needs.

use nix::sys::signal::Signal;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::artifact::ArtifactReference;
use crate::config::LaunchConfig;
use crate::error::LaunchError;
use crate::native::process::{send_signal, spawn_detached};

/// Non-owning reference to the launched server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub pid_file: PathBuf,
    /// `None` when output is discarded.
    pub stdout_log: Option<PathBuf>,
    pub stderr_log: Option<PathBuf>,
}

pub struct Launcher<'a> {
    config: &'a LaunchConfig,
}

impl<'a> Launcher<'a> {
    pub fn new(config: &'a LaunchConfig) -> Self {
        Self { config }
    }

    /// Full argument list passed to `program`. Paths should be absolute: the
    /// child runs with `root_dir` as its cwd.
    pub fn command_args(&self, artifact: &Path, root_dir: &Path, verbose: bool) -> Vec<String> {
        let mut args = self.config.program_args.clone();
        args.push(artifact.display().to_string());
        args.push("--port".to_string());
        args.push(self.config.http_port.to_string());
        args.push("--root-dir".to_string());
        args.push(root_dir.display().to_string());
        if verbose {
            args.push("--verbose".to_string());
        }
        args
    }

    pub async fn launch(
        &self,
        artifact: &ArtifactReference,
        verbose: bool,
    ) -> Result<ProcessHandle, LaunchError> {
        let program = &self.config.program;
        let spawn_err = |source: anyhow::Error| LaunchError::Spawn {
            program: program.clone(),
            source,
        };

        let (stdout, stderr, stdout_log, stderr_log) = if self.config.capture_output {
            let out_path = self.config.stdout_log_path();
            let err_path = self.config.stderr_log_path();
            let out = open_log(&out_path).map_err(spawn_err)?;
            let err = open_log(&err_path).map_err(spawn_err)?;
            (out, err, Some(out_path), Some(err_path))
        } else {
            (Stdio::null(), Stdio::null(), None, None)
        };

        let root_dir = absolute(&self.config.work_dir).map_err(spawn_err)?;
        let artifact_path = absolute(&artifact.path).map_err(spawn_err)?;
        let args = self.command_args(&artifact_path, &root_dir, verbose);
        tracing::info!(%program, args = ?args, work_dir = %root_dir.display(), "Starting server");

        let pid = spawn_detached(program, &args, &root_dir, stdout, stderr).map_err(spawn_err)?;

        let pid_file = self.config.pid_file_path();
        // The pid must be on disk before anything else runs, so even a failed
        // readiness probe leaves a recoverable handle behind.
        if let Err(e) = tokio::fs::write(&pid_file, pid.to_string()).await {
            tracing::error!(pid, path = %pid_file.display(), "Server started but pid file could not be written");
            // Without a pid file nothing could stop it later.
            match send_signal(pid as i32, Signal::SIGKILL) {
                Ok(()) => tracing::warn!(pid, "Killed unrecorded server"),
                Err(kill_err) => tracing::error!(pid, error = %kill_err, "Failed to kill unrecorded server"),
            }
            return Err(spawn_err(anyhow::anyhow!(
                "pid {} started but writing {} failed: {}",
                pid,
                pid_file.display(),
                e
            )));
        }

        tracing::info!(pid, pid_file = %pid_file.display(), "Server process detached");
        Ok(ProcessHandle {
            pid,
            pid_file,
            stdout_log,
            stderr_log,
        })
    }
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    std::path::absolute(path)
        .map_err(|e| anyhow::anyhow!("Failed to resolve {}: {}", path.display(), e))
}

fn open_log(path: &Path) -> anyhow::Result<Stdio> {
    let file = File::create(path)
        .map_err(|e| anyhow::anyhow!("Failed to open log {}: {}", path.display(), e))?;
    Ok(Stdio::from(file))
}
