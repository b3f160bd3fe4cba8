// Teardown Agent.
//
// Best-effort: reads the persisted pid, sends SIGTERM, then sleeps for a fixed
// grace period so the server can flush its output. There is no portable
// "wait until stopped" for a process we are not the parent of, so the delay is
// an approximation, not a guarantee. Failures are logged and never escalate.

use nix::sys::signal::Signal;
use std::path::Path;
use std::time::Duration;

use crate::config::{LaunchConfig, TeardownConfig};
use crate::error::LaunchError;
use crate::native::file::read_lossy;
use crate::native::process::{is_alive, is_no_such_process, send_signal};

pub struct TeardownAgent<'a> {
    launch: &'a LaunchConfig,
    teardown: &'a TeardownConfig,
}

/// Parse the pid file: a positive decimal integer, surrounding whitespace allowed.
pub async fn read_pid(path: &Path) -> Result<i32, LaunchError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        LaunchError::Teardown(anyhow::anyhow!("Failed to read {}: {}", path.display(), e))
    })?;
    match raw.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(LaunchError::Teardown(anyhow::anyhow!(
            "{} does not hold a valid pid: {:?}",
            path.display(),
            raw.trim()
        ))),
    }
}

impl<'a> TeardownAgent<'a> {
    pub fn new(launch: &'a LaunchConfig, teardown: &'a TeardownConfig) -> Self {
        Self { launch, teardown }
    }

    /// Stop the recorded server. Returns the signaled pid, or `None` if teardown failed.
    pub async fn shutdown(&self) -> Option<i32> {
        match self.try_shutdown().await {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = %e, "Teardown failed; the server may still be running");
                None
            }
        }
    }

    async fn try_shutdown(&self) -> Result<i32, LaunchError> {
        let pid_file = self.launch.pid_file_path();
        let pid = read_pid(&pid_file).await?;

        tracing::info!(pid, "Sending SIGTERM to stub server");
        if let Err(e) = send_signal(pid, Signal::SIGTERM) {
            if is_no_such_process(&e) {
                // Already gone; a kept pid could later name an unrelated process.
                remove_pid_file(&pid_file).await;
            }
            return Err(LaunchError::Teardown(e));
        }
        remove_pid_file(&pid_file).await;

        tokio::time::sleep(Duration::from_millis(self.teardown.grace_period_ms)).await;

        if is_alive(pid) {
            tracing::warn!(
                pid,
                grace_period_ms = self.teardown.grace_period_ms,
                "Server still running after grace period"
            );
        } else {
            tracing::info!(pid, "Server stopped");
        }

        if self.teardown.print_logs && self.launch.capture_output {
            self.print_logs().await;
        }
        Ok(pid)
    }

    async fn print_logs(&self) {
        for (stream, path) in [
            ("stdout", self.launch.stdout_log_path()),
            ("stderr", self.launch.stderr_log_path()),
        ] {
            match read_lossy(&path).await {
                Ok(text) if text.is_empty() => {}
                Ok(text) => tracing::info!(stream, "Server {}:\n{}", stream, text.trim_end()),
                Err(e) => tracing::warn!(stream, error = %e, "Could not read server log"),
            }
        }
    }
}

async fn remove_pid_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Could not remove pid file");
    }
}
