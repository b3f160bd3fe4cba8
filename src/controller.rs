// Lifecycle Controller.
//
//   Idle -> Provisioning -> Staging -> Launching -> Probing -> Ready | Failed
//
// Stages run strictly in order, each feeding the next. The first failure ends
// the run. A process that was launched but never became ready is left running
// with its pid file in place; `mockd stop` or an operator cleans it up.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::artifact::{ArtifactCache, ArtifactReference, Fetcher, Provisioner};
use crate::config::Config;
use crate::error::LaunchError;
use crate::launcher::{Launcher, ProcessHandle};
use crate::native::file::read_lossy;
use crate::probe::{Prober, ReadinessResult};
use crate::report::{OutputSink, STDERR_OUTPUT, STDOUT_OUTPUT};
use crate::staging::{Stager, StagingLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Provisioning,
    Staging,
    Launching,
    Probing,
    Ready,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Provisioning => "provisioning",
            Phase::Staging => "staging",
            Phase::Launching => "launching",
            Phase::Probing => "probing",
            Phase::Ready => "ready",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// User-supplied stub content for one run.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub mappings_path: PathBuf,
    pub files_path: PathBuf,
}

/// Everything a successful pipeline produced.
#[derive(Debug)]
pub struct Launched {
    pub artifact: ArtifactReference,
    pub layout: StagingLayout,
    pub handle: ProcessHandle,
    pub readiness: ReadinessResult,
}

/// Why and where the pipeline stopped. `handle` is set once a process exists.
#[derive(Debug)]
pub struct PipelineFailure {
    pub phase: Phase,
    pub error: LaunchError,
    pub handle: Option<ProcessHandle>,
}

/// Terminal result of `mockd start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    /// `Ready` on success, otherwise the phase that failed.
    pub phase: Phase,
    pub stdout: String,
    pub stderr: String,
    pub failure: Option<String>,
}

pub struct Controller<'a> {
    config: &'a Config,
    cache: &'a dyn ArtifactCache,
    fetcher: &'a dyn Fetcher,
}

struct Transitions {
    phase: Phase,
    entered: Instant,
}

impl Transitions {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            entered: Instant::now(),
        }
    }

    fn enter(&mut self, next: Phase) {
        tracing::info!(
            from = %self.phase,
            phase = %next,
            elapsed_ms = self.entered.elapsed().as_millis() as u64,
            "Pipeline phase"
        );
        self.phase = next;
        self.entered = Instant::now();
    }

    fn fail(&self, error: LaunchError, handle: Option<ProcessHandle>) -> PipelineFailure {
        tracing::error!(
            from = %self.phase,
            phase = %Phase::Failed,
            kind = %error.kind(),
            error = %error,
            "Pipeline failed"
        );
        PipelineFailure {
            phase: self.phase,
            error,
            handle,
        }
    }
}

impl<'a> Controller<'a> {
    pub fn new(config: &'a Config, cache: &'a dyn ArtifactCache, fetcher: &'a dyn Fetcher) -> Self {
        Self {
            config,
            cache,
            fetcher,
        }
    }

    /// Run every stage in order and stop at the first failure.
    pub async fn execute(&self, inputs: &RunInputs) -> Result<Launched, PipelineFailure> {
        let mut t = Transitions::new();

        t.enter(Phase::Provisioning);
        let artifact_cfg = &self.config.artifact;
        let artifact = Provisioner::new(artifact_cfg, self.cache, self.fetcher)
            .resolve(&artifact_cfg.name, &artifact_cfg.version)
            .await
            .map_err(|e| t.fail(e, None))?;

        t.enter(Phase::Staging);
        let layout = Stager::new(&self.config.launch.work_dir, &self.config.probe.path)
            .stage(&inputs.mappings_path, &inputs.files_path)
            .await
            .map_err(|e| t.fail(e, None))?;

        t.enter(Phase::Launching);
        let handle = Launcher::new(&self.config.launch)
            .launch(&artifact, self.config.launch.verbose)
            .await
            .map_err(|e| t.fail(e, None))?;

        t.enter(Phase::Probing);
        let readiness = match self.probe().await {
            Ok(r) if r.ready => r,
            Ok(r) => {
                let err = LaunchError::ReadinessTimeout {
                    url: self.config.probe.url(self.config.launch.http_port),
                    attempts: r.attempts,
                    last_failure: r.last_failure,
                };
                return Err(self.abandon(&t, err, handle));
            }
            Err(err) => return Err(self.abandon(&t, err, handle)),
        };

        t.enter(Phase::Ready);
        Ok(Launched {
            artifact,
            layout,
            handle,
            readiness,
        })
    }

    async fn probe(&self) -> Result<ReadinessResult, LaunchError> {
        Prober::new(&self.config.probe)?
            .await_ready(self.config.launch.http_port)
            .await
    }

    fn abandon(&self, t: &Transitions, err: LaunchError, handle: ProcessHandle) -> PipelineFailure {
        tracing::warn!(
            pid = handle.pid,
            pid_file = %handle.pid_file.display(),
            "Server left running; run `mockd stop` to terminate it"
        );
        t.fail(err, Some(handle))
    }

    /// Execute the pipeline and report the result through `sink`.
    pub async fn run(&self, inputs: &RunInputs, sink: &mut dyn OutputSink) -> RunOutcome {
        match self.execute(inputs).await {
            Ok(launched) => {
                let (stdout, stderr) = collect_output(&launched.handle).await;
                report_output(sink, &stdout, &stderr);
                tracing::info!(
                    pid = launched.handle.pid,
                    port = self.config.launch.http_port,
                    attempts = launched.readiness.attempts,
                    artifact = %launched.artifact.name,
                    version = %launched.artifact.version,
                    mappings_dir = %launched.layout.mappings_dir.display(),
                    "Stub server running"
                );
                RunOutcome {
                    success: true,
                    phase: Phase::Ready,
                    stdout,
                    stderr,
                    failure: None,
                }
            }
            Err(failure) => {
                let (stdout, stderr) = match &failure.handle {
                    Some(handle) => {
                        let captured = collect_output(handle).await;
                        report_output(sink, &captured.0, &captured.1);
                        captured
                    }
                    None => (String::new(), String::new()),
                };
                let message = failure.error.to_string();
                sink.set_failed(&message);
                RunOutcome {
                    success: false,
                    phase: failure.phase,
                    stdout,
                    stderr,
                    failure: Some(message),
                }
            }
        }
    }
}

async fn collect_output(handle: &ProcessHandle) -> (String, String) {
    (
        read_log(handle.stdout_log.as_deref()).await,
        read_log(handle.stderr_log.as_deref()).await,
    )
}

async fn read_log(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return String::new();
    };
    read_lossy(path).await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not read server log");
        String::new()
    })
}

fn report_output(sink: &mut dyn OutputSink, stdout: &str, stderr: &str) {
    for (name, value) in [(STDOUT_OUTPUT, stdout), (STDERR_OUTPUT, stderr)] {
        if let Err(e) = sink.set_output(name, value) {
            tracing::warn!(output = name, error = %e, "Failed to set output");
        }
    }
}
