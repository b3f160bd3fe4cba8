pub mod artifact;
pub mod config;
pub mod controller;
pub mod error;
pub mod launcher;
pub mod native;
pub mod probe;
pub mod report;
pub mod staging;
pub mod teardown;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::artifact::{HttpFetcher, ToolCacheDir};
use crate::config::{parse_bool_input, parse_port_input, Config};
use crate::controller::{Controller, RunInputs};
use crate::error::LaunchError;
use crate::report::{ActionsSink, OutputSink};
use crate::teardown::TeardownAgent;

/// Provision, launch and tear down a WireMock stub server for CI jobs.
#[derive(Parser)]
#[command(name = "mockd", version, about)]
struct Cli {
    /// Config file (defaults to ./mockd.toml when present)
    #[arg(long, global = true, env = "MOCKD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Stage stubs, start the server detached and wait until it answers
    Start(StartArgs),
    /// Stop the server recorded in the pid file
    Stop,
}

#[derive(Args, Debug)]
struct StartArgs {
    /// Directory of WireMock stub mappings
    #[arg(long, env = "INPUT_MAPPINGS-PATH")]
    mappings_path: PathBuf,

    /// Directory of response body files
    #[arg(long, env = "INPUT_FILES-PATH")]
    files_path: PathBuf,

    /// Port the server listens on (default 8080)
    #[arg(long, env = "INPUT_HTTP-PORT")]
    http_port: Option<String>,

    /// Start the server with --verbose
    #[arg(long, env = "INPUT_VERBOSE", num_args = 0..=1, default_missing_value = "true")]
    verbose: Option<String>,
}

impl StartArgs {
    /// Overlay invocation inputs on top of file/default config.
    fn apply(&self, config: &mut Config) -> Result<(), LaunchError> {
        if let Some(port) = parse_port_input(self.http_port.as_deref())? {
            config.launch.http_port = port;
        }
        if let Some(verbose) = parse_bool_input(self.verbose.as_deref())? {
            config.launch.verbose = verbose;
        }
        config.validate()
    }

    fn inputs(&self) -> RunInputs {
        RunInputs {
            mappings_path: self.mappings_path.clone(),
            files_path: self.files_path.clone(),
        }
    }
}

/// Default log directive, following the merged `launch.verbose` setting.
fn log_directive(config: Option<&Config>) -> &'static str {
    match config {
        Some(config) if config.launch.verbose => "mockd=debug",
        _ => "mockd=info",
    }
}

fn init_tracing(config: Option<&Config>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directive(config)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match &cli.cmd {
        Cmd::Start(args) => {
            let config = load_start_config(cli.config.as_deref(), args);
            init_tracing(config.as_ref().ok());
            Ok(start(config, args).await)
        }
        Cmd::Stop => {
            let config = Config::load(cli.config.as_deref());
            init_tracing(config.as_ref().ok());
            stop(config).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn start(config: Result<Config, LaunchError>, args: &StartArgs) -> ExitCode {
    let mut sink = ActionsSink::from_env();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            sink.set_failed(&e.to_string());
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        artifact = %config.artifact.name,
        version = %config.artifact.version,
        port = config.launch.http_port,
        "Starting mockd"
    );

    let cache = ToolCacheDir::new(config.cache.root());
    let fetcher = match HttpFetcher::new(config.cache.temp_dir()) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            sink.set_failed(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let outcome = Controller::new(&config, &cache, &fetcher)
        .run(&args.inputs(), &mut sink)
        .await;

    tracing::debug!(
        phase = %outcome.phase,
        stdout_bytes = outcome.stdout.len(),
        stderr_bytes = outcome.stderr.len(),
        failure = outcome.failure.as_deref().unwrap_or(""),
        "Run finished"
    );
    if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn load_start_config(
    config_path: Option<&std::path::Path>,
    args: &StartArgs,
) -> Result<Config, LaunchError> {
    let mut config = Config::load(config_path).map_err(|e| LaunchError::Config(e.to_string()))?;
    args.apply(&mut config)?;
    Ok(config)
}

async fn stop(config: anyhow::Result<Config>) {
    let config = config.unwrap_or_else(|err| {
        tracing::warn!("Failed to load config ({}). Using defaults.", err);
        Config::default()
    });
    TeardownAgent::new(&config.launch, &config.teardown)
        .shutdown()
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_args(argv: &[&str]) -> StartArgs {
        let mut full = vec!["mockd", "start"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().cmd {
            Cmd::Start(args) => args,
            Cmd::Stop => panic!("expected start"),
        }
    }

    #[test]
    fn test_cli_parses_start() {
        let args = start_args(&[
            "--mappings-path",
            "stubs/mappings",
            "--files-path",
            "stubs/__files",
            "--http-port",
            "9090",
            "--verbose",
        ]);
        let mut config = Config::default();
        args.apply(&mut config).unwrap();

        assert_eq!(config.launch.http_port, 9090);
        assert!(config.launch.verbose);
        assert_eq!(args.inputs().mappings_path, PathBuf::from("stubs/mappings"));
        assert_eq!(args.inputs().files_path, PathBuf::from("stubs/__files"));
    }

    #[test]
    fn test_cli_defaults() {
        let args = start_args(&["--mappings-path", "m", "--files-path", "f"]);
        let mut config = Config::default();
        args.apply(&mut config).unwrap();

        assert_eq!(config.launch.http_port, 8080);
        assert!(!config.launch.verbose);
        assert_eq!(log_directive(Some(&config)), "mockd=info");
    }

    #[test]
    fn test_verbose_from_config_file_raises_log_level() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mockd.toml");
        std::fs::write(&path, "[launch]\nverbose = true\n").unwrap();

        let args = start_args(&["--mappings-path", "m", "--files-path", "f"]);
        let config = load_start_config(Some(&path), &args).unwrap();

        assert!(config.launch.verbose);
        assert_eq!(log_directive(Some(&config)), "mockd=debug");
        assert_eq!(log_directive(None), "mockd=info");
    }

    #[test]
    fn test_cli_explicit_false_verbose() {
        let args = start_args(&["--mappings-path", "m", "--files-path", "f", "--verbose", "false"]);
        let mut config = Config::default();
        config.launch.verbose = true;
        args.apply(&mut config).unwrap();
        assert!(!config.launch.verbose);
    }

    #[test]
    fn test_cli_rejects_bad_port() {
        let args = start_args(&["--mappings-path", "m", "--files-path", "f", "--http-port", "nope"]);
        let err = args.apply(&mut Config::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::Config);
    }

    #[test]
    fn test_cli_parses_stop() {
        let cli = Cli::try_parse_from(["mockd", "stop", "--config", "ci/mockd.toml"]).unwrap();
        assert!(matches!(cli.cmd, Cmd::Stop));
        assert_eq!(cli.config, Some(PathBuf::from("ci/mockd.toml")));
    }
}
