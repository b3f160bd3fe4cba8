// Runtime configuration for mockd.
//
// Built once per invocation from (lowest to highest precedence):
//   built-in defaults < mockd.toml < CLI flags / INPUT_* env vars
// and passed by reference through every pipeline stage.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::LaunchError;

/// Config file picked up from the invocation directory when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "mockd.toml";

pub const DEFAULT_WIREMOCK_VERSION: &str = "2.26.3";
pub const DEFAULT_URL_TEMPLATE: &str = "https://repo1.maven.org/maven2/com/github/tomakehurst/wiremock-standalone/{version}/wiremock-standalone-{version}.jar";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub artifact: ArtifactConfig,
    pub cache: CacheConfig,
    pub launch: LaunchConfig,
    pub probe: ProbeConfig,
    pub teardown: TeardownConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ArtifactConfig {
    pub name: String,
    pub version: String,
    /// Download location; `{name}` and `{version}` are substituted.
    pub url_template: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            name: "wiremock".to_string(),
            version: DEFAULT_WIREMOCK_VERSION.to_string(),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
        }
    }
}

impl ArtifactConfig {
    pub fn download_url(&self, name: &str, version: &str) -> String {
        self.url_template
            .replace("{name}", name)
            .replace("{version}", version)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Tool cache root. Falls back to `$RUNNER_TOOL_CACHE`, then the OS temp dir.
    pub dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn root(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        match std::env::var_os("RUNNER_TOOL_CACHE") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::temp_dir().join("mockd-tool-cache"),
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        match std::env::var_os("RUNNER_TEMP") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LaunchConfig {
    /// Base directory for staging, persisted state and the server's `--root-dir`.
    pub work_dir: PathBuf,
    pub program: String,
    /// Arguments placed between `program` and the artifact path.
    pub program_args: Vec<String>,
    pub http_port: u16,
    pub verbose: bool,
    /// Redirect the server's stdout/stderr to the log files; otherwise discard them.
    pub capture_output: bool,
    pub pid_file: PathBuf,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            program: "java".to_string(),
            program_args: vec!["-jar".to_string()],
            http_port: 8080,
            verbose: false,
            capture_output: true,
            pid_file: PathBuf::from("wiremock.pid"),
            stdout_log: PathBuf::from("out.log"),
            stderr_log: PathBuf::from("err.log"),
        }
    }
}

impl LaunchConfig {
    pub fn pid_file_path(&self) -> PathBuf {
        self.work_dir.join(&self.pid_file)
    }

    pub fn stdout_log_path(&self) -> PathBuf {
        self.work_dir.join(&self.stdout_log)
    }

    pub fn stderr_log_path(&self) -> PathBuf {
        self.work_dir.join(&self.stderr_log)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    pub host: String,
    /// Health-check route; also the URL of the staged ping mapping.
    pub path: String,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            path: "/__mockd_ping".to_string(),
            max_attempts: 10,
            initial_backoff_ms: 500,
            max_backoff_ms: 5000,
            request_timeout_ms: 2000,
        }
    }
}

impl ProbeConfig {
    pub fn url(&self, port: u16) -> String {
        format!("http://{}:{}{}", self.host, port, self.path)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TeardownConfig {
    /// Delay after SIGTERM so the server can flush its output. Best-effort only.
    pub grace_period_ms: u64,
    pub print_logs: bool,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 1000,
            print_logs: true,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config TOML {}: {}", path.display(), e))
    }

    /// Load an explicit config file, or `mockd.toml` if present, or defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::load_from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from_file(DEFAULT_CONFIG_PATH)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.artifact.name.trim().is_empty() {
            return Err(LaunchError::Config("artifact.name cannot be empty".into()));
        }
        if self.artifact.version.trim().is_empty() {
            return Err(LaunchError::Config("artifact.version cannot be empty".into()));
        }
        if self.launch.program.trim().is_empty() {
            return Err(LaunchError::Config("launch.program cannot be empty".into()));
        }
        if self.launch.http_port == 0 {
            return Err(LaunchError::Config("http-port must be between 1 and 65535".into()));
        }
        if self.probe.max_attempts == 0 {
            return Err(LaunchError::Config("probe.max_attempts must be at least 1".into()));
        }
        if !self.probe.path.starts_with('/') {
            return Err(LaunchError::Config(format!(
                "probe.path must start with '/': {}",
                self.probe.path
            )));
        }
        Ok(())
    }
}

/// Parse an optional `http-port` input. Empty means "use the default".
pub fn parse_port_input(raw: Option<&str>) -> Result<Option<u16>, LaunchError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .map(Some)
            .ok_or_else(|| LaunchError::Config(format!("Invalid http-port: {}", value))),
    }
}

/// Parse an optional boolean input the way Actions passes them (`true`/`false`).
pub fn parse_bool_input(raw: Option<&str>) -> Result<Option<bool>, LaunchError> {
    match raw.map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => match v.as_str() {
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(LaunchError::Config(format!("Invalid boolean input: {}", v))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.launch.http_port, 8080);
        assert!(!config.launch.verbose);
        assert_eq!(config.launch.pid_file_path(), PathBuf::from("./wiremock.pid"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_download_url_substitutes_version() {
        let artifact = ArtifactConfig::default();
        assert_eq!(
            artifact.download_url(&artifact.name, &artifact.version),
            "https://repo1.maven.org/maven2/com/github/tomakehurst/wiremock-standalone/2.26.3/wiremock-standalone-2.26.3.jar"
        );
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
        [launch]
        http_port = 9090
        verbose = true

        [probe]
        max_attempts = 3
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.launch.http_port, 9090);
        assert!(config.launch.verbose);
        assert_eq!(config.launch.program, "java");
        assert_eq!(config.probe.max_attempts, 3);
        assert_eq!(config.probe.path, "/__mockd_ping");
        assert_eq!(config.teardown.grace_period_ms, 1000);
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.probe.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.launch.http_port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.probe.path = "ping".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_port_input() {
        assert_eq!(parse_port_input(None).unwrap(), None);
        assert_eq!(parse_port_input(Some("")).unwrap(), None);
        assert_eq!(parse_port_input(Some(" 9000 ")).unwrap(), Some(9000));
        assert!(parse_port_input(Some("0")).is_err());
        assert!(parse_port_input(Some("http")).is_err());
        assert!(parse_port_input(Some("70000")).is_err());
    }

    #[test]
    fn test_parse_bool_input() {
        assert_eq!(parse_bool_input(None).unwrap(), None);
        assert_eq!(parse_bool_input(Some("")).unwrap(), None);
        assert_eq!(parse_bool_input(Some("TRUE")).unwrap(), Some(true));
        assert_eq!(parse_bool_input(Some("false")).unwrap(), Some(false));
        assert!(parse_bool_input(Some("maybe")).is_err());
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/mockd.toml")));
        assert!(result.is_err());
    }
}
