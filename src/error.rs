use std::fmt;
use std::path::PathBuf;

/// Coarse classification of a pipeline failure, used by the controller and by
/// the invoking automation to tell failure modes apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Config,
    Acquisition,
    Staging,
    Spawn,
    ReadinessTimeout,
    Transport,
    Teardown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Config => "config",
            FailureKind::Acquisition => "acquisition",
            FailureKind::Staging => "staging",
            FailureKind::Spawn => "spawn",
            FailureKind::ReadinessTimeout => "readiness-timeout",
            FailureKind::Transport => "transport",
            FailureKind::Teardown => "teardown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to acquire {name} {version}: {source}")]
    Acquisition {
        name: String,
        version: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to stage {}: {source}", .path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Server not ready after {attempts} attempts at {url}{}", last_failure_suffix(.last_failure))]
    ReadinessTimeout {
        url: String,
        attempts: u32,
        last_failure: Option<String>,
    },

    #[error("Readiness probe failed at {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Teardown failed: {0:#}")]
    Teardown(#[source] anyhow::Error),
}

fn last_failure_suffix(last: &Option<String>) -> String {
    match last {
        Some(reason) => format!(" (last failure: {})", reason),
        None => String::new(),
    }
}

impl LaunchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LaunchError::Config(_) => FailureKind::Config,
            LaunchError::Acquisition { .. } => FailureKind::Acquisition,
            LaunchError::Staging { .. } => FailureKind::Staging,
            LaunchError::Spawn { .. } => FailureKind::Spawn,
            LaunchError::ReadinessTimeout { .. } => FailureKind::ReadinessTimeout,
            LaunchError::Transport { .. } => FailureKind::Transport,
            LaunchError::Teardown(_) => FailureKind::Teardown,
        }
    }

    pub fn staging(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        LaunchError::Staging {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_timeout_message_includes_last_failure() {
        let err = LaunchError::ReadinessTimeout {
            url: "http://localhost:8080/__mockd_ping".into(),
            attempts: 3,
            last_failure: Some("connection refused".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("connection refused"));
        assert_eq!(err.kind(), FailureKind::ReadinessTimeout);
    }

    #[test]
    fn test_acquisition_message_carries_cause() {
        let err = LaunchError::Acquisition {
            name: "wiremock".into(),
            version: "2.26.3".into(),
            source: anyhow::anyhow!("HTTP 404"),
        };
        assert_eq!(err.to_string(), "Failed to acquire wiremock 2.26.3: HTTP 404");
        assert_eq!(err.kind().to_string(), "acquisition");
    }
}
