// Output reporting towards the invoking automation.
//
// Outputs go to the file named by $GITHUB_OUTPUT using the multi-line
// `name<<delimiter` format. Without it (local runs) they are printed to stdout.
// Failures are raised as an `::error::` workflow command; the process exit code
// is set by main.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

pub const STDOUT_OUTPUT: &str = "wiremock-stdout";
pub const STDERR_OUTPUT: &str = "wiremock-stderr";

pub trait OutputSink {
    fn set_output(&mut self, name: &str, value: &str) -> anyhow::Result<()>;
    fn set_failed(&mut self, message: &str);
}

pub struct ActionsSink {
    output_file: Option<PathBuf>,
}

impl ActionsSink {
    pub fn from_env() -> Self {
        let output_file = std::env::var_os("GITHUB_OUTPUT")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self { output_file }
    }

    pub fn with_output_file(path: impl Into<PathBuf>) -> Self {
        Self {
            output_file: Some(path.into()),
        }
    }
}

/// Render one output in the `$GITHUB_OUTPUT` heredoc format.
pub fn format_output(name: &str, value: &str, delimiter: &str) -> anyhow::Result<String> {
    if name.contains(delimiter) || value.contains(delimiter) {
        anyhow::bail!("Output {} collides with delimiter {}", name, delimiter);
    }
    Ok(format!("{}<<{}\n{}\n{}\n", name, delimiter, value, delimiter))
}

/// Escape a message for a workflow command (`%`, CR and LF are significant).
fn escape_command_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

impl OutputSink for ActionsSink {
    fn set_output(&mut self, name: &str, value: &str) -> anyhow::Result<()> {
        match &self.output_file {
            Some(path) => {
                let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4());
                let entry = format_output(name, value, &delimiter)?;
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| anyhow::anyhow!("Output file open failed ({}): {}", path.display(), e))?;
                file.write_all(entry.as_bytes())
                    .map_err(|e| anyhow::anyhow!("Output write failed: {}", e))?;
            }
            None => {
                println!("{}:", name);
                println!("{}", value);
            }
        }
        Ok(())
    }

    fn set_failed(&mut self, message: &str) {
        println!("::error::{}", escape_command_data(message));
    }
}
