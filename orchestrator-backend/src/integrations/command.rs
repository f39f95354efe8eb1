//! External program execution for the CLI fee transport.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::error::OrchestratorError;

const UNSUPPORTED_FLAG_MARKERS: [&str; 3] = [
    "flag provided but not defined",
    "unknown option",
    "unrecognized option",
];

#[derive(Error, Debug)]
pub enum CommandError {
    /// The program rejected one of its arguments as an unknown flag
    #[error("{program} rejected a flag: {detail}")]
    UnsupportedFlag { program: String, detail: String },

    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<CommandError> for OrchestratorError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::UnsupportedFlag { program, detail } => OrchestratorError::CapabilityMismatch {
                program,
                flag: detail,
            },
            CommandError::Failed { program, code, stderr } => OrchestratorError::api(
                &program,
                None,
                format!("exit code {}: {}", code.map(|c| c.to_string()).unwrap_or_else(|| "?".into()), stderr),
            ),
            CommandError::Spawn { source, .. } => OrchestratorError::Io(source),
        }
    }
}

/// Whether program output says an argument is not a known flag
pub fn is_unsupported_flag(output: &str) -> bool {
    let lower = output.to_lowercase();
    UNSUPPORTED_FLAG_MARKERS.iter().any(|m| lower.contains(m))
}

/// Split a configured command path on whitespace (`docker exec lnd lncli` -> 4 words).
pub fn split_command(path: &str, default: &str) -> Vec<String> {
    let parts: Vec<String> = path.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        vec![default.to_string()]
    } else {
        parts
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv` to completion and return trimmed stdout
    async fn run(&self, argv: &[String]) -> Result<String, CommandError>;
}

/// Runs commands as child processes
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[String]) -> Result<String, CommandError> {
        let program = argv.first().cloned().unwrap_or_default();
        let output = Command::new(&program)
            .args(argv.get(1..).unwrap_or(&[]))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            return Ok(stdout);
        }
        if is_unsupported_flag(&stderr) || is_unsupported_flag(&stdout) {
            let detail = if stderr.is_empty() { stdout } else { stderr };
            return Err(CommandError::UnsupportedFlag { program, detail });
        }
        Err(CommandError::Failed {
            program,
            code: output.status.code(),
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_flag_markers() {
        assert!(is_unsupported_flag("flag provided but not defined: -format"));
        assert!(is_unsupported_flag("error: Unknown option '--set-inbound-rate-discount'"));
        assert!(is_unsupported_flag("unrecognized option --x"));
        assert!(!is_unsupported_flag("connection refused"));
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("docker exec lnd lncli", "lncli"), vec!["docker", "exec", "lnd", "lncli"]);
        assert_eq!(split_command("   ", "bos"), vec!["bos"]);
    }

    #[tokio::test]
    async fn test_process_runner_spawn_failure() {
        let argv = vec!["definitely-not-a-real-binary-xyz".to_string()];
        let err = ProcessRunner.run(&argv).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
