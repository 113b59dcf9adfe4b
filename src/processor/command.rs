//! Runs a hook's command as a subprocess.
//!
//! The command is resolved against the hook's working directory, run with the
//! hook's arguments, and its combined output logged under the request ID.
//! Failures are logged and never retried.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use crate::types::{Hook, HookEvent, Request};

use super::EventProcessor;

/// Errors from running a hook command.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The hook has no command configured.
    #[error("hook {hook} has no command to execute")]
    NoCommand { hook: String },

    /// The command could not be found.
    #[error("command not found: {command}")]
    CommandNotFound {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command could not be started or waited on.
    #[error("failed to run {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited unsuccessfully.
    #[error("command {command} exited with {status}")]
    Failed {
        command: String,
        status: ExitStatus,
        output: String,
    },
}

/// Result type for command execution.
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Event processor that executes the hook's command.
///
/// The child process receives `HOOK_ID` and `HOOK_REQUEST_ID` in its
/// environment on top of the inherited one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandProcessor;

impl CommandProcessor {
    pub fn new() -> Self {
        CommandProcessor
    }

    /// Runs the hook's command and returns its combined stdout and stderr.
    #[instrument(skip_all, fields(hook = %hook.id, request = %request.id))]
    pub async fn run(&self, hook: &Hook, request: &Request) -> Result<String> {
        if hook.execute_command.is_empty() {
            return Err(ProcessError::NoCommand {
                hook: hook.id.to_string(),
            });
        }

        let program = resolve_command(&hook.execute_command, hook.working_directory.as_deref());

        let mut cmd = Command::new(&program);
        cmd.args(&hook.arguments)
            .env("HOOK_ID", hook.id.as_str())
            .env("HOOK_REQUEST_ID", request.id.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &hook.working_directory {
            cmd.current_dir(dir);
        }

        info!(
            command = %program.display(),
            arguments = ?hook.arguments,
            cwd = ?hook.working_directory,
            "Executing hook command"
        );

        let output = cmd.output().await.map_err(|source| {
            let command = hook.execute_command.clone();
            if source.kind() == std::io::ErrorKind::NotFound {
                if command.contains(' ') {
                    warn!(
                        command = %command,
                        "Command contains a space; pass arguments via `arguments`"
                    );
                }
                ProcessError::CommandNotFound { command, source }
            } else {
                ProcessError::Io { command, source }
            }
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!(output = %combined, "Command output");

        if !output.status.success() {
            return Err(ProcessError::Failed {
                command: hook.execute_command.clone(),
                status: output.status,
                output: combined,
            });
        }

        Ok(combined)
    }
}

impl EventProcessor for CommandProcessor {
    async fn apply(&self, event: HookEvent) {
        match self.run(&event.hook, &event.request).await {
            Ok(_) => info!(
                hook = %event.hook_id(),
                request = %event.request_id(),
                "Finished handling hook"
            ),
            Err(e) => error!(
                hook = %event.hook_id(),
                request = %event.request_id(),
                error = %e,
                "Hook command failed"
            ),
        }
    }
}

/// Resolves the program to spawn.
///
/// Absolute commands are used as is. A relative command is joined onto the
/// working directory when it names a path there; a bare name that does not
/// exist in the working directory is left for `PATH` lookup.
fn resolve_command(command: &str, working_directory: Option<&Path>) -> PathBuf {
    let path = Path::new(command);
    match working_directory {
        Some(dir) if !path.is_absolute() => {
            let joined = dir.join(path);
            if joined.exists() || path.components().count() > 1 {
                joined
            } else {
                path.to_path_buf()
            }
        }
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absolute_command_is_used_as_is() {
        let resolved = resolve_command("/bin/sh", Some(Path::new("/srv/hooks")));
        assert_eq!(resolved, PathBuf::from("/bin/sh"));
    }

    #[test]
    fn relative_path_joins_working_directory() {
        let resolved = resolve_command("scripts/deploy.sh", Some(Path::new("/srv/hooks")));
        assert_eq!(resolved, PathBuf::from("/srv/hooks/scripts/deploy.sh"));
    }

    #[test]
    fn bare_name_missing_from_working_directory_uses_path() {
        let dir = tempdir().unwrap();
        let resolved = resolve_command("sh", Some(dir.path()));
        assert_eq!(resolved, PathBuf::from("sh"));
    }

    #[test]
    fn bare_name_present_in_working_directory_is_joined() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("deploy"), "#!/bin/sh\n").unwrap();

        let resolved = resolve_command("deploy", Some(dir.path()));
        assert_eq!(resolved, dir.path().join("deploy"));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let hook = Hook::new("noop", "");
        let err = CommandProcessor::new()
            .run(&hook, &Request::new("r1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::NoCommand { .. }));
    }

    #[tokio::test]
    async fn missing_command_is_not_found() {
        let hook = Hook::new("missing", "/definitely/not/a/real/command");
        let err = CommandProcessor::new()
            .run(&hook, &Request::new("r1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::CommandNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_combined_output() {
        let hook = Hook::new("echo", "sh").with_arguments(["-c", "echo out; echo err >&2"]);
        let output = CommandProcessor::new()
            .run(&hook, &Request::new("r1"))
            .await
            .unwrap();

        assert_eq!(output, "out\nerr\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exposes_hook_and_request_ids_in_environment() {
        let hook =
            Hook::new("env-hook", "sh").with_arguments(["-c", "echo $HOOK_ID:$HOOK_REQUEST_ID"]);
        let output = CommandProcessor::new()
            .run(&hook, &Request::new("req-7"))
            .await
            .unwrap();

        assert_eq!(output.trim(), "env-hook:req-7");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempdir().unwrap();
        let hook = Hook::new("pwd", "sh")
            .with_arguments(["-c", "pwd -P"])
            .with_working_directory(dir.path());

        let output = CommandProcessor::new()
            .run(&hook, &Request::new("r1"))
            .await
            .unwrap();

        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(PathBuf::from(output.trim()), expected);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_failure_with_output() {
        let hook = Hook::new("fail", "sh").with_arguments(["-c", "echo boom; exit 3"]);
        let err = CommandProcessor::new()
            .run(&hook, &Request::new("r1"))
            .await
            .unwrap_err();

        match err {
            ProcessError::Failed { status, output, .. } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(output, "boom\n");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn apply_swallows_failures() {
        let hook = Hook::new("fail", "sh").with_arguments(["-c", "exit 1"]);
        let event = HookEvent::new(hook, Request::new("r1"));

        CommandProcessor::new().apply(event).await;
    }
}
