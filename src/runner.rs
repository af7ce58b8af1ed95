use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;

use crate::command::{OutputHandler, SpawnCommand};
use crate::error::ProcessError;
use crate::invoked::{InvokedProcess, Limits};
use crate::result::ProcessResult;

/// Spawns real operating-system processes.
///
/// [`TokioProcessRunner`] is the production implementation; tests can
/// substitute their own to observe what would have been executed.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Spawn without waiting for exit.
    async fn start(
        &self,
        command: SpawnCommand,
        output_handler: Option<OutputHandler>,
    ) -> Result<InvokedProcess, ProcessError>;

    /// Spawn and wait for exit, streaming output through `output_handler`.
    async fn run(
        &self,
        command: SpawnCommand,
        output_handler: Option<OutputHandler>,
    ) -> Result<ProcessResult, ProcessError> {
        self.start(command, output_handler).await?.wait().await
    }
}

pub struct TokioProcessRunner;

impl TokioProcessRunner {
    /// Log command execution details
    fn log_command_start(command: &SpawnCommand) {
        tracing::debug!("Executing subprocess: {}", command.command_line());

        if !command.env.is_empty() {
            tracing::debug!(
                "Environment overrides count: {}, total size: {} bytes",
                command.env.len(),
                command
                    .env
                    .iter()
                    .map(|(k, v)| k.len() + v.len() + 2)
                    .sum::<usize>()
            );
            tracing::trace!("Environment overrides: {:?}", command.env);
        }

        tracing::trace!("Working directory: {:?}", command.working_dir);

        if let Some(ref input) = command.input {
            tracing::trace!("Stdin provided: {} bytes", input.len());
        }

        if command.timeout.is_some() || command.idle_timeout.is_some() {
            tracing::trace!(
                "Timeout: {:?}, idle timeout: {:?}",
                command.timeout,
                command.idle_timeout
            );
        }
    }

    /// Configure the command with environment, working directory and stdio
    fn configure_command(
        command: &SpawnCommand,
    ) -> Result<(tokio::process::Command, bool), ProcessError> {
        let (program, args) = command
            .program_and_args()
            .ok_or(ProcessError::MissingCommand)?;

        let mut cmd = tokio::process::Command::new(&program);
        cmd.args(&args);
        cmd.envs(&command.env);
        cmd.current_dir(&command.working_dir);

        let process_group = Self::apply_options(&mut cmd, command);
        Self::configure_stdio(&mut cmd, command);

        Ok((cmd, process_group))
    }

    /// Apply the spawn options this runner understands. Returns whether the
    /// child leads its own process group.
    fn apply_options(cmd: &mut tokio::process::Command, command: &SpawnCommand) -> bool {
        cmd.kill_on_drop(command.option_bool("kill_on_drop").unwrap_or(true));

        // A child in its own group cannot read from the controlling terminal.
        let process_group = command
            .option_bool("process_group")
            .unwrap_or(!command.tty);

        #[cfg(unix)]
        {
            if process_group {
                cmd.process_group(0);
            }
        }

        for key in command.options.keys() {
            if key != "kill_on_drop" && key != "process_group" {
                tracing::debug!("Spawn option '{}' is not used by the tokio runner", key);
            }
        }

        cfg!(unix) && process_group
    }

    /// Configure stdio pipes for the process
    fn configure_stdio(cmd: &mut tokio::process::Command, command: &SpawnCommand) {
        if command.tty {
            cmd.stdin(Stdio::inherit());
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
            return;
        }

        cmd.stdin(Stdio::piped());

        if command.quiet {
            cmd.stdout(Stdio::null());
            cmd.stderr(Stdio::null());
        } else {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        }
    }

    /// Idle time is measured from captured output, so it cannot apply when
    /// output is discarded or goes straight to the terminal.
    fn idle_timeout(command: &SpawnCommand) -> Option<Duration> {
        let idle_timeout = command.idle_timeout?;
        if command.quiet || command.tty {
            tracing::debug!(
                "Ignoring idle timeout of {:?} for uncaptured output: {}",
                idle_timeout,
                command.command_line()
            );
            return None;
        }
        Some(idle_timeout)
    }

    /// Map spawn error to ProcessError
    fn map_spawn_error(error: std::io::Error, command: &SpawnCommand) -> ProcessError {
        if error.kind() == std::io::ErrorKind::NotFound {
            let program = command
                .program_and_args()
                .map(|(program, _)| program)
                .unwrap_or_default();

            if let Ok(path) = std::env::var("PATH") {
                tracing::error!("Command '{}' not found. Parent process PATH: {}", program, path);
            }
            ProcessError::CommandNotFound(program)
        } else {
            tracing::error!(
                "Failed to spawn '{}': {:?} (kind: {:?})",
                command.command_line(),
                error,
                error.kind()
            );
            ProcessError::SpawnFailed {
                command: command.command_line(),
                source: error,
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn start(
        &self,
        command: SpawnCommand,
        output_handler: Option<OutputHandler>,
    ) -> Result<InvokedProcess, ProcessError> {
        Self::log_command_start(&command);

        let (mut cmd, process_group) = Self::configure_command(&command)?;
        let child = cmd
            .spawn()
            .map_err(|e| Self::map_spawn_error(e, &command))?;

        let limits = Limits {
            timeout: command.timeout,
            idle_timeout: Self::idle_timeout(&command),
            process_group,
        };

        let mut process = InvokedProcess::from_child(
            command.command_line(),
            child,
            limits,
            if command.quiet { None } else { output_handler },
        );

        if let Some(input) = command.input {
            process.feed_stdin(input);
        }

        Ok(process)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::command::{Command, OutputType};
    use crate::error::TimeoutKind;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn spawn(command: impl Into<Command>) -> SpawnCommand {
        SpawnCommand::new(command, std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_run_shell_command() {
        let result = TokioProcessRunner
            .run(spawn("echo hello; echo oops >&2"), None)
            .await
            .unwrap();

        assert!(result.successful());
        assert_eq!(result.output(), "hello\n");
        assert_eq!(result.error_output(), "oops\n");
        assert_eq!(result.command(), "echo hello; echo oops >&2");
    }

    #[tokio::test]
    async fn test_run_argv_command() {
        let result = TokioProcessRunner
            .run(spawn(["printf", "a b"]), None)
            .await
            .unwrap();

        assert_eq!(result.output(), "a b");
        assert_eq!(result.command(), "printf 'a b'");
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let result = TokioProcessRunner.run(spawn("exit 3"), None).await.unwrap();
        assert_eq!(result.exit_code(), Some(3));
        assert!(result.failed());
    }

    #[tokio::test]
    async fn test_command_not_found() {
        let result = TokioProcessRunner
            .run(spawn(["nonexistent-command-12345"]), None)
            .await;

        match result {
            Err(ProcessError::CommandNotFound(program)) => {
                assert_eq!(program, "nonexistent-command-12345")
            }
            other => panic!("Expected CommandNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_env_and_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut command = SpawnCommand::new("echo \"$GREETING\"; pwd", dir.path());
        command
            .env
            .insert("GREETING".to_string(), "hi there".to_string());

        let result = TokioProcessRunner.run(command, None).await.unwrap();
        let canonical = dir.path().canonicalize().unwrap();

        assert!(result.output().starts_with("hi there\n"));
        assert!(result.see_in_output(canonical.to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_input_is_written_to_stdin() {
        let mut command = spawn("cat");
        command.input = Some("piped input".to_string());

        let result = TokioProcessRunner.run(command, None).await.unwrap();
        assert_eq!(result.output(), "piped input");
    }

    #[tokio::test]
    async fn test_quiet_discards_output() {
        let mut command = spawn("echo loud");
        command.quiet = true;

        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let handler: OutputHandler = Box::new(move |_: OutputType, _: &str| {
            *counter.lock().unwrap() += 1;
        });

        let result = TokioProcessRunner.run(command, Some(handler)).await.unwrap();
        assert!(result.successful());
        assert_eq!(result.output(), "");
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_output_handler_sees_lines_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: OutputHandler = Box::new(move |kind: OutputType, text: &str| {
            sink.lock().unwrap().push((kind, text.to_string()));
        });

        TokioProcessRunner
            .run(spawn("echo one; echo two; echo three"), Some(handler))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        let lines: Vec<&str> = seen.iter().map(|(_, text)| text.as_str()).collect();
        assert_eq!(lines, vec!["one\n", "two\n", "three\n"]);
        assert!(seen.iter().all(|(kind, _)| *kind == OutputType::Stdout));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let mut command = spawn("echo started; sleep 5; echo never");
        command.timeout = Some(Duration::from_millis(300));

        let err = TokioProcessRunner.run(command, None).await.unwrap_err();
        match err {
            ProcessError::Timeout {
                kind,
                timeout,
                result,
            } => {
                assert_eq!(kind, TimeoutKind::Total);
                assert_eq!(timeout, Duration::from_millis(300));
                assert_eq!(result.output(), "started\n");
                assert_eq!(result.exit_code(), None);
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let mut command = spawn("echo tick; sleep 5");
        command.idle_timeout = Some(Duration::from_millis(300));

        let err = TokioProcessRunner.run(command, None).await.unwrap_err();
        match err {
            ProcessError::Timeout { kind, result, .. } => {
                assert_eq!(kind, TimeoutKind::Idle);
                assert_eq!(result.output(), "tick\n");
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_applies_while_input_is_unread() {
        let mut command = spawn("sleep 3");
        command.input = Some("x".repeat(1 << 20));
        command.timeout = Some(Duration::from_millis(300));

        let started = std::time::Instant::now();
        let err = TokioProcessRunner.run(command, None).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        match err {
            ProcessError::Timeout { kind, result, .. } => {
                assert_eq!(kind, TimeoutKind::Total);
                assert_eq!(result.exit_code(), None);
            }
            other => panic!("Expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unread_input_keeps_exit_code() {
        let mut command = spawn("echo done; exit 2");
        command.input = Some("x".repeat(1 << 20));

        let result = TokioProcessRunner.run(command, None).await.unwrap();
        assert_eq!(result.exit_code(), Some(2));
        assert_eq!(result.output(), "done\n");
    }

    #[tokio::test]
    async fn test_quiet_process_ignores_idle_timeout() {
        let mut command = spawn("sleep 0.5");
        command.quiet = true;
        command.idle_timeout = Some(Duration::from_millis(100));

        let result = TokioProcessRunner.run(command, None).await.unwrap();
        assert!(result.successful());
    }

    #[tokio::test]
    async fn test_start_and_poll() {
        let mut process = TokioProcessRunner
            .start(spawn("sleep 0.2; echo finished"), None)
            .await
            .unwrap();

        assert!(process.id().is_some());
        assert!(process.running());

        let result = process.wait().await.unwrap();
        assert!(result.successful());
        assert_eq!(result.output(), "finished\n");
    }

    #[tokio::test]
    async fn test_write_stdin_on_started_process() {
        let mut process = TokioProcessRunner.start(spawn("cat"), None).await.unwrap();

        process.write_stdin("first\n").await.unwrap();
        process.write_stdin("second\n").await.unwrap();

        let result = process.wait().await.unwrap();
        assert_eq!(result.output(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_signal_terminates_process() {
        let mut process = TokioProcessRunner
            .start(spawn(["sleep", "5"]), None)
            .await
            .unwrap();

        process.signal(15).unwrap();
        let result = process.wait().await.unwrap();

        assert_eq!(result.exit_code(), None);
        assert!(result.failed());
    }

    #[tokio::test]
    async fn test_latest_output() {
        let mut process = TokioProcessRunner
            .start(spawn("echo a; exec sleep 5"), None)
            .await
            .unwrap();

        let mut latest = String::new();
        for _ in 0..50 {
            latest = process.latest_output();
            if !latest.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(latest, "a\n");
        assert_eq!(process.latest_output(), "");
        assert_eq!(process.output(), "a\n");
        process.signal(9).unwrap();
        process.wait().await.unwrap();
    }
}
