//! Handle to a real, asynchronously running child process.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::command::{OutputHandler, OutputType};
use crate::error::{ProcessError, TimeoutKind};
use crate::result::ProcessResult;

/// How long to wait for the output pipes to close after the process is gone.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct CapturedOutput {
    stdout: String,
    stderr: String,
    latest_stdout: usize,
    latest_stderr: usize,
    last_activity: Instant,
}

impl CapturedOutput {
    fn new() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            latest_stdout: 0,
            latest_stderr: 0,
            last_activity: Instant::now(),
        }
    }

    fn push(&mut self, kind: OutputType, chunk: &str) {
        match kind {
            OutputType::Stdout => self.stdout.push_str(chunk),
            OutputType::Stderr => self.stderr.push_str(chunk),
        }
        self.last_activity = Instant::now();
    }
}

/// Limits applied while waiting on a process.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Limits {
    pub timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub process_group: bool,
}

pub struct InvokedProcess {
    command: String,
    child: Child,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    captured: Arc<Mutex<CapturedOutput>>,
    collector: Option<JoinHandle<()>>,
    readers: Vec<JoinHandle<()>>,
    feeder: Option<JoinHandle<()>>,
    started: Instant,
    limits: Limits,
    exit_status: Option<std::process::ExitStatus>,
}

impl InvokedProcess {
    /// Take ownership of a freshly spawned child and start streaming its output.
    pub(crate) fn from_child(
        command: String,
        mut child: Child,
        limits: Limits,
        output_handler: Option<OutputHandler>,
    ) -> Self {
        let captured = Arc::new(Mutex::new(CapturedOutput::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, OutputType::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, OutputType::Stderr, tx.clone()));
        }
        drop(tx);

        let collector = spawn_collector(rx, Arc::clone(&captured), output_handler);

        Self {
            command,
            pid: child.id(),
            stdin: child.stdin.take(),
            child,
            captured,
            collector: Some(collector),
            readers,
            feeder: None,
            started: Instant::now(),
            limits,
            exit_status: None,
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn command_line(&self) -> &str {
        &self.command
    }

    /// Non-blocking check whether the process is still alive.
    pub fn running(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::debug!("Failed to poll process '{}': {}", self.command, e);
                false
            }
        }
    }

    /// Standard output captured so far.
    pub fn output(&self) -> String {
        self.captured().stdout.clone()
    }

    pub fn error_output(&self) -> String {
        self.captured().stderr.clone()
    }

    /// Standard output captured since the previous call.
    pub fn latest_output(&mut self) -> String {
        let mut captured = self.captured();
        let latest = captured.stdout[captured.latest_stdout..].to_string();
        captured.latest_stdout = captured.stdout.len();
        latest
    }

    pub fn latest_error_output(&mut self) -> String {
        let mut captured = self.captured();
        let latest = captured.stderr[captured.latest_stderr..].to_string();
        captured.latest_stderr = captured.stderr.len();
        latest
    }

    pub async fn write_stdin(&mut self, data: &str) -> Result<(), ProcessError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin is closed")
        })?;
        stdin.write_all(data.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    pub fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Write `input` to stdin from a background task, then close it.
    ///
    /// The child exiting before it reads everything ends the input early
    /// rather than failing the process.
    pub(crate) fn feed_stdin(&mut self, input: String) {
        let Some(mut stdin) = self.stdin.take() else {
            tracing::debug!("No stdin pipe to feed for '{}'", self.command);
            return;
        };
        let command = self.command.clone();

        self.feeder = Some(tokio::spawn(async move {
            let written = match stdin.write_all(input.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!("'{}' closed stdin before reading all input", command);
                }
                Err(e) => {
                    tracing::warn!("Failed to write stdin of '{}': {}", command, e);
                }
            }
        }));
    }

    /// Send `signal` to the process.
    #[cfg(unix)]
    pub fn signal(&mut self, signal: i32) -> Result<(), ProcessError> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = self.pid.ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "process has no pid")
        })?;
        let signal = Signal::try_from(signal).map_err(std::io::Error::from)?;

        tracing::debug!("Sending {:?} to process {}: {}", signal, pid, self.command);
        kill(Pid::from_raw(pid as i32), signal).map_err(std::io::Error::from)?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn signal(&mut self, _signal: i32) -> Result<(), ProcessError> {
        self.child.start_kill()?;
        Ok(())
    }

    /// Wait for the process to exit, enforcing the configured timeouts.
    ///
    /// Stdin is closed first. On timeout the process is killed and the
    /// error carries everything captured up to that point.
    pub async fn wait(mut self) -> Result<ProcessResult, ProcessError> {
        self.close_stdin();

        let status = loop {
            if let Some(status) = self.exit_status {
                break status;
            }

            let Some(deadline) = self.next_deadline() else {
                break self.child.wait().await?;
            };

            let exited = tokio::select! {
                status = self.child.wait() => Some(status?),
                _ = tokio::time::sleep_until(deadline) => None,
            };

            if let Some(status) = exited {
                break status;
            }

            if let Some((kind, limit)) = self.expired_timeout() {
                return Err(self.terminate(kind, limit).await);
            }
        };

        self.stop_feeder();
        self.drain_output().await;
        let result = self.build_result(status.code());
        log_exit(&result, status, self.started.elapsed());
        Ok(result)
    }

    fn captured(&self) -> MutexGuard<'_, CapturedOutput> {
        self.captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_deadline(&self) -> Option<Instant> {
        let total = self.limits.timeout.map(|limit| self.started + limit);
        let idle = self
            .limits
            .idle_timeout
            .map(|limit| self.captured().last_activity + limit);

        match (total, idle) {
            (Some(total), Some(idle)) => Some(total.min(idle)),
            (total, idle) => total.or(idle),
        }
    }

    fn expired_timeout(&self) -> Option<(TimeoutKind, Duration)> {
        let now = Instant::now();
        if let Some(limit) = self.limits.timeout {
            if now >= self.started + limit {
                return Some((TimeoutKind::Total, limit));
            }
        }
        if let Some(limit) = self.limits.idle_timeout {
            if now >= self.captured().last_activity + limit {
                return Some((TimeoutKind::Idle, limit));
            }
        }
        None
    }

    async fn terminate(&mut self, kind: TimeoutKind, limit: Duration) -> ProcessError {
        tracing::warn!(
            "Process exceeded its {} of {:?}, killing: {}",
            kind,
            limit,
            self.command
        );

        self.stop_feeder();
        self.kill_process_group();
        if let Err(e) = self.child.kill().await {
            tracing::debug!("Failed to kill process '{}': {}", self.command, e);
        }

        self.drain_output().await;
        ProcessError::Timeout {
            kind,
            timeout: limit,
            result: Box::new(self.build_result(None)),
        }
    }

    fn stop_feeder(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }

    #[cfg(unix)]
    fn kill_process_group(&self) {
        if !self.limits.process_group {
            return;
        }
        if let Some(pid) = self.pid {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                tracing::trace!("killpg({}) failed: {}", pid, e);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill_process_group(&self) {}

    async fn drain_output(&mut self) {
        let Some(collector) = self.collector.take() else {
            return;
        };

        if tokio::time::timeout(OUTPUT_DRAIN_GRACE, collector)
            .await
            .is_err()
        {
            tracing::warn!(
                "Output pipes of '{}' stayed open after exit; abandoning readers",
                self.command
            );
            for reader in &self.readers {
                reader.abort();
            }
        }
    }

    fn build_result(&self, exit_code: Option<i32>) -> ProcessResult {
        let captured = self.captured();
        ProcessResult::new(
            self.command.clone(),
            exit_code,
            captured.stdout.clone(),
            captured.stderr.clone(),
        )
    }
}

impl fmt::Debug for InvokedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokedProcess")
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("limits", &self.limits)
            .field("exit_status", &self.exit_status)
            .finish_non_exhaustive()
    }
}

/// Read `stream` line by line, keeping line endings, until EOF.
fn spawn_reader<R>(
    stream: R,
    kind: OutputType,
    tx: mpsc::UnboundedSender<(OutputType, String)>,
) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let chunk = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send((kind, chunk)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("Error reading {:?}: {}", kind, e);
                    break;
                }
            }
        }
    })
}

/// Append chunks in arrival order and forward them to the output handler.
fn spawn_collector(
    mut rx: mpsc::UnboundedReceiver<(OutputType, String)>,
    captured: Arc<Mutex<CapturedOutput>>,
    mut output_handler: Option<OutputHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((kind, chunk)) = rx.recv().await {
            captured
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(kind, &chunk);
            if let Some(handler) = output_handler.as_mut() {
                handler(kind, &chunk);
            }
        }
    })
}

fn log_exit(result: &ProcessResult, status: std::process::ExitStatus, elapsed: Duration) {
    match result.exit_code() {
        Some(0) => {
            tracing::debug!(
                "Subprocess completed successfully in {:?}: {}",
                elapsed,
                result.command()
            );
            tracing::trace!("Stdout length: {} bytes", result.output().len());
            tracing::trace!("Stderr length: {} bytes", result.error_output().len());
        }
        Some(code) => {
            tracing::debug!(
                "Subprocess failed with exit code {} in {:?}: {}",
                code,
                elapsed,
                result.command()
            );
            if !result.error_output().is_empty() {
                tracing::trace!("Stderr: {}", result.error_output());
            }
        }
        None => {
            tracing::warn!(
                "Subprocess terminated without exit code ({}) in {:?}: {}",
                status,
                elapsed,
                result.command()
            );
        }
    }
}
