//! The fluent process builder.
//!
//! A [`PendingProcess`] accumulates how a command should run, then either
//! runs it to completion or starts it and hands back a handle. Before
//! touching the OS it renders the canonical command line and checks the
//! registered fakes in declaration order; the first matching pattern
//! supplies a scripted outcome instead.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::command::{Command, OutputHandler, OutputType, SpawnCommand};
use crate::config::{ProcessConfig, ShellConfig};
use crate::error::ProcessError;
use crate::fake::{resolve_outcome, FakeHandler, FakeInvokedProcess, FakeOutcome};
use crate::invoked::InvokedProcess;
use crate::matcher::{first_match, CommandMatcher, WildcardMatcher};
use crate::recorder::{NoopRecorder, ProcessRecorder};
use crate::result::ProcessResult;
use crate::runner::{ProcessRunner, TokioProcessRunner};

/// Everything configured on a builder, snapshotted into recordings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    pub command: Option<Command>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub env: HashMap<String, String>,
    pub input: Option<String>,
    pub quiet: bool,
    pub tty: bool,
    pub options: BTreeMap<String, Value>,
}

#[derive(Clone)]
pub struct PendingProcess {
    invocation: Invocation,
    shell: ShellConfig,
    fake_handlers: Vec<(String, FakeHandler)>,
    matcher: Arc<dyn CommandMatcher>,
    runner: Arc<dyn ProcessRunner>,
    recorder: Arc<dyn ProcessRecorder>,
}

impl Default for PendingProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingProcess {
    /// A standalone builder that runs real processes with default settings.
    pub fn new() -> Self {
        Self::from_config(&ProcessConfig::default())
    }

    pub fn from_config(config: &ProcessConfig) -> Self {
        Self {
            invocation: Invocation {
                timeout: config.timeout,
                idle_timeout: config.idle_timeout,
                ..Invocation::default()
            },
            shell: config.shell.clone(),
            fake_handlers: Vec::new(),
            matcher: Arc::new(WildcardMatcher),
            runner: Arc::new(TokioProcessRunner),
            recorder: Arc::new(NoopRecorder),
        }
    }

    pub fn command(mut self, command: impl Into<Command>) -> Self {
        self.invocation.command = Some(command.into());
        self
    }

    /// Working directory. Defaults to the current directory.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.invocation.working_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.invocation.timeout = Some(timeout);
        self
    }

    /// Kill the process when no output arrives for `timeout`.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.invocation.idle_timeout = Some(timeout);
        self
    }

    /// Let the process run without a timeout.
    pub fn forever(mut self) -> Self {
        self.invocation.timeout = None;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.invocation
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            self.invocation
                .env
                .insert(key.as_ref().to_string(), value.as_ref().to_string());
        }
        self
    }

    /// Data written to the process's stdin before it is closed.
    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.invocation.input = Some(input.into());
        self
    }

    /// Discard stdout and stderr.
    pub fn without_output(mut self) -> Self {
        self.invocation.quiet = true;
        self
    }

    pub fn quietly(self) -> Self {
        self.without_output()
    }

    pub fn tty(mut self, tty: bool) -> Self {
        self.invocation.tty = tty;
        self
    }

    /// Spawn options passed to the runner untouched.
    pub fn options<I, K>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.invocation
            .options
            .extend(options.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.invocation.options.insert(key.into(), value.into());
        self
    }

    /// Replace the fake handlers consulted before spawning.
    pub fn with_fake_handlers(mut self, handlers: Vec<(String, FakeHandler)>) -> Self {
        self.fake_handlers = handlers;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn CommandMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn ProcessRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Render the configuration into a spawn descriptor.
    pub fn to_spawn_command(&self) -> Result<SpawnCommand, ProcessError> {
        let invocation = &self.invocation;
        let command = invocation
            .command
            .clone()
            .ok_or(ProcessError::MissingCommand)?;

        let working_dir = match &invocation.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        let mut spawn = SpawnCommand::new(command, working_dir);
        spawn.env = invocation.env.clone();
        spawn.input = invocation.input.clone();
        spawn.quiet = invocation.quiet;
        spawn.tty = invocation.tty;
        spawn.options = invocation.options.clone();
        spawn.shell = self.shell.clone();
        spawn.timeout = invocation.timeout;
        spawn.idle_timeout = invocation.idle_timeout;

        Ok(spawn)
    }

    /// The first registered fake whose pattern matches `command_line`.
    pub fn fake_for(&self, command_line: &str) -> Option<(&str, &FakeHandler)> {
        first_match(self.matcher.as_ref(), &self.fake_handlers, command_line)
    }

    /// Run the process to completion.
    pub async fn run(&self) -> Result<ProcessResult, ProcessError> {
        self.run_inner(None).await
    }

    /// Run to completion, passing each chunk of output to `on_output`.
    pub async fn run_with_output<F>(&self, on_output: F) -> Result<ProcessResult, ProcessError>
    where
        F: FnMut(OutputType, &str) + Send + 'static,
    {
        self.run_inner(Some(Box::new(on_output))).await
    }

    /// Start the process without waiting for it.
    pub async fn start(&self) -> Result<StartedProcess, ProcessError> {
        self.start_inner(None).await
    }

    pub async fn start_with_output<F>(&self, on_output: F) -> Result<StartedProcess, ProcessError>
    where
        F: FnMut(OutputType, &str) + Send + 'static,
    {
        self.start_inner(Some(Box::new(on_output))).await
    }

    /// Run `command` in place of any configured command, keeping every
    /// other setting.
    pub async fn run_command(
        &self,
        command: impl Into<Command>,
    ) -> Result<ProcessResult, ProcessError> {
        self.clone().command(command).run().await
    }

    /// Start `command` in place of any configured command.
    pub async fn start_command(
        &self,
        command: impl Into<Command>,
    ) -> Result<StartedProcess, ProcessError> {
        self.clone().command(command).start().await
    }

    async fn run_inner(
        &self,
        output_handler: Option<OutputHandler>,
    ) -> Result<ProcessResult, ProcessError> {
        let spawn = self.to_spawn_command()?;
        let command_line = spawn.command_line();
        let output_handler = self.effective_handler(output_handler);

        if let Some((pattern, handler)) = self.fake_for(&command_line) {
            tracing::debug!("Faking process '{}' (pattern '{}')", command_line, pattern);
            let result = self.resolve_synchronous_fake(&command_line, handler, output_handler)?;
            self.recorder.record_if_recording(self, &result);
            return Ok(result);
        }

        self.ensure_not_stray(&command_line)?;
        self.runner.run(spawn, output_handler).await
    }

    async fn start_inner(
        &self,
        output_handler: Option<OutputHandler>,
    ) -> Result<StartedProcess, ProcessError> {
        let spawn = self.to_spawn_command()?;
        let command_line = spawn.command_line();
        let output_handler = self.effective_handler(output_handler);

        if let Some((pattern, handler)) = self.fake_for(&command_line) {
            tracing::debug!("Faking started process '{}' (pattern '{}')", command_line, pattern);
            let process = self.resolve_asynchronous_fake(&command_line, handler, output_handler)?;
            if self.recorder.is_recording() {
                self.recorder
                    .record_if_recording(self, &process.predict_process_result());
            }
            return Ok(StartedProcess::Fake(process));
        }

        self.ensure_not_stray(&command_line)?;
        let process = self.runner.start(spawn, output_handler).await?;
        Ok(StartedProcess::Real(process))
    }

    fn resolve_synchronous_fake(
        &self,
        command_line: &str,
        handler: &FakeHandler,
        output_handler: Option<OutputHandler>,
    ) -> Result<ProcessResult, ProcessError> {
        let resolved = resolve_outcome(self.invoke_handler(handler))?;

        match output_handler {
            None => Ok(resolved.into_process_result(command_line)),
            Some(output_handler) => {
                let mut process = FakeInvokedProcess::new(
                    command_line,
                    resolved.into_description(),
                    Some(output_handler),
                );
                Ok(process.wait())
            }
        }
    }

    fn resolve_asynchronous_fake(
        &self,
        command_line: &str,
        handler: &FakeHandler,
        output_handler: Option<OutputHandler>,
    ) -> Result<FakeInvokedProcess, ProcessError> {
        let description = resolve_outcome(self.invoke_handler(handler))?.into_description();
        Ok(FakeInvokedProcess::new(
            command_line,
            description,
            output_handler,
        ))
    }

    fn invoke_handler(&self, handler: &FakeHandler) -> FakeOutcome {
        (**handler)(self)
    }

    fn ensure_not_stray(&self, command_line: &str) -> Result<(), ProcessError> {
        if self.recorder.is_recording() && self.recorder.preventing_stray_processes() {
            tracing::warn!("Refusing to run process without a matching fake: {}", command_line);
            return Err(ProcessError::StrayProcess {
                command: command_line.to_string(),
            });
        }
        Ok(())
    }

    fn effective_handler(&self, output_handler: Option<OutputHandler>) -> Option<OutputHandler> {
        if self.invocation.quiet {
            None
        } else {
            output_handler
        }
    }
}

impl fmt::Debug for PendingProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingProcess")
            .field("invocation", &self.invocation)
            .field("shell", &self.shell)
            .field(
                "fake_patterns",
                &self
                    .fake_handlers
                    .iter()
                    .map(|(pattern, _)| pattern.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// A started process, real or faked, behind one surface.
#[derive(Debug)]
pub enum StartedProcess {
    Real(InvokedProcess),
    Fake(FakeInvokedProcess),
}

impl StartedProcess {
    pub fn is_fake(&self) -> bool {
        matches!(self, StartedProcess::Fake(_))
    }

    pub fn id(&self) -> Option<u32> {
        match self {
            StartedProcess::Real(process) => process.id(),
            StartedProcess::Fake(process) => process.id(),
        }
    }

    pub fn command_line(&self) -> &str {
        match self {
            StartedProcess::Real(process) => process.command_line(),
            StartedProcess::Fake(process) => process.command_line(),
        }
    }

    pub fn running(&mut self) -> bool {
        match self {
            StartedProcess::Real(process) => process.running(),
            StartedProcess::Fake(process) => process.running(),
        }
    }

    pub fn output(&self) -> String {
        match self {
            StartedProcess::Real(process) => process.output(),
            StartedProcess::Fake(process) => process.output(),
        }
    }

    pub fn error_output(&self) -> String {
        match self {
            StartedProcess::Real(process) => process.error_output(),
            StartedProcess::Fake(process) => process.error_output(),
        }
    }

    pub fn latest_output(&mut self) -> String {
        match self {
            StartedProcess::Real(process) => process.latest_output(),
            StartedProcess::Fake(process) => process.latest_output(),
        }
    }

    pub fn latest_error_output(&mut self) -> String {
        match self {
            StartedProcess::Real(process) => process.latest_error_output(),
            StartedProcess::Fake(process) => process.latest_error_output(),
        }
    }

    /// Write to stdin. Fakes accept and discard the data.
    pub async fn write_stdin(&mut self, data: &str) -> Result<(), ProcessError> {
        match self {
            StartedProcess::Real(process) => process.write_stdin(data).await,
            StartedProcess::Fake(process) => {
                tracing::trace!(
                    "Discarding {} bytes written to fake process: {}",
                    data.len(),
                    process.command_line()
                );
                Ok(())
            }
        }
    }

    pub fn signal(&mut self, signal: i32) -> Result<(), ProcessError> {
        match self {
            StartedProcess::Real(process) => process.signal(signal),
            StartedProcess::Fake(process) => process.signal(signal),
        }
    }

    pub async fn wait(self) -> Result<ProcessResult, ProcessError> {
        match self {
            StartedProcess::Real(process) => process.wait().await,
            StartedProcess::Fake(mut process) => Ok(process.wait()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeProcessDescription, FakeProcessResult, FakeProcessSequence};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Runner that never spawns anything and counts attempts.
    #[derive(Default)]
    struct CountingRunner {
        runs: AtomicUsize,
        starts: AtomicUsize,
        last_command: Mutex<Option<SpawnCommand>>,
    }

    #[async_trait]
    impl ProcessRunner for CountingRunner {
        async fn start(
            &self,
            command: SpawnCommand,
            _output_handler: Option<OutputHandler>,
        ) -> Result<InvokedProcess, ProcessError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Err(ProcessError::CommandNotFound(command.command_line()))
        }

        async fn run(
            &self,
            command: SpawnCommand,
            _output_handler: Option<OutputHandler>,
        ) -> Result<ProcessResult, ProcessError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let result = ProcessResult::new(command.command_line(), Some(0), "real\n", "");
            *self.last_command.lock().unwrap() = Some(command);
            Ok(result)
        }
    }

    struct StrictRecorder;

    impl ProcessRecorder for StrictRecorder {
        fn is_recording(&self) -> bool {
            true
        }

        fn preventing_stray_processes(&self) -> bool {
            true
        }

        fn record_if_recording(&self, _process: &PendingProcess, _result: &ProcessResult) {}
    }

    fn handlers(entries: Vec<(&str, FakeOutcome)>) -> Vec<(String, FakeHandler)> {
        entries
            .into_iter()
            .map(|(pattern, outcome)| (pattern.to_string(), outcome.into_handler()))
            .collect()
    }

    #[test]
    fn test_builder_configuration() {
        let process = PendingProcess::new()
            .command(["ls", "-la"])
            .path("/tmp")
            .timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(1))
            .env("A", "1")
            .envs([("B", "2")])
            .input("data")
            .quietly()
            .tty(true)
            .option("kill_on_drop", false);

        let invocation = process.invocation();
        assert_eq!(invocation.command, Some(Command::from(["ls", "-la"])));
        assert_eq!(invocation.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(invocation.timeout, Some(Duration::from_secs(5)));
        assert_eq!(invocation.idle_timeout, Some(Duration::from_secs(1)));
        assert_eq!(invocation.env.get("B").map(String::as_str), Some("2"));
        assert_eq!(invocation.input.as_deref(), Some("data"));
        assert!(invocation.quiet);
        assert!(invocation.tty);
        assert_eq!(invocation.options.get("kill_on_drop"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_default_timeout_and_forever() {
        let process = PendingProcess::new();
        assert_eq!(process.invocation().timeout, Some(Duration::from_secs(60)));
        assert_eq!(process.forever().invocation().timeout, None);
    }

    #[test]
    fn test_spawn_command_defaults_to_current_dir() {
        let spawn = PendingProcess::new()
            .command("echo hi")
            .forever()
            .to_spawn_command()
            .unwrap();

        assert_eq!(spawn.working_dir, std::env::current_dir().unwrap());
        assert_eq!(spawn.timeout, None);
        assert_eq!(spawn.command_line(), "echo hi");
    }

    #[tokio::test]
    async fn test_missing_command() {
        let err = PendingProcess::new().run().await.unwrap_err();
        assert!(matches!(err, ProcessError::MissingCommand));
    }

    #[tokio::test]
    async fn test_fake_plain_string() {
        let result = PendingProcess::new()
            .command("say-hi")
            .with_fake_handlers(handlers(vec![("say-hi", "hello".into())]))
            .run()
            .await
            .unwrap();

        assert_eq!(result.output(), "hello");
        assert_eq!(result.exit_code(), Some(0));
        assert_eq!(result.command(), "say-hi");
    }

    #[tokio::test]
    async fn test_first_declared_pattern_wins() {
        let process = PendingProcess::new()
            .command("git push origin main")
            .with_fake_handlers(handlers(vec![
                ("git push *", "first".into()),
                ("git *", "second".into()),
                ("*", "third".into()),
            ]));

        assert_eq!(process.run().await.unwrap().output(), "first");
    }

    #[tokio::test]
    async fn test_fakes_match_rendered_command_line() {
        let process = PendingProcess::new()
            .command(["git", "commit", "-m", "two words"])
            .with_fake_handlers(handlers(vec![(
                "git commit -m 'two words'",
                FakeProcessResult::new().output("committed").into(),
            )]));

        assert_eq!(process.run().await.unwrap().output(), "committed");
    }

    #[tokio::test]
    async fn test_no_fake_runs_real_process() {
        let runner = Arc::new(CountingRunner::default());
        let result = PendingProcess::new()
            .command("make test")
            .path("/work")
            .env("CI", "1")
            .with_fake_handlers(handlers(vec![("cargo *", "".into())]))
            .with_runner(runner.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(result.output(), "real\n");
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);

        let spawn = runner.last_command.lock().unwrap().clone().unwrap();
        assert_eq!(spawn.working_dir, PathBuf::from("/work"));
        assert_eq!(spawn.env.get("CI").map(String::as_str), Some("1"));
        assert_eq!(spawn.timeout, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_explicit_command_overrides_configured_one() {
        let runner = Arc::new(CountingRunner::default());
        let process = PendingProcess::new()
            .command("git status")
            .env("GIT_PAGER", "cat")
            .with_fake_handlers(handlers(vec![
                ("git status", "configured".into()),
                ("git log", "overridden".into()),
            ]))
            .with_runner(runner.clone());

        assert_eq!(process.run_command("git log").await.unwrap().output(), "overridden");
        assert_eq!(process.run().await.unwrap().output(), "configured");

        let result = process.run_command(["git", "fetch"]).await.unwrap();
        assert_eq!(result.command(), "git fetch");
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
        let spawn = runner.last_command.lock().unwrap().clone().unwrap();
        assert_eq!(spawn.command_line(), "git fetch");
        assert_eq!(spawn.env.get("GIT_PAGER").map(String::as_str), Some("cat"));

        let started = process.start_command("git log").await.unwrap();
        assert_eq!(started.command_line(), "git log");
        assert_eq!(started.wait().await.unwrap().output(), "overridden");
    }

    #[tokio::test]
    async fn test_strict_mode_refuses_stray_processes() {
        let runner = Arc::new(CountingRunner::default());
        let process = PendingProcess::new()
            .command("rm -rf /tmp/cache")
            .with_runner(runner.clone())
            .with_recorder(Arc::new(StrictRecorder));

        match process.run().await {
            Err(ProcessError::StrayProcess { command }) => assert_eq!(command, "rm -rf /tmp/cache"),
            other => panic!("Expected StrayProcess, got {other:?}"),
        }
        assert!(matches!(
            process.start().await,
            Err(ProcessError::StrayProcess { .. })
        ));
        assert_eq!(runner.runs.load(Ordering::SeqCst), 0);
        assert_eq!(runner.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_sees_builder() {
        let handler: FakeHandler = Arc::new(|process: &PendingProcess| {
            let env = process.invocation().env.get("TARGET").cloned();
            FakeOutcome::from(env.unwrap_or_default())
        });

        let result = PendingProcess::new()
            .command("deploy")
            .env("TARGET", "staging")
            .with_fake_handlers(vec![("deploy".to_string(), handler)])
            .run()
            .await
            .unwrap();

        assert_eq!(result.output(), "staging");
    }

    #[tokio::test]
    async fn test_sequence_is_consumed_across_runs() {
        let sequence = FakeProcessSequence::new(["A", "B", "C"]);
        let process = PendingProcess::new()
            .command("next")
            .with_fake_handlers(handlers(vec![("next", sequence.into())]));

        assert_eq!(process.run().await.unwrap().output(), "A");
        assert_eq!(process.run().await.unwrap().output(), "B");
        assert_eq!(process.run().await.unwrap().output(), "C");
        assert!(matches!(
            process.run().await,
            Err(ProcessError::SequenceExhausted)
        ));
    }

    #[tokio::test]
    async fn test_run_with_output_streams_fake_frames() {
        let description = FakeProcessDescription::new()
            .output("building")
            .error_output("warning")
            .output("done")
            .exit_code(0);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let result = PendingProcess::new()
            .command("build")
            .with_fake_handlers(handlers(vec![("build", description.into())]))
            .run_with_output(move |kind, text| sink.lock().unwrap().push((kind, text.to_string())))
            .await
            .unwrap();

        assert_eq!(result.output(), "building\ndone\n");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (OutputType::Stdout, "building\n".to_string()),
                (OutputType::Stderr, "warning\n".to_string()),
                (OutputType::Stdout, "done\n".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_start_returns_fake_handle() {
        let description = FakeProcessDescription::new()
            .id(4242)
            .iterations_with(2, |d| d.output("tick"))
            .exit_code(5);

        let mut process = PendingProcess::new()
            .command("watch")
            .with_fake_handlers(handlers(vec![("watch", description.into())]))
            .start()
            .await
            .unwrap();

        assert!(process.is_fake());
        assert_eq!(process.id(), Some(4242));
        assert!(process.running());
        assert!(process.running());
        assert!(!process.running());
        process.write_stdin("ignored").await.unwrap();

        let result = process.wait().await.unwrap();
        assert_eq!(result.exit_code(), Some(5));
        assert_eq!(result.output(), "tick\ntick\n");
    }

    #[tokio::test]
    async fn test_start_normalizes_plain_output() {
        let mut process = PendingProcess::new()
            .command("whoami")
            .with_fake_handlers(handlers(vec![("whoami", "root".into())]))
            .start()
            .await
            .unwrap();

        assert!(!process.running());
        assert_eq!(process.output(), "root");
        assert_eq!(process.wait().await.unwrap().output(), "root");
    }

    #[tokio::test]
    async fn test_quiet_fake_skips_output_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result = PendingProcess::new()
            .command("noisy")
            .quietly()
            .with_fake_handlers(handlers(vec![("noisy", "lots of output".into())]))
            .run_with_output(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(result.output(), "lots of output");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
