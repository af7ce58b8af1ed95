//! Entry point that hands out builders and owns fake registrations.
//!
//! Every [`PendingProcess`] created by a factory sees the fakes registered
//! on it at creation time and reports fake resolutions back to it, so tests
//! can assert on what would have run.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::command::Command;
use crate::config::ProcessConfig;
use crate::error::ProcessError;
use crate::fake::{
    FakeHandler, FakeOutcome, FakeProcessDescription, FakeProcessResult, FakeProcessSequence,
};
use crate::matcher::{CommandMatcher, WildcardMatcher};
use crate::pending::{PendingProcess, StartedProcess};
use crate::recorder::{ProcessRecorder, RecordedProcess};
use crate::result::ProcessResult;
use crate::runner::{ProcessRunner, TokioProcessRunner};

#[derive(Default)]
struct FakeState {
    fakes: Mutex<Vec<(String, FakeHandler)>>,
    recording: AtomicBool,
    prevent_stray: AtomicBool,
    recorded: Mutex<Vec<RecordedProcess>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeState {
    /// Strict mode from config implies recording.
    fn restore(&self, config: &ProcessConfig) {
        let strict = config.prevent_stray_processes;
        self.prevent_stray.store(strict, Ordering::SeqCst);
        self.recording.store(strict, Ordering::SeqCst);
    }
}

impl ProcessRecorder for FakeState {
    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn preventing_stray_processes(&self) -> bool {
        self.prevent_stray.load(Ordering::SeqCst)
    }

    fn record_if_recording(&self, process: &PendingProcess, result: &ProcessResult) {
        if !self.is_recording() {
            return;
        }
        tracing::trace!("Recording faked process: {}", result.command());
        lock(&self.recorded).push(RecordedProcess {
            invocation: process.invocation().clone(),
            result: result.clone(),
        });
    }
}

#[derive(Clone)]
pub struct ProcessFactory {
    config: ProcessConfig,
    runner: Arc<dyn ProcessRunner>,
    matcher: Arc<dyn CommandMatcher>,
    state: Arc<FakeState>,
}

impl Default for ProcessFactory {
    fn default() -> Self {
        Self::new(ProcessConfig::default())
    }
}

impl ProcessFactory {
    pub fn new(config: ProcessConfig) -> Self {
        let state = FakeState::default();
        state.restore(&config);
        Self {
            config,
            runner: Arc::new(TokioProcessRunner),
            matcher: Arc::new(WildcardMatcher),
            state: Arc::new(state),
        }
    }

    /// Use `runner` for every process that no fake intercepts.
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn CommandMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// A fresh builder carrying a snapshot of the current fakes.
    pub fn pending_process(&self) -> PendingProcess {
        let fakes = lock(&self.state.fakes).clone();
        PendingProcess::from_config(&self.config)
            .with_runner(Arc::clone(&self.runner))
            .with_matcher(Arc::clone(&self.matcher))
            .with_recorder(self.state.clone())
            .with_fake_handlers(fakes)
    }

    pub fn command(&self, command: impl Into<Command>) -> PendingProcess {
        self.pending_process().command(command)
    }

    pub async fn run(&self, command: impl Into<Command>) -> Result<ProcessResult, ProcessError> {
        self.command(command).run().await
    }

    pub async fn start(&self, command: impl Into<Command>) -> Result<StartedProcess, ProcessError> {
        self.command(command).start().await
    }

    /// Fake every command line matching `pattern` with a fixed outcome.
    pub fn fake(&self, pattern: impl Into<String>, outcome: impl Into<FakeOutcome>) -> &Self {
        self.register(pattern.into(), outcome.into().into_handler())
    }

    /// Fake every command line matching `pattern` with a computed outcome.
    pub fn fake_with<F, O>(&self, pattern: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(&PendingProcess) -> O + Send + Sync + 'static,
        O: Into<FakeOutcome>,
    {
        let handler: FakeHandler = Arc::new(move |process: &PendingProcess| {
            let outcome: FakeOutcome = handler(process).into();
            outcome
        });
        self.register(pattern.into(), handler)
    }

    /// Fake every command with an empty successful result.
    pub fn fake_all(&self) -> &Self {
        self.fake("*", FakeProcessResult::new())
    }

    /// Fail any command that no fake matches.
    pub fn prevent_stray_processes(&self, prevent: bool) -> &Self {
        self.state.prevent_stray.store(prevent, Ordering::SeqCst);
        if prevent {
            self.state.recording.store(true, Ordering::SeqCst);
        }
        self
    }

    pub fn preventing_stray_processes(&self) -> bool {
        self.state.preventing_stray_processes()
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    /// Faked invocations so far, in order.
    pub fn recorded(&self) -> Vec<RecordedProcess> {
        lock(&self.state.recorded).clone()
    }

    /// Forget fakes and recordings and return to the configured mode.
    pub fn reset(&self) {
        lock(&self.state.fakes).clear();
        lock(&self.state.recorded).clear();
        self.state.restore(&self.config);
    }

    pub fn sequence<I, T>(&self, items: I) -> FakeProcessSequence
    where
        I: IntoIterator<Item = T>,
        T: Into<FakeOutcome>,
    {
        FakeProcessSequence::new(items)
    }

    pub fn result(&self) -> FakeProcessResult {
        FakeProcessResult::new()
    }

    pub fn describe(&self) -> FakeProcessDescription {
        FakeProcessDescription::new()
    }

    #[track_caller]
    pub fn assert_ran(&self, command_line: &str) {
        self.assert_ran_times(command_line, 1..);
    }

    /// Assert some recorded invocation satisfies `predicate`.
    #[track_caller]
    pub fn assert_ran_matching<F>(&self, predicate: F)
    where
        F: Fn(&RecordedProcess) -> bool,
    {
        let recorded = self.recorded();
        assert!(
            recorded.iter().any(predicate),
            "No recorded process matched the predicate. Recorded: {:?}",
            Self::command_lines(&recorded)
        );
    }

    #[track_caller]
    pub fn assert_ran_times(&self, command_line: &str, times: impl RangeOrCount) {
        let recorded = self.recorded();
        let count = self.count_matching(&recorded, command_line);
        assert!(
            times.contains(count),
            "Expected [{}] to run {} time(s), but it ran {} time(s). Recorded: {:?}",
            command_line,
            times.describe(),
            count,
            Self::command_lines(&recorded)
        );
    }

    #[track_caller]
    pub fn assert_not_ran(&self, command_line: &str) {
        self.assert_ran_times(command_line, 0);
    }

    #[track_caller]
    pub fn assert_nothing_ran(&self) {
        let recorded = self.recorded();
        assert!(
            recorded.is_empty(),
            "Expected no processes to run. Recorded: {:?}",
            Self::command_lines(&recorded)
        );
    }

    fn register(&self, pattern: String, handler: FakeHandler) -> &Self {
        tracing::debug!("Registering process fake for '{}'", pattern);
        self.state.recording.store(true, Ordering::SeqCst);
        lock(&self.state.fakes).push((pattern, handler));
        self
    }

    fn count_matching(&self, recorded: &[RecordedProcess], command_line: &str) -> usize {
        recorded
            .iter()
            .filter(|process| self.matcher.matches(command_line, process.command_line()))
            .count()
    }

    fn command_lines(recorded: &[RecordedProcess]) -> Vec<&str> {
        recorded.iter().map(RecordedProcess::command_line).collect()
    }
}

impl fmt::Debug for ProcessFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessFactory")
            .field("config", &self.config)
            .field("fakes", &lock(&self.state.fakes).len())
            .field("recording", &self.is_recording())
            .finish_non_exhaustive()
    }
}

/// Expected invocation count for [`ProcessFactory::assert_ran_times`].
pub trait RangeOrCount {
    fn contains(&self, count: usize) -> bool;
    fn describe(&self) -> String;
}

impl RangeOrCount for usize {
    fn contains(&self, count: usize) -> bool {
        *self == count
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl RangeOrCount for std::ops::RangeFrom<usize> {
    fn contains(&self, count: usize) -> bool {
        count >= self.start
    }

    fn describe(&self) -> String {
        format!("at least {}", self.start)
    }
}

impl RangeOrCount for std::ops::RangeInclusive<usize> {
    fn contains(&self, count: usize) -> bool {
        std::ops::RangeInclusive::contains(self, &count)
    }

    fn describe(&self) -> String {
        format!("{}..={}", self.start(), self.end())
    }
}
