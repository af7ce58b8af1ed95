//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use pending_process::{
    InvokedProcess, OutputHandler, ProcessError, ProcessResult, ProcessRunner, SpawnCommand,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

static INIT: Once = Once::new();

/// Install a tracing subscriber once. Set `RUST_LOG=pending_process=trace` to see events.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Runner that never touches the OS and remembers what it was asked to spawn.
#[derive(Default)]
pub struct StubRunner {
    attempts: AtomicUsize,
    commands: Mutex<Vec<SpawnCommand>>,
}

impl StubRunner {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(SpawnCommand::command_line)
            .collect()
    }

    pub fn last_command(&self) -> Option<SpawnCommand> {
        self.commands.lock().unwrap().last().cloned()
    }

    fn remember(&self, command: &SpawnCommand) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.commands.lock().unwrap().push(command.clone());
    }
}

#[async_trait]
impl ProcessRunner for StubRunner {
    async fn start(
        &self,
        command: SpawnCommand,
        _output_handler: Option<OutputHandler>,
    ) -> Result<InvokedProcess, ProcessError> {
        self.remember(&command);
        Err(ProcessError::CommandNotFound(command.command_line()))
    }

    async fn run(
        &self,
        command: SpawnCommand,
        _output_handler: Option<OutputHandler>,
    ) -> Result<ProcessResult, ProcessError> {
        self.remember(&command);
        Ok(ProcessResult::new(
            command.command_line(),
            Some(0),
            "stubbed\n",
            "",
        ))
    }
}
