use crate::pending::{Invocation, PendingProcess};
use crate::result::ProcessResult;

/// What the builder needs from whoever tracks fake invocations.
pub trait ProcessRecorder: Send + Sync {
    fn is_recording(&self) -> bool;

    /// When recording, refuse commands that no fake matches.
    fn preventing_stray_processes(&self) -> bool;

    fn record_if_recording(&self, process: &PendingProcess, result: &ProcessResult);
}

/// Recorder for standalone builders: never records, never blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl ProcessRecorder for NoopRecorder {
    fn is_recording(&self) -> bool {
        false
    }

    fn preventing_stray_processes(&self) -> bool {
        false
    }

    fn record_if_recording(&self, _process: &PendingProcess, _result: &ProcessResult) {}
}

/// A faked invocation captured for later assertions.
#[derive(Debug, Clone)]
pub struct RecordedProcess {
    pub invocation: Invocation,
    pub result: ProcessResult,
}

impl RecordedProcess {
    pub fn command_line(&self) -> &str {
        self.result.command()
    }
}
