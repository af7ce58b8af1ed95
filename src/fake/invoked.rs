use std::fmt;

use crate::command::{OutputHandler, OutputType};
use crate::error::ProcessError;
use crate::result::ProcessResult;

use super::description::{collapse_frames, FakeProcessDescription};

/// Handle returned by `start()` when a fake intercepts the command.
///
/// Nothing runs in the background: every call to [`running`](Self::running)
/// advances the script by one iteration and [`wait`](Self::wait) drains the
/// rest.
pub struct FakeInvokedProcess {
    command: String,
    description: FakeProcessDescription,
    output_handler: Option<OutputHandler>,
    next_frame: usize,
    latest_stdout_frame: usize,
    latest_stderr_frame: usize,
    remaining_iterations: Option<usize>,
    exited: bool,
    signals: Vec<i32>,
}

impl FakeInvokedProcess {
    pub fn new(
        command: impl Into<String>,
        description: FakeProcessDescription,
        output_handler: Option<OutputHandler>,
    ) -> Self {
        Self {
            command: command.into(),
            description,
            output_handler,
            next_frame: 0,
            latest_stdout_frame: 0,
            latest_stderr_frame: 0,
            remaining_iterations: None,
            exited: false,
            signals: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<u32> {
        Some(self.description.process_id())
    }

    pub fn command_line(&self) -> &str {
        &self.command
    }

    /// Advance one iteration and report whether the fake is still running.
    pub fn running(&mut self) -> bool {
        if self.exited {
            return false;
        }

        self.emit_next_frame();

        let remaining = self
            .remaining_iterations
            .unwrap_or_else(|| self.description.run_iterations());

        if remaining == 0 {
            self.finish();
            return false;
        }

        self.remaining_iterations = Some(remaining - 1);
        true
    }

    /// Standard output emitted so far.
    pub fn output(&self) -> String {
        collapse_frames(self.emitted(), OutputType::Stdout)
    }

    pub fn error_output(&self) -> String {
        collapse_frames(self.emitted(), OutputType::Stderr)
    }

    /// Standard output emitted since the previous call.
    pub fn latest_output(&mut self) -> String {
        let start = self.latest_stdout_frame.min(self.next_frame);
        self.latest_stdout_frame = self.next_frame;
        collapse_frames(&self.description.frames()[start..self.next_frame], OutputType::Stdout)
    }

    pub fn latest_error_output(&mut self) -> String {
        let start = self.latest_stderr_frame.min(self.next_frame);
        self.latest_stderr_frame = self.next_frame;
        collapse_frames(&self.description.frames()[start..self.next_frame], OutputType::Stderr)
    }

    /// Record a signal request. A fake has nothing to deliver it to.
    pub fn signal(&mut self, signal: i32) -> Result<(), ProcessError> {
        tracing::debug!(
            "Recording signal {} sent to fake process: {}",
            signal,
            self.command
        );
        self.signals.push(signal);
        Ok(())
    }

    pub fn has_received_signal(&self, signal: i32) -> bool {
        self.signals.contains(&signal)
    }

    /// Emit every remaining frame and return the finished result.
    pub fn wait(&mut self) -> ProcessResult {
        self.finish();
        self.predict_process_result()
    }

    /// The result `wait` will produce, computed without emitting anything.
    pub fn predict_process_result(&self) -> ProcessResult {
        self.description.to_process_result(&self.command)
    }

    fn finish(&mut self) {
        while self.emit_next_frame() {}
        self.remaining_iterations = Some(0);
        self.exited = true;
    }

    fn emitted(&self) -> &[crate::fake::OutputFrame] {
        &self.description.frames()[..self.next_frame]
    }

    fn emit_next_frame(&mut self) -> bool {
        let Some(frame) = self.description.frames().get(self.next_frame) else {
            return false;
        };
        self.next_frame += 1;
        if let Some(handler) = self.output_handler.as_mut() {
            handler(frame.kind, &frame.text);
        }
        true
    }
}

impl fmt::Debug for FakeInvokedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeInvokedProcess")
            .field("command", &self.command)
            .field("description", &self.description)
            .field("next_frame", &self.next_frame)
            .field("remaining_iterations", &self.remaining_iterations)
            .field("exited", &self.exited)
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}
