//! Declarative script for a fake process that produces output over time.
//!
//! A description is a list of output frames plus an exit code. When driven
//! through a [`FakeInvokedProcess`](super::FakeInvokedProcess), each poll of
//! `running()` emits the next frame and consumes one run iteration; the
//! process reports itself finished once the iterations are used up.

use crate::command::OutputType;
use crate::result::ProcessResult;

use super::result::FakeProcessResult;

pub const DEFAULT_FAKE_PROCESS_ID: u32 = 1000;

/// One chunk of scripted output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFrame {
    pub kind: OutputType,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeProcessDescription {
    process_id: u32,
    frames: Vec<OutputFrame>,
    exit_code: Option<i32>,
    run_iterations: usize,
}

impl Default for FakeProcessDescription {
    fn default() -> Self {
        Self {
            process_id: DEFAULT_FAKE_PROCESS_ID,
            frames: Vec::new(),
            exit_code: Some(0),
            run_iterations: 0,
        }
    }
}

impl FakeProcessDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, process_id: u32) -> Self {
        self.process_id = process_id;
        self
    }

    /// Append a line of standard output.
    pub fn output(mut self, text: impl AsRef<str>) -> Self {
        self.push_line(OutputType::Stdout, text.as_ref());
        self
    }

    pub fn output_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.push_line(OutputType::Stdout, line.as_ref());
        }
        self
    }

    /// Append a line of error output.
    pub fn error_output(mut self, text: impl AsRef<str>) -> Self {
        self.push_line(OutputType::Stderr, text.as_ref());
        self
    }

    pub fn error_output_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.push_line(OutputType::Stderr, line.as_ref());
        }
        self
    }

    /// Drop every stdout frame and, if `text` is non-empty, add it as the only one.
    pub fn replace_output(mut self, text: impl AsRef<str>) -> Self {
        self.frames.retain(|frame| frame.kind != OutputType::Stdout);
        if !text.as_ref().is_empty() {
            self.push_line(OutputType::Stdout, text.as_ref());
        }
        self
    }

    pub fn replace_error_output(mut self, text: impl AsRef<str>) -> Self {
        self.frames.retain(|frame| frame.kind != OutputType::Stderr);
        if !text.as_ref().is_empty() {
            self.push_line(OutputType::Stderr, text.as_ref());
        }
        self
    }

    pub fn exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    /// Number of `running()` polls that report the process as still running.
    pub fn runs_for(mut self, iterations: usize) -> Self {
        self.run_iterations = iterations;
        self
    }

    pub fn iterations(self, iterations: usize) -> Self {
        self.runs_for(iterations)
    }

    /// Apply `step` once per iteration, then run for that many iterations.
    ///
    /// ```
    /// use pending_process::FakeProcessDescription;
    ///
    /// let description = FakeProcessDescription::new()
    ///     .iterations_with(3, |d| d.output("tick"));
    /// assert_eq!(description.frames().len(), 3);
    /// assert_eq!(description.run_iterations(), 3);
    /// ```
    pub fn iterations_with<F>(mut self, iterations: usize, mut step: F) -> Self
    where
        F: FnMut(Self) -> Self,
    {
        for _ in 0..iterations {
            self = step(self);
        }
        self.runs_for(iterations)
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn frames(&self) -> &[OutputFrame] {
        &self.frames
    }

    /// `None` for a process that never exited normally.
    pub fn get_exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn run_iterations(&self) -> usize {
        self.run_iterations
    }

    /// Collapse every frame into a finished result.
    pub fn to_process_result(&self, command_line: &str) -> ProcessResult {
        ProcessResult::new(
            command_line,
            self.exit_code,
            self.collapse(OutputType::Stdout),
            self.collapse(OutputType::Stderr),
        )
    }

    pub(crate) fn collapse(&self, kind: OutputType) -> String {
        collapse_frames(&self.frames, kind)
    }

    /// A description that finishes immediately with the given output, stored verbatim.
    pub(crate) fn from_output(
        output: String,
        error_output: String,
        exit_code: Option<i32>,
    ) -> Self {
        let mut description = Self {
            exit_code,
            ..Self::default()
        };
        if !output.is_empty() {
            description.frames.push(OutputFrame {
                kind: OutputType::Stdout,
                text: output,
            });
        }
        if !error_output.is_empty() {
            description.frames.push(OutputFrame {
                kind: OutputType::Stderr,
                text: error_output,
            });
        }
        description
    }

    fn push_line(&mut self, kind: OutputType, text: &str) {
        let mut text = text.trim_end_matches('\n').to_string();
        text.push('\n');
        self.frames.push(OutputFrame { kind, text });
    }
}

impl From<FakeProcessResult> for FakeProcessDescription {
    fn from(result: FakeProcessResult) -> Self {
        Self::from_output(
            result.get_output().to_string(),
            result.get_error_output().to_string(),
            Some(result.get_exit_code()),
        )
    }
}

pub(crate) fn collapse_frames(frames: &[OutputFrame], kind: OutputType) -> String {
    frames
        .iter()
        .filter(|frame| frame.kind == kind)
        .map(|frame| frame.text.as_str())
        .collect()
}
