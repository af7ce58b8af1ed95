//! Scripted stand-ins for real processes.
//!
//! A fake is registered under a command-line pattern together with a
//! [`FakeHandler`]. When a [`PendingProcess`] renders a command line that
//! matches, the handler's [`FakeOutcome`] is turned into the same result or
//! handle type a real execution would produce.

pub mod description;
pub mod invoked;
pub mod result;
pub mod sequence;

use std::sync::Arc;

use crate::error::ProcessError;
use crate::pending::PendingProcess;
use crate::result::ProcessResult;

pub use description::{FakeProcessDescription, OutputFrame};
pub use invoked::FakeInvokedProcess;
pub use result::FakeProcessResult;
pub use sequence::FakeProcessSequence;

/// How deep sequences may nest inside one another before resolution gives up.
pub const MAX_SEQUENCE_DEPTH: usize = 8;

/// Everything a fake handler may answer with.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Output { output: String, error_output: String },
    Result(FakeProcessResult),
    /// A finished result served as-is apart from its command line.
    Finished(ProcessResult),
    Description(FakeProcessDescription),
    Sequence(FakeProcessSequence),
}

impl Default for FakeOutcome {
    fn default() -> Self {
        FakeOutcome::Result(FakeProcessResult::new())
    }
}

impl FakeOutcome {
    pub fn output(output: impl Into<String>, error_output: impl Into<String>) -> Self {
        FakeOutcome::Output {
            output: output.into(),
            error_output: error_output.into(),
        }
    }

    /// A handler that answers every invocation with a clone of this outcome.
    pub fn into_handler(self) -> FakeHandler {
        Arc::new(move |_: &PendingProcess| self.clone())
    }
}

impl From<&str> for FakeOutcome {
    fn from(output: &str) -> Self {
        FakeOutcome::output(output, "")
    }
}

impl From<String> for FakeOutcome {
    fn from(output: String) -> Self {
        FakeOutcome::output(output, "")
    }
}

impl From<Vec<&str>> for FakeOutcome {
    fn from(lines: Vec<&str>) -> Self {
        FakeOutcome::output(result::join_lines(lines), "")
    }
}

impl From<Vec<String>> for FakeOutcome {
    fn from(lines: Vec<String>) -> Self {
        FakeOutcome::output(result::join_lines(lines), "")
    }
}

impl From<FakeProcessResult> for FakeOutcome {
    fn from(result: FakeProcessResult) -> Self {
        FakeOutcome::Result(result)
    }
}

impl From<ProcessResult> for FakeOutcome {
    fn from(result: ProcessResult) -> Self {
        FakeOutcome::Finished(result)
    }
}

impl From<FakeProcessDescription> for FakeOutcome {
    fn from(description: FakeProcessDescription) -> Self {
        FakeOutcome::Description(description)
    }
}

impl From<FakeProcessSequence> for FakeOutcome {
    fn from(sequence: FakeProcessSequence) -> Self {
        FakeOutcome::Sequence(sequence)
    }
}

/// Produces the fake outcome for a matched invocation.
pub type FakeHandler = Arc<dyn Fn(&PendingProcess) -> FakeOutcome + Send + Sync>;

/// A fake outcome with every sequence layer peeled off.
#[derive(Debug)]
pub(crate) enum ResolvedFake {
    Result(FakeProcessResult),
    Finished(ProcessResult),
    Description(FakeProcessDescription),
}

impl ResolvedFake {
    pub(crate) fn into_process_result(self, command_line: &str) -> ProcessResult {
        match self {
            ResolvedFake::Result(result) => result.into_process_result(command_line),
            ResolvedFake::Finished(result) => result.with_command(command_line),
            ResolvedFake::Description(description) => description.to_process_result(command_line),
        }
    }

    pub(crate) fn into_description(self) -> FakeProcessDescription {
        match self {
            ResolvedFake::Result(result) => result.into(),
            ResolvedFake::Finished(result) => FakeProcessDescription::from_output(
                result.output().to_string(),
                result.error_output().to_string(),
                result.exit_code(),
            ),
            ResolvedFake::Description(description) => description,
        }
    }
}

/// Pop sequences until a terminal outcome is reached.
pub(crate) fn resolve_outcome(mut outcome: FakeOutcome) -> Result<ResolvedFake, ProcessError> {
    for _ in 0..=MAX_SEQUENCE_DEPTH {
        outcome = match outcome {
            FakeOutcome::Output {
                output,
                error_output,
            } => {
                return Ok(ResolvedFake::Result(
                    FakeProcessResult::new()
                        .output(output)
                        .error_output(error_output),
                ))
            }
            FakeOutcome::Result(result) => return Ok(ResolvedFake::Result(result)),
            FakeOutcome::Finished(result) => return Ok(ResolvedFake::Finished(result)),
            FakeOutcome::Description(description) => {
                return Ok(ResolvedFake::Description(description))
            }
            FakeOutcome::Sequence(sequence) => sequence.next_outcome()?,
        };
    }

    Err(ProcessError::InvalidFakeResult(format!(
        "process sequences nested more than {MAX_SEQUENCE_DEPTH} levels deep"
    )))
}
