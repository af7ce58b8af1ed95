use std::fmt;
use std::time::Duration;

use crate::result::ProcessResult;

/// Which clock a timed-out process ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The overall wall-clock timeout measured from spawn.
    Total,
    /// No output arrived within the idle window.
    Idle,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::Total => f.write_str("timeout"),
            TimeoutKind::Idle => f.write_str("idle timeout"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("No command has been configured for the process")]
    MissingCommand,

    #[error("Unsupported fake process result: {0}")]
    InvalidFakeResult(String),

    #[error("Attempted process [{command}] without a matching fake")]
    StrayProcess { command: String },

    #[error("A process sequence has been exhausted")]
    SequenceExhausted,

    #[error("The process \"{}\" exceeded the {kind} of {timeout:?}", result.command())]
    Timeout {
        kind: TimeoutKind,
        timeout: Duration,
        result: Box<ProcessResult>,
    },

    #[error("{}", failure_message(result))]
    Failed { result: Box<ProcessResult> },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// The result collected before the failure, when one exists.
    pub fn partial_result(&self) -> Option<&ProcessResult> {
        match self {
            ProcessError::Timeout { result, .. } | ProcessError::Failed { result } => Some(&**result),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::Timeout { .. })
    }
}

fn failure_message(result: &ProcessResult) -> String {
    let exit_code = result
        .exit_code()
        .map_or_else(|| "(none)".to_string(), |code| code.to_string());

    let mut message = format!(
        "The command \"{}\" failed.\n\nExit Code: {}",
        result.command(),
        exit_code
    );

    if !result.output().is_empty() {
        message.push_str("\n\nOutput:\n================\n");
        message.push_str(result.output());
    }

    if !result.error_output().is_empty() {
        message.push_str("\n\nError Output:\n================\n");
        message.push_str(result.error_output());
    }

    message
}
