use crate::error::ProcessError;

/// The finished outcome of a process, real or faked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessResult {
    command: String,
    exit_code: Option<i32>,
    output: String,
    error_output: String,
}

impl ProcessResult {
    pub fn new(
        command: impl Into<String>,
        exit_code: Option<i32>,
        output: impl Into<String>,
        error_output: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            exit_code,
            output: output.into(),
            error_output: error_output.into(),
        }
    }

    /// The canonical command line that produced this result.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// `None` when the process never exited normally (timeout or signal).
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn successful(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn failed(&self) -> bool {
        !self.successful()
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn error_output(&self) -> &str {
        &self.error_output
    }

    pub fn see_in_output(&self, needle: &str) -> bool {
        self.output.contains(needle)
    }

    pub fn see_in_error_output(&self, needle: &str) -> bool {
        self.error_output.contains(needle)
    }

    /// Turn a failed result into [`ProcessError::Failed`].
    pub fn throw_if_failed(self) -> Result<Self, ProcessError> {
        if self.failed() {
            return Err(ProcessError::Failed {
                result: Box::new(self),
            });
        }
        Ok(self)
    }

    /// Like [`throw_if_failed`](Self::throw_if_failed), but only when `condition` holds.
    pub fn throw_if(self, condition: bool) -> Result<Self, ProcessError> {
        if condition {
            self.throw_if_failed()
        } else {
            Ok(self)
        }
    }

    pub(crate) fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_failure_flags() {
        let ok = ProcessResult::new("true", Some(0), "", "");
        assert!(ok.successful());
        assert!(!ok.failed());

        let failed = ProcessResult::new("false", Some(1), "", "");
        assert!(failed.failed());

        let killed = ProcessResult::new("sleep 10", None, "", "");
        assert!(killed.failed());
        assert_eq!(killed.exit_code(), None);
    }

    #[test]
    fn test_see_in_output() {
        let result = ProcessResult::new("git status", Some(0), "On branch main\n", "warning: lf\n");
        assert!(result.see_in_output("branch main"));
        assert!(!result.see_in_output("detached"));
        assert!(result.see_in_error_output("warning"));
    }

    #[test]
    fn test_throw_if_failed() {
        let ok = ProcessResult::new("true", Some(0), "", "");
        assert!(ok.throw_if_failed().is_ok());

        let failed = ProcessResult::new("false", Some(1), "", "nope");
        match failed.clone().throw_if_failed() {
            Err(ProcessError::Failed { result }) => assert_eq!(*result, failed),
            other => panic!("Expected Failed error, got {other:?}"),
        }

        assert!(failed.clone().throw_if(false).is_ok());
        assert!(failed.throw_if(true).is_err());
    }
}
