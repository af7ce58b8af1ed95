use crate::result::ProcessResult;

/// A canned, already finished process outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FakeProcessResult {
    exit_code: i32,
    output: String,
    error_output: String,
}

impl FakeProcessResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Join `lines` with newlines, ending with a trailing newline.
    pub fn output_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.output = join_lines(lines);
        self
    }

    pub fn error_output(mut self, error_output: impl Into<String>) -> Self {
        self.error_output = error_output.into();
        self
    }

    pub fn error_output_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.error_output = join_lines(lines);
        self
    }

    pub fn exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn get_exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn get_output(&self) -> &str {
        &self.output
    }

    pub fn get_error_output(&self) -> &str {
        &self.error_output
    }

    pub fn into_process_result(self, command_line: &str) -> ProcessResult {
        ProcessResult::new(
            command_line,
            Some(self.exit_code),
            self.output,
            self.error_output,
        )
    }
}

pub(crate) fn join_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut joined = String::new();
    for line in lines {
        joined.push_str(line.as_ref().trim_end_matches('\n'));
        joined.push('\n');
    }
    joined
}
