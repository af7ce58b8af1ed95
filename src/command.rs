use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ShellConfig;

/// What to execute: an argv vector or a string handed to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Argv(Vec<String>),
    Shell(String),
}

impl Command {
    /// The canonical command line. Argv tokens are joined with POSIX quoting,
    /// shell strings are returned verbatim.
    pub fn command_line(&self) -> String {
        match self {
            Command::Argv(args) => shell_words::join(args),
            Command::Shell(line) => line.clone(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        Command::Shell(line.to_string())
    }
}

impl From<String> for Command {
    fn from(line: String) -> Self {
        Command::Shell(line)
    }
}

impl From<Vec<String>> for Command {
    fn from(args: Vec<String>) -> Self {
        Command::Argv(args)
    }
}

impl From<Vec<&str>> for Command {
    fn from(args: Vec<&str>) -> Self {
        Command::Argv(args.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Command {
    fn from(args: [&str; N]) -> Self {
        Command::Argv(args.iter().map(|s| s.to_string()).collect())
    }
}

/// Stream a chunk of output arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Stdout,
    Stderr,
}

/// Callback invoked with every chunk of output, in the order it was produced.
pub type OutputHandler = Box<dyn FnMut(OutputType, &str) + Send + 'static>;

/// A fully rendered process invocation, ready to hand to a [`ProcessRunner`](crate::ProcessRunner).
#[derive(Debug, Clone)]
pub struct SpawnCommand {
    pub command: Command,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    pub input: Option<String>,
    pub timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub quiet: bool,
    pub tty: bool,
    pub options: BTreeMap<String, Value>,
    pub shell: ShellConfig,
}

impl SpawnCommand {
    pub fn new(command: impl Into<Command>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            env: HashMap::new(),
            input: None,
            timeout: None,
            idle_timeout: None,
            quiet: false,
            tty: false,
            options: BTreeMap::new(),
            shell: ShellConfig::default(),
        }
    }

    /// The string fakes are matched against.
    pub fn command_line(&self) -> String {
        self.command.command_line()
    }

    /// Program and arguments to hand to the OS.
    pub fn program_and_args(&self) -> Option<(String, Vec<String>)> {
        match &self.command {
            Command::Argv(args) => {
                let (program, rest) = args.split_first()?;
                Some((program.clone(), rest.to_vec()))
            }
            Command::Shell(line) => {
                let mut args = self.shell.args.clone();
                args.push(line.clone());
                Some((self.shell.program.clone(), args))
            }
        }
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.options.get(key).and_then(Value::as_bool)
    }
}
