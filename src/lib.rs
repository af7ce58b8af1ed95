//! # pending-process
//!
//! A fluent builder for running external commands, with first-class fakes
//! for tests.
//!
//! ## Usage
//!
//! ```no_run
//! # async fn demo() -> Result<(), pending_process::ProcessError> {
//! use pending_process::ProcessFactory;
//! use std::time::Duration;
//!
//! let factory = ProcessFactory::default();
//! let result = factory
//!     .command(["cargo", "build"])
//!     .path("/srv/app")
//!     .timeout(Duration::from_secs(300))
//!     .run()
//!     .await?
//!     .throw_if_failed()?;
//! println!("{}", result.output());
//! # Ok(())
//! # }
//! ```
//!
//! In tests the same factory intercepts commands before they reach the OS:
//!
//! ```
//! # tokio_test::block_on(async {
//! use pending_process::ProcessFactory;
//!
//! let factory = ProcessFactory::default();
//! factory.fake("git rev-parse *", "abc123");
//!
//! let result = factory.run("git rev-parse HEAD").await.unwrap();
//! assert_eq!(result.output(), "abc123");
//! factory.assert_ran("git rev-parse HEAD");
//! # });
//! ```
//!
//! ## Modules
//!
//! - `pending` - The builder and the unified started-process handle
//! - `factory` - Hands out builders and owns fake registrations and recordings
//! - `fake` - Fake results, descriptions, sequences and the fake handle
//! - `runner` - Real process execution on tokio
//! - `invoked` - Handle to a running real process
//! - `matcher` - Command-line pattern matching for fakes
//! - `config` - Defaults loaded from TOML and the environment

pub mod command;
pub mod config;
pub mod error;
pub mod factory;
pub mod fake;
pub mod invoked;
pub mod matcher;
pub mod pending;
pub mod recorder;
pub mod result;
pub mod runner;

pub use command::{Command, OutputHandler, OutputType, SpawnCommand};
pub use config::{ProcessConfig, ShellConfig};
pub use error::{ProcessError, TimeoutKind};
pub use factory::{ProcessFactory, RangeOrCount};
pub use fake::{
    FakeHandler, FakeInvokedProcess, FakeOutcome, FakeProcessDescription, FakeProcessResult,
    FakeProcessSequence, OutputFrame,
};
pub use invoked::InvokedProcess;
pub use matcher::{CommandMatcher, WildcardMatcher};
pub use pending::{Invocation, PendingProcess, StartedProcess};
pub use recorder::{NoopRecorder, ProcessRecorder, RecordedProcess};
pub use result::ProcessResult;
pub use runner::{ProcessRunner, TokioProcessRunner};
