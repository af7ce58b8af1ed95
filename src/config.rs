//! Default settings applied to every process a factory builds.
//!
//! Settings can come from a TOML file and be overridden from the
//! environment:
//!
//! ```toml
//! timeout = "2m"
//! idle_timeout = "30s"
//! prevent_stray_processes = true
//!
//! [shell]
//! program = "bash"
//! args = ["-c"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const TIMEOUT_ENV: &str = "PENDING_PROCESS_TIMEOUT";
pub const IDLE_TIMEOUT_ENV: &str = "PENDING_PROCESS_IDLE_TIMEOUT";

/// Shell used to run string commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        if cfg!(windows) {
            Self {
                program: "cmd".to_string(),
                args: vec!["/C".to_string()],
            }
        } else {
            Self {
                program: "sh".to_string(),
                args: vec!["-c".to_string()],
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Wall-clock limit for each process. `None` lets processes run forever.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Option<Duration>,

    /// Maximum time without output before the process is killed.
    #[serde(with = "humantime_serde", default)]
    pub idle_timeout: Option<Duration>,

    #[serde(default)]
    pub shell: ShellConfig,

    /// Refuse to run any command that has no matching fake.
    #[serde(default)]
    pub prevent_stray_processes: bool,
}

fn default_timeout() -> Option<Duration> {
    Some(Duration::from_secs(60))
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            idle_timeout: None,
            shell: ShellConfig::default(),
            prevent_stray_processes: false,
        }
    }
}

impl ProcessConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse process configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid process configuration in {}", path.display()))
    }

    /// Apply `PENDING_PROCESS_TIMEOUT` / `PENDING_PROCESS_IDLE_TIMEOUT` on top of this config.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(TIMEOUT_ENV) {
            self.timeout = parse_optional_duration(&value)
                .with_context(|| format!("Invalid {TIMEOUT_ENV} value '{value}'"))?;
        }
        if let Some(value) = lookup(IDLE_TIMEOUT_ENV) {
            self.idle_timeout = parse_optional_duration(&value)
                .with_context(|| format!("Invalid {IDLE_TIMEOUT_ENV} value '{value}'"))?;
        }
        Ok(self)
    }
}

/// Parse a humantime duration, treating `none`/`forever` as "no limit".
fn parse_optional_duration(value: &str) -> Result<Option<Duration>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("none") || value.eq_ignore_ascii_case("forever") {
        return Ok(None);
    }
    let duration = humantime_serde::re::humantime::parse_duration(value)?;
    Ok(Some(duration))
}
