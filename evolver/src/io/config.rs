//! Engine configuration stored as TOML (`evolver.toml` by default).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::params::RunParams;
use crate::error::ConfigError;

/// Engine configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to values that
/// reproduce a small FizzBuzz-sized search with a Python interpreter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EvolverConfig {
    /// Number of candidates per generation.
    pub population_size: usize,

    /// Hard cap on evaluated generations.
    pub max_generations: u32,

    /// Per-test wall-clock limit for one candidate, in milliseconds.
    pub test_timeout_ms: u64,

    /// Maximum number of candidates evaluated concurrently.
    pub workers: usize,

    /// Truncate captured candidate and oracle output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Leave the run workspace on disk after the run (for debugging candidates).
    pub keep_workspace: bool,

    /// Parent directory for run workspaces. Defaults to `<temp>/evolver`.
    pub workspace_dir: Option<PathBuf>,

    pub sandbox: SandboxConfig,

    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter command; the candidate file and the test input are appended.
    pub command: Vec<String>,
    /// File name the candidate source is written to inside its slot.
    pub file_name: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string()],
            file_name: "candidate.py".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Command that reads a mutation prompt on stdin and prints a new candidate.
    pub command: Vec<String>,
    /// Wall-clock limit for one oracle call, in seconds.
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string(), "-p".to_string()],
            timeout_secs: 120,
        }
    }
}

impl Default for EvolverConfig {
    fn default() -> Self {
        Self {
            population_size: 3,
            max_generations: 5,
            test_timeout_ms: 1_000,
            workers: 4,
            output_limit_bytes: 64 * 1024,
            keep_workspace: false,
            workspace_dir: None,
            sandbox: SandboxConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl EvolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::new("population_size must be > 0"));
        }
        if self.max_generations == 0 {
            return Err(ConfigError::new("max_generations must be > 0"));
        }
        if self.test_timeout_ms == 0 {
            return Err(ConfigError::new("test_timeout_ms must be > 0"));
        }
        if self.workers == 0 {
            return Err(ConfigError::new("workers must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(ConfigError::new("output_limit_bytes must be > 0"));
        }
        if is_blank_command(&self.sandbox.command) {
            return Err(ConfigError::new("sandbox.command must be a non-empty array"));
        }
        if self.sandbox.file_name.trim().is_empty() {
            return Err(ConfigError::new("sandbox.file_name must be non-empty"));
        }
        if self.sandbox.file_name.contains('/') || self.sandbox.file_name.contains('\\') {
            return Err(ConfigError::new(
                "sandbox.file_name must not contain path separators",
            ));
        }
        if is_blank_command(&self.oracle.command) {
            return Err(ConfigError::new("oracle.command must be a non-empty array"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::new("oracle.timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Run parameters handed to the driver.
    pub fn run_params(&self) -> RunParams {
        RunParams {
            population_size: self.population_size,
            max_generations: self.max_generations,
            workers: self.workers,
            test_timeout: Duration::from_millis(self.test_timeout_ms),
            oracle_timeout: Duration::from_secs(self.oracle.timeout_secs),
        }
    }

    /// Parent directory for run workspaces.
    pub fn workspace_base(&self) -> PathBuf {
        self.workspace_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("evolver"))
    }
}

fn is_blank_command(command: &[String]) -> bool {
    command.first().is_none_or(|program| program.trim().is_empty())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EvolverConfig::default()`.
pub fn load_config(path: &Path) -> Result<EvolverConfig> {
    if !path.exists() {
        let cfg = EvolverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EvolverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EvolverConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
