use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::gcc::{CppStandard, GccCommand, Optimization, Warnings};
pub use crate::config::problem::{CaseEntry, Problem};
pub use crate::config::toolchain::{
    Bindings, CommandTemplate, CompileConfig, DEFAULT_RUN_PATH, FileExtension, RunConfig, Toolchain,
};
use crate::error::{Component, ErrorKind, StructuredError};
use crate::types::ResourceLimits;

mod gcc;
mod loader;
mod problem;
pub mod toolchain;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../arbiter.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("file extension '{0}' must not contain '/' or '.'")]
    InvalidExtension(String),

    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("toolchain '{0}' not found in configuration")]
    ToolchainNotFound(String),

    #[error("no toolchain handles source files with extension '{0}'")]
    NoToolchainForExtension(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Limits(#[from] StructuredError),
}

impl From<ConfigError> for StructuredError {
    fn from(err: ConfigError) -> Self {
        let kind = match &err {
            ConfigError::Limits(inner) => return inner.clone(),
            ConfigError::ReadFile { .. } => ErrorKind::FileError,
            ConfigError::ToolchainNotFound(_) | ConfigError::NoToolchainForExtension(_) => {
                ErrorKind::UnsupportedOperation
            }
            ConfigError::InvalidExtension(_) | ConfigError::Parse(_) | ConfigError::Invalid(_) => {
                ErrorKind::InvalidArgument
            }
        };
        StructuredError::new(kind, Component::Config, err.to_string())
    }
}

/// Config for the judge
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Default resource limits applied to every execution.
    /// Toolchain run limits and per-case limits override these.
    #[serde(default)]
    pub default_limits: ResourceLimits,

    /// Base resource limits for compiler invocations
    #[serde(default = "default_compile_limits")]
    pub compile_limits: ResourceLimits,

    /// Maximum number of test cases executed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Wall clock budget in seconds for judging a whole submission.
    /// Cases still running when it expires are cancelled.
    #[serde(default)]
    pub submission_time_limit: Option<f64>,

    /// Interval between memory samples of a running process tree
    #[serde(default = "default_memory_poll_interval_ms")]
    pub memory_poll_interval_ms: u64,

    /// Directory for build and per-case scratch directories (system temp if unset)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    /// Exit code a correct program is expected to return
    #[serde(default)]
    pub success_exit_code: i32,

    /// Output more than this many times larger than the expected answer is
    /// judged as an output limit violation
    #[serde(default)]
    pub output_ratio_limit: Option<u64>,

    /// Toolchain configurations keyed by toolchain ID
    #[serde(default)]
    pub toolchains: HashMap<String, Toolchain>,
}

impl Config {
    /// Create a new config with embedded default toolchains
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no toolchains
    pub fn empty() -> Self {
        Self {
            default_limits: ResourceLimits::default(),
            compile_limits: default_compile_limits(),
            workers: default_workers(),
            submission_time_limit: None,
            memory_poll_interval_ms: default_memory_poll_interval_ms(),
            scratch_dir: None,
            success_exit_code: 0,
            output_ratio_limit: None,
            toolchains: HashMap::new(),
        }
    }

    /// Get a toolchain by ID
    pub fn get_toolchain(&self, id: &str) -> Result<&Toolchain, ConfigError> {
        self.toolchains
            .get(id)
            .ok_or_else(|| ConfigError::ToolchainNotFound(id.to_string()))
    }

    /// Find the toolchain handling a source file by its extension
    ///
    /// When several toolchains share an extension the one with the
    /// lexicographically smallest ID wins, so the choice is stable.
    pub fn toolchain_for_source(&self, source: &Path) -> Result<(&str, &Toolchain), ConfigError> {
        let extension = source
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.toolchains
            .iter()
            .filter(|(_, toolchain)| toolchain.handles(source))
            .min_by_key(|(id, _)| id.as_str())
            .map(|(id, toolchain)| (id.as_str(), toolchain))
            .ok_or(ConfigError::NoToolchainForExtension(extension))
    }

    /// Merge resource limits with defaults
    pub fn effective_limits(&self, overrides: Option<&ResourceLimits>) -> ResourceLimits {
        match overrides {
            Some(limits) => self.default_limits.overlaid_with(limits),
            None => self.default_limits.clone(),
        }
    }

    /// Memory sampling interval as a duration
    pub fn memory_poll_interval(&self) -> Duration {
        Duration::from_millis(self.memory_poll_interval_ms.max(1))
    }

    /// Directory under which scratch directories are created
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

/// Default compilation limits
fn default_compile_limits() -> ResourceLimits {
    ResourceLimits {
        time_limit: Some(30.0),     // 30 seconds
        extra_time: Some(0.0),
        memory_limit: Some(524288), // 512 MB
        stack_limit: None,
        max_output: Some(65536),    // 64 MB of diagnostics
        max_open_files: None,
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_memory_poll_interval_ms() -> u64 {
    10
}
