//! Execution request builder
//!
//! Describes a single child process launch: argv, environment, working
//! directory, limits and standard input.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::DEFAULT_RUN_PATH;
use crate::error::{Component, StructuredError};
use crate::types::ResourceLimits;

/// Default interval between memory samples
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Where a child's standard input comes from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InputSource {
    /// Standard input is `/dev/null`
    #[default]
    Empty,

    /// Standard input is read from a file
    File(PathBuf),

    /// Standard input is fed from memory
    Bytes(Arc<[u8]>),
}

impl InputSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        InputSource::File(path.into())
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        InputSource::Bytes(Arc::from(data.into()))
    }

    /// Size of the input in bytes, if known without reading it
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            InputSource::Empty => Some(0),
            InputSource::File(path) => std::fs::metadata(path).ok().map(|m| m.len()),
            InputSource::Bytes(data) => Some(data.len() as u64),
        }
    }
}

/// A request to run one program under limits
///
/// Immutable once handed to [`execute`](crate::process::execute).
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    command: Vec<String>,
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
    env_inherit: Vec<String>,
    limits: ResourceLimits,
    input: InputSource,
    poll_interval: Duration,
}

impl ExecutionRequest {
    /// Create a request for the given argv with default limits
    pub fn new(command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: HashMap::new(),
            env_inherit: Vec::new(),
            limits: ResourceLimits::default(),
            input: InputSource::Empty,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set resource limits
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the working directory of the child
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables
    pub fn envs<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Inherit an environment variable from the parent process
    pub fn env_inherit(mut self, key: impl Into<String>) -> Self {
        self.env_inherit.push(key.into());
        self
    }

    /// Set standard input
    pub fn input(mut self, input: InputSource) -> Self {
        self.input = input;
        self
    }

    /// Set the memory sampling interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// First element of the command, or an empty string
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    pub fn get_working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn get_limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn get_input(&self) -> &InputSource {
        &self.input
    }

    pub fn get_poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Environment the child starts with: explicit variables plus the
    /// inherited ones that are set in the parent
    pub fn environment(&self) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = self
            .env_inherit
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)))
            .collect();
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    /// PATH used to resolve a bare program name
    pub fn search_path(&self) -> String {
        self.env
            .get("PATH")
            .cloned()
            .or_else(|| std::env::var("PATH").ok())
            .unwrap_or_else(|| DEFAULT_RUN_PATH.to_string())
    }
}

/// Resolve the program in argv to a path
///
/// Names containing a `/` are checked for existence as given (relative to
/// `working_dir` when relative). Bare names are searched in `search_path`.
pub fn resolve_command(
    command: &mut [String],
    search_path: &str,
    working_dir: Option<&Path>,
) -> Result<(), StructuredError> {
    let Some(first) = command.first_mut() else {
        return Err(StructuredError::invalid_argument(
            Component::Process,
            "empty command",
        ));
    };

    if first.contains('/') {
        let path = Path::new(first.as_str());
        let resolved = match working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };
        if !resolved.is_file() {
            return Err(StructuredError::system(
                Component::Process,
                format!("program '{}' does not exist", resolved.display()),
            ));
        }
        *first = resolved.to_string_lossy().into_owned();
        return Ok(());
    }

    for dir in search_path.split(':').filter(|dir| !dir.is_empty()) {
        let candidate = Path::new(dir).join(&*first);
        if candidate.is_file() {
            *first = candidate.to_string_lossy().into_owned();
            return Ok(());
        }
    }

    Err(StructuredError::system(
        Component::Process,
        format!("command '{first}' not found in PATH"),
    ))
}
