use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::DEFAULT_RUN_PATH;
use crate::process::{ExecutionRequest, InputSource};
use crate::types::ResourceLimits;

/// A runnable artifact
///
/// Produced by compilation (or directly for interpreted toolchains and
/// prebuilt executables). Cloning is cheap; a compiled program's build
/// directory lives until the last clone is dropped.
#[derive(Debug, Clone)]
pub struct Program {
    toolchain: String,
    command: Vec<String>,
    path: PathBuf,
    working_dir: PathBuf,
    limits: ResourceLimits,
    env: HashMap<String, String>,
    build_dir: Option<Arc<TempDir>>,
}

impl Program {
    pub(crate) fn new(
        toolchain: impl Into<String>,
        command: Vec<String>,
        path: PathBuf,
        working_dir: PathBuf,
        limits: ResourceLimits,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            toolchain: toolchain.into(),
            command,
            path,
            working_dir,
            limits,
            env,
            build_dir: None,
        }
    }

    pub(crate) fn owning(mut self, build_dir: TempDir) -> Self {
        self.build_dir = Some(Arc::new(build_dir));
        self
    }

    /// Wrap an existing executable, run with default limits
    ///
    /// A relative path is taken against the current directory, since the
    /// program may later run from a scratch directory.
    pub fn from_executable(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = std::path::absolute(&path).unwrap_or(path);
        let working_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let env = HashMap::from([("PATH".to_string(), DEFAULT_RUN_PATH.to_string())]);
        Self::new(
            "native",
            vec![path.to_string_lossy().into_owned()],
            path,
            working_dir,
            ResourceLimits::default(),
            env,
        )
    }

    /// Append arguments to the run command
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command.extend(args.into_iter().map(Into::into));
        self
    }

    /// Override the program's limits field by field
    pub fn with_limits(mut self, limits: &ResourceLimits) -> Self {
        self.limits = self.limits.overlaid_with(limits);
        self
    }

    /// Set an environment variable for every run
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// ID of the toolchain that produced this program
    pub fn toolchain(&self) -> &str {
        &self.toolchain
    }

    /// Full run command
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Path of the artifact (the source file for interpreted programs)
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default working directory for runs
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Limits every run starts from
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Build an execution request for one run of this program
    pub fn request(&self, input: InputSource, overrides: Option<&ResourceLimits>) -> ExecutionRequest {
        let limits = match overrides {
            Some(overrides) => self.limits.overlaid_with(overrides),
            None => self.limits.clone(),
        };
        ExecutionRequest::new(self.command.iter().cloned())
            .limits(limits)
            .working_dir(&self.working_dir)
            .envs(self.env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .input(input)
    }
}
