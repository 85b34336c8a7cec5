//! Compilation driver and program runner
//!
//! Provides high-level APIs for compiling sources with a configured
//! toolchain and running the resulting programs.

use std::path::Path;
use std::sync::Arc;

pub use crate::runner::compile::{CompileFailure, CompileFailureReason, CompileOutcome};
pub use crate::runner::program::Program;

mod compile;
mod execute;
mod program;

use crate::{
    config::Config,
    error::StructuredError,
    process::InputSource,
    types::{ExecutionResult, ResourceLimits},
};

/// High-level runner for compiling and executing code
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Create a runner sharing an existing configuration
    pub fn from_shared(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn shared_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Compile a source file with the toolchain `toolchain_id`
    ///
    /// A compiler that fails, times out or produces no artifact yields
    /// [`CompileOutcome::Failed`]. Errors are reserved for problems outside
    /// the submission (missing source, unknown toolchain, no compiler).
    pub async fn compile(
        &self,
        source: &Path,
        toolchain_id: &str,
        limits: Option<&ResourceLimits>,
    ) -> Result<CompileOutcome, StructuredError> {
        compile::compile(&self.config, toolchain_id, source, limits).await
    }

    /// Compile a source file with the toolchain matching its extension
    pub async fn compile_detected(
        &self,
        source: &Path,
        limits: Option<&ResourceLimits>,
    ) -> Result<CompileOutcome, StructuredError> {
        let (toolchain_id, _) = self.config.toolchain_for_source(source)?;
        let toolchain_id = toolchain_id.to_owned();
        self.compile(source, &toolchain_id, limits).await
    }

    /// Run a program in its own working directory
    pub async fn run(
        &self,
        program: &Program,
        input: InputSource,
        limits: Option<&ResourceLimits>,
    ) -> Result<ExecutionResult, StructuredError> {
        execute::execute(&self.config, program, input, None, limits).await
    }

    /// Run a program in the given working directory
    pub async fn run_in(
        &self,
        program: &Program,
        working_dir: &Path,
        input: InputSource,
        limits: Option<&ResourceLimits>,
    ) -> Result<ExecutionResult, StructuredError> {
        execute::execute(&self.config, program, input, Some(working_dir), limits).await
    }

    /// Compile and run in one step
    ///
    /// Returns the compile outcome and, if compilation succeeded, the run
    /// result.
    pub async fn compile_and_run(
        &self,
        source: &Path,
        toolchain_id: &str,
        input: InputSource,
        limits: Option<&ResourceLimits>,
    ) -> Result<(CompileOutcome, Option<ExecutionResult>), StructuredError> {
        let outcome = self.compile(source, toolchain_id, None).await?;

        match outcome.program() {
            Some(program) => {
                let result = self.run(program, input, limits).await?;
                Ok((outcome, Some(result)))
            }
            None => Ok((outcome, None)),
        }
    }
}
