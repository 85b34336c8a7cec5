//! Compilation step
//!
//! Runs a toolchain's compiler on a source file inside a fresh build
//! directory and turns the result into a [`Program`] or a compile failure.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::config::{Bindings, Config, Toolchain};
use crate::error::{Component, StructuredError};
use crate::process::{self, ExecutionRequest};
use crate::runner::Program;
use crate::types::{ExecutionResult, ResourceLimits, Termination};

/// Why a compilation did not produce a program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileFailureReason {
    /// Compiler exited with a non-zero code
    ExitCode(i32),

    /// Compiler was killed by a signal
    Signaled(i32),

    /// Compiler ran past the compile time limit
    TimedOut,

    /// Compiler ran past the compile memory limit
    MemoryExceeded,

    /// Compiler reported success but the artifact is missing
    MissingArtifact,
}

impl fmt::Display for CompileFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileFailureReason::ExitCode(code) => write!(f, "compiler exited with code {code}"),
            CompileFailureReason::Signaled(signal) => {
                write!(f, "compiler was killed by signal {signal}")
            }
            CompileFailureReason::TimedOut => f.write_str("compilation timed out"),
            CompileFailureReason::MemoryExceeded => {
                f.write_str("compilation exceeded the memory limit")
            }
            CompileFailureReason::MissingArtifact => {
                f.write_str("compiler reported success but produced no artifact")
            }
        }
    }
}

/// A failed compilation with the compiler's diagnostics
#[derive(Debug, Clone)]
pub struct CompileFailure {
    pub reason: CompileFailureReason,

    /// Compiler stderr verbatim (stdout if stderr was empty)
    pub diagnostics: String,

    /// The compiler's execution result
    pub execution: ExecutionResult,
}

/// Result of a compilation
#[derive(Debug, Clone)]
pub enum CompileOutcome {
    Compiled {
        program: Program,
        /// Compiler output, usually warnings
        diagnostics: String,
    },
    Failed(CompileFailure),
}

impl CompileOutcome {
    /// Check if compilation was successful
    pub fn is_success(&self) -> bool {
        matches!(self, CompileOutcome::Compiled { .. })
    }

    pub fn program(&self) -> Option<&Program> {
        match self {
            CompileOutcome::Compiled { program, .. } => Some(program),
            CompileOutcome::Failed(_) => None,
        }
    }

    pub fn diagnostics(&self) -> &str {
        match self {
            CompileOutcome::Compiled { diagnostics, .. } => diagnostics,
            CompileOutcome::Failed(failure) => &failure.diagnostics,
        }
    }
}

fn diagnostics_of(execution: &ExecutionResult) -> String {
    if execution.stderr.is_empty() {
        String::from_utf8_lossy(&execution.stdout).into_owned()
    } else {
        execution.stderr_lossy()
    }
}

fn failure_reason(execution: &ExecutionResult, artifact: &Path) -> Option<CompileFailureReason> {
    match execution.termination {
        Termination::TimedOut => Some(CompileFailureReason::TimedOut),
        Termination::MemoryExceeded => Some(CompileFailureReason::MemoryExceeded),
        Termination::Signaled(signal) => Some(CompileFailureReason::Signaled(signal)),
        Termination::Exited(0) if !artifact.is_file() => Some(CompileFailureReason::MissingArtifact),
        Termination::Exited(0) => None,
        Termination::Exited(code) => Some(CompileFailureReason::ExitCode(code)),
    }
}

/// Effective compile limits: configured base, then toolchain, then caller
fn compile_limits(
    config: &Config,
    toolchain: &Toolchain,
    limits: Option<&ResourceLimits>,
) -> ResourceLimits {
    let mut effective = config.compile_limits.clone();
    if let Some(toolchain_limits) = toolchain.compile.as_ref().and_then(|c| c.limits.as_ref()) {
        effective = effective.overlaid_with(toolchain_limits);
    }
    if let Some(user) = limits {
        effective = effective.overlaid_with(user);
    }
    effective
}

/// Compile a source file with the given toolchain
///
/// Interpreted toolchains skip the compiler and return a program running the
/// source in place.
#[instrument(skip(config, limits), fields(source = %source.display()))]
pub(crate) async fn compile(
    config: &Config,
    toolchain_id: &str,
    source: &Path,
    limits: Option<&ResourceLimits>,
) -> Result<CompileOutcome, StructuredError> {
    let toolchain = config
        .get_toolchain(toolchain_id)
        .map_err(|e| StructuredError::from(e).within(Component::Compiler))?;

    let source = std::path::absolute(source)
        .map_err(|e| StructuredError::io(Component::Compiler, source, &e))?;
    if !source.is_file() {
        return Err(StructuredError::file(
            Component::Compiler,
            format!("source file '{}' does not exist", source.display()),
        ));
    }
    let run_limits = config.effective_limits(toolchain.run.limits.as_ref());

    let Some(ref compile_config) = toolchain.compile else {
        let source_str = source.to_string_lossy();
        let command = toolchain.run.command.expand(Bindings {
            source: &source_str,
            artifact: &source_str,
        });
        let working_dir = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        debug!(?command, "interpreted toolchain, nothing to compile");
        let program = Program::new(
            toolchain_id,
            command,
            source.clone(),
            working_dir,
            run_limits,
            toolchain.run.environment(),
        );
        return Ok(CompileOutcome::Compiled {
            program,
            diagnostics: String::new(),
        });
    };

    let scratch = std::path::absolute(config.scratch_root())
        .map_err(|e| StructuredError::io(Component::Compiler, &config.scratch_root(), &e))?;
    let build_dir = tempfile::Builder::new()
        .prefix("arbiter-build-")
        .tempdir_in(&scratch)
        .map_err(|e| {
            StructuredError::system(
                Component::Compiler,
                format!("failed to create build directory in {}: {e}", scratch.display()),
            )
        })?;

    let source_in_build = match compile_config.source_name {
        Some(ref name) => {
            let target = build_dir.path().join(name);
            tokio::fs::copy(&source, &target)
                .await
                .map_err(|e| StructuredError::io(Component::Compiler, &source, &e))?;
            target
        }
        None => source.clone(),
    };
    let artifact = build_dir.path().join(&compile_config.output_name);
    let source_str = source_in_build.to_string_lossy();
    let artifact_str = artifact.to_string_lossy();

    let bindings = Bindings {
        source: &source_str,
        artifact: &artifact_str,
    };
    let command = compile_config.command.expand(bindings);
    debug!(?command, "compiling");

    let request = ExecutionRequest::new(command)
        .limits(compile_limits(config, toolchain, limits))
        .working_dir(build_dir.path())
        .env("PATH", &toolchain.run.path)
        .env_inherit("HOME")
        .env_inherit("TMPDIR")
        .envs(compile_config.env.iter().map(|(k, v)| (k.clone(), v.clone())))
        .poll_interval(config.memory_poll_interval());

    let execution = process::execute(request)
        .await
        .map_err(|e| e.within(Component::Compiler))?;
    let mut diagnostics = diagnostics_of(&execution);

    debug!(
        termination = ?execution.termination,
        time = execution.wall_time,
        "compilation complete"
    );

    if let Some(reason) = failure_reason(&execution, &artifact) {
        if diagnostics.is_empty() {
            diagnostics = reason.to_string();
        }
        return Ok(CompileOutcome::Failed(CompileFailure {
            reason,
            diagnostics,
            execution,
        }));
    }

    let command = toolchain.run.command.expand(bindings);
    let program = Program::new(
        toolchain_id,
        command,
        artifact.clone(),
        build_dir.path().to_path_buf(),
        run_limits,
        toolchain.run.environment(),
    )
    .owning(build_dir);

    Ok(CompileOutcome::Compiled {
        program,
        diagnostics,
    })
}
