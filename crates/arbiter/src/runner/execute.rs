//! Execution step for compiled or interpreted programs

use std::path::Path;

use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::StructuredError;
use crate::process::{self, InputSource};
use crate::runner::Program;
use crate::types::{ExecutionResult, ResourceLimits};

/// Run a program once
///
/// Limits are the program's own (configured defaults merged with the
/// toolchain's run limits) overridden by `limits`.
#[instrument(skip(config, program, input, limits), fields(toolchain = program.toolchain()))]
pub(crate) async fn execute(
    config: &Config,
    program: &Program,
    input: InputSource,
    working_dir: Option<&Path>,
    limits: Option<&ResourceLimits>,
) -> Result<ExecutionResult, StructuredError> {
    let mut request = program
        .request(input, limits)
        .poll_interval(config.memory_poll_interval());
    if let Some(dir) = working_dir {
        request = request.working_dir(dir);
    }

    let result = process::execute(request).await?;

    debug!(
        termination = ?result.termination,
        time = result.wall_time,
        memory = result.memory,
        "program finished"
    );

    Ok(result)
}
