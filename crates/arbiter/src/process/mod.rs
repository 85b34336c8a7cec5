//! Process execution subsystem
//!
//! Launches a program as a child process with resource limits, captures its
//! output into bounded buffers and reports how it ended. The whole process
//! tree is killed on timeout, on memory violation and when the execution is
//! cancelled.

#[cfg(unix)]
mod capture;
mod command;
#[cfg(unix)]
mod tree;
#[cfg(unix)]
mod unix;

pub use command::{DEFAULT_POLL_INTERVAL, ExecutionRequest, InputSource, resolve_command};
#[cfg(unix)]
pub use unix::execute;

#[cfg(not(unix))]
use crate::error::{Component, StructuredError};
#[cfg(not(unix))]
use crate::types::ExecutionResult;

/// Run a program to completion under the request's limits
///
/// Process control is only implemented for unix targets.
#[cfg(not(unix))]
pub async fn execute(request: ExecutionRequest) -> Result<ExecutionResult, StructuredError> {
    Err(StructuredError::unsupported(
        Component::Process,
        format!(
            "cannot run '{}': process execution is not supported on this platform",
            request.program()
        ),
    ))
}
