//! Child process execution on unix
//!
//! Every child runs in its own process group, and its descendants are
//! tracked even after they leave it. Rlimits are applied between fork and
//! exec; wall clock and memory are watched from the async side.

use std::os::fd::AsRawFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::sys::resource::{Resource, getrlimit, setrlimit};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument};

use crate::error::{Component, StructuredError};
use crate::process::capture::{self, Capture, Captured};
use crate::process::command::{ExecutionRequest, InputSource, resolve_command};
use crate::process::tree::ProcessTree;
use crate::types::{ExecutionResult, ResourceLimits, Termination};

/// Rlimits applied in the child before exec
#[derive(Debug, Clone, Copy, Default)]
struct RlimitPlan {
    cpu_seconds: Option<u64>,
    stack_bytes: Option<u64>,
    open_files: Option<u64>,
    file_size_bytes: Option<u64>,
}

impl RlimitPlan {
    fn from_limits(limits: &ResourceLimits) -> Self {
        let cpu_seconds = limits
            .kill_after()
            .map(|wall| wall.as_secs_f64().ceil() as u64 + 1);
        Self {
            cpu_seconds,
            stack_bytes: limits.stack_limit.map(|kb| kb.saturating_mul(1024)),
            open_files: limits.max_open_files.map(u64::from),
            file_size_bytes: limits.max_output.map(|kb| kb.saturating_mul(1024)),
        }
    }

    /// Runs in the forked child; only async-signal-safe calls allowed
    fn apply(&self) -> std::io::Result<()> {
        lower(Resource::RLIMIT_CORE, 0, 0)?;
        if let Some(cpu) = self.cpu_seconds {
            // SIGXCPU at the soft limit, SIGKILL one second later
            lower(Resource::RLIMIT_CPU, cpu, cpu + 1)?;
        }
        if let Some(stack) = self.stack_bytes {
            lower(Resource::RLIMIT_STACK, stack, stack)?;
        }
        if let Some(files) = self.open_files {
            lower(Resource::RLIMIT_NOFILE, files, files)?;
        }
        if let Some(size) = self.file_size_bytes {
            lower(Resource::RLIMIT_FSIZE, size, size)?;
        }
        Ok(())
    }
}

/// Set a limit, never raising it past the current hard limit
fn lower(resource: Resource, soft: u64, hard: u64) -> std::io::Result<()> {
    let (_, current_hard) = getrlimit(resource)?;
    let hard = hard.min(current_hard);
    setrlimit(resource, soft.min(hard), hard)?;
    Ok(())
}

fn spawn_failed(program: &str, e: &std::io::Error) -> StructuredError {
    StructuredError::system(Component::Process, format!("failed to launch '{program}': {e}"))
}

fn classify(status: ExitStatus) -> Termination {
    match (status.code(), status.signal()) {
        (Some(code), _) => Termination::Exited(code),
        (None, Some(signal)) => Termination::Signaled(signal),
        (None, None) => Termination::Signaled(0),
    }
}

/// Run a program to completion under the request's limits
///
/// Launch failures are errors; everything the program itself does
/// (exit codes, signals, limit violations) is reported in the result.
#[instrument(skip(request), fields(program = request.program()))]
pub async fn execute(request: ExecutionRequest) -> Result<ExecutionResult, StructuredError> {
    let limits = request.get_limits().clone();
    limits.validate(Component::Process)?;

    // Anchored once so a relative program path is not joined onto it twice
    let working_dir = match request.get_working_dir() {
        Some(dir) => Some(
            std::path::absolute(dir).map_err(|e| StructuredError::io(Component::Process, dir, &e))?,
        ),
        None => None,
    };

    let mut argv = request.command().to_vec();
    resolve_command(&mut argv, &request.search_path(), working_dir.as_deref())?;

    let stdin = match request.get_input() {
        InputSource::Empty => Stdio::null(),
        InputSource::File(path) => std::fs::File::open(path)
            .map(Stdio::from)
            .map_err(|e| StructuredError::io(Component::Process, path, &e))?,
        InputSource::Bytes(_) => Stdio::piped(),
    };

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .env_clear()
        .envs(request.environment())
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    if let Some(dir) = &working_dir {
        cmd.current_dir(dir);
    }

    let plan = RlimitPlan::from_limits(&limits);
    // SAFETY: the hook only calls getrlimit and setrlimit, both async-signal-safe.
    unsafe {
        cmd.pre_exec(move || plan.apply());
    }

    debug!(?argv, "spawning");
    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| spawn_failed(&argv[0], &e))?;
    let pid = child
        .id()
        .ok_or_else(|| StructuredError::system(Component::Process, "child exited before it was tracked"))?;
    // Declared after `child` so it drops first, while the root is unreaped
    let mut tree = ProcessTree::new(pid);

    let cap = limits.output_cap_bytes();
    let stdout_capture = child.stdout.take().map(|out| {
        tree.watch_pipe(out.as_raw_fd());
        Capture::spawn(out, cap)
    });
    let stderr_capture = child.stderr.take().map(|err| {
        tree.watch_pipe(err.as_raw_fd());
        Capture::spawn(err, cap)
    });

    let stdin_task = match (request.get_input(), child.stdin.take()) {
        (InputSource::Bytes(data), Some(mut writer)) => {
            let data = data.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = writer.write_all(&data).await
                    && e.kind() != std::io::ErrorKind::BrokenPipe
                {
                    debug!(error = %e, "failed to feed stdin");
                }
            }))
        }
        _ => None,
    };

    let (termination, peak_memory) =
        supervise(&mut child, &mut tree, &limits, request.get_poll_interval(), start).await?;
    let elapsed = start.elapsed().as_secs_f64();

    // Clear out anything the program left running, detached or not
    tree.kill();
    if let Some(task) = stdin_task {
        task.abort();
    }

    let Captured {
        data: stdout,
        truncated: stdout_truncated,
    } = capture::join(stdout_capture, "stdout").await;
    let Captured {
        data: stderr,
        truncated: stderr_truncated,
    } = capture::join(stderr_capture, "stderr").await;

    let termination = match termination {
        Termination::Exited(_) | Termination::Signaled(_)
            if limits.time_limit.is_some_and(|limit| elapsed > limit) =>
        {
            Termination::TimedOut
        }
        Termination::Exited(_) | Termination::Signaled(_)
            if limits.memory_limit.is_some_and(|limit| peak_memory > limit) =>
        {
            Termination::MemoryExceeded
        }
        other => other,
    };

    let result = ExecutionResult {
        termination,
        wall_time: elapsed,
        memory: peak_memory,
        stdout,
        stderr,
        truncated: stdout_truncated || stderr_truncated,
    };

    debug!(
        termination = ?result.termination,
        time = result.wall_time,
        memory = result.memory,
        truncated = result.truncated,
        "execution complete"
    );

    Ok(result)
}

/// Wait for the child while enforcing the wall clock and memory ceilings
///
/// Returns the termination cause and the peak memory observed in KiB.
async fn supervise(
    child: &mut Child,
    tree: &mut ProcessTree,
    limits: &ResourceLimits,
    poll_interval: Duration,
    start: Instant,
) -> Result<(Termination, u64), StructuredError> {
    let deadline = limits
        .kill_after()
        .map(|wall| tokio::time::Instant::from_std(start) + wall);

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut peak = 0u64;

    let wait_failed =
        |e: std::io::Error| StructuredError::system(Component::Process, format!("wait failed: {e}"));

    loop {
        tokio::select! {
            status = child.wait() => {
                return Ok((classify(status.map_err(wait_failed)?), peak));
            }
            _ = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            } => {
                debug!("wall clock limit reached, killing process tree");
                tree.kill();
                child.wait().await.map_err(wait_failed)?;
                return Ok((Termination::TimedOut, peak));
            }
            _ = ticker.tick() => {
                if let Some(usage) = tree.poll() {
                    let kb = usage.observed_kb();
                    peak = peak.max(kb);
                    if limits.memory_limit.is_some_and(|limit| kb > limit) {
                        debug!(memory = kb, "memory limit exceeded, killing process tree");
                        tree.kill();
                        child.wait().await.map_err(wait_failed)?;
                        return Ok((Termination::MemoryExceeded, peak));
                    }
                }
            }
        }
    }
}
