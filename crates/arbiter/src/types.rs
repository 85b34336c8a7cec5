use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Component, StructuredError};

/// Upper bound accepted for time limits, in seconds
pub const MAX_TIME_LIMIT: f64 = 3600.0;

/// Upper bound accepted for memory, stack and output limits, in kilobytes
pub const MAX_SIZE_LIMIT: u64 = 64 * ResourceLimits::GB;

/// Ceilings a program runs under; `None` leaves a resource unlimited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Seconds of wall time before the verdict is a timeout
    #[serde(default)]
    pub time_limit: Option<f64>,

    /// Grace period in seconds before an over-time program is killed
    #[serde(default)]
    pub extra_time: Option<f64>,

    /// KiB the whole process tree may hold
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// `RLIMIT_STACK`, in KiB
    #[serde(default)]
    pub stack_limit: Option<u64>,

    /// Maximum captured size of each output stream in kilobytes
    #[serde(default)]
    pub max_output: Option<u64>,

    /// `RLIMIT_NOFILE`
    #[serde(default)]
    pub max_open_files: Option<u32>,
}

impl ResourceLimits {
    // Size limits are counted in KiB
    pub const KB: u64 = 1;
    pub const MB: u64 = 1024;
    pub const GB: u64 = 1024 * 1024;

    /// Limits with every field unset; overlaying them changes nothing
    pub fn none() -> Self {
        Self {
            time_limit: None,
            extra_time: None,
            memory_limit: None,
            stack_limit: None,
            max_output: None,
            max_open_files: None,
        }
    }

    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    pub fn with_extra_time(mut self, seconds: f64) -> Self {
        self.extra_time = Some(seconds);
        self
    }

    pub fn with_memory_limit(mut self, kb: u64) -> Self {
        self.memory_limit = Some(kb);
        self
    }

    pub fn with_max_output(mut self, kb: u64) -> Self {
        self.max_output = Some(kb);
        self
    }

    /// `top` laid over `self`: each limit `top` sets wins, the rest stay
    ///
    /// Limits stack from the configured defaults through the toolchain and
    /// problem up to a single case.
    pub fn overlaid_with(&self, top: &ResourceLimits) -> ResourceLimits {
        let ResourceLimits {
            time_limit,
            extra_time,
            memory_limit,
            stack_limit,
            max_output,
            max_open_files,
        } = top.clone();
        ResourceLimits {
            time_limit: time_limit.or(self.time_limit),
            extra_time: extra_time.or(self.extra_time),
            memory_limit: memory_limit.or(self.memory_limit),
            stack_limit: stack_limit.or(self.stack_limit),
            max_output: max_output.or(self.max_output),
            max_open_files: max_open_files.or(self.max_open_files),
        }
    }

    /// How long a program may run before it is killed: the time limit plus
    /// the grace period
    pub fn kill_after(&self) -> Option<Duration> {
        let seconds = self.time_limit? + self.extra_time.unwrap_or(0.0);
        Some(Duration::from_secs_f64(seconds))
    }

    /// Check that every present limit is positive, finite and within bounds
    ///
    /// Malformed values are reported as `InvalidArgument`, values past the
    /// accepted ceilings as `RangeError`.
    pub fn validate(&self, component: Component) -> Result<(), StructuredError> {
        for (name, value) in [("time_limit", self.time_limit), ("extra_time", self.extra_time)] {
            let Some(value) = value else { continue };
            let positive = if name == "extra_time" {
                value >= 0.0
            } else {
                value > 0.0
            };
            if !value.is_finite() || !positive {
                return Err(StructuredError::invalid_argument(
                    component,
                    format!("{name} must be a finite number of seconds above zero, got {value}"),
                ));
            }
            if value > MAX_TIME_LIMIT {
                return Err(StructuredError::range(
                    component,
                    format!("{name} of {value}s exceeds the maximum of {MAX_TIME_LIMIT}s"),
                ));
            }
        }

        for (name, value) in [
            ("memory_limit", self.memory_limit),
            ("stack_limit", self.stack_limit),
            ("max_output", self.max_output),
        ] {
            let Some(value) = value else { continue };
            if value == 0 {
                return Err(StructuredError::invalid_argument(
                    component,
                    format!("{name} must be positive"),
                ));
            }
            if value > MAX_SIZE_LIMIT {
                return Err(StructuredError::range(
                    component,
                    format!("{name} of {value} KB exceeds the maximum of {MAX_SIZE_LIMIT} KB"),
                ));
            }
        }

        if self.max_open_files == Some(0) {
            return Err(StructuredError::invalid_argument(
                component,
                "max_open_files must be positive",
            ));
        }

        Ok(())
    }

    /// Output cap per stream in bytes, if any
    pub fn output_cap_bytes(&self) -> Option<usize> {
        self.max_output
            .map(|kb| usize::try_from(kb.saturating_mul(1024)).unwrap_or(usize::MAX))
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            time_limit: Some(2.0),
            extra_time: Some(0.5),
            memory_limit: Some(256 * Self::MB),
            stack_limit: Some(256 * Self::MB),
            max_output: Some(64 * Self::MB),
            max_open_files: Some(64),
        }
    }
}

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Program exited on its own with this code
    Exited(i32),

    /// Program was killed by this signal (not by the judge)
    Signaled(i32),

    /// Wall clock limit exceeded; the process tree was killed
    TimedOut,

    /// Memory limit exceeded; the process tree was killed
    MemoryExceeded,
}

/// What one run of a program produced
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub termination: Termination,

    /// Seconds from spawn to reap
    pub wall_time: f64,

    /// Largest tree memory reading in KiB, 0 when nothing could be sampled
    pub memory: u64,

    /// Both streams are cut at the output cap
    pub stdout: Vec<u8>,

    pub stderr: Vec<u8>,

    /// Set when either stream was cut
    pub truncated: bool,
}

impl ExecutionResult {
    /// Exited with `success_code` and wrote nothing past the cap
    #[must_use]
    pub fn is_success(&self, success_code: i32) -> bool {
        self.termination == Termination::Exited(success_code) && !self.truncated
    }

    /// Exit code if the program exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// Signal number if the program was killed by a signal
    pub fn signal(&self) -> Option<i32> {
        match self.termination {
            Termination::Signaled(signal) => Some(signal),
            _ => None,
        }
    }

    /// Which limit, if any, ended or spoiled the execution
    pub fn limit_exceeded(&self) -> LimitExceeded {
        match self.termination {
            Termination::TimedOut => LimitExceeded::Time,
            Termination::MemoryExceeded => LimitExceeded::Memory,
            _ if self.truncated => LimitExceeded::Output,
            _ => LimitExceeded::NotExceeded,
        }
    }

    /// Captured stderr as lossy UTF-8
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self {
            termination: Termination::Exited(0),
            wall_time: 0.0,
            memory: 0,
            stdout: Vec::new(),
            stderr: Vec::new(),
            truncated: false,
        }
    }
}

/// Which resource limit was exceeded, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LimitExceeded {
    #[default]
    #[serde(rename = "none")]
    NotExceeded,

    /// Ran past `time_limit`
    #[serde(rename = "time")]
    Time,

    /// Grew past `memory_limit`
    #[serde(rename = "memory")]
    Memory,

    /// Wrote more than `max_output` to a stream
    #[serde(rename = "output")]
    Output,
}

impl LimitExceeded {
    /// False only for `NotExceeded`
    #[must_use]
    pub fn is_exceeded(&self) -> bool {
        !matches!(self, LimitExceeded::NotExceeded)
    }
}
