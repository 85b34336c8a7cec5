//! Membership, memory and teardown of a child's process tree
//!
//! A descendant can leave the child's process group with `setsid` or
//! `setpgid`, so the group alone does not bound the tree. On Linux the tree
//! is rebuilt from `/proc` on every poll: a process joins when its parent is
//! already a member, when it is still in the root's group, or (at teardown)
//! when it holds one of the run's output pipes. Members are keyed by pid and
//! start time so a recycled pid is never mistaken for one of ours.

use std::collections::HashMap;
use std::os::fd::RawFd;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Teardown rescans until a pass finds nothing new, at most this many times
const KILL_PASSES: usize = 8;

/// Memory readings from one poll, in KiB
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TreeUsage {
    /// Resident set summed over every live member
    pub resident_kb: u64,
    /// Largest per-process high-water mark (`VmHWM`) among live members
    pub high_water_kb: u64,
}

impl TreeUsage {
    /// The figure compared against the memory limit
    pub fn observed_kb(&self) -> u64 {
        self.resident_kb.max(self.high_water_kb)
    }
}

/// Every process a run has spawned, killed on drop
///
/// Dropping the execution future (cancellation) drops this guard, which
/// takes every known descendant down with it.
pub(crate) struct ProcessTree {
    root: Pid,
    /// pid -> start time in clock ticks since boot (0 when unreadable)
    members: HashMap<i32, u64>,
    /// `/proc/self/fd` link targets of the run's output pipes
    pipes: Vec<String>,
    killed: bool,
}

impl ProcessTree {
    pub fn new(pid: u32) -> Self {
        let root = pid as i32;
        let start_time = proc_fs::read_stat(root).map_or(0, |stat| stat.start_time);
        Self {
            root: Pid::from_raw(root),
            members: HashMap::from([(root, start_time)]),
            pipes: Vec::new(),
            killed: false,
        }
    }

    /// Remember an output pipe so detached holders of it can be found later
    pub fn watch_pipe(&mut self, fd: RawFd) {
        if let Some(target) = proc_fs::fd_target("self", &fd.to_string()) {
            self.pipes.push(target);
        }
    }

    /// Number of processes currently tracked, the root included
    #[cfg(test)]
    fn len(&self) -> usize {
        self.members.len()
    }

    /// Rescan the tree and sample its memory
    ///
    /// Returns `None` when no member could be read (the tree is gone, or the
    /// platform has no `/proc`).
    pub fn poll(&mut self) -> Option<TreeUsage> {
        self.rescan(false);
        proc_fs::usage(self.members.keys().copied())
    }

    /// SIGKILL every member and the root's process group
    ///
    /// Only the first call does anything.
    pub fn kill(&mut self) {
        if std::mem::replace(&mut self.killed, true) {
            return;
        }
        for _ in 0..KILL_PASSES {
            let grew = self.rescan(true);
            self.signal_all();
            if !grew {
                return;
            }
        }
        warn!(root = self.root.as_raw(), "process tree still growing after teardown");
    }

    fn signal_all(&self) {
        match killpg(self.root, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!(pgid = self.root.as_raw(), error = %e, "failed to kill process group"),
        }
        for &pid in self.members.keys() {
            match kill(Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => debug!(pid, error = %e, "failed to kill descendant"),
            }
        }
    }

    /// Fold a fresh `/proc` snapshot into the member set
    ///
    /// Returns whether any process joined.
    fn rescan(&mut self, with_pipes: bool) -> bool {
        let Some(snapshot) = proc_fs::snapshot() else {
            return false;
        };

        // Drop members that exited or whose pid now belongs to someone else
        self.members.retain(|pid, start| match snapshot.get(pid) {
            Some(stat) => *start == 0 || stat.start_time == *start,
            None => false,
        });

        let before = self.members.len();
        let root = self.root.as_raw();
        loop {
            let joined: Vec<(i32, u64)> = snapshot
                .iter()
                .filter(|&(pid, stat)| {
                    !self.members.contains_key(pid)
                        && (stat.pgrp == root || self.members.contains_key(&stat.ppid))
                })
                .map(|(&pid, stat)| (pid, stat.start_time))
                .collect();
            if joined.is_empty() {
                break;
            }
            self.members.extend(joined);
        }

        if with_pipes && !self.pipes.is_empty() {
            // Our other children may hold the pipes briefly between fork and exec
            let own = std::process::id() as i32;
            for (&pid, stat) in &snapshot {
                if pid != own
                    && stat.ppid != own
                    && !self.members.contains_key(&pid)
                    && proc_fs::holds_any(pid, &self.pipes)
                {
                    debug!(pid, "found detached process holding an output pipe");
                    self.members.insert(pid, stat.start_time);
                }
            }
        }

        self.members.len() > before
    }
}

impl Drop for ProcessTree {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Fields of `/proc/<pid>/stat` the tree cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stat {
    ppid: i32,
    pgrp: i32,
    start_time: u64,
}

/// Parse `/proc/<pid>/stat`
///
/// The command name is parenthesized and may contain spaces, so fields are
/// counted from the last `)`.
fn parse_stat(stat: &str) -> Option<Stat> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is the state (field 3); ppid, pgrp and starttime are 4, 5 and 22
    Some(Stat {
        ppid: fields.get(1)?.parse().ok()?,
        pgrp: fields.get(2)?.parse().ok()?,
        start_time: fields.get(19)?.parse().ok()?,
    })
}

/// Read a `Vm*` line of `/proc/<pid>/status` in kB
fn status_kb(status: &str, key: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
        .and_then(|value| value.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

#[cfg(target_os = "linux")]
mod proc_fs {
    use std::collections::HashMap;
    use std::fs;

    use super::{Stat, TreeUsage, parse_stat, status_kb};

    pub fn read_stat(pid: i32) -> Option<Stat> {
        parse_stat(&fs::read_to_string(format!("/proc/{pid}/stat")).ok()?)
    }

    pub fn snapshot() -> Option<HashMap<i32, Stat>> {
        let entries = fs::read_dir("/proc").ok()?;
        let snapshot = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
            // Processes may exit between listing and reading
            .filter_map(|pid| Some((pid, read_stat(pid)?)))
            .collect();
        Some(snapshot)
    }

    pub fn usage(pids: impl Iterator<Item = i32>) -> Option<TreeUsage> {
        let mut found = false;
        let mut usage = TreeUsage::default();
        for pid in pids {
            let Ok(status) = fs::read_to_string(format!("/proc/{pid}/status")) else {
                continue;
            };
            // Zombies have no VmRSS line and hold no memory
            if let Some(rss) = status_kb(&status, "VmRSS") {
                found = true;
                usage.resident_kb += rss;
                let hwm = status_kb(&status, "VmHWM").unwrap_or(rss);
                usage.high_water_kb = usage.high_water_kb.max(hwm);
            }
        }
        found.then_some(usage)
    }

    pub fn fd_target(pid: &str, fd: &str) -> Option<String> {
        let target = fs::read_link(format!("/proc/{pid}/fd/{fd}")).ok()?;
        Some(target.to_string_lossy().into_owned())
    }

    pub fn holds_any(pid: i32, targets: &[String]) -> bool {
        let pid = pid.to_string();
        // Other users' descriptors are unreadable; such processes are not ours
        let Ok(fds) = fs::read_dir(format!("/proc/{pid}/fd")) else {
            return false;
        };
        fds.flatten().any(|fd| {
            fd.file_name()
                .to_str()
                .and_then(|fd| fd_target(&pid, fd))
                .is_some_and(|target| targets.contains(&target))
        })
    }
}

/// Without `/proc` the tree is just the root's process group
#[cfg(not(target_os = "linux"))]
mod proc_fs {
    use std::collections::HashMap;

    use super::{Stat, TreeUsage};

    pub fn read_stat(_pid: i32) -> Option<Stat> {
        None
    }

    pub fn snapshot() -> Option<HashMap<i32, Stat>> {
        None
    }

    pub fn usage(_pids: impl Iterator<Item = i32>) -> Option<TreeUsage> {
        None
    }

    pub fn fd_target(_pid: &str, _fd: &str) -> Option<String> {
        None
    }

    pub fn holds_any(_pid: i32, _targets: &[String]) -> bool {
        false
    }
}
