use std::time::{Duration, Instant};

use arbiter::error::ErrorKind;
use arbiter::process::{ExecutionRequest, InputSource, execute};
use arbiter::types::{ResourceLimits, Termination};

use super::source;

fn sh(script: &str) -> ExecutionRequest {
    ExecutionRequest::new(["/bin/sh".to_string(), source(script).to_string_lossy().into_owned()])
        .env("PATH", "/usr/bin:/bin")
}

/// True once `pid` is gone or a zombie waiting to be reaped
#[cfg(target_os = "linux")]
fn process_gone(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state == "Z" || state == "X"),
        Err(_) => true,
    }
}

#[cfg(target_os = "linux")]
async fn wait_until_gone(pid: u32) -> bool {
    for _ in 0..50 {
        if process_gone(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_clean_exit_captures_stdout() {
    let request = sh("sum.sh").input(InputSource::bytes("2 3\n"));
    let result = execute(request).await.expect("Execution failed");

    assert_eq!(result.termination, Termination::Exited(0));
    assert_eq!(result.stdout, b"5\n");
    assert!(!result.truncated);
    assert!(result.wall_time >= 0.0);
}

#[tokio::test]
async fn test_exit_code_is_reported() {
    let result = execute(sh("exit3.sh")).await.expect("Execution failed");

    assert_eq!(result.termination, Termination::Exited(3));
    assert_eq!(result.exit_code(), Some(3));
    assert_eq!(result.stdout, b"partial\n");
    assert!(!result.is_success(0));
}

#[tokio::test]
async fn test_signal_is_reported() {
    let result = execute(sh("crash.sh")).await.expect("Execution failed");

    assert_eq!(result.termination, Termination::Signaled(11));
    assert_eq!(result.signal(), Some(11));
}

#[tokio::test]
async fn test_time_limit_kills_program() {
    let limits = ResourceLimits::default()
        .with_time_limit(0.3)
        .with_extra_time(0.2);
    let started = Instant::now();
    let result = execute(sh("slow.sh").limits(limits))
        .await
        .expect("Execution failed");

    assert_eq!(result.termination, Termination::TimedOut);
    assert!(result.limit_exceeded().is_exceeded());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_one_step_over_the_limit_times_out() {
    let limits = ResourceLimits::default()
        .with_time_limit(0.5)
        .with_extra_time(0.0);
    let request = ExecutionRequest::new(["/bin/sh", "-c", "sleep 1"])
        .env("PATH", "/usr/bin:/bin")
        .limits(limits);
    let result = execute(request).await.expect("Execution failed");

    assert_eq!(result.termination, Termination::TimedOut);
}

#[tokio::test]
async fn test_output_is_truncated_at_cap() {
    let limits = ResourceLimits::default().with_max_output(1);
    let request = ExecutionRequest::new(["/bin/sh", "-c", "head -c 4096 /dev/zero"])
        .env("PATH", "/usr/bin:/bin")
        .limits(limits);
    let result = execute(request).await.expect("Execution failed");

    assert!(result.truncated);
    assert!(result.stdout.len() <= 1024);
}

#[tokio::test]
async fn test_input_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.txt");
    std::fs::write(&input, "40 2\n").unwrap();

    let result = execute(sh("sum.sh").input(InputSource::file(&input)))
        .await
        .expect("Execution failed");

    assert_eq!(result.stdout, b"42\n");
}

#[tokio::test]
async fn test_missing_input_file_is_an_error() {
    let err = execute(sh("sum.sh").input(InputSource::file("/nonexistent/input.txt")))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::FileError);
}

#[tokio::test]
async fn test_missing_program_is_an_error() {
    let err = execute(ExecutionRequest::new(["/nonexistent/program"]))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::SystemError);
}

#[tokio::test]
async fn test_same_request_twice_gives_same_result() {
    let first = execute(sh("sum.sh").input(InputSource::bytes("7 8\n")))
        .await
        .unwrap();
    let second = execute(sh("sum.sh").input(InputSource::bytes("7 8\n")))
        .await
        .unwrap();

    assert_eq!(first.termination, second.termination);
    assert_eq!(first.stdout, second.stdout);
    assert_eq!(first.stderr, second.stderr);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_process_tree() {
    let limits = ResourceLimits::default()
        .with_time_limit(0.3)
        .with_extra_time(0.2);
    let result = execute(sh("fork_tree.sh").limits(limits))
        .await
        .expect("Execution failed");
    assert_eq!(result.termination, Termination::TimedOut);

    let pid: u32 = String::from_utf8_lossy(&result.stdout)
        .trim()
        .parse()
        .expect("fork_tree.sh should print its child's pid");
    assert!(wait_until_gone(pid).await, "background child {pid} survived");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_cancellation_kills_process_tree() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let request = ExecutionRequest::new([
        "/bin/sh".to_string(),
        "-c".to_string(),
        "sleep 60 & echo $! > \"$0\"; sleep 60".to_string(),
        pid_file.to_string_lossy().into_owned(),
    ])
    .env("PATH", "/usr/bin:/bin")
    .limits(ResourceLimits::default().with_time_limit(60.0));

    let task = tokio::spawn(execute(request));

    let mut pid = None;
    for _ in 0..100 {
        if let Ok(content) = std::fs::read_to_string(&pid_file)
            && let Ok(parsed) = content.trim().parse::<u32>()
        {
            pid = Some(parsed);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let pid = pid.expect("child never wrote its pid");

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert!(wait_until_gone(pid).await, "background child {pid} survived");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_memory_limit_kills_program() {
    let limits = ResourceLimits::default()
        .with_time_limit(10.0)
        .with_memory_limit(32 * ResourceLimits::MB);
    let request = sh("memory_hog.sh")
        .limits(limits)
        .poll_interval(Duration::from_millis(5));
    let result = execute(request).await.expect("Execution failed");

    assert_eq!(result.termination, Termination::MemoryExceeded);
    assert!(result.memory > 32 * ResourceLimits::MB);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_descendant_that_left_the_group() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let request = ExecutionRequest::new([
        "/bin/sh".to_string(),
        source("escape.sh").to_string_lossy().into_owned(),
        pid_file.to_string_lossy().into_owned(),
    ])
    .env("PATH", "/usr/bin:/bin")
    .limits(ResourceLimits::default().with_time_limit(0.5).with_extra_time(0.0));

    let result = execute(request).await.expect("Execution failed");
    assert_eq!(result.termination, Termination::TimedOut);

    let pid: u32 = std::fs::read_to_string(&pid_file)
        .expect("escaped child never wrote its pid")
        .trim()
        .parse()
        .unwrap();
    assert!(wait_until_gone(pid).await, "descendant {pid} in its own session survived");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_output_survives_detached_pipe_holder() {
    let started = Instant::now();
    let result = execute(sh("detached_echo.sh")).await.expect("Execution failed");

    assert_eq!(result.termination, Termination::Exited(0));
    assert_eq!(result.stdout, b"42\n");
    assert!(!result.truncated);
    assert!(started.elapsed() < Duration::from_secs(5));

    let pid: u32 = result
        .stderr_lossy()
        .trim()
        .parse()
        .expect("detached_echo.sh should print its child's pid");
    assert!(wait_until_gone(pid).await, "detached child {pid} survived");
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_memory_spike_between_polls_is_caught() {
    let limits = ResourceLimits::default()
        .with_time_limit(10.0)
        .with_memory_limit(32 * ResourceLimits::MB);
    // The allocation is released long before the second sample is taken
    let request = sh("memory_spike.sh")
        .limits(limits)
        .poll_interval(Duration::from_secs(1));
    let result = execute(request).await.expect("Execution failed");

    assert_eq!(result.termination, Termination::MemoryExceeded);
    assert!(result.memory > 32 * ResourceLimits::MB);
    assert!(result.stdout.is_empty());
}

#[tokio::test]
async fn test_relative_working_dir_and_program() {
    use std::os::unix::fs::PermissionsExt;

    // Integration tests run from the crate root
    let dir = tempfile::tempdir_in(".").unwrap();
    let script = dir.path().join("hello.sh");
    std::fs::write(&script, "#!/bin/sh\necho \"from $(basename \"$PWD\")\"\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let relative = dir.path().file_name().unwrap().to_owned();

    let request = ExecutionRequest::new(["./hello.sh"])
        .working_dir(relative.clone())
        .env("PATH", "/usr/bin:/bin");
    let result = execute(request).await.expect("Execution failed");

    assert_eq!(result.termination, Termination::Exited(0));
    assert_eq!(
        String::from_utf8_lossy(&result.stdout).trim(),
        format!("from {}", relative.to_string_lossy())
    );
}
