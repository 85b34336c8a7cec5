//! Special judge support for testlib-style checkers
//!
//! A checker is run as `checker <input> <output> <answer> <report> -appes`.
//! Its verdict is read from the XML report when one was written, and from
//! the exit code otherwise.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, instrument};

use crate::compare::ComparisonResult;
use crate::config::DEFAULT_RUN_PATH;
use crate::error::{Component, StructuredError};
use crate::process::{self, ExecutionRequest};
use crate::types::{ResourceLimits, Termination};

/// Time limit for a checker that does not set its own
pub const DEFAULT_CHECKER_TIME_LIMIT: f64 = 10.0;

const REPORT_NAME: &str = "checker-report.xml";

/// Files handed to the checker
#[derive(Debug, Clone)]
pub struct CheckerFiles {
    pub input: PathBuf,
    pub output: PathBuf,
    pub answer: PathBuf,
    /// Directory the checker runs in and writes its report to
    pub scratch: PathBuf,
}

/// Parsed `<result>` element of a testlib report
#[derive(Debug, Clone, PartialEq)]
struct Report {
    outcome: String,
    points: Option<f64>,
    message: String,
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let mut from = 0;
    while let Some(found) = tag[from..].find(name) {
        let at = from + found;
        from = at + name.len();
        let before_ok = at == 0 || tag.as_bytes()[at - 1].is_ascii_whitespace();
        if !before_ok {
            continue;
        }
        let after = tag[from..].trim_start();
        let Some(value) = after.strip_prefix('=') else {
            continue;
        };
        let value = value.trim_start().strip_prefix('"')?;
        let end = value.find('"')?;
        return Some(unescape(&value[..end]));
    }
    None
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn parse_report(xml: &str) -> Option<Report> {
    let open = xml.find("<result")?;
    let tag_end = open + xml[open..].find('>')?;
    let tag = &xml[open + "<result".len()..tag_end];

    let outcome = attribute(tag, "outcome")?;
    let points = attribute(tag, "points").and_then(|p| p.trim().parse().ok());
    let body = &xml[tag_end + 1..];
    let message = body
        .find("</result>")
        .map(|end| &body[..end])
        .unwrap_or(body);

    Some(Report {
        outcome,
        points,
        message: unescape(message.trim()),
    })
}

fn checker_failed(message: impl Into<String>) -> StructuredError {
    StructuredError::validation(Component::Comparator, message)
}

fn from_report(report: Report) -> Result<ComparisonResult, StructuredError> {
    let Report {
        outcome,
        points,
        message,
    } = report;
    match outcome.as_str() {
        "accepted" => Ok(ComparisonResult::matched().with_message(message)),
        "wrong-answer" | "unexpected-eof" => Ok(ComparisonResult::rejected(message)),
        "presentation-error" => Ok(ComparisonResult::presentation(message)),
        "points" | "relative-scoring" | "partially-correct" => {
            Ok(ComparisonResult::partial(points, message))
        }
        "fail" => Err(checker_failed(format!("checker failed: {message}"))),
        other => Err(checker_failed(format!(
            "checker reported unknown outcome '{other}'"
        ))),
    }
}

fn from_exit_code(code: i32, message: String) -> Result<ComparisonResult, StructuredError> {
    match code {
        0 => Ok(ComparisonResult::matched().with_message(message)),
        1 | 4 | 8 => Ok(ComparisonResult::rejected(message)),
        2 => Ok(ComparisonResult::presentation(message)),
        7 => Ok(ComparisonResult::partial(None, message)),
        3 => Err(checker_failed(format!("checker failed: {message}"))),
        other => Err(checker_failed(format!(
            "checker exited with unexpected code {other}: {message}"
        ))),
    }
}

/// Run a checker and interpret its verdict
///
/// A missing checker is a `FileError`. A checker that crashes, times out,
/// reports `fail` or produces nothing interpretable is `ValidationFailed`.
#[instrument(skip(files), fields(checker = %checker.display()))]
pub async fn run_checker(
    checker: &Path,
    time_limit: Option<f64>,
    files: &CheckerFiles,
    poll_interval: Duration,
) -> Result<ComparisonResult, StructuredError> {
    if !checker.is_file() {
        return Err(StructuredError::file(
            Component::Comparator,
            format!("checker '{}' does not exist", checker.display()),
        ));
    }

    let report_path = files.scratch.join(REPORT_NAME);
    let command = [
        checker.as_os_str(),
        files.input.as_os_str(),
        files.output.as_os_str(),
        files.answer.as_os_str(),
        report_path.as_os_str(),
    ]
    .into_iter()
    .map(|arg| arg.to_string_lossy().into_owned())
    .chain(std::iter::once("-appes".to_string()));

    let limits = ResourceLimits::default()
        .with_time_limit(time_limit.unwrap_or(DEFAULT_CHECKER_TIME_LIMIT))
        .with_extra_time(0.5);
    let request = ExecutionRequest::new(command)
        .limits(limits)
        .working_dir(&files.scratch)
        .env("PATH", DEFAULT_RUN_PATH)
        .poll_interval(poll_interval);

    let execution = process::execute(request)
        .await
        .map_err(|e| e.within(Component::Comparator))?;

    debug!(termination = ?execution.termination, "checker finished");

    let code = match execution.termination {
        Termination::Exited(code) => code,
        Termination::Signaled(signal) => {
            return Err(checker_failed(format!("checker was killed by signal {signal}")));
        }
        Termination::TimedOut => return Err(checker_failed("checker timed out")),
        Termination::MemoryExceeded => {
            return Err(checker_failed("checker exceeded the memory limit"));
        }
    };

    match tokio::fs::read(&report_path).await {
        Ok(bytes) => {
            let xml = String::from_utf8_lossy(&bytes);
            let report = parse_report(&xml)
                .ok_or_else(|| checker_failed("checker wrote an unreadable report"))?;
            from_report(report)
        }
        Err(_) => from_exit_code(code, execution.stderr_lossy().trim().to_string()),
    }
}
