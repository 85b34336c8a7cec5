//! Verdicts and their derivation from execution and comparison evidence

use std::fmt;

use serde::Serialize;

use crate::compare::{ComparisonResult, Outcome};
use crate::types::{ExecutionResult, Termination};

/// Final judgment for one test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    PresentationError,
    PartiallyCorrect,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    OutputLimitExceeded,
    RuntimeError,
    CompileError,
    SystemError,
    /// Case was abandoned before it finished
    Cancelled,
}

impl Verdict {
    /// Two or three letter abbreviation
    pub fn short_code(&self) -> &'static str {
        match self {
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::PresentationError => "PE",
            Verdict::PartiallyCorrect => "PC",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::MemoryLimitExceeded => "MLE",
            Verdict::OutputLimitExceeded => "OLE",
            Verdict::RuntimeError => "RE",
            Verdict::CompileError => "CE",
            Verdict::SystemError => "SE",
            Verdict::Cancelled => "CXL",
        }
    }

    pub fn is_accepted(&self) -> bool {
        *self == Verdict::Accepted
    }

    /// Whether the case ran to a judgment of the program itself
    pub fn is_judged(&self) -> bool {
        !matches!(self, Verdict::CompileError | Verdict::Cancelled)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::PresentationError => "Presentation Error",
            Verdict::PartiallyCorrect => "Partially Correct",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            Verdict::OutputLimitExceeded => "Output Limit Exceeded",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::CompileError => "Compile Error",
            Verdict::SystemError => "System Error",
            Verdict::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Everything known about a case once it stopped
///
/// Fields not reached are left at their defaults: a case that never ran
/// has no execution, one that never compared has no comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evidence<'a> {
    pub compile_failed: bool,
    pub execution: Option<&'a ExecutionResult>,
    pub success_exit_code: i32,
    /// Output was disproportionately large compared to the answer
    pub output_oversized: bool,
    /// A per-case infrastructure problem stopped the case
    pub system_error: bool,
    pub comparison: Option<&'a ComparisonResult>,
}

/// Derive the verdict, first matching rule wins
///
/// CE, RE, TLE, MLE, OLE, SE, WA, PE, PC, AC. A case that reached none of
/// them (no comparison and no error recorded) is a system error.
pub fn derive(evidence: &Evidence<'_>) -> Verdict {
    if evidence.compile_failed {
        return Verdict::CompileError;
    }

    if let Some(execution) = evidence.execution {
        match execution.termination {
            Termination::Exited(code) if code != evidence.success_exit_code => {
                return Verdict::RuntimeError;
            }
            Termination::Signaled(_) => return Verdict::RuntimeError,
            Termination::TimedOut => return Verdict::TimeLimitExceeded,
            Termination::MemoryExceeded => return Verdict::MemoryLimitExceeded,
            Termination::Exited(_) => {}
        }
        if execution.truncated || evidence.output_oversized {
            return Verdict::OutputLimitExceeded;
        }
    }

    if evidence.system_error {
        return Verdict::SystemError;
    }

    match evidence.comparison.map(|c| c.outcome) {
        Some(Outcome::Mismatch) => Verdict::WrongAnswer,
        Some(Outcome::PresentationMismatch) => Verdict::PresentationError,
        Some(Outcome::Partial) => Verdict::PartiallyCorrect,
        Some(Outcome::Match) => Verdict::Accepted,
        None => Verdict::SystemError,
    }
}

/// Score for a verdict, `None` when the program was never judged
pub fn score(verdict: Verdict, comparison: Option<&ComparisonResult>) -> Option<f64> {
    match verdict {
        Verdict::CompileError | Verdict::Cancelled => None,
        Verdict::Accepted => Some(1.0),
        Verdict::PartiallyCorrect => Some(comparison.and_then(|c| c.score).unwrap_or(0.0)),
        _ => Some(0.0),
    }
}
