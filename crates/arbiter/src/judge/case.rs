//! Test cases, submissions and their results

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::OnceCell;

use crate::compare::{ComparisonResult, FileReader, Policy, Readable, TextReader};
use crate::judge::verdict::Verdict;
use crate::process::InputSource;
use crate::runner::CompileOutcome;
use crate::types::ResourceLimits;

/// Where the expected output comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerSource {
    File(PathBuf),
    Text(Arc<[u8]>),
}

impl AnswerSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        AnswerSource::File(path.into())
    }

    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        AnswerSource::Text(Arc::from(data.into()))
    }

    /// Size in bytes, if it can be known without reading
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            AnswerSource::File(path) => std::fs::metadata(path).ok().map(|m| m.len()),
            AnswerSource::Text(data) => Some(data.len() as u64),
        }
    }

    /// Owned reader over the answer
    pub fn reader(&self) -> Box<dyn Readable> {
        match self {
            AnswerSource::File(path) => Box::new(FileReader::new(path)),
            AnswerSource::Text(data) => Box::new(TextReader::new(Arc::clone(data))),
        }
    }
}

/// One test: input, expected answer, comparison policy and limit overrides
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub input: InputSource,
    pub answer: AnswerSource,
    pub policy: Policy,
    pub limits: Option<ResourceLimits>,
}

impl TestCase {
    /// Test compared with the token policy under the program's limits
    pub fn new(name: impl Into<String>, input: InputSource, answer: AnswerSource) -> Self {
        Self {
            name: name.into(),
            input,
            answer,
            policy: Policy::default(),
            limits: None,
        }
    }

    /// Test reading `input` and `answer` from files
    pub fn from_files(
        name: impl Into<String>,
        input: impl Into<PathBuf>,
        answer: impl Into<PathBuf>,
    ) -> Self {
        Self::new(name, InputSource::file(input), AnswerSource::file(answer))
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Stage a case had reached when it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Compiling,
    Running,
    Comparing,
    Done,
}

/// Result of judging one test case
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeResult {
    /// Position of the case in the submission
    pub index: usize,
    pub name: String,
    pub verdict: Verdict,
    /// Fraction of the case's points, `None` if the program was never judged
    pub score: Option<f64>,
    pub message: String,
    /// Wall time in seconds, if the program ran
    pub time: Option<f64>,
    /// Peak memory in KiB, if the program ran
    pub memory: Option<u64>,
    pub stage: Stage,
    pub comparison: Option<ComparisonResult>,
}

impl JudgeResult {
    pub(crate) fn unjudged(
        index: usize,
        name: impl Into<String>,
        verdict: Verdict,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            verdict,
            score: crate::judge::verdict::score(verdict, None),
            message: message.into(),
            time: None,
            memory: None,
            stage,
            comparison: None,
        }
    }

    /// One-line rendering: verdict, message, time, memory and score
    pub fn summary_line(&self) -> String {
        let mut parts = vec![format!("{} ({})", self.verdict, self.verdict.short_code())];
        if !self.message.is_empty() {
            parts.push(self.message.clone());
        }
        if let Some(time) = self.time {
            parts.push(format!("{:.0} ms", time * 1000.0));
        }
        if let Some(memory) = self.memory {
            parts.push(format!("{:.1} MiB", memory as f64 / 1024.0));
        }
        if let Some(score) = self.score {
            parts.push(format!("{:.0}%", score * 100.0));
        }
        parts.join(", ")
    }
}

/// A source file to judge against a list of test cases
///
/// The compile outcome is cached on first use, so judging the same
/// submission twice compiles it once.
#[derive(Debug)]
pub struct Submission {
    source: PathBuf,
    toolchain: String,
    cases: Vec<TestCase>,
    compile_limits: Option<ResourceLimits>,
    pub(crate) compiled: OnceCell<CompileOutcome>,
}

impl Submission {
    pub fn new(
        source: impl Into<PathBuf>,
        toolchain: impl Into<String>,
        cases: impl IntoIterator<Item = TestCase>,
    ) -> Self {
        Self {
            source: source.into(),
            toolchain: toolchain.into(),
            cases: cases.into_iter().collect(),
            compile_limits: None,
            compiled: OnceCell::new(),
        }
    }

    /// Override the compile limits for this submission
    pub fn with_compile_limits(mut self, limits: ResourceLimits) -> Self {
        self.compile_limits = Some(limits);
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn toolchain(&self) -> &str {
        &self.toolchain
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn compile_limits(&self) -> Option<&ResourceLimits> {
        self.compile_limits.as_ref()
    }

    /// Compile outcome, if the submission has been compiled
    pub fn compile_outcome(&self) -> Option<&CompileOutcome> {
        self.compiled.get()
    }
}

/// Aggregate outcome of a submission
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReport {
    /// Whether compilation produced a program
    pub compiled: bool,
    pub compile_diagnostics: String,
    /// Per-case results in the submission's case order
    pub results: Vec<JudgeResult>,
    /// First non-accepted verdict in case order, else Accepted
    pub verdict: Verdict,
    /// Sum of case scores
    pub score: f64,
}

impl SubmissionReport {
    pub(crate) fn new(compiled: bool, compile_diagnostics: String, results: Vec<JudgeResult>) -> Self {
        let verdict = overall_verdict(&results);
        let score = results.iter().filter_map(|r| r.score).sum();
        Self {
            compiled,
            compile_diagnostics,
            results,
            verdict,
            score,
        }
    }

    /// Number of accepted cases
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.verdict.is_accepted()).count()
    }
}

fn overall_verdict(results: &[JudgeResult]) -> Verdict {
    results
        .iter()
        .map(|r| r.verdict)
        .find(|v| !v.is_accepted())
        .unwrap_or(Verdict::Accepted)
}
