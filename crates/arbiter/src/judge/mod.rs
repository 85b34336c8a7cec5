//! Judge orchestrator
//!
//! Sequences compile, run and compare for every test case of a submission
//! and derives a [`Verdict`] per case. Compilation happens once per
//! submission; cases then run concurrently, bounded by the configured
//! number of workers.
//!
//! Problems with the subject program or a case's data end up in that case's
//! verdict. Problems with the judge itself (a compiler that cannot be
//! launched, a checker that fails, limits that do not validate) abort the
//! whole run with a [`StructuredError`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

pub use crate::judge::case::{AnswerSource, JudgeResult, Stage, Submission, SubmissionReport, TestCase};
pub use crate::judge::duel::{Duel, DuelFailure, DuelReport, Side};
pub use crate::judge::verdict::{Evidence, Verdict};

mod case;
mod duel;
pub mod verdict;

use crate::compare::{CheckerFiles, ComparisonRequest, ComparisonResult, Policy, TextReader, run_checker};
use crate::config::Config;
use crate::error::{Component, ErrorKind, StructuredError};
use crate::process::InputSource;
use crate::runner::{CompileOutcome, Program, Runner};
use crate::types::{ExecutionResult, ResourceLimits, Termination};

type CaseOutcome = Result<JudgeResult, StructuredError>;

/// Slot a joined case into `results`, passing fatal errors up
fn collect(
    joined: Result<CaseOutcome, JoinError>,
    results: &mut [Option<JudgeResult>],
) -> Result<(), StructuredError> {
    match joined {
        Ok(Ok(result)) => {
            let index = result.index;
            results[index] = Some(result);
            Ok(())
        }
        Ok(Err(err)) => Err(err),
        Err(err) if err.is_cancelled() => Ok(()),
        Err(err) => Err(StructuredError::system(
            Component::Judge,
            format!("test case task failed: {err}"),
        )),
    }
}

/// Collect cases that have finished but were not joined yet
fn drain_finished(
    set: &mut JoinSet<CaseOutcome>,
    results: &mut [Option<JudgeResult>],
) -> Result<(), StructuredError> {
    while let Some(joined) = set.try_join_next() {
        collect(joined, results)?;
    }
    Ok(())
}

/// Whether an error raised while handling one case stays with that case
fn is_case_error(err: &StructuredError) -> bool {
    matches!(err.kind, ErrorKind::FileError | ErrorKind::UnsupportedOperation)
}

/// Output more than `ratio` times the size of the answer
fn oversized(ratio: Option<u64>, output: &[u8], answer: &AnswerSource) -> bool {
    match (ratio, answer.len_hint()) {
        (Some(ratio), Some(answer_len)) => output.len() as u64 > answer_len.saturating_mul(ratio),
        _ => false,
    }
}

/// Explanation for a verdict reached without a comparison
pub(crate) fn execution_message(
    verdict: Verdict,
    execution: &ExecutionResult,
    limits: &ResourceLimits,
    ratio: Option<u64>,
) -> String {
    match (verdict, execution.termination) {
        (Verdict::RuntimeError, Termination::Exited(code)) => format!("exited with code {code}"),
        (Verdict::RuntimeError, Termination::Signaled(signal)) => {
            format!("killed by signal {signal}")
        }
        (Verdict::TimeLimitExceeded, _) => match limits.time_limit {
            Some(limit) => format!("time limit of {limit}s exceeded"),
            None => "time limit exceeded".to_string(),
        },
        (Verdict::MemoryLimitExceeded, _) => match limits.memory_limit {
            Some(limit) => format!("memory limit of {limit} KiB exceeded"),
            None => "memory limit exceeded".to_string(),
        },
        (Verdict::OutputLimitExceeded, _) if execution.truncated => match limits.max_output {
            Some(limit) => format!("output exceeded {limit} KiB"),
            None => "output limit exceeded".to_string(),
        },
        (Verdict::OutputLimitExceeded, _) => match ratio {
            Some(ratio) => format!("output is more than {ratio} times the size of the answer"),
            None => "output limit exceeded".to_string(),
        },
        _ => String::new(),
    }
}

/// Judges submissions and single cases
///
/// Cloning is cheap; clones share the configuration.
#[derive(Debug, Clone)]
pub struct Judge {
    runner: Runner,
}

impl Judge {
    pub fn new(config: Config) -> Self {
        Self {
            runner: Runner::new(config),
        }
    }

    pub fn from_runner(runner: Runner) -> Self {
        Self { runner }
    }

    /// Judge with the embedded default configuration
    pub fn with_defaults() -> Self {
        Self::from_runner(Runner::with_defaults())
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn config(&self) -> &Config {
        self.runner.config()
    }

    fn scratch_root(&self) -> Result<PathBuf, StructuredError> {
        let root = self.config().scratch_root();
        std::path::absolute(&root).map_err(|e| {
            StructuredError::system(
                Component::Judge,
                format!("cannot resolve scratch directory {}: {e}", root.display()),
            )
        })
    }

    /// Compile a submission, or return the cached outcome
    pub async fn compile<'s>(
        &self,
        submission: &'s Submission,
    ) -> Result<&'s CompileOutcome, StructuredError> {
        submission
            .compiled
            .get_or_try_init(|| {
                self.runner.compile(
                    submission.source(),
                    submission.toolchain(),
                    submission.compile_limits(),
                )
            })
            .await
    }

    /// Judge every case of a submission
    ///
    /// A compile failure marks every case as a compile error without running
    /// anything. On a fatal error outstanding cases are cancelled and the
    /// error is returned.
    #[instrument(
        skip(self, submission),
        fields(source = %submission.source().display(), toolchain = submission.toolchain())
    )]
    pub async fn judge_submission(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionReport, StructuredError> {
        let outcome = self.compile(submission).await?;

        let program = match outcome {
            CompileOutcome::Compiled { program, .. } => program,
            CompileOutcome::Failed(failure) => {
                info!(reason = %failure.reason, "compilation failed");
                let results = submission
                    .cases()
                    .iter()
                    .enumerate()
                    .map(|(index, case)| {
                        JudgeResult::unjudged(
                            index,
                            &case.name,
                            Verdict::CompileError,
                            Stage::Compiling,
                            failure.reason.to_string(),
                        )
                    })
                    .collect();
                return Ok(SubmissionReport::new(
                    false,
                    failure.diagnostics.clone(),
                    results,
                ));
            }
        };

        let results = self.run_cases(program, submission.cases()).await?;
        let report = SubmissionReport::new(true, outcome.diagnostics().to_string(), results);

        info!(
            verdict = %report.verdict,
            passed = report.passed(),
            total = report.results.len(),
            "submission judged"
        );
        Ok(report)
    }

    async fn run_cases(
        &self,
        program: &Program,
        cases: &[TestCase],
    ) -> Result<Vec<JudgeResult>, StructuredError> {
        let config = self.config();
        let workers = Arc::new(Semaphore::new(config.workers.max(1)));
        let mut set = JoinSet::new();

        for (index, case) in cases.iter().enumerate() {
            let judge = self.clone();
            let program = program.clone();
            let case = case.clone();
            let workers = Arc::clone(&workers);
            set.spawn(async move {
                let Ok(_permit) = workers.acquire_owned().await else {
                    return Err(StructuredError::system(Component::Judge, "worker pool closed"));
                };
                judge.judge_case(&program, index, &case).await
            });
        }

        let deadline = config
            .submission_time_limit
            .map(|seconds| Instant::now() + Duration::from_secs_f64(seconds));
        let mut results: Vec<Option<JudgeResult>> = vec![None; cases.len()];

        loop {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, set.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        let drained = drain_finished(&mut set, &mut results);
                        warn!(outstanding = set.len(), "submission time limit exceeded, cancelling");
                        set.shutdown().await;
                        drained?;
                        break;
                    }
                },
                None => set.join_next().await,
            };
            let Some(joined) = joined else {
                break;
            };

            if let Err(err) = collect(joined, &mut results) {
                warn!(%err, outstanding = set.len(), "fatal error, cancelling outstanding cases");
                set.shutdown().await;
                return Err(err);
            }
        }

        Ok(results
            .into_iter()
            .zip(cases)
            .enumerate()
            .map(|(index, (result, case))| {
                result.unwrap_or_else(|| {
                    JudgeResult::unjudged(
                        index,
                        &case.name,
                        Verdict::Cancelled,
                        Stage::Pending,
                        "cancelled before finishing",
                    )
                })
            })
            .collect())
    }

    /// Run one case against a compiled program
    ///
    /// The program runs in a scratch directory of its own, removed when the
    /// case finishes or is cancelled.
    #[instrument(skip(self, program, case), fields(case = %case.name))]
    pub async fn judge_case(
        &self,
        program: &Program,
        index: usize,
        case: &TestCase,
    ) -> Result<JudgeResult, StructuredError> {
        let config = self.config();
        let scratch_root = self.scratch_root()?;
        let scratch = tempfile::Builder::new()
            .prefix("arbiter-case-")
            .tempdir_in(&scratch_root)
            .map_err(|e| {
                StructuredError::system(
                    Component::Judge,
                    format!("failed to create scratch directory in {}: {e}", scratch_root.display()),
                )
            })?;

        debug!(stage = ?Stage::Running, "running program");
        let execution = match self
            .runner
            .run_in(program, scratch.path(), case.input.clone(), case.limits.as_ref())
            .await
        {
            Ok(execution) => execution,
            Err(err) if is_case_error(&err) => {
                debug!(%err, "case data problem");
                return Ok(JudgeResult::unjudged(
                    index,
                    &case.name,
                    Verdict::SystemError,
                    Stage::Running,
                    err.to_string(),
                ));
            }
            Err(err) => return Err(err),
        };

        let limits = match case.limits {
            Some(ref overrides) => program.limits().overlaid_with(overrides),
            None => program.limits().clone(),
        };
        let ratio = config.output_ratio_limit;
        let output_oversized = oversized(ratio, &execution.stdout, &case.answer);
        let evidence = Evidence {
            execution: Some(&execution),
            success_exit_code: config.success_exit_code,
            output_oversized,
            ..Default::default()
        };

        let ran_cleanly = execution.is_success(config.success_exit_code) && !output_oversized;
        if !ran_cleanly {
            let verdict = verdict::derive(&evidence);
            let message = execution_message(verdict, &execution, &limits, ratio);
            return Ok(finish(index, case, verdict, Stage::Running, message, &execution, None));
        }

        debug!(stage = ?Stage::Comparing, policy = %case.policy, "comparing output");
        let comparison = match self.compare(case, &execution, scratch.path()).await {
            Ok(comparison) => comparison,
            Err(err) if is_case_error(&err) => {
                debug!(%err, "case data problem");
                let evidence = Evidence {
                    system_error: true,
                    ..evidence
                };
                let verdict = verdict::derive(&evidence);
                return Ok(finish(
                    index,
                    case,
                    verdict,
                    Stage::Comparing,
                    err.to_string(),
                    &execution,
                    None,
                ));
            }
            Err(err) => return Err(err),
        };

        let verdict = verdict::derive(&Evidence {
            comparison: Some(&comparison),
            ..evidence
        });
        debug!(%verdict, "case judged");
        let message = comparison.message.clone();
        Ok(finish(
            index,
            case,
            verdict,
            Stage::Done,
            message,
            &execution,
            Some(comparison),
        ))
    }

    async fn compare(
        &self,
        case: &TestCase,
        execution: &ExecutionResult,
        scratch: &Path,
    ) -> Result<ComparisonResult, StructuredError> {
        if let Policy::Checker { path, time_limit } = &case.policy {
            let files = checker_files(case, &execution.stdout, scratch).await?;
            return run_checker(path, *time_limit, &files, self.config().memory_poll_interval())
                .await;
        }

        let request = ComparisonRequest {
            expected: case.answer.reader(),
            actual: Box::new(TextReader::new(execution.stdout.clone())),
            policy: case.policy.clone(),
        };
        tokio::task::spawn_blocking(move || request.compare())
            .await
            .map_err(|e| {
                StructuredError::system(Component::Judge, format!("comparison task failed: {e}"))
            })?
    }
}

fn finish(
    index: usize,
    case: &TestCase,
    verdict: Verdict,
    stage: Stage,
    message: String,
    execution: &ExecutionResult,
    comparison: Option<ComparisonResult>,
) -> JudgeResult {
    JudgeResult {
        index,
        name: case.name.clone(),
        verdict,
        score: verdict::score(verdict, comparison.as_ref()),
        message,
        time: Some(execution.wall_time),
        memory: Some(execution.memory),
        stage,
        comparison,
    }
}

async fn write_scratch(path: PathBuf, data: &[u8]) -> Result<PathBuf, StructuredError> {
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| StructuredError::io(Component::Judge, &path, &e))?;
    Ok(path)
}

fn existing_file(path: &Path) -> Result<PathBuf, StructuredError> {
    if !path.is_file() {
        return Err(StructuredError::file(
            Component::Judge,
            format!("'{}' does not exist", path.display()),
        ));
    }
    std::path::absolute(path).map_err(|e| StructuredError::io(Component::Judge, path, &e))
}

/// Lay out input, output and answer as files for a checker
async fn checker_files(
    case: &TestCase,
    output: &[u8],
    scratch: &Path,
) -> Result<CheckerFiles, StructuredError> {
    let input = match case.input {
        InputSource::File(ref path) => existing_file(path)?,
        InputSource::Bytes(ref data) => write_scratch(scratch.join("judge.in"), data).await?,
        InputSource::Empty => write_scratch(scratch.join("judge.in"), &[]).await?,
    };
    let answer = match case.answer {
        AnswerSource::File(ref path) => existing_file(path)?,
        AnswerSource::Text(ref data) => write_scratch(scratch.join("judge.ans"), data).await?,
    };
    let output = write_scratch(scratch.join("judge.out"), output).await?;

    Ok(CheckerFiles {
        input,
        output,
        answer,
        scratch: scratch.to_path_buf(),
    })
}
