//! Stress testing a candidate against a reference on generated inputs

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::compare::Policy;
use crate::error::{Component, StructuredError};
use crate::judge::case::{AnswerSource, TestCase};
use crate::judge::verdict::{self, Evidence, Verdict};
use crate::judge::{Judge, execution_message};
use crate::process::InputSource;
use crate::runner::Program;
use crate::types::{ExecutionResult, ResourceLimits};

/// Which program lost a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Generator,
    Reference,
    Candidate,
}

/// The round that ended a duel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuelFailure {
    /// 1-based round number
    pub round: u64,
    pub side: Side,
    pub verdict: Verdict,
    pub message: String,
    /// The round's input, kept on disk (none if the generator failed)
    pub input: Option<PathBuf>,
}

/// Outcome of a duel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuelReport {
    /// Rounds both programs survived
    pub rounds: u64,
    pub failure: Option<DuelFailure>,
}

impl DuelReport {
    pub fn survived(&self) -> bool {
        self.failure.is_none()
    }
}

/// A generator, a trusted reference and a candidate
///
/// Each round the generator is run with the round number as its last
/// argument; its output is the round's input.
#[derive(Debug, Clone)]
pub struct Duel {
    generator: Program,
    reference: Program,
    candidate: Program,
    policy: Policy,
    limits: Option<ResourceLimits>,
    keep_dir: Option<PathBuf>,
}

impl Duel {
    pub fn new(generator: Program, reference: Program, candidate: Program) -> Self {
        Self {
            generator,
            reference,
            candidate,
            policy: Policy::default(),
            limits: None,
            keep_dir: None,
        }
    }

    /// Policy the candidate's output is compared under
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Limit overrides for the reference and the candidate
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Directory a losing round's input is written to (the scratch root by default)
    pub fn keep_inputs_in(mut self, dir: impl Into<PathBuf>) -> Self {
        self.keep_dir = Some(dir.into());
        self
    }
}

fn keep_input(dir: &Path, round: u64, data: &[u8]) -> Result<PathBuf, StructuredError> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("duel-round-{round}-"))
        .suffix(".in")
        .tempfile_in(dir)
        .map_err(|e| StructuredError::io(Component::Judge, dir, &e))?;
    file.write_all(data)
        .map_err(|e| StructuredError::io(Component::Judge, file.path(), &e))?;
    let (_, path) = file
        .keep()
        .map_err(|e| StructuredError::io(Component::Judge, dir, &e.error))?;
    Ok(path)
}

impl Judge {
    fn lost(
        &self,
        execution: &ExecutionResult,
        program: &Program,
        limits: Option<&ResourceLimits>,
    ) -> Option<(Verdict, String)> {
        let success = self.config().success_exit_code;
        if execution.is_success(success) {
            return None;
        }
        let verdict = verdict::derive(&Evidence {
            execution: Some(execution),
            success_exit_code: success,
            ..Default::default()
        });
        let limits = match limits {
            Some(overrides) => program.limits().overlaid_with(overrides),
            None => program.limits().clone(),
        };
        Some((verdict, execution_message(verdict, execution, &limits, None)))
    }

    /// Run rounds until one program loses, or `rounds` have passed
    ///
    /// `None` runs until a failure. The losing round's input is kept on disk.
    #[instrument(skip(self, duel))]
    pub async fn duel(&self, duel: &Duel, rounds: Option<u64>) -> Result<DuelReport, StructuredError> {
        let keep_dir = match duel.keep_dir {
            Some(ref dir) => dir.clone(),
            None => self.config().scratch_root(),
        };
        let limits = duel.limits.as_ref();

        let mut round = 0;
        while rounds.is_none_or(|total| round < total) {
            round += 1;

            let generator = duel.generator.clone().with_args([round.to_string()]);
            let generated = self.runner().run(&generator, InputSource::Empty, None).await?;
            if let Some((verdict, message)) = self.lost(&generated, &generator, None) {
                info!(round, %verdict, "generator failed");
                return Ok(DuelReport {
                    rounds: round - 1,
                    failure: Some(DuelFailure {
                        round,
                        side: Side::Generator,
                        verdict,
                        message,
                        input: None,
                    }),
                });
            }
            let input = InputSource::bytes(generated.stdout);

            let answer = self.runner().run(&duel.reference, input.clone(), limits).await?;
            if let Some((verdict, message)) = self.lost(&answer, &duel.reference, limits) {
                info!(round, %verdict, "reference failed");
                return failure(round, Side::Reference, verdict, message, &input, &keep_dir);
            }

            let answer = AnswerSource::text(answer.stdout);
            let mut case = TestCase::new(format!("round {round}"), input.clone(), answer)
                .with_policy(duel.policy.clone());
            case.limits = duel.limits.clone();

            let result = self.judge_case(&duel.candidate, 0, &case).await?;
            if !result.verdict.is_accepted() {
                info!(round, verdict = %result.verdict, "candidate failed");
                return failure(
                    round,
                    Side::Candidate,
                    result.verdict,
                    result.message,
                    &input,
                    &keep_dir,
                );
            }
            debug!(round, "both programs survived");
        }

        Ok(DuelReport {
            rounds: round,
            failure: None,
        })
    }
}

/// Report for a round lost by the reference or the candidate
fn failure(
    round: u64,
    side: Side,
    verdict: Verdict,
    message: String,
    input: &InputSource,
    keep_dir: &Path,
) -> Result<DuelReport, StructuredError> {
    let data: &[u8] = match input {
        InputSource::Bytes(data) => &data[..],
        _ => &[],
    };
    let kept = keep_input(keep_dir, round, data)?;
    Ok(DuelReport {
        rounds: round - 1,
        failure: Some(DuelFailure {
            round,
            side,
            verdict,
            message,
            input: Some(kept),
        }),
    })
}
