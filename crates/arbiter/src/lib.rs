//! A library for compiling, running and judging submitted programs.
//!
//! Arbiter drives the compile, execute and compare pipeline of a judging
//! system: it builds a submission once with a configured toolchain, runs it
//! against each test case under time, memory and output limits, compares
//! the output with the expected answer and derives a verdict per case.
//!
//! # Features
//!
//! - **Limited execution**: Child processes run in their own process group with wall clock, memory, stack and output limits; the whole tree is killed on timeout or cancellation.
//! - **Toolchains**: Compiled and interpreted languages configured in TOML, plus a builder for GCC command lines.
//! - **Comparators**: Strict, token, numeric and presentation-aware comparison, and testlib-style special judges.
//! - **Concurrent judging**: Cases run in parallel up to a worker limit, with a submission-wide time budget.
//! - **Stress testing**: Duels between a reference and a candidate on generated inputs.
//! - **Structured errors**: Every failure carries a kind and the component it came from.

pub use compare::{
    ComparatorRegistry, ComparisonRequest, ComparisonResult, Divergence, Outcome, Policy,
};
pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Problem, Toolchain};
pub use error::{Component, ErrorKind, StructuredError};
pub use judge::{
    AnswerSource, Duel, DuelReport, Judge, JudgeResult, Stage, Submission, SubmissionReport,
    TestCase, Verdict,
};
pub use process::{ExecutionRequest, InputSource};
pub use runner::{CompileOutcome, Program, Runner};
pub use types::{ExecutionResult, LimitExceeded, ResourceLimits, Termination};

pub mod compare;
pub mod config;
pub mod error;
pub mod judge;
pub mod process;
pub mod runner;
pub mod types;
