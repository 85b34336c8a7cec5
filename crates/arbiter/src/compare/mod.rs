//! Comparator framework
//!
//! Decides whether a program's output is equivalent to the expected answer
//! under a [`Policy`]. Stream policies read both sides incrementally through
//! [`Readable`] backends; the checker policy hands files to an external
//! special judge.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use crate::compare::checker::{CheckerFiles, DEFAULT_CHECKER_TIME_LIMIT, run_checker};
pub use crate::compare::reader::{FileReader, Position, Readable, TextReader};

mod checker;
mod reader;
mod strict;
mod token;

use crate::compare::token::TokenRule;
use crate::error::{Component, StructuredError};

fn default_tolerance() -> f64 {
    1e-6
}

/// Comparison policy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Policy {
    /// Byte equality, forgiving a single trailing newline
    Strict,

    /// Byte equality with no allowance at all
    StrictNaive,

    /// Equal sequences of whitespace-separated tokens
    #[default]
    Token,

    /// Token comparison with numeric tokens compared within tolerance
    Numeric {
        #[serde(default = "default_tolerance")]
        abs_tolerance: f64,
        #[serde(default = "default_tolerance")]
        rel_tolerance: f64,
    },

    /// Strict comparison that reports whitespace-only differences as
    /// presentation mismatches
    Presentation,

    /// External testlib-style checker
    Checker {
        path: PathBuf,
        #[serde(default)]
        time_limit: Option<f64>,
    },
}

impl Policy {
    /// Numeric policy with the default tolerances
    pub fn numeric() -> Self {
        Policy::Numeric {
            abs_tolerance: default_tolerance(),
            rel_tolerance: default_tolerance(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Policy::Strict => "strict",
            Policy::StrictNaive => "strict-naive",
            Policy::Token => "token",
            Policy::Numeric { .. } => "numeric",
            Policy::Presentation => "presentation",
            Policy::Checker { .. } => "checker",
        }
    }

    /// Whether the policy needs files on disk rather than streams
    pub fn is_checker(&self) -> bool {
        matches!(self, Policy::Checker { .. })
    }

    /// Reject tolerances that are negative or not finite
    pub fn validate(&self) -> Result<(), StructuredError> {
        match self {
            Policy::Numeric {
                abs_tolerance,
                rel_tolerance,
            } => {
                for (name, value) in [("abs_tolerance", abs_tolerance), ("rel_tolerance", rel_tolerance)] {
                    if !value.is_finite() || *value < 0.0 {
                        return Err(StructuredError::invalid_argument(
                            Component::Comparator,
                            format!("{name} must be a non-negative number, got {value}"),
                        ));
                    }
                }
                Ok(())
            }
            Policy::Checker {
                time_limit: Some(limit),
                ..
            } if !(limit.is_finite() && *limit > 0.0) => Err(StructuredError::invalid_argument(
                Component::Comparator,
                format!("checker time_limit must be positive, got {limit}"),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Match,
    Mismatch,
    PresentationMismatch,
    /// Checker awarded partial credit
    Partial,
}

/// First point where the outputs diverge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Divergence {
    /// Byte position (0-based offset, 1-based line and column)
    Byte { offset: u64, line: u64, column: u64 },
    /// Token position (0-based)
    Token { index: u64 },
}

/// Result of a comparison
///
/// Immutable value; safe to share across threads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub outcome: Outcome,
    pub divergence: Option<Divergence>,
    pub message: String,
    /// Points awarded by a checker
    pub score: Option<f64>,
}

impl ComparisonResult {
    pub fn matched() -> Self {
        Self {
            outcome: Outcome::Match,
            divergence: None,
            message: String::new(),
            score: None,
        }
    }

    pub fn mismatch(divergence: Divergence, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Mismatch,
            divergence: Some(divergence),
            message: message.into(),
            score: None,
        }
    }

    /// Mismatch without a known position
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Mismatch,
            divergence: None,
            message: message.into(),
            score: None,
        }
    }

    pub fn presentation(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::PresentationMismatch,
            divergence: None,
            message: message.into(),
            score: None,
        }
    }

    pub fn partial(score: Option<f64>, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Partial,
            divergence: None,
            message: message.into(),
            score,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_match(&self) -> bool {
        self.outcome == Outcome::Match
    }
}

/// Expected and actual streams plus the policy to compare them under
pub struct ComparisonRequest {
    pub expected: Box<dyn Readable>,
    pub actual: Box<dyn Readable>,
    pub policy: Policy,
}

impl ComparisonRequest {
    pub fn new(
        expected: impl Readable + 'static,
        actual: impl Readable + 'static,
        policy: Policy,
    ) -> Self {
        Self {
            expected: Box::new(expected),
            actual: Box::new(actual),
            policy,
        }
    }

    /// Run the comparison
    ///
    /// Blocking; callers on an async runtime should use `spawn_blocking`
    /// for file-backed readers. Checker policies are not stream policies and
    /// are rejected here; use [`run_checker`].
    pub fn compare(mut self) -> Result<ComparisonResult, StructuredError> {
        self.policy.validate()?;
        if self.policy.is_checker() {
            return Err(StructuredError::unsupported(
                Component::Comparator,
                "checker policies compare files; use run_checker",
            ));
        }

        self.expected.open()?;
        if let Err(e) = self.actual.open() {
            self.expected.close();
            return Err(e);
        }

        let result = compare_open(&self.policy, &mut *self.expected, &mut *self.actual);

        self.expected.close();
        self.actual.close();
        result
    }
}

fn compare_open(
    policy: &Policy,
    expected: &mut dyn Readable,
    actual: &mut dyn Readable,
) -> Result<ComparisonResult, StructuredError> {
    match *policy {
        Policy::Strict => strict::compare(expected, actual, true),
        Policy::StrictNaive => strict::compare(expected, actual, false),
        Policy::Token => token::compare(expected, actual, TokenRule::Exact),
        Policy::Numeric {
            abs_tolerance,
            rel_tolerance,
        } => token::compare(
            expected,
            actual,
            TokenRule::Numeric {
                abs_tolerance,
                rel_tolerance,
            },
        ),
        Policy::Presentation => {
            let strict = strict::compare(expected, actual, true)?;
            if strict.is_match() {
                return Ok(strict);
            }
            expected.open()?;
            actual.open()?;
            let tokens = token::compare(expected, actual, TokenRule::Exact)?;
            if tokens.is_match() {
                Ok(ComparisonResult {
                    outcome: Outcome::PresentationMismatch,
                    divergence: strict.divergence,
                    message: format!("whitespace differs: {}", strict.message),
                    score: None,
                })
            } else {
                Ok(tokens)
            }
        }
        Policy::Checker { .. } => Err(StructuredError::unsupported(
            Component::Comparator,
            "checker policies compare files",
        )),
    }
}

/// Named comparison policies
#[derive(Debug, Clone)]
pub struct ComparatorRegistry {
    policies: BTreeMap<String, Policy>,
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        let policies = [
            Policy::Strict,
            Policy::StrictNaive,
            Policy::Token,
            Policy::numeric(),
            Policy::Presentation,
        ]
        .into_iter()
        .map(|policy| (policy.name().to_string(), policy))
        .collect();
        Self { policies }
    }
}

impl ComparatorRegistry {
    /// Registry with the built-in policies
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy under `name`, returning the one it replaced
    pub fn register(
        &mut self,
        name: impl Into<String>,
        policy: Policy,
    ) -> Result<Option<Policy>, StructuredError> {
        policy.validate()?;
        Ok(self.policies.insert(name.into(), policy))
    }

    /// Look up a policy by name
    pub fn get(&self, name: &str) -> Result<&Policy, StructuredError> {
        self.policies.get(name).ok_or_else(|| {
            StructuredError::unsupported(
                Component::Comparator,
                format!("no comparator named '{name}'"),
            )
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }
}
