//! Problem manifests
//!
//! A manifest is a TOML file listing a problem's test cases:
//!
//! ```toml
//! comparator = "close"
//!
//! [limits]
//! time_limit = 1.0
//!
//! [comparators.close]
//! type = "numeric"
//! abs_tolerance = 1e-4
//!
//! [[cases]]
//! input = "tests/1.in"
//! answer = "tests/1.ans"
//!
//! [[cases]]
//! name = "large"
//! input = "tests/2.in"
//! answer = "tests/2.ans"
//! comparator = "token"
//! limits = { time_limit = 3.0 }
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config as ConfigBuilder, File, FileFormat};
use serde::Deserialize;

use crate::compare::{ComparatorRegistry, Policy};
use crate::config::ConfigError;
use crate::error::{Component, StructuredError};
use crate::judge::{AnswerSource, TestCase};
use crate::process::InputSource;
use crate::types::ResourceLimits;

fn default_comparator() -> String {
    Policy::default().name().to_string()
}

/// One `[[cases]]` entry of a manifest
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaseEntry {
    /// Defaults to the input file's stem
    #[serde(default)]
    pub name: Option<String>,
    pub input: PathBuf,
    pub answer: PathBuf,
    /// Comparator name, the problem's default if unset
    #[serde(default)]
    pub comparator: Option<String>,
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

/// Test data for one problem
#[derive(Debug, Clone, Deserialize)]
pub struct Problem {
    /// Name of the comparator used by cases that do not pick one
    #[serde(default = "default_comparator")]
    pub comparator: String,

    /// Limit overrides applied to every case
    #[serde(default)]
    pub limits: Option<ResourceLimits>,

    /// Extra named comparators, on top of the built-in ones
    #[serde(default)]
    pub comparators: BTreeMap<String, Policy>,

    #[serde(default)]
    pub cases: Vec<CaseEntry>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Problem {
    /// Load a manifest from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        std::fs::metadata(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

        let manifest = ConfigBuilder::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?;

        let mut problem: Problem = manifest.try_deserialize()?;
        problem.base_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        problem.validate()?;
        Ok(problem)
    }

    /// Parse a manifest whose relative paths are relative to `base_dir`
    pub fn parse_toml(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let manifest = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let mut problem: Problem = manifest.try_deserialize()?;
        problem.base_dir = base_dir.into();
        problem.validate()?;
        Ok(problem)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref limits) = self.limits {
            limits.validate(Component::Config)?;
        }
        for (index, case) in self.cases.iter().enumerate() {
            if let Some(ref limits) = case.limits {
                limits.validate(Component::Config).map_err(|e| StructuredError {
                    message: format!("case {}: {}", index + 1, e.message),
                    ..e
                })?;
            }
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Built-in comparators plus the manifest's own
    ///
    /// Checker paths are resolved against the manifest's directory.
    pub fn registry(&self) -> Result<ComparatorRegistry, StructuredError> {
        let mut registry = ComparatorRegistry::new();
        for (name, policy) in &self.comparators {
            let policy = match policy {
                Policy::Checker { path, time_limit } => Policy::Checker {
                    path: self.resolve(path),
                    time_limit: *time_limit,
                },
                other => other.clone(),
            };
            registry
                .register(name.clone(), policy)
                .map_err(|e| e.within(Component::Config))?;
        }
        Ok(registry)
    }

    /// Test cases in manifest order
    ///
    /// Unknown comparator names are `UnsupportedOperation`. Files are not
    /// opened here; a missing input or answer surfaces when its case runs.
    pub fn test_cases(&self) -> Result<Vec<TestCase>, StructuredError> {
        let registry = self.registry()?;
        self.cases
            .iter()
            .enumerate()
            .map(|(index, entry)| -> Result<TestCase, StructuredError> {
                let name = entry.name.clone().unwrap_or_else(|| {
                    entry
                        .input
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                        .unwrap_or_else(|| (index + 1).to_string())
                });
                let comparator = entry.comparator.as_deref().unwrap_or(&self.comparator);
                let policy = registry
                    .get(comparator)
                    .map_err(|e| e.within(Component::Config))?
                    .clone();
                let limits = match (&self.limits, &entry.limits) {
                    (Some(base), Some(case)) => Some(base.overlaid_with(case)),
                    (base, case) => case.clone().or_else(|| base.clone()),
                };

                Ok(TestCase {
                    name,
                    input: InputSource::File(self.resolve(&entry.input)),
                    answer: AnswerSource::File(self.resolve(&entry.answer)),
                    policy,
                    limits,
                })
            })
            .collect()
    }
}
