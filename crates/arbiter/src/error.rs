//! Structured error taxonomy shared by every component
//!
//! Every failure that crosses a component boundary is a [`StructuredError`]:
//! a kind from a closed set, the component it originated in, and a message.
//! Callers match on [`ErrorKind`] instead of downcasting.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Kind of a structured error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or unreadable input, answer, or artifact
    FileError,

    /// Malformed limits or paths supplied by the caller
    InvalidArgument,

    /// Configuration value outside its accepted bounds
    RangeError,

    /// Misbehavior of a subject program
    RuntimeError,

    /// OS or process-launch infrastructure failure
    SystemError,

    /// Requested comparator or toolchain is not available here
    UnsupportedOperation,

    /// A post-condition check failed
    ValidationFailed,
}

impl ErrorKind {
    /// Whether this kind always indicates a failure of the judging
    /// infrastructure rather than of the subject program or its data.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            ErrorKind::SystemError
                | ErrorKind::InvalidArgument
                | ErrorKind::RangeError
                | ErrorKind::ValidationFailed
        )
    }

    /// Stable lowercase name, as used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::FileError => "file error",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::RangeError => "range error",
            ErrorKind::RuntimeError => "runtime error",
            ErrorKind::SystemError => "system error",
            ErrorKind::UnsupportedOperation => "unsupported operation",
            ErrorKind::ValidationFailed => "validation failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component an error originated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Config,
    Process,
    Compiler,
    Comparator,
    Judge,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Config => "config",
            Component::Process => "process",
            Component::Compiler => "compiler",
            Component::Comparator => "comparator",
            Component::Judge => "judge",
        };
        f.write_str(name)
    }
}

/// A tagged error carrying its kind and originating component
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} in {component}: {message}")]
pub struct StructuredError {
    pub kind: ErrorKind,
    pub component: Component,
    pub message: String,
}

impl StructuredError {
    pub fn new(kind: ErrorKind, component: Component, message: impl Into<String>) -> Self {
        Self {
            kind,
            component,
            message: message.into(),
        }
    }

    pub fn file(component: Component, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileError, component, message)
    }

    pub fn invalid_argument(component: Component, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, component, message)
    }

    pub fn range(component: Component, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RangeError, component, message)
    }

    pub fn system(component: Component, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SystemError, component, message)
    }

    pub fn unsupported(component: Component, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedOperation, component, message)
    }

    pub fn validation(component: Component, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, component, message)
    }

    /// File error for an I/O failure on `path`
    pub fn io(component: Component, path: &Path, err: &std::io::Error) -> Self {
        Self::file(component, format!("{}: {err}", path.display()))
    }

    /// Re-tag the originating component, keeping kind and message
    #[must_use]
    pub fn within(mut self, component: Component) -> Self {
        self.component = component;
        self
    }
}
