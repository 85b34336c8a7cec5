//! Toolchain entries: how sources of one language are built and run
//!
//! Commands are argv templates. `{source}` names the source file, while
//! `{output}` and `{binary}` both name the build artifact. Expansion is a
//! single left-to-right pass, so a substituted path that itself contains a
//! placeholder is inserted verbatim.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::types::ResourceLimits;

/// Default PATH given to compilers and programs
pub const DEFAULT_RUN_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Values substituted into a [`CommandTemplate`]
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub source: &'a str,
    pub artifact: &'a str,
}

impl Bindings<'_> {
    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "source" => Some(self.source),
            "output" | "binary" => Some(self.artifact),
            _ => None,
        }
    }
}

/// An argv whose arguments may contain placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(Vec<String>);

impl CommandTemplate {
    pub fn new(args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(args.into_iter().map(Into::into).collect())
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Substitute placeholders in every argument
    ///
    /// Unknown `{names}` and unbalanced braces are kept as written.
    pub fn expand(&self, bindings: Bindings<'_>) -> Vec<String> {
        self.0.iter().map(|arg| expand_arg(arg, bindings)).collect()
    }
}

fn expand_arg(arg: &str, bindings: Bindings<'_>) -> String {
    let mut expanded = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        expanded.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| Some((bindings.lookup(&after[..close])?, close)));
        match value {
            Some((value, close)) => {
                expanded.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                expanded.push('{');
                rest = after;
            }
        }
    }
    expanded.push_str(rest);
    expanded
}

/// A language together with the tools that build and run it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toolchain {
    /// Display name, e.g. "C++20 (GCC)"
    pub name: String,

    /// Sources with this extension are detected as this toolchain's
    pub extension: FileExtension,

    /// Build step; interpreted toolchains have none
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    pub run: RunConfig,
}

impl Toolchain {
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Whether `source` carries this toolchain's extension
    pub fn handles(&self, source: &Path) -> bool {
        let extension = source.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        self.extension.as_str() == extension
    }

    /// Reject entries that could never build or run anything
    pub(crate) fn check(&self, id: &str) -> Result<(), ConfigError> {
        let invalid = |what: &str| Err(ConfigError::Invalid(format!("toolchain '{id}' {what}")));

        if self.name.is_empty() {
            return invalid("has empty name");
        }
        if self.extension.as_str().is_empty() {
            return invalid("has empty extension");
        }
        if self.run.command.is_empty() {
            return invalid("has empty run command");
        }
        if let Some(ref compile) = self.compile {
            if compile.command.is_empty() {
                return invalid("has empty compile command");
            }
            if compile.output_name.is_empty() || compile.output_name.contains('/') {
                return invalid("needs a plain file name as output_name");
            }
        }
        Ok(())
    }
}

/// Source file extension, stored without the leading dot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        Self::try_from(extension.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FileExtension {
    type Error = ConfigError;

    fn try_from(extension: String) -> Result<Self, Self::Error> {
        if extension.contains(['/', '.']) {
            return Err(ConfigError::InvalidExtension(extension));
        }
        Ok(Self(extension))
    }
}

impl From<FileExtension> for String {
    fn from(extension: FileExtension) -> Self {
        extension.0
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a source is turned into an artifact
///
/// The compiler runs inside a fresh build directory which then holds the
/// artifact for as long as the program is alive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    pub command: CommandTemplate,

    /// Copy the source into the build directory under this name first.
    /// Needed by compilers that insist on a file name, e.g. "Main.java".
    #[serde(default)]
    pub source_name: Option<String>,

    /// File the compiler must leave in the build directory
    pub output_name: String,

    /// Set on top of the run PATH while compiling
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Layered over the configured compile limits
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

/// How a built (or interpreted) program is started
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub command: CommandTemplate,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// PATH for the program and its compiler
    #[serde(default = "default_run_path")]
    pub path: String,

    /// Layered over the default limits
    #[serde(default)]
    pub limits: Option<ResourceLimits>,
}

impl RunConfig {
    pub fn new(command: CommandTemplate) -> Self {
        Self {
            command,
            env: HashMap::new(),
            path: default_run_path(),
            limits: None,
        }
    }

    /// Environment a program starts with: `env` plus PATH
    pub fn environment(&self) -> HashMap<String, String> {
        let mut env = self.env.clone();
        env.insert("PATH".to_string(), self.path.clone());
        env
    }
}

fn default_run_path() -> String {
    DEFAULT_RUN_PATH.to_owned()
}
