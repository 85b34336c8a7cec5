//! Builder for GCC-family compile commands
//!
//! Produces a [`CompileConfig`] whose command uses the usual `{source}` and
//! `{output}` placeholders, so the result plugs into a [`Toolchain`] like a
//! hand-written configuration entry.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::toolchain::{CommandTemplate, CompileConfig, FileExtension, RunConfig};
use crate::config::{ConfigError, Toolchain};
use crate::types::ResourceLimits;

/// Optimization level passed as `-O<level>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Optimization {
    O0,
    O1,
    #[default]
    O2,
    O3,
    Ofast,
}

impl Optimization {
    fn flag(self) -> &'static str {
        match self {
            Optimization::O0 => "-O0",
            Optimization::O1 => "-O1",
            Optimization::O2 => "-O2",
            Optimization::O3 => "-O3",
            Optimization::Ofast => "-Ofast",
        }
    }
}

/// Language standard passed as `-std=`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CppStandard {
    Cpp98,
    Cpp03,
    Cpp11,
    Cpp14,
    #[default]
    Cpp17,
    Cpp20,
}

impl CppStandard {
    fn flag(self) -> &'static str {
        match self {
            CppStandard::Cpp98 => "-std=c++98",
            CppStandard::Cpp03 => "-std=c++03",
            CppStandard::Cpp11 => "-std=c++11",
            CppStandard::Cpp14 => "-std=c++14",
            CppStandard::Cpp17 => "-std=c++17",
            CppStandard::Cpp20 => "-std=c++20",
        }
    }
}

/// Warning switches. With none enabled, warnings are silenced with `-w`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Warnings {
    pub all: bool,
    pub extra: bool,
    pub pedantic: bool,
    pub error: bool,
}

impl Warnings {
    pub const NONE: Warnings = Warnings {
        all: false,
        extra: false,
        pedantic: false,
        error: false,
    };

    /// `-Wall -Wextra`
    pub const STANDARD: Warnings = Warnings {
        all: true,
        extra: true,
        pedantic: false,
        error: false,
    };

    fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    fn flags(&self) -> Vec<&'static str> {
        if self.is_none() {
            return vec!["-w"];
        }
        let mut flags = Vec::new();
        if self.all {
            flags.push("-Wall");
        }
        if self.extra {
            flags.push("-Wextra");
        }
        if self.pedantic {
            flags.push("-pedantic");
        }
        if self.error {
            flags.push("-Werror");
        }
        flags
    }
}

/// Builder for a `g++`-style compile command
#[derive(Debug, Clone)]
pub struct GccCommand {
    compiler: String,
    optimization: Optimization,
    standard: CppStandard,
    warnings: Warnings,
    debug: bool,
    link_static: bool,
    include_files: Vec<String>,
    include_dirs: Vec<String>,
    defines: BTreeMap<String, String>,
    libraries: Vec<String>,
    output_name: String,
    limits: Option<ResourceLimits>,
}

impl Default for GccCommand {
    fn default() -> Self {
        Self {
            compiler: "g++".to_string(),
            optimization: Optimization::default(),
            standard: CppStandard::default(),
            warnings: Warnings::NONE,
            debug: false,
            link_static: false,
            include_files: Vec::new(),
            include_dirs: Vec::new(),
            defines: BTreeMap::new(),
            libraries: Vec::new(),
            output_name: "main".to_string(),
            limits: None,
        }
    }
}

impl GccCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler executable (default `g++`)
    pub fn with_compiler(mut self, compiler: impl Into<String>) -> Self {
        self.compiler = compiler.into();
        self
    }

    pub fn with_optimization(mut self, optimization: Optimization) -> Self {
        self.optimization = optimization;
        self
    }

    pub fn with_standard(mut self, standard: CppStandard) -> Self {
        self.standard = standard;
        self
    }

    /// Replace the warning switches
    pub fn with_warnings(mut self, warnings: Warnings) -> Self {
        self.warnings = warnings;
        self
    }

    /// Enable warning switches in addition to the current ones
    pub fn add_warnings(mut self, warnings: Warnings) -> Self {
        self.warnings.all |= warnings.all;
        self.warnings.extra |= warnings.extra;
        self.warnings.pedantic |= warnings.pedantic;
        self.warnings.error |= warnings.error;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_static_linking(mut self, link_static: bool) -> Self {
        self.link_static = link_static;
        self
    }

    /// Force-include a header (`-include <file>`)
    pub fn include_file(mut self, file: impl Into<String>) -> Self {
        self.include_files.push(file.into());
        self
    }

    /// Add a header search directory (`-I<dir>`)
    pub fn include_dir(mut self, dir: impl Into<String>) -> Self {
        self.include_dirs.push(dir.into());
        self
    }

    /// Define a macro (`-D<key>` or `-D<key>=<value>`)
    pub fn define(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.insert(key.into(), value.into());
        self
    }

    /// Link a library (`-l<lib>`)
    pub fn link(mut self, library: impl Into<String>) -> Self {
        self.libraries.push(library.into());
        self
    }

    /// Artifact name inside the build directory
    pub fn with_output_name(mut self, output_name: impl Into<String>) -> Self {
        self.output_name = output_name.into();
        self
    }

    /// Compile limits overriding the configured compile limits
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Command template with `{source}` and `{output}` placeholders
    pub fn command(&self) -> CommandTemplate {
        let mut cmd = vec![self.compiler.clone(), "{source}".to_string()];
        if self.debug {
            cmd.push("-g".to_string());
        }
        cmd.push(self.optimization.flag().to_string());
        cmd.push(self.standard.flag().to_string());
        cmd.extend(self.warnings.flags().into_iter().map(str::to_string));

        for file in &self.include_files {
            cmd.push("-include".to_string());
            cmd.push(file.clone());
        }
        for dir in &self.include_dirs {
            cmd.push(format!("-I{dir}"));
        }
        for (key, value) in &self.defines {
            if value.is_empty() {
                cmd.push(format!("-D{key}"));
            } else {
                cmd.push(format!("-D{key}={value}"));
            }
        }
        for lib in &self.libraries {
            cmd.push(format!("-l{lib}"));
        }
        if self.link_static {
            cmd.push("-static".to_string());
        }

        cmd.push("-o".to_string());
        cmd.push("{output}".to_string());
        CommandTemplate::new(cmd)
    }

    /// Compile step configuration for a toolchain
    pub fn compile_config(&self) -> CompileConfig {
        CompileConfig {
            command: self.command(),
            source_name: None,
            output_name: self.output_name.clone(),
            env: HashMap::new(),
            limits: self.limits.clone(),
        }
    }

    /// Complete toolchain that compiles with this command and runs the artifact
    pub fn into_toolchain(
        self,
        name: impl Into<String>,
        extension: &str,
    ) -> Result<Toolchain, ConfigError> {
        Ok(Toolchain {
            name: name.into(),
            extension: FileExtension::new(extension)?,
            compile: Some(self.compile_config()),
            run: RunConfig::new(CommandTemplate::new(["{binary}"])),
        })
    }
}
