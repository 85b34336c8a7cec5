//! Configuration file loading
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError};
use crate::error::Component;

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        std::fs::metadata(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

        let config = ConfigBuilder::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.default_limits.validate(Component::Config)?;
        self.compile_limits.validate(Component::Config)?;

        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.memory_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "memory_poll_interval_ms must be positive".to_string(),
            ));
        }
        if let Some(budget) = self.submission_time_limit
            && !(budget.is_finite() && budget > 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "submission_time_limit must be positive, got {budget}"
            )));
        }
        if self.output_ratio_limit == Some(0) {
            return Err(ConfigError::Invalid(
                "output_ratio_limit must be positive".to_string(),
            ));
        }

        for (id, toolchain) in &self.toolchains {
            toolchain.check(id)?;
            if let Some(ref limits) = toolchain.run.limits {
                limits.validate(Component::Config)?;
            }
            if let Some(limits) = toolchain.compile.as_ref().and_then(|c| c.limits.as_ref()) {
                limits.validate(Component::Config)?;
            }
        }

        Ok(())
    }
}
