//! Worker configuration: TOML file, command-line overrides and validation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::protocol::codec::{DEFAULT_INITIAL_BUFFER_BYTES, DEFAULT_MAX_RECORD_BYTES};
use crate::worker::StreamLimits;
use crate::{AppError, Result};

fn default_max_record_bytes() -> usize {
    DEFAULT_MAX_RECORD_BYTES
}

fn default_initial_buffer_bytes() -> usize {
    DEFAULT_INITIAL_BUFFER_BYTES
}

/// Worker configuration parsed from an optional `worker.toml`.
///
/// Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct WorkerConfig {
    /// Signature dataset that supersedes embedded entries of the same name.
    #[serde(default)]
    pub fingerprints: Option<PathBuf>,
    /// Largest accepted input record in bytes.
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
    /// Initial read buffer capacity in bytes.
    #[serde(default = "default_initial_buffer_bytes")]
    pub initial_buffer_bytes: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            fingerprints: None,
            max_record_bytes: default_max_record_bytes(),
            initial_buffer_bytes: default_initial_buffer_bytes(),
        }
    }
}

impl WorkerConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read config {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.fingerprints = config.fingerprints.filter(|path| !path.as_os_str().is_empty());
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line values on top of the file (or default) values.
    ///
    /// An empty `fingerprints` path means "no override", as in the file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the merged configuration is invalid.
    pub fn apply_overrides(
        &mut self,
        fingerprints: Option<PathBuf>,
        max_record_bytes: Option<usize>,
    ) -> Result<()> {
        if let Some(path) = fingerprints.filter(|path| !path.as_os_str().is_empty()) {
            self.fingerprints = Some(path);
        }
        if let Some(max) = max_record_bytes {
            self.max_record_bytes = max;
        }
        self.validate()
    }

    /// Stream bounds derived from this configuration.
    ///
    /// The initial buffer is clamped to the record bound.
    #[must_use]
    pub fn limits(&self) -> StreamLimits {
        StreamLimits {
            max_record_bytes: self.max_record_bytes,
            initial_buffer_bytes: self.initial_buffer_bytes.min(self.max_record_bytes),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_record_bytes == 0 {
            return Err(AppError::Config(
                "max_record_bytes must be greater than zero".into(),
            ));
        }

        if self.initial_buffer_bytes == 0 {
            return Err(AppError::Config(
                "initial_buffer_bytes must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
